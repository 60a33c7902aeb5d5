//! Audit records and the recorder port
//!
//! Every evaluation produces one [`DecisionAudit`] and one [`ExecutionLog`]
//! per rule firing, correlated by execution id. Both are append-only: the
//! recorder port has no update or delete operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    Amount, AuditId, ClaimId, DomainPort, ExecutionId, HealthCheckable, LogId, OperationMetadata,
    Percent, PortError, RuleId, TenantId,
};
use domain_claims::{ClaimError, ContextSnapshot, DecisionType, FinancialOutcome};
use domain_rules::RuleCategory;

use crate::compiler::KnowledgeBase;

pub const RULES_SNAPSHOT_FORMAT: &str = "rules_snapshot/v1";

/// One rule firing within an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: LogId,
    pub execution_id: ExecutionId,
    /// Position of this firing within the batch, starting at 1
    pub sequence: u32,
    pub tenant_id: TenantId,
    pub claim_id: ClaimId,
    pub claim_type: String,
    pub rule_id: RuleId,
    pub rule_code: String,
    pub rule_version: u32,
    pub rule_name: String,
    pub category: RuleCategory,
    pub fired: bool,
    pub condition: String,
    pub action_taken: String,
    /// Field changes and retractions made by the firing
    pub result: serde_json::Value,
    pub duration_ns: u64,
    pub input_snapshot: serde_json::Value,
    pub output_snapshot: serde_json::Value,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Summary of one evaluation batch; the input to replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAudit {
    pub id: AuditId,
    pub execution_id: ExecutionId,
    pub tenant_id: TenantId,
    pub claim_id: ClaimId,
    pub total_rules_evaluated: u32,
    pub rules_fired: u32,
    pub execution_time_ms: u64,
    pub requested_amount: Amount,
    pub approved_amount: Amount,
    pub total_deductions: Amount,
    pub franchise_amount: Amount,
    pub basic_share: Amount,
    pub supplemental_share: Amount,
    pub decision_type: DecisionType,
    pub rejection_codes: Vec<String>,
    /// Context as submitted, before any rule fired
    pub claim_snapshot: serde_json::Value,
    /// Context when the batch ended
    pub output_snapshot: serde_json::Value,
    pub rules_snapshot: serde_json::Value,
    pub knowledge_base_version: String,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub processed_by: String,
    pub processing_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DecisionAudit {
    pub fn financials(&self) -> FinancialOutcome {
        FinancialOutcome {
            requested_amount: self.requested_amount,
            approved_amount: self.approved_amount,
            deductions: self.total_deductions,
            franchise: self.franchise_amount,
            basic_share: self.basic_share,
            supp_share: self.supplemental_share,
            decision: self.decision_type,
            rejection_codes: self.rejection_codes.clone(),
        }
    }

    pub fn input_context(&self) -> Result<ContextSnapshot, ClaimError> {
        ContextSnapshot::from_value(self.claim_snapshot.clone())
    }

    pub fn rules_used(&self) -> Result<RulesSnapshot, ClaimError> {
        RulesSnapshot::from_value(self.rules_snapshot.clone())
    }
}

/// A rule version pinned by a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshotEntry {
    #[serde(alias = "id")]
    pub rule_id: RuleId,
    pub code: String,
    pub version: u32,
    pub checksum: String,
}

/// Engine limits in force when a decision was made
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotLimits {
    pub cycle_ceiling: Option<usize>,
    pub coverage_percent_ceiling: Option<Percent>,
}

/// The rules a decision was computed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesSnapshot {
    pub format: String,
    #[serde(default)]
    pub knowledge_base_version: String,
    #[serde(default)]
    pub limits: SnapshotLimits,
    pub rules: Vec<RuleSnapshotEntry>,
}

impl RulesSnapshot {
    pub fn capture(kb: &KnowledgeBase, limits: SnapshotLimits) -> Self {
        Self {
            format: RULES_SNAPSHOT_FORMAT.to_string(),
            knowledge_base_version: kb.build_version().to_string(),
            limits,
            rules: kb
                .rules()
                .iter()
                .map(|r| RuleSnapshotEntry {
                    rule_id: r.rule_id,
                    code: r.code.clone(),
                    version: r.version,
                    checksum: r.checksum.clone(),
                })
                .collect(),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, ClaimError> {
        serde_json::to_value(self).map_err(|e| ClaimError::Snapshot(e.to_string()))
    }

    /// Decodes a stored rules snapshot.
    ///
    /// Accepts the tagged v1 object and the bare array of entries written
    /// before snapshots carried a format tag.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ClaimError> {
        if value.is_array() {
            let rules: Vec<RuleSnapshotEntry> = serde_json::from_value(value)
                .map_err(|e| ClaimError::Snapshot(e.to_string()))?;
            return Ok(Self {
                format: RULES_SNAPSHOT_FORMAT.to_string(),
                knowledge_base_version: String::new(),
                limits: SnapshotLimits::default(),
                rules,
            });
        }

        match value.get("format").and_then(|f| f.as_str()) {
            Some(RULES_SNAPSHOT_FORMAT) => {
                serde_json::from_value(value).map_err(|e| ClaimError::Snapshot(e.to_string()))
            }
            Some(other) => Err(ClaimError::UnsupportedSnapshotFormat(other.to_string())),
            None => Err(ClaimError::Snapshot("rules snapshot has no format tag".into())),
        }
    }
}

/// Append-only storage for execution logs and decision audits
#[async_trait]
pub trait AuditPort: DomainPort + HealthCheckable {
    async fn log_execution(
        &self,
        log: &ExecutionLog,
        metadata: Option<OperationMetadata>,
    ) -> Result<(), PortError>;

    /// Records a decision; a second decision for the same execution is a conflict
    async fn log_decision(
        &self,
        audit: &DecisionAudit,
        metadata: Option<OperationMetadata>,
    ) -> Result<(), PortError>;

    async fn get_decision(
        &self,
        execution_id: ExecutionId,
        metadata: Option<OperationMetadata>,
    ) -> Result<DecisionAudit, PortError>;

    /// Logs for one execution in firing order
    async fn list_execution_logs(
        &self,
        execution_id: ExecutionId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<ExecutionLog>, PortError>;

    /// Decisions recorded for a claim, oldest first
    async fn list_decisions_for_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<DecisionAudit>, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory audit recorder.
    ///
    /// `set_unavailable(true)` makes every write fail with a connection
    /// error, for exercising the engine's persistence failure path.
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryAuditLog {
        logs: Arc<RwLock<Vec<ExecutionLog>>>,
        decisions: Arc<RwLock<Vec<DecisionAudit>>>,
        unavailable: Arc<AtomicBool>,
    }

    impl InMemoryAuditLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        pub async fn decision_count(&self) -> usize {
            self.decisions.read().await.len()
        }

        pub async fn log_count(&self) -> usize {
            self.logs.read().await.len()
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::connection("audit store unreachable"));
            }
            Ok(())
        }
    }

    impl DomainPort for InMemoryAuditLog {}

    #[async_trait]
    impl HealthCheckable for InMemoryAuditLog {
        async fn health_check(&self) -> HealthCheckResult {
            let unavailable = self.unavailable.load(Ordering::SeqCst);
            HealthCheckResult {
                adapter_id: "in-memory-audit-log".to_string(),
                status: if unavailable {
                    AdapterHealth::Unhealthy
                } else {
                    AdapterHealth::Healthy
                },
                latency_ms: 0,
                message: unavailable.then(|| "audit store unreachable".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl AuditPort for InMemoryAuditLog {
        async fn log_execution(
            &self,
            log: &ExecutionLog,
            _metadata: Option<OperationMetadata>,
        ) -> Result<(), PortError> {
            self.check_available()?;
            let mut logs = self.logs.write().await;
            if logs
                .iter()
                .any(|l| l.execution_id == log.execution_id && l.sequence == log.sequence)
            {
                return Err(PortError::conflict(format!(
                    "execution {} already has a log at sequence {}",
                    log.execution_id, log.sequence
                )));
            }
            logs.push(log.clone());
            Ok(())
        }

        async fn log_decision(
            &self,
            audit: &DecisionAudit,
            _metadata: Option<OperationMetadata>,
        ) -> Result<(), PortError> {
            self.check_available()?;
            let mut decisions = self.decisions.write().await;
            if decisions.iter().any(|d| d.execution_id == audit.execution_id) {
                return Err(PortError::conflict(format!(
                    "execution {} already has a decision",
                    audit.execution_id
                )));
            }
            decisions.push(audit.clone());
            Ok(())
        }

        async fn get_decision(
            &self,
            execution_id: ExecutionId,
            _metadata: Option<OperationMetadata>,
        ) -> Result<DecisionAudit, PortError> {
            self.decisions
                .read()
                .await
                .iter()
                .find(|d| d.execution_id == execution_id)
                .cloned()
                .ok_or_else(|| PortError::not_found("DecisionAudit", execution_id))
        }

        async fn list_execution_logs(
            &self,
            execution_id: ExecutionId,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Vec<ExecutionLog>, PortError> {
            let mut logs: Vec<_> = self
                .logs
                .read()
                .await
                .iter()
                .filter(|l| l.execution_id == execution_id)
                .cloned()
                .collect();
            logs.sort_by_key(|l| l.sequence);
            Ok(logs)
        }

        async fn list_decisions_for_claim(
            &self,
            tenant_id: TenantId,
            claim_id: ClaimId,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Vec<DecisionAudit>, PortError> {
            Ok(self
                .decisions
                .read()
                .await
                .iter()
                .filter(|d| d.tenant_id == tenant_id && d.claim_id == claim_id)
                .cloned()
                .collect())
        }
    }
}
