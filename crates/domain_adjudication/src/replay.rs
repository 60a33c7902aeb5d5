//! Decision replay
//!
//! Re-runs a recorded decision against the exact rule versions it used.
//! Each pinned version is fetched by code and version, never through the
//! effective-rule query, and its script is checked against the checksum the
//! audit recorded. Any difference is an integrity violation and no result is
//! produced.

use serde::Serialize;
use tracing::{info, instrument, warn};

use core_kernel::{ExecutionId, OperationMetadata};
use domain_claims::FinancialOutcome;
use domain_rules::{content_checksum, Rule};

use crate::audit::{DecisionAudit, RuleSnapshotEntry};
use crate::compiler::KnowledgeBase;
use crate::engine::{evaluate_detached, recorded_write_policy, AdjudicationEngine, EvaluationResult};
use crate::error::EngineError;
use crate::fixpoint::BatchLimits;

/// A replay compared with the decision it reproduces
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub execution_id: ExecutionId,
    pub recorded: FinancialOutcome,
    pub recorded_rules_fired: u32,
    pub replayed: EvaluationResult,
}

impl ReplayReport {
    /// Financial outputs and decision are identical to the recorded ones
    pub fn matches(&self) -> bool {
        self.recorded == self.replayed.financials()
            && self.recorded_rules_fired == self.replayed.rules_fired
    }

    /// Names of the recorded fields the replay disagrees on
    pub fn differences(&self) -> Vec<&'static str> {
        let replayed = self.replayed.financials();
        let recorded = &self.recorded;
        let mut diffs = Vec::new();
        if recorded.approved_amount != replayed.approved_amount {
            diffs.push("approved_amount");
        }
        if recorded.deductions != replayed.deductions {
            diffs.push("deductions");
        }
        if recorded.franchise != replayed.franchise {
            diffs.push("franchise");
        }
        if recorded.basic_share != replayed.basic_share {
            diffs.push("basic_share");
        }
        if recorded.supp_share != replayed.supp_share {
            diffs.push("supp_share");
        }
        if recorded.decision != replayed.decision {
            diffs.push("decision");
        }
        if recorded.rejection_codes != replayed.rejection_codes {
            diffs.push("rejection_codes");
        }
        if self.recorded_rules_fired != self.replayed.rules_fired {
            diffs.push("rules_fired");
        }
        diffs
    }
}

impl AdjudicationEngine {
    /// Re-runs a recorded decision.
    ///
    /// Nothing is persisted and the knowledge base cache is not touched.
    ///
    /// # Errors
    ///
    /// - `Snapshot` if either stored snapshot cannot be decoded
    /// - `RuleStore` if a pinned version no longer exists
    /// - `Integrity` if a pinned version's content differs from the recorded checksum
    #[instrument(
        skip(self, audit),
        fields(tenant_id = %audit.tenant_id, execution_id = %audit.execution_id)
    )]
    pub async fn replay(&self, audit: &DecisionAudit) -> Result<EvaluationResult, EngineError> {
        let execution_id = audit.execution_id;
        let snapshot = audit
            .input_context()
            .map_err(|e| EngineError::snapshot(execution_id, e))?;
        let rules_used = audit
            .rules_used()
            .map_err(|e| EngineError::snapshot(execution_id, e))?;

        let mut rules = Vec::with_capacity(rules_used.rules.len());
        for entry in &rules_used.rules {
            rules.push(self.pinned_rule(audit, entry).await?);
        }

        let kb = KnowledgeBase::build(audit.tenant_id, &rules)?;
        let limits = BatchLimits {
            cycle_ceiling: rules_used
                .limits
                .cycle_ceiling
                .unwrap_or_else(|| self.config().cycle_ceiling(kb.len())),
            deadline: None,
            write_policy: recorded_write_policy(&rules_used.limits, self.config()),
        };

        let mut context = snapshot.context;
        context.tenant_id = audit.tenant_id;
        let result = evaluate_detached(execution_id, &kb, context, &limits);
        info!(
            fired = result.rules_fired,
            decision = %result.decision,
            "Replayed decision"
        );
        Ok(result)
    }

    /// Loads a decision by execution id, replays it and compares the outcome
    pub async fn replay_execution(
        &self,
        execution_id: ExecutionId,
        metadata: Option<OperationMetadata>,
    ) -> Result<ReplayReport, EngineError> {
        let audit = self
            .audit_port()
            .get_decision(execution_id, metadata)
            .await
            .map_err(|source| EngineError::AuditLookup {
                execution_id,
                source,
            })?;

        let replayed = self.replay(&audit).await?;
        let report = ReplayReport {
            execution_id,
            recorded: audit.financials(),
            recorded_rules_fired: audit.rules_fired,
            replayed,
        };
        if !report.matches() {
            warn!(
                execution_id = %execution_id,
                differences = ?report.differences(),
                "Replay diverged from recorded decision"
            );
        }
        Ok(report)
    }

    async fn pinned_rule(
        &self,
        audit: &DecisionAudit,
        entry: &RuleSnapshotEntry,
    ) -> Result<Rule, EngineError> {
        let rule = self
            .rule_store()
            .get_rule_by_version(audit.tenant_id, &entry.code, entry.version, None)
            .await
            .map_err(|source| EngineError::RuleStore {
                tenant_id: audit.tenant_id,
                source,
            })?;

        let integrity = |actual: String| EngineError::Integrity {
            code: entry.code.clone(),
            version: entry.version,
            expected: entry.checksum.clone(),
            actual,
        };
        if rule.checksum != entry.checksum {
            return Err(integrity(rule.checksum));
        }
        let computed = content_checksum(&rule.script);
        if computed != entry.checksum {
            return Err(integrity(computed));
        }
        Ok(rule)
    }
}
