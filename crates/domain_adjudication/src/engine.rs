//! Adjudication engine
//!
//! [`AdjudicationEngine::evaluate`] resolves the rules for a claim, runs the
//! fixpoint loop, and writes the execution logs and the decision audit
//! before returning.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = AdjudicationEngine::new(rule_store, audit_log, EngineConfig::default());
//! let outcome = engine.evaluate(EvaluationRequest::new(tenant_id, context)).await?;
//! if let Some(err) = &outcome.audit_error {
//!     // decision stands; retry persisting `outcome.audit` and `outcome.logs`
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AuditId, ClaimId, ExecutionId, LogId, OperationMetadata, PortError, RuleSetId, TenantId,
};
use domain_claims::{ClaimContext, ContextSnapshot, DecisionType, FinancialOutcome, WritePolicy};
use domain_rules::{Rule, RuleStorePort};

use crate::audit::{AuditPort, DecisionAudit, ExecutionLog, RulesSnapshot, SnapshotLimits};
use crate::cache::{CacheKey, KnowledgeBaseCache};
use crate::compiler::KnowledgeBase;
use crate::config::EngineConfig;
use crate::error::{AuditPersistenceError, EngineError, EvaluationError};
use crate::fixpoint::{run_batch, BatchLimits, BatchOutcome};

/// Where the rules for an evaluation come from
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// The tenant's effective rules at `as_of` (now when `None`)
    Store { as_of: Option<DateTime<Utc>> },
    /// The effective members of one rule set
    RuleSet {
        id: RuleSetId,
        as_of: Option<DateTime<Utc>>,
    },
    /// Rules supplied by the caller, used as given
    Explicit(Vec<Rule>),
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub tenant_id: TenantId,
    pub context: ClaimContext,
    pub rules: RuleSource,
    pub deadline: Option<Duration>,
    pub processed_by: Option<String>,
    pub processing_note: Option<String>,
    pub metadata: Option<OperationMetadata>,
}

impl EvaluationRequest {
    pub fn new(tenant_id: TenantId, context: ClaimContext) -> Self {
        Self {
            tenant_id,
            context,
            rules: RuleSource::Store { as_of: None },
            deadline: None,
            processed_by: None,
            processing_note: None,
            metadata: None,
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = RuleSource::Explicit(rules);
        self
    }

    pub fn with_rule_set(mut self, id: RuleSetId) -> Self {
        self.rules = RuleSource::RuleSet { id, as_of: None };
        self
    }

    /// Resolves store rules as of `at` instead of now
    pub fn as_of(mut self, at: DateTime<Utc>) -> Self {
        match &mut self.rules {
            RuleSource::Store { as_of } | RuleSource::RuleSet { as_of, .. } => *as_of = Some(at),
            RuleSource::Explicit(_) => {}
        }
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn processed_by(mut self, processor: impl Into<String>) -> Self {
        self.processed_by = Some(processor.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.processing_note = Some(note.into());
        self
    }

    pub fn with_metadata(mut self, metadata: OperationMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A rule that fired, in firing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiredRule {
    pub sequence: u32,
    pub code: String,
    pub version: u32,
}

/// The outcome of one rule batch.
///
/// When `error` is set the batch aborted and `context` holds whatever the
/// rules computed up to that point; treat it as incomplete.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub execution_id: ExecutionId,
    pub tenant_id: TenantId,
    pub claim_id: ClaimId,
    pub context: ClaimContext,
    pub decision: DecisionType,
    pub rules_evaluated: u32,
    pub rules_fired: u32,
    pub fired_rules: Vec<FiredRule>,
    #[serde(with = "duration_ms")]
    pub execution_time: Duration,
    pub knowledge_base_version: String,
    #[serde(serialize_with = "error_message")]
    pub error: Option<EvaluationError>,
}

impl EvaluationResult {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn financials(&self) -> FinancialOutcome {
        self.context.financials()
    }
}

/// Everything an evaluation produced
#[derive(Debug)]
pub struct EvaluationOutcome {
    pub result: EvaluationResult,
    pub audit: DecisionAudit,
    pub logs: Vec<ExecutionLog>,
    /// Set when some audit writes failed; `result` is still valid
    pub audit_error: Option<AuditPersistenceError>,
}

pub struct AdjudicationEngine {
    rule_store: Arc<dyn RuleStorePort>,
    audit: Arc<dyn AuditPort>,
    cache: Arc<KnowledgeBaseCache>,
    config: EngineConfig,
}

impl AdjudicationEngine {
    pub fn new(
        rule_store: Arc<dyn RuleStorePort>,
        audit: Arc<dyn AuditPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rule_store,
            audit,
            cache: Arc::new(KnowledgeBaseCache::new()),
            config,
        }
    }

    /// Shares a cache with other engine instances
    pub fn with_cache(mut self, cache: Arc<KnowledgeBaseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<KnowledgeBaseCache> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn rule_store(&self) -> &Arc<dyn RuleStorePort> {
        &self.rule_store
    }

    pub(crate) fn audit_port(&self) -> &Arc<dyn AuditPort> {
        &self.audit
    }

    /// Drops cached knowledge bases for a tenant after a rule change
    pub async fn invalidate(&self, tenant_id: TenantId) {
        self.cache.invalidate(tenant_id).await;
    }

    /// Evaluates one claim and records the decision.
    ///
    /// # Errors
    ///
    /// Returns an error when no evaluation took place (the rule store failed,
    /// a rule did not compile, the rule set is inactive, or the context names
    /// another tenant) or when the audit records cannot be encoded. Aborted
    /// batches and audit write failures are reported on the outcome.
    #[instrument(
        skip(self, request),
        fields(
            tenant_id = %request.tenant_id,
            claim_id = %request.context.claim_id,
            execution_id = tracing::field::Empty
        )
    )]
    pub async fn evaluate(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationOutcome, EngineError> {
        let EvaluationRequest {
            tenant_id,
            mut context,
            rules,
            deadline,
            processed_by,
            processing_note,
            metadata,
        } = request;

        let execution_id = ExecutionId::new_v7();
        tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

        if context.tenant_id.as_uuid().is_nil() {
            context.tenant_id = tenant_id;
        } else if context.tenant_id != tenant_id {
            return Err(EngineError::TenantMismatch {
                tenant_id,
                context_tenant: context.tenant_id,
            });
        }

        let kb = self.resolve(tenant_id, rules, metadata.clone()).await?;
        let limits = BatchLimits {
            cycle_ceiling: self.config.cycle_ceiling(kb.len()),
            deadline: deadline.or_else(|| self.config.default_timeout()),
            write_policy: self.config.write_policy(),
        };

        let input = context.clone();
        let batch = run_batch(&kb, &mut context, &limits);
        let result = summarize(execution_id, &kb, context, &batch);

        if let Some(err) = &result.error {
            warn!(error = %err, fired = result.rules_fired, "Evaluation aborted");
        } else {
            info!(
                decision = %result.decision,
                fired = result.rules_fired,
                evaluated = result.rules_evaluated,
                approved = result.context.approved_amount.minor_units(),
                "Claim evaluated"
            );
        }

        let logs = execution_logs(execution_id, &kb, &batch)?;
        let audit = decision_audit(
            &result,
            &kb,
            &input,
            &limits,
            processed_by.unwrap_or_else(|| self.config.processed_by.clone()),
            processing_note,
        )?;
        let audit_error = self.persist(execution_id, &logs, &audit, metadata).await;

        Ok(EvaluationOutcome {
            result,
            audit,
            logs,
            audit_error,
        })
    }

    async fn resolve(
        &self,
        tenant_id: TenantId,
        source: RuleSource,
        metadata: Option<OperationMetadata>,
    ) -> Result<Arc<KnowledgeBase>, EngineError> {
        let store_error = |source: PortError| EngineError::RuleStore { tenant_id, source };

        match source {
            RuleSource::Store { as_of } => {
                let rules = self
                    .rule_store
                    .get_effective_rules(tenant_id, as_of.unwrap_or_else(Utc::now), metadata)
                    .await
                    .map_err(store_error)?;
                Ok(self.cache.get_or_build(CacheKey::tenant(tenant_id), &rules).await?)
            }
            RuleSource::RuleSet { id, as_of } => {
                let rule_set = self
                    .rule_store
                    .get_rule_set(tenant_id, id, metadata.clone())
                    .await
                    .map_err(store_error)?;
                if !rule_set.is_active {
                    return Err(EngineError::InactiveRuleSet {
                        tenant_id,
                        rule_set_id: id,
                    });
                }
                let at = as_of.unwrap_or_else(Utc::now);
                let effective = self
                    .rule_store
                    .get_effective_rules(tenant_id, at, metadata)
                    .await
                    .map_err(store_error)?;
                let rules = rule_set.filter(effective);
                Ok(self
                    .cache
                    .get_or_build(CacheKey::rule_set(tenant_id, id), &rules)
                    .await?)
            }
            RuleSource::Explicit(rules) => Ok(Arc::new(KnowledgeBase::build(tenant_id, &rules)?)),
        }
    }

    /// Writes logs then the decision, attempting every write even after a failure
    async fn persist(
        &self,
        execution_id: ExecutionId,
        logs: &[ExecutionLog],
        audit: &DecisionAudit,
        metadata: Option<OperationMetadata>,
    ) -> Option<AuditPersistenceError> {
        let mut failures: Vec<PortError> = Vec::new();

        for log in logs {
            if let Err(err) = self.audit.log_execution(log, metadata.clone()).await {
                failures.push(err);
            }
        }
        let decision_persisted = match self.audit.log_decision(audit, metadata).await {
            Ok(()) => true,
            Err(err) => {
                failures.push(err);
                false
            }
        };

        let failed_writes = failures.len();
        let first_error = failures.into_iter().next()?;
        let err = AuditPersistenceError {
            execution_id,
            attempted_writes: logs.len() + 1,
            failed_writes,
            decision_persisted,
            first_error,
        };
        warn!(error = %err, "Audit persistence failed");
        Some(err)
    }
}

/// Runs a knowledge base without touching the cache or the recorder
pub(crate) fn evaluate_detached(
    execution_id: ExecutionId,
    kb: &KnowledgeBase,
    mut context: ClaimContext,
    limits: &BatchLimits,
) -> EvaluationResult {
    let batch = run_batch(kb, &mut context, limits);
    summarize(execution_id, kb, context, &batch)
}

fn summarize(
    execution_id: ExecutionId,
    kb: &KnowledgeBase,
    context: ClaimContext,
    batch: &BatchOutcome,
) -> EvaluationResult {
    let fired_rules: Vec<FiredRule> = batch
        .firings
        .iter()
        .map(|f| {
            let rule = &kb.rules()[f.rule_index];
            debug!(
                sequence = f.sequence,
                rule = %rule.label(),
                changes = f.changes.len(),
                "Rule fired"
            );
            FiredRule {
                sequence: f.sequence,
                code: rule.code.clone(),
                version: rule.version,
            }
        })
        .collect();

    EvaluationResult {
        execution_id,
        tenant_id: kb.tenant_id(),
        claim_id: context.claim_id,
        decision: context.decision(),
        context,
        rules_evaluated: kb.len() as u32,
        rules_fired: fired_rules.len() as u32,
        fired_rules,
        execution_time: batch.elapsed,
        knowledge_base_version: kb.build_version().to_string(),
        error: batch.error.clone(),
    }
}

fn execution_logs(
    execution_id: ExecutionId,
    kb: &KnowledgeBase,
    batch: &BatchOutcome,
) -> Result<Vec<ExecutionLog>, EngineError> {
    let now = Utc::now();
    batch
        .firings
        .iter()
        .map(|f| -> Result<ExecutionLog, EngineError> {
            let rule = &kb.rules()[f.rule_index];
            Ok(ExecutionLog {
                id: LogId::new_v7(),
                execution_id,
                sequence: f.sequence,
                tenant_id: kb.tenant_id(),
                claim_id: f.before.claim_id,
                claim_type: f.before.claim_type.clone(),
                rule_id: rule.rule_id,
                rule_code: rule.code.clone(),
                rule_version: rule.version,
                rule_name: rule.name.clone(),
                category: rule.category,
                fired: true,
                condition: rule.script.condition_text().to_string(),
                action_taken: rule.script.action_text().to_string(),
                result: serde_json::json!({
                    "changes": f.changes,
                    "retracted": f.retracted,
                }),
                duration_ns: f.duration.as_nanos().min(u64::MAX as u128) as u64,
                input_snapshot: snapshot_value(execution_id, &f.before)?,
                output_snapshot: snapshot_value(execution_id, &f.after)?,
                has_error: f.error.is_some(),
                error_message: f.error.clone(),
                created_at: now,
            })
        })
        .collect()
}

fn decision_audit(
    result: &EvaluationResult,
    kb: &KnowledgeBase,
    input: &ClaimContext,
    limits: &BatchLimits,
    processed_by: String,
    processing_note: Option<String>,
) -> Result<DecisionAudit, EngineError> {
    let execution_id = result.execution_id;
    let financials = result.financials();
    let rules_snapshot = RulesSnapshot::capture(
        kb,
        SnapshotLimits {
            cycle_ceiling: Some(limits.cycle_ceiling),
            coverage_percent_ceiling: Some(limits.write_policy.coverage_percent_ceiling),
        },
    );

    Ok(DecisionAudit {
        id: AuditId::new_v7(),
        execution_id: result.execution_id,
        tenant_id: result.tenant_id,
        claim_id: result.claim_id,
        total_rules_evaluated: result.rules_evaluated,
        rules_fired: result.rules_fired,
        execution_time_ms: result.execution_time.as_millis().min(u64::MAX as u128) as u64,
        requested_amount: financials.requested_amount,
        approved_amount: financials.approved_amount,
        total_deductions: financials.deductions,
        franchise_amount: financials.franchise,
        basic_share: financials.basic_share,
        supplemental_share: financials.supp_share,
        decision_type: financials.decision,
        rejection_codes: financials.rejection_codes,
        claim_snapshot: snapshot_value(execution_id, input)?,
        output_snapshot: snapshot_value(execution_id, &result.context)?,
        rules_snapshot: rules_snapshot
            .to_value()
            .map_err(|e| EngineError::snapshot(execution_id, e))?,
        knowledge_base_version: result.knowledge_base_version.clone(),
        has_error: result.error.is_some(),
        error_message: result.error.as_ref().map(ToString::to_string),
        processed_by,
        processing_note,
        created_at: Utc::now(),
    })
}

fn snapshot_value(
    execution_id: ExecutionId,
    context: &ClaimContext,
) -> Result<serde_json::Value, EngineError> {
    ContextSnapshot::capture(context)
        .to_value()
        .map_err(|e| EngineError::snapshot(execution_id, e))
}

/// Write policy recorded on a snapshot, falling back to the engine's own
pub(crate) fn recorded_write_policy(limits: &SnapshotLimits, config: &EngineConfig) -> WritePolicy {
    limits
        .coverage_percent_ceiling
        .map(|ceiling| WritePolicy {
            coverage_percent_ceiling: ceiling,
        })
        .unwrap_or_else(|| config.write_policy())
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }
}

fn error_message<S: serde::Serializer>(
    value: &Option<EvaluationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, CALCULATE_FRANCHISE, COVERAGE_LIMIT, EMERGENCY_BONUS};
    use core_kernel::{Amount, Percent};
    use domain_rules::{RuleSet, RuleTransition};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_coverage_limit_reconciles() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        let ctx = &outcome.result.context;
        assert!(outcome.result.is_complete());
        assert_eq!(ctx.approved_amount, Amount::new(700_000));
        assert_eq!(ctx.deductions, Amount::new(300_000));
        assert!(ctx.reconciles());
        assert_eq!(ctx.deduction_codes, vec!["LIMIT_EXCEEDED".to_string()]);
    }

    #[tokio::test]
    async fn test_franchise_follows_coverage_limit() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        let ctx = &outcome.result.context;
        assert_eq!(ctx.franchise, Amount::new(140_000));
        assert_eq!(ctx.supp_share, Amount::new(560_000));

        let order: Vec<_> = outcome.logs.iter().map(|l| l.rule_code.as_str()).collect();
        assert_eq!(order, vec!["COVERAGE_LIMIT", "CALCULATE_FRANCHISE"]);
    }

    #[tokio::test]
    async fn test_franchise_on_preset_approved_amount() {
        let h = Harness::new().await;
        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;
        let mut claim = h.claim();
        claim.approved_amount = Amount::new(700_000);

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim)).await.unwrap();
        assert_eq!(outcome.result.context.franchise, Amount::new(140_000));
        assert_eq!(outcome.result.context.supp_share, Amount::new(560_000));
    }

    #[tokio::test]
    async fn test_emergency_bonus_is_capped_at_hundred() {
        let h = Harness::new().await;
        h.publish("EMERGENCY_BONUS", 15, EMERGENCY_BONUS).await;
        let mut claim = h.claim();
        claim.is_emergency = true;
        claim.coverage_percent = Percent::new(dec!(95));

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim)).await.unwrap();
        assert_eq!(outcome.result.context.coverage_percent, Percent::hundred());
        assert_eq!(outcome.result.rules_fired, 1);
    }

    #[tokio::test]
    async fn test_configured_coverage_ceiling_applies() {
        let h = Harness::with_config(EngineConfig::default().with_coverage_ceiling(dec!(90))).await;
        h.publish("EMERGENCY_BONUS", 15, EMERGENCY_BONUS).await;
        let mut claim = h.claim();
        claim.is_emergency = true;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim)).await.unwrap();
        assert_eq!(outcome.result.context.coverage_percent, Percent::new(dec!(90)));
    }

    #[tokio::test]
    async fn test_repeated_evaluation_is_deterministic() {
        let h = Harness::new().await;
        h.publish("EMERGENCY_BONUS", 15, EMERGENCY_BONUS).await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;
        let mut claim = h.claim();
        claim.is_emergency = true;

        let first = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim.clone())).await.unwrap();
        let second = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim)).await.unwrap();

        assert_ne!(first.result.execution_id, second.result.execution_id);
        assert_eq!(first.result.financials(), second.result.financials());
        assert_eq!(first.result.fired_rules, second.result.fired_rules);
        assert_eq!(
            serde_json::to_string(&first.result.context).unwrap(),
            serde_json::to_string(&second.result.context).unwrap()
        );
    }

    #[tokio::test]
    async fn test_higher_salience_logs_first() {
        let h = Harness::new().await;
        h.publish("LOW", 5, r#"when true then Claim.Notes = Append(Claim.Notes, "low"); Retract("LOW")"#)
            .await;
        h.publish("HIGH", 10, r#"when true then Claim.Notes = Append(Claim.Notes, "high"); Retract("HIGH")"#)
            .await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        let high = outcome.logs.iter().find(|l| l.rule_code == "HIGH").unwrap();
        let low = outcome.logs.iter().find(|l| l.rule_code == "LOW").unwrap();
        assert!(high.sequence < low.sequence);
        assert_eq!(outcome.result.context.notes, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn test_self_retracting_rule_fires_once_per_execution() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        let logs = h
            .audit
            .list_execution_logs(outcome.result.execution_id, None)
            .await
            .unwrap();
        let mut codes: Vec<_> = logs.iter().map(|l| l.rule_code.clone()).collect();
        let total = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[tokio::test]
    async fn test_no_effective_rules() {
        let h = Harness::new().await;
        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();

        assert!(outcome.result.is_complete());
        assert_eq!(outcome.result.rules_fired, 0);
        assert_eq!(outcome.result.rules_evaluated, 0);
        assert_eq!(outcome.result.context.approved_amount, Amount::zero());
        assert_eq!(outcome.result.decision, DecisionType::Partial);
        assert_eq!(h.audit.decision_count().await, 1);
    }

    #[tokio::test]
    async fn test_audit_records_batch_summary() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;
        h.publish("EMERGENCY_BONUS", 15, EMERGENCY_BONUS).await;

        let outcome = h
            .engine
            .evaluate(
                EvaluationRequest::new(h.tenant, h.claim())
                    .processed_by("adjuster-7")
                    .with_note("resubmission"),
            )
            .await
            .unwrap();
        let stored = h.audit.get_decision(outcome.result.execution_id, None).await.unwrap();

        assert_eq!(stored, outcome.audit);
        assert_eq!(stored.total_rules_evaluated, 3);
        assert_eq!(stored.rules_fired, 2);
        assert_eq!(stored.approved_amount, Amount::new(700_000));
        assert_eq!(stored.franchise_amount, Amount::new(140_000));
        assert_eq!(stored.processed_by, "adjuster-7");
        assert_eq!(stored.processing_note.as_deref(), Some("resubmission"));
        assert!(!stored.has_error);

        let rules = stored.rules_used().unwrap();
        assert_eq!(rules.rules.len(), 3);
        assert_eq!(rules.limits.cycle_ceiling, Some(30));
        assert_eq!(stored.input_context().unwrap().context.approved_amount, Amount::zero());

        let log = &outcome.logs[0];
        assert_eq!(log.condition, "Claim.RequestedAmount > Claim.RemainingLimit");
        assert!(log.action_taken.starts_with("Claim.ApprovedAmount = Claim.RemainingLimit;"));
        assert_eq!(log.result["retracted"][0], "COVERAGE_LIMIT");
        assert!(stored.rules_snapshot.is_object());
        assert!(outcome
            .logs
            .iter()
            .all(|l| l.input_snapshot.is_object() && l.output_snapshot.is_object()));
    }

    #[tokio::test]
    async fn test_processed_by_defaults_to_config() {
        let h = Harness::new().await;
        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert_eq!(outcome.audit.processed_by, "system");
    }

    #[tokio::test]
    async fn test_runaway_rule_hits_cycle_ceiling_and_is_audited() {
        let h = Harness::new().await;
        h.publish("RUNAWAY", 1, r#"when true then Claim.Notes = Append(Claim.Notes, "again")"#)
            .await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert!(matches!(
            outcome.result.error,
            Some(EvaluationError::CycleLimitExceeded { ceiling: 10, .. })
        ));
        assert_eq!(outcome.result.rules_fired, 10);
        assert!(outcome.audit.has_error);
        assert!(outcome.audit.error_message.as_deref().unwrap_or("").contains("RUNAWAY"));
        assert_eq!(h.audit.decision_count().await, 1);
        assert_eq!(h.audit.log_count().await, 10);
    }

    #[tokio::test]
    async fn test_deadline_abort_is_persisted_with_error() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;

        let outcome = h
            .engine
            .evaluate(EvaluationRequest::new(h.tenant, h.claim()).with_deadline(Duration::ZERO))
            .await
            .unwrap();
        assert!(matches!(
            outcome.result.error,
            Some(EvaluationError::DeadlineExceeded { .. })
        ));
        assert!(!outcome.result.is_complete());
        let stored = h.audit.get_decision(outcome.result.execution_id, None).await.unwrap();
        assert!(stored.has_error);
    }

    #[tokio::test]
    async fn test_action_error_keeps_partial_context() {
        let h = Harness::new().await;
        h.publish(
            "UNIT_PRICE",
            1,
            "when true then Claim.IsApproved = true; Claim.ApprovedAmount = Claim.RequestedAmount / Claim.Quantity",
        )
        .await;

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert!(matches!(
            outcome.result.error,
            Some(EvaluationError::Action { ref code, version: 1, .. }) if code == "UNIT_PRICE"
        ));
        assert!(outcome.result.context.is_approved);
        assert_eq!(outcome.result.decision, DecisionType::Approved);
        assert!(outcome.audit.has_error);
        assert!(outcome.logs[0].has_error);
    }

    #[tokio::test]
    async fn test_audit_outage_still_returns_decision() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.audit.set_unavailable(true);

        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert_eq!(outcome.result.context.approved_amount, Amount::new(700_000));

        let err = outcome.audit_error.expect("audit failure reported");
        assert_eq!(err.execution_id, outcome.result.execution_id);
        assert_eq!(err.attempted_writes, 2);
        assert_eq!(err.failed_writes, 2);
        assert!(!err.decision_persisted);
        assert!(err.first_error.is_transient());

        h.audit.set_unavailable(false);
        for log in &outcome.logs {
            h.audit.log_execution(log, None).await.unwrap();
        }
        h.audit.log_decision(&outcome.audit, None).await.unwrap();
        assert_eq!(h.audit.decision_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_before_evaluation() {
        let h = Harness::new().await;
        let stranger = TenantId::new();
        let claim = ClaimContext::new(stranger, ClaimId::new());

        let err = h.engine.evaluate(EvaluationRequest::new(stranger, claim)).await.unwrap_err();
        assert!(matches!(err, EngineError::RuleStore { ref source, .. } if source.is_not_found()));
        assert_eq!(h.audit.decision_count().await, 0);
    }

    #[tokio::test]
    async fn test_context_from_another_tenant_is_rejected() {
        let h = Harness::new().await;
        let claim = ClaimContext::new(TenantId::new(), ClaimId::new());
        let err = h.engine.evaluate(EvaluationRequest::new(h.tenant, claim)).await.unwrap_err();
        assert!(matches!(err, EngineError::TenantMismatch { .. }));
    }

    #[tokio::test]
    async fn test_explicit_rules_bypass_store_and_cache() {
        let h = Harness::new().await;
        let rule = h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.store
            .transition(h.tenant, "COVERAGE_LIMIT", 1, RuleTransition::Deactivate, None)
            .await
            .unwrap();

        let outcome = h
            .engine
            .evaluate(EvaluationRequest::new(h.tenant, h.claim()).with_rules(vec![rule]))
            .await
            .unwrap();
        assert_eq!(outcome.result.rules_fired, 1);
        assert_eq!(h.engine.cache().build_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_rule_with_bad_script_fails_compilation() {
        let h = Harness::new().await;
        let mut rule = h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        rule.script = "when Claim.Missing > 0 then Claim.IsApproved = true".into();
        rule.checksum = domain_rules::content_checksum(&rule.script);

        let err = h
            .engine
            .evaluate(EvaluationRequest::new(h.tenant, h.claim()).with_rules(vec![rule]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Compilation(_)));
        assert_eq!(h.audit.decision_count().await, 0);
    }

    #[tokio::test]
    async fn test_activation_rebuilds_cached_knowledge_base() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;

        h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert_eq!(h.engine.cache().build_count(), 1);

        h.publish("CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE).await;
        let outcome = h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert_eq!(h.engine.cache().build_count(), 2);
        assert_eq!(outcome.result.rules_fired, 2);

        h.engine.invalidate(h.tenant).await;
        h.engine.evaluate(EvaluationRequest::new(h.tenant, h.claim())).await.unwrap();
        assert_eq!(h.engine.cache().build_count(), 3);
    }

    #[tokio::test]
    async fn test_rule_set_limits_the_batch() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        h.publish("EMERGENCY_BONUS", 15, EMERGENCY_BONUS).await;
        let set = h
            .store
            .save_rule_set(RuleSet::new(h.tenant, "limits only", vec!["COVERAGE_LIMIT".into()]), None)
            .await
            .unwrap();
        let mut claim = h.claim();
        claim.is_emergency = true;

        let outcome = h
            .engine
            .evaluate(EvaluationRequest::new(h.tenant, claim).with_rule_set(set.id))
            .await
            .unwrap();
        assert_eq!(outcome.result.rules_evaluated, 1);
        let fired: Vec<_> = outcome.result.fired_rules.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(fired, vec!["COVERAGE_LIMIT"]);
        assert_eq!(outcome.result.context.coverage_percent, Percent::new(dec!(80)));
    }

    #[tokio::test]
    async fn test_inactive_rule_set_is_refused() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        let mut retired = RuleSet::new(h.tenant, "retired", vec!["COVERAGE_LIMIT".into()]);
        retired.is_active = false;
        let set = h.store.save_rule_set(retired, None).await.unwrap();

        let err = h
            .engine
            .evaluate(EvaluationRequest::new(h.tenant, h.claim()).with_rule_set(set.id))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InactiveRuleSet { rule_set_id, .. } if rule_set_id == set.id));
        assert_eq!(h.audit.decision_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_do_not_share_context() {
        let h = Harness::new().await;
        h.publish("COVERAGE_LIMIT", 10, COVERAGE_LIMIT).await;
        let engine = Arc::new(h.engine);

        let mut handles = Vec::new();
        for requested in [800_000_i64, 900_000, 1_000_000, 1_200_000] {
            let engine = Arc::clone(&engine);
            let mut claim = ClaimContext::new(h.tenant, ClaimId::new());
            claim.requested_amount = Amount::new(requested);
            claim.remaining_limit = Amount::new(700_000);
            handles.push(tokio::spawn(async move {
                let outcome = engine.evaluate(EvaluationRequest::new(claim.tenant_id, claim)).await;
                (requested, outcome.map(|o| o.result.context.deductions))
            }));
        }
        for handle in handles {
            let (requested, deductions) = handle.await.unwrap();
            assert_eq!(deductions.unwrap(), Amount::new(requested - 700_000));
        }
    }
}
