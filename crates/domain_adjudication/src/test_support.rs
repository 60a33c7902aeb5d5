//! Shared fixtures for the engine and replay tests

use std::sync::Arc;

use core_kernel::{Amount, ClaimId, Percent, TenantId};
use domain_claims::ClaimContext;
use domain_rules::{InMemoryRuleStore, NewRuleVersion, Rule, RuleCategory, RuleStorePort, RuleTransition};
use rust_decimal_macros::dec;

use crate::audit::mock::InMemoryAuditLog;
use crate::config::EngineConfig;
use crate::engine::AdjudicationEngine;

pub const COVERAGE_LIMIT: &str = r#"
    when Claim.RequestedAmount > Claim.RemainingLimit
    then Claim.ApprovedAmount = Claim.RemainingLimit;
         Claim.Deductions = Claim.RequestedAmount - Claim.RemainingLimit;
         Claim.DeductionCodes = Append(Claim.DeductionCodes, "LIMIT_EXCEEDED");
         Retract("COVERAGE_LIMIT")
"#;

pub const CALCULATE_FRANCHISE: &str = r#"
    when Claim.ApprovedAmount > 0 && Claim.CoveragePercent > 0
    then Claim.Franchise = Claim.ApprovedAmount * (100 - Claim.CoveragePercent) / 100;
         Claim.SuppShare = Claim.ApprovedAmount - Claim.Franchise;
         Retract("CALCULATE_FRANCHISE")
"#;

pub const EMERGENCY_BONUS: &str = r#"
    when Claim.IsEmergency == true && Claim.CoveragePercent < 100
    then Claim.CoveragePercent = Claim.CoveragePercent + 10;
         Claim.Notes = Append(Claim.Notes, "EMERGENCY_BONUS");
         Retract("EMERGENCY_BONUS")
"#;

pub struct Harness {
    pub tenant: TenantId,
    pub store: InMemoryRuleStore,
    pub audit: InMemoryAuditLog,
    pub engine: AdjudicationEngine,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let tenant = TenantId::new();
        let store = InMemoryRuleStore::new();
        store.add_tenant(tenant).await;
        let audit = InMemoryAuditLog::new();
        let engine = AdjudicationEngine::new(
            Arc::new(store.clone()),
            Arc::new(audit.clone()),
            config,
        );
        Self {
            tenant,
            store,
            audit,
            engine,
        }
    }

    /// Creates and activates the next version of a rule
    pub async fn publish(&self, code: &str, salience: i32, script: &str) -> Rule {
        let draft = self
            .store
            .create_version(
                self.tenant,
                NewRuleVersion::new(code, code, RuleCategory::Coverage, script)
                    .with_salience(salience),
                None,
            )
            .await
            .unwrap();
        self.store
            .transition(
                self.tenant,
                code,
                draft.version,
                RuleTransition::Activate {
                    approved_by: "reviewer".into(),
                },
                None,
            )
            .await
            .unwrap()
    }

    /// 1,000,000 requested against 700,000 remaining at 80% coverage
    pub fn claim(&self) -> ClaimContext {
        ClaimContext {
            claim_type: "OUTPATIENT".into(),
            requested_amount: Amount::new(1_000_000),
            coverage_limit: Amount::new(1_000_000),
            used_amount: Amount::new(300_000),
            remaining_limit: Amount::new(700_000),
            coverage_percent: Percent::new(dec!(80)),
            ..ClaimContext::new(self.tenant, ClaimId::new())
        }
    }
}
