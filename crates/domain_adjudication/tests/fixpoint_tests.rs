//! Property tests for the evaluation loop over the reference rule trio

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Amount, ClaimId, Percent, TenantId};
use domain_adjudication::{run_batch, BatchLimits, EngineConfig, KnowledgeBase};
use domain_claims::ClaimContext;
use domain_rules::{NewRuleVersion, Rule, RuleCategory, RuleStatus};

const COVERAGE_LIMIT: &str = r#"
    when Claim.RequestedAmount > Claim.RemainingLimit
    then Claim.ApprovedAmount = Claim.RemainingLimit;
         Claim.Deductions = Claim.RequestedAmount - Claim.RemainingLimit;
         Retract("COVERAGE_LIMIT")
"#;

const FULL_APPROVAL: &str = r#"
    when Claim.RequestedAmount <= Claim.RemainingLimit && Claim.ApprovedAmount == 0
    then Claim.ApprovedAmount = Claim.RequestedAmount;
         Claim.IsApproved = true;
         Retract("FULL_APPROVAL")
"#;

const CALCULATE_FRANCHISE: &str = r#"
    when Claim.ApprovedAmount > 0 && Claim.CoveragePercent > 0
    then Claim.Franchise = Claim.ApprovedAmount * (100 - Claim.CoveragePercent) / 100;
         Claim.SuppShare = Claim.ApprovedAmount - Claim.Franchise;
         Retract("CALCULATE_FRANCHISE")
"#;

const EMERGENCY_BONUS: &str = r#"
    when Claim.IsEmergency && Claim.CoveragePercent < 100
    then Claim.CoveragePercent = Claim.CoveragePercent + 10;
         Retract("EMERGENCY_BONUS")
"#;

fn active(tenant: TenantId, code: &str, salience: i32, script: &str) -> Rule {
    let mut rule = NewRuleVersion::new(code, code, RuleCategory::Coverage, script)
        .with_salience(salience)
        .into_draft(tenant, 1, None, Utc::now());
    rule.status = RuleStatus::Active;
    rule
}

fn reference_rules(tenant: TenantId) -> Vec<Rule> {
    vec![
        active(tenant, "CALCULATE_FRANCHISE", 5, CALCULATE_FRANCHISE),
        active(tenant, "FULL_APPROVAL", 10, FULL_APPROVAL),
        active(tenant, "EMERGENCY_BONUS", 15, EMERGENCY_BONUS),
        active(tenant, "COVERAGE_LIMIT", 10, COVERAGE_LIMIT),
    ]
}

fn limits(kb: &KnowledgeBase) -> BatchLimits {
    let config = EngineConfig::default();
    BatchLimits {
        cycle_ceiling: config.cycle_ceiling(kb.len()),
        deadline: None,
        write_policy: config.write_policy(),
    }
}

fn claim_strategy(tenant: TenantId) -> impl Strategy<Value = ClaimContext> {
    (
        0i64..5_000_000,
        0i64..5_000_000,
        0u32..=100,
        any::<bool>(),
    )
        .prop_map(move |(requested, remaining, coverage, emergency)| ClaimContext {
            requested_amount: Amount::new(requested),
            remaining_limit: Amount::new(remaining),
            coverage_percent: Percent::new(Decimal::from(coverage)),
            is_emergency: emergency,
            ..ClaimContext::new(tenant, ClaimId::new())
        })
}

#[test]
fn test_reference_rules_fire_in_salience_order() {
    let tenant = TenantId::new();
    let kb = KnowledgeBase::build(tenant, &reference_rules(tenant)).unwrap();
    let mut ctx = ClaimContext {
        requested_amount: Amount::new(1_000_000),
        remaining_limit: Amount::new(700_000),
        coverage_percent: Percent::new(Decimal::from(80)),
        is_emergency: true,
        ..ClaimContext::new(tenant, ClaimId::new())
    };

    let outcome = run_batch(&kb, &mut ctx, &limits(&kb));
    let order: Vec<_> = outcome
        .firings
        .iter()
        .map(|f| kb.rules()[f.rule_index].code.as_str())
        .collect();
    assert_eq!(order, vec!["EMERGENCY_BONUS", "COVERAGE_LIMIT", "CALCULATE_FRANCHISE"]);
    assert_eq!(ctx.franchise, Amount::new(70_000));
    assert_eq!(ctx.supp_share, Amount::new(630_000));
}

proptest! {
    #[test]
    fn prop_batches_are_deterministic(claim in claim_strategy(TenantId::new())) {
        let tenant = claim.tenant_id;
        let rules = reference_rules(tenant);
        let mut reversed = rules.clone();
        reversed.reverse();

        let kb_a = KnowledgeBase::build(tenant, &rules).unwrap();
        let kb_b = KnowledgeBase::build(tenant, &reversed).unwrap();
        prop_assert_eq!(kb_a.build_version(), kb_b.build_version());

        let mut ctx_a = claim.clone();
        let mut ctx_b = claim;
        let run_a = run_batch(&kb_a, &mut ctx_a, &limits(&kb_a));
        let run_b = run_batch(&kb_b, &mut ctx_b, &limits(&kb_b));

        let seq_a: Vec<_> = run_a.firings.iter().map(|f| kb_a.rules()[f.rule_index].code.clone()).collect();
        let seq_b: Vec<_> = run_b.firings.iter().map(|f| kb_b.rules()[f.rule_index].code.clone()).collect();
        prop_assert_eq!(seq_a, seq_b);
        prop_assert_eq!(ctx_a, ctx_b);
    }

    #[test]
    fn prop_reference_rules_reconcile(claim in claim_strategy(TenantId::new())) {
        let tenant = claim.tenant_id;
        let kb = KnowledgeBase::build(tenant, &reference_rules(tenant)).unwrap();
        let mut ctx = claim;
        let outcome = run_batch(&kb, &mut ctx, &limits(&kb));

        prop_assert!(outcome.error.is_none());
        prop_assert!(ctx.reconciles());
        prop_assert!(ctx.coverage_percent <= Percent::hundred());
        if ctx.approved_amount.is_positive() && ctx.coverage_percent > Percent::zero() {
            prop_assert_eq!(
                ctx.franchise.checked_add(ctx.supp_share).unwrap(),
                ctx.approved_amount
            );
        } else {
            prop_assert_eq!(ctx.franchise, Amount::zero());
        }
        prop_assert!(outcome.firings.len() <= kb.len());
    }
}
