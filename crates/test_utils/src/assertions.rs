//! Custom Test Assertions
//!
//! Assertion helpers for adjudication outcomes that report every relevant
//! amount when they fail.

use core_kernel::Amount;
use domain_adjudication::{DecisionAudit, ExecutionLog};
use domain_claims::{ClaimContext, FinancialOutcome};

/// Asserts approved + deductions == requested
pub fn assert_reconciles(ctx: &ClaimContext) {
    assert!(
        ctx.reconciles(),
        "Claim does not reconcile: requested={}, approved={}, deductions={}",
        ctx.requested_amount,
        ctx.approved_amount,
        ctx.deductions
    );
}

/// Asserts franchise + supplemental share == approved
pub fn assert_split_conserved(ctx: &ClaimContext) {
    let split = ctx.franchise.checked_add(ctx.supp_share).ok();
    assert_eq!(
        split,
        Some(ctx.approved_amount),
        "Franchise split does not add up: approved={}, franchise={}, supp_share={}",
        ctx.approved_amount,
        ctx.franchise,
        ctx.supp_share
    );
}

/// Asserts the headline amounts of an outcome
pub fn assert_outcome(outcome: &FinancialOutcome, approved: i64, deductions: i64, franchise: i64, supp_share: i64) {
    assert_eq!(
        (
            outcome.approved_amount,
            outcome.deductions,
            outcome.franchise,
            outcome.supp_share
        ),
        (
            Amount::new(approved),
            Amount::new(deductions),
            Amount::new(franchise),
            Amount::new(supp_share)
        ),
        "Outcome mismatch (approved, deductions, franchise, supp_share)"
    );
}

/// Asserts logs are numbered 1..=n and all belong to the audit's execution
pub fn assert_logs_match_audit(audit: &DecisionAudit, logs: &[ExecutionLog]) {
    assert_eq!(
        logs.len() as u32,
        audit.rules_fired,
        "Audit reports {} firings but {} logs were stored",
        audit.rules_fired,
        logs.len()
    );
    for (index, log) in logs.iter().enumerate() {
        assert_eq!(log.execution_id, audit.execution_id, "Log {} has a foreign execution id", index);
        assert_eq!(log.sequence, index as u32 + 1, "Logs out of sequence at {}", index);
    }
}

/// Asserts the listed codes fired in exactly this order
pub fn assert_firing_order(logs: &[ExecutionLog], expected: &[&str]) {
    let actual: Vec<&str> = logs.iter().map(|l| l.rule_code.as_str()).collect();
    assert_eq!(actual, expected, "Unexpected firing order");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::ClaimContextBuilder;
    use core_kernel::TenantId;

    #[test]
    fn test_reconciled_context_passes() {
        let mut ctx = ClaimContextBuilder::new(TenantId::new()).requested(1_000).build();
        ctx.approved_amount = Amount::new(600);
        ctx.deductions = Amount::new(400);
        assert_reconciles(&ctx);
    }

    #[test]
    #[should_panic(expected = "does not reconcile")]
    fn test_unreconciled_context_panics() {
        let mut ctx = ClaimContextBuilder::new(TenantId::new()).requested(1_000).build();
        ctx.approved_amount = Amount::new(600);
        assert_reconciles(&ctx);
    }
}
