//! Property-Based Test Generators
//!
//! Proptest strategies for claims and rule orderings that stay inside the
//! ranges the engine accepts.

use core_kernel::{Amount, ClaimId, Percent, TenantId};
use domain_claims::ClaimContext;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Amounts in minor units, up to 50 million
pub fn amount_strategy() -> impl Strategy<Value = Amount> {
    (0i64..=5_000_000_000i64).prop_map(Amount::new)
}

/// Whole or two-decimal percentages in [0, 100]
pub fn percent_strategy() -> impl Strategy<Value = Percent> {
    (0i64..=10_000i64).prop_map(|n| Percent::new(Decimal::new(n, 2)))
}

pub fn claim_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("OUTPATIENT".to_string()),
        Just("INPATIENT".to_string()),
        Just("DENTAL".to_string()),
        Just("PHARMACY".to_string()),
    ]
}

/// Claims with a consistent limit: remaining = max(limit - used, 0)
pub fn claim_context_strategy(tenant_id: TenantId) -> impl Strategy<Value = ClaimContext> {
    (
        claim_type_strategy(),
        amount_strategy(),
        amount_strategy(),
        amount_strategy(),
        percent_strategy(),
        any::<bool>(),
    )
        .prop_map(move |(claim_type, requested, limit, used, coverage, emergency)| {
            ClaimContext {
                claim_type,
                requested_amount: requested,
                coverage_limit: limit,
                used_amount: used,
                coverage_percent: coverage,
                is_emergency: emergency,
                ..ClaimContext::new(tenant_id, ClaimId::new())
            }
            .with_derived_remaining_limit()
        })
}

pub fn salience_strategy() -> impl Strategy<Value = i32> {
    -100i32..=100i32
}

/// A permutation of `0..len`, for shuffling rule input order
pub fn permutation_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}
