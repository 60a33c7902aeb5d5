//! Pre-built Test Fixtures
//!
//! The reference rule trio used across the suites, and a few fixed instants
//! and claims with well-known outcomes.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{Amount, ClaimId, Percent, TenantId};
use domain_claims::ClaimContext;
use domain_rules::{NewRuleVersion, RuleCategory};
use rust_decimal_macros::dec;

/// Caps approval at the remaining limit and records the excess as a deduction
pub const COVERAGE_LIMIT_SCRIPT: &str = r#"
    when Claim.RequestedAmount > Claim.RemainingLimit
    then Claim.ApprovedAmount = Claim.RemainingLimit;
         Claim.Deductions = Claim.RequestedAmount - Claim.RemainingLimit;
         Claim.DeductionCodes = Append(Claim.DeductionCodes, "LIMIT_EXCEEDED");
         Retract("COVERAGE_LIMIT")
"#;

/// Approves the full request when it fits inside the remaining limit
pub const FULL_APPROVAL_SCRIPT: &str = r#"
    when Claim.RequestedAmount <= Claim.RemainingLimit && Claim.ApprovedAmount == 0
    then Claim.ApprovedAmount = Claim.RequestedAmount;
         Claim.IsApproved = true;
         Retract("FULL_APPROVAL")
"#;

/// Splits the approved amount into the insured's franchise and the insurer's share
pub const CALCULATE_FRANCHISE_SCRIPT: &str = r#"
    when Claim.ApprovedAmount > 0 && Claim.CoveragePercent > 0
    then Claim.Franchise = Claim.ApprovedAmount * (100 - Claim.CoveragePercent) / 100;
         Claim.SuppShare = Claim.ApprovedAmount - Claim.Franchise;
         Retract("CALCULATE_FRANCHISE")
"#;

/// Raises coverage by ten points for emergencies
pub const EMERGENCY_BONUS_SCRIPT: &str = r#"
    when Claim.IsEmergency && Claim.CoveragePercent < 100
    then Claim.CoveragePercent = Claim.CoveragePercent + 10;
         Claim.Notes = Append(Claim.Notes, "EMERGENCY_BONUS");
         Retract("EMERGENCY_BONUS")
"#;

/// Never retracts itself; used to exercise the cycle ceiling
pub const RUNAWAY_SCRIPT: &str = r#"
    when true
    then Claim.Notes = Append(Claim.Notes, "again")
"#;

/// Requests for the reference rules
pub struct ReferenceRules;

impl ReferenceRules {
    pub fn coverage_limit() -> NewRuleVersion {
        NewRuleVersion::new("COVERAGE_LIMIT", "Coverage limit", RuleCategory::Limit, COVERAGE_LIMIT_SCRIPT)
            .with_salience(10)
    }

    pub fn full_approval() -> NewRuleVersion {
        NewRuleVersion::new("FULL_APPROVAL", "Full approval", RuleCategory::Coverage, FULL_APPROVAL_SCRIPT)
            .with_salience(10)
    }

    pub fn calculate_franchise() -> NewRuleVersion {
        NewRuleVersion::new(
            "CALCULATE_FRANCHISE",
            "Franchise split",
            RuleCategory::Franchise,
            CALCULATE_FRANCHISE_SCRIPT,
        )
        .with_salience(5)
    }

    pub fn emergency_bonus() -> NewRuleVersion {
        NewRuleVersion::new(
            "EMERGENCY_BONUS",
            "Emergency coverage bonus",
            RuleCategory::Coverage,
            EMERGENCY_BONUS_SCRIPT,
        )
        .with_salience(15)
    }

    /// Coverage limit, franchise and emergency bonus
    pub fn trio() -> Vec<NewRuleVersion> {
        vec![
            Self::coverage_limit(),
            Self::calculate_franchise(),
            Self::emergency_bonus(),
        ]
    }
}

pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Start of the 2026 rule year
    pub fn rule_year_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    pub fn rule_year_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
    }

    pub fn mid_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    pub fn before_rule_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()
    }
}

pub struct ClaimFixtures;

impl ClaimFixtures {
    /// 1,000,000 requested against 700,000 remaining at 80% coverage.
    ///
    /// With the reference trio: approved 700,000, deductions 300,000,
    /// franchise 140,000, supplemental share 560,000.
    pub fn over_limit_outpatient(tenant_id: TenantId) -> ClaimContext {
        ClaimContext {
            claim_type: "OUTPATIENT".into(),
            service_type: "CONSULTATION".into(),
            requested_amount: Amount::new(1_000_000),
            coverage_limit: Amount::new(1_000_000),
            used_amount: Amount::new(300_000),
            remaining_limit: Amount::new(700_000),
            coverage_percent: Percent::new(dec!(80)),
            ..ClaimContext::new(tenant_id, ClaimId::new())
        }
    }

    /// The over-limit claim flagged as an emergency at 95% coverage
    pub fn emergency(tenant_id: TenantId) -> ClaimContext {
        ClaimContext {
            is_emergency: true,
            coverage_percent: Percent::new(dec!(95)),
            ..Self::over_limit_outpatient(tenant_id)
        }
    }

    /// 200,000 requested with the full limit still available
    pub fn within_limit(tenant_id: TenantId) -> ClaimContext {
        ClaimContext {
            claim_type: "OUTPATIENT".into(),
            requested_amount: Amount::new(200_000),
            coverage_limit: Amount::new(1_000_000),
            remaining_limit: Amount::new(1_000_000),
            coverage_percent: Percent::new(dec!(80)),
            ..ClaimContext::new(tenant_id, ClaimId::new())
        }
    }
}
