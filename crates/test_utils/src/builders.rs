//! Test Data Builders
//!
//! Builders for claim contexts and stored rules that let a test name only
//! the fields it cares about.

use chrono::Utc;
use core_kernel::{Amount, ClaimId, EffectiveWindow, Percent, TenantId};
use domain_claims::ClaimContext;
use domain_rules::{Applicability, NewRuleVersion, Rule, RuleCategory, RuleStatus};
use rust_decimal::Decimal;

/// Builder for claim contexts
///
/// Defaults to an outpatient claim with nothing requested, no limit and
/// zero coverage.
pub struct ClaimContextBuilder {
    context: ClaimContext,
}

impl ClaimContextBuilder {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            context: ClaimContext {
                claim_type: "OUTPATIENT".into(),
                ..ClaimContext::new(tenant_id, ClaimId::new())
            },
        }
    }

    pub fn with_claim_id(mut self, claim_id: ClaimId) -> Self {
        self.context.claim_id = claim_id;
        self
    }

    pub fn claim_type(mut self, claim_type: impl Into<String>) -> Self {
        self.context.claim_type = claim_type.into();
        self
    }

    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.context.service_type = service_type.into();
        self
    }

    pub fn provider_level(mut self, level: i64) -> Self {
        self.context.provider_level = level;
        self
    }

    pub fn requested(mut self, minor_units: i64) -> Self {
        self.context.requested_amount = Amount::new(minor_units);
        self
    }

    /// Sets the coverage limit and used amount, deriving the remaining limit
    pub fn limit(mut self, coverage_limit: i64, used: i64) -> Self {
        self.context.coverage_limit = Amount::new(coverage_limit);
        self.context.used_amount = Amount::new(used);
        self.context = self.context.with_derived_remaining_limit();
        self
    }

    pub fn coverage(mut self, percent: i64) -> Self {
        self.context.coverage_percent = Percent::new(Decimal::from(percent));
        self
    }

    pub fn emergency(mut self) -> Self {
        self.context.is_emergency = true;
        self
    }

    pub fn needs_pre_auth(mut self, has_pre_auth: bool) -> Self {
        self.context.needs_pre_auth = true;
        self.context.has_pre_auth = has_pre_auth;
        self
    }

    pub fn days_since_policy_start(mut self, days: i64) -> Self {
        self.context.days_since_policy_start = days;
        self
    }

    pub fn build(self) -> ClaimContext {
        self.context
    }
}

/// Builder for fully formed rules, bypassing any store
///
/// Produces an active version 1 unless told otherwise.
pub struct RuleBuilder {
    tenant_id: TenantId,
    request: NewRuleVersion,
    version: u32,
    status: RuleStatus,
}

impl RuleBuilder {
    pub fn new(tenant_id: TenantId, code: impl Into<String>, script: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            tenant_id,
            request: NewRuleVersion::new(code.clone(), code, RuleCategory::Coverage, script),
            version: 1,
            status: RuleStatus::Active,
        }
    }

    /// Starts from an existing request, such as a reference rule
    pub fn from_request(tenant_id: TenantId, request: NewRuleVersion) -> Self {
        Self {
            tenant_id,
            request,
            version: 1,
            status: RuleStatus::Active,
        }
    }

    pub fn salience(mut self, salience: i32) -> Self {
        self.request.salience = salience;
        self
    }

    pub fn category(mut self, category: RuleCategory) -> Self {
        self.request.category = category;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn effective(mut self, window: EffectiveWindow) -> Self {
        self.request.effective = window;
        self
    }

    pub fn applicability(mut self, applicability: Applicability) -> Self {
        self.request.applicability = applicability;
        self
    }

    pub fn build(self) -> Rule {
        let mut rule = self
            .request
            .into_draft(self.tenant_id, self.version, None, Utc::now());
        rule.status = self.status;
        rule
    }
}
