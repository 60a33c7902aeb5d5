//! Versioned rule definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use core_kernel::{EffectiveWindow, RuleId, TenantId};
use domain_claims::ClaimContext;

use crate::error::RuleError;

/// Business area a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Coverage,
    Franchise,
    Deduction,
    Limit,
    Validation,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Coverage => "coverage",
            RuleCategory::Franchise => "franchise",
            RuleCategory::Deduction => "deduction",
            RuleCategory::Limit => "limit",
            RuleCategory::Validation => "validation",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coverage" => Ok(RuleCategory::Coverage),
            "franchise" => Ok(RuleCategory::Franchise),
            "deduction" => Ok(RuleCategory::Deduction),
            "limit" => Ok(RuleCategory::Limit),
            "validation" => Ok(RuleCategory::Validation),
            other => Err(RuleError::UnknownCategory(other.to_string())),
        }
    }
}

/// Lifecycle status of a rule version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    Active,
    Inactive,
    Archived,
    Deprecated,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Draft => "draft",
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
            RuleStatus::Archived => "archived",
            RuleStatus::Deprecated => "deprecated",
        }
    }

    /// Checks if a transition to the target status is valid
    pub fn can_transition_to(&self, target: RuleStatus) -> bool {
        use RuleStatus::*;
        matches!(
            (self, target),
            (Draft, Active)
                | (Draft, Archived)
                | (Active, Inactive)
                | (Active, Deprecated)
                | (Active, Archived)
                | (Inactive, Active)
                | (Inactive, Archived)
                | (Deprecated, Archived)
        )
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RuleStatus::Draft),
            "active" => Ok(RuleStatus::Active),
            "inactive" => Ok(RuleStatus::Inactive),
            "archived" => Ok(RuleStatus::Archived),
            "deprecated" => Ok(RuleStatus::Deprecated),
            other => Err(RuleError::UnknownStatus(other.to_string())),
        }
    }
}

/// An administrative status change requested against a stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleTransition {
    /// Draft (or inactive) to active, recording who approved it
    Activate { approved_by: String },
    Deactivate,
    Deprecate,
    Archive,
}

impl RuleTransition {
    pub fn target(&self) -> RuleStatus {
        match self {
            RuleTransition::Activate { .. } => RuleStatus::Active,
            RuleTransition::Deactivate => RuleStatus::Inactive,
            RuleTransition::Deprecate => RuleStatus::Deprecated,
            RuleTransition::Archive => RuleStatus::Archived,
        }
    }
}

/// Tag filters restricting which claims a rule may match.
///
/// An empty list matches everything. Provider levels are compared against
/// the decimal rendering of the context's provider level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Applicability {
    pub claim_types: Vec<String>,
    pub service_types: Vec<String>,
    pub provider_levels: Vec<String>,
}

impl Applicability {
    pub fn matches(&self, context: &ClaimContext) -> bool {
        fn allowed(tags: &[String], value: &str) -> bool {
            tags.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(value))
        }

        allowed(&self.claim_types, &context.claim_type)
            && allowed(&self.service_types, &context.service_type)
            && allowed(&self.provider_levels, &context.provider_level.to_string())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.claim_types.is_empty() && self.service_types.is_empty() && self.provider_levels.is_empty()
    }

    /// Parses the comma-separated tag lists used by storage
    pub fn from_csv(claim_types: &str, service_types: &str, provider_levels: &str) -> Self {
        fn split(raw: &str) -> Vec<String> {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        }

        Self {
            claim_types: split(claim_types),
            service_types: split(service_types),
            provider_levels: split(provider_levels),
        }
    }
}

/// SHA-256 of a script body, hex encoded
pub fn content_checksum(script: &str) -> String {
    hex::encode(Sha256::digest(script.as_bytes()))
}

/// A tenant-scoped, versioned business rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    /// Business key shared by every version of the rule
    pub code: String,
    pub version: u32,
    pub name: String,
    pub description: Option<String>,
    pub category: RuleCategory,
    pub status: RuleStatus,
    pub script: String,
    /// Execution priority; higher fires first
    pub salience: i32,
    pub applicability: Applicability,
    pub effective: EffectiveWindow,
    pub checksum: String,
    pub is_latest: bool,
    pub previous_version_id: Option<RuleId>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Active and inside the effective window at `as_of`
    pub fn is_effective_at(&self, as_of: DateTime<Utc>) -> bool {
        self.status == RuleStatus::Active && self.effective.contains(as_of)
    }

    /// Returns true if the stored checksum matches the script body
    pub fn verify_checksum(&self) -> bool {
        content_checksum(&self.script) == self.checksum
    }

    /// `CODE@vN`, used in logs and error messages
    pub fn label(&self) -> String {
        format!("{}@v{}", self.code, self.version)
    }

    /// Applies a lifecycle transition in place.
    ///
    /// Only status and approval metadata change; the script body of a version
    /// is immutable once created.
    pub fn apply_transition(
        &mut self,
        transition: &RuleTransition,
        at: DateTime<Utc>,
    ) -> Result<(), RuleError> {
        let target = transition.target();
        if !self.status.can_transition_to(target) {
            return Err(RuleError::InvalidTransition {
                code: self.code.clone(),
                version: self.version,
                from: self.status,
                to: target,
            });
        }

        if let RuleTransition::Activate { approved_by } = transition {
            if approved_by.trim().is_empty() {
                return Err(RuleError::validation("activation requires an approver"));
            }
            self.approved_by = Some(approved_by.clone());
            self.approved_at = Some(at);
            if self.published_at.is_none() {
                self.published_at = Some(at);
            }
        }

        self.status = target;
        self.updated_at = at;
        Ok(())
    }
}

/// Request to create the next version of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRuleVersion {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: RuleCategory,
    pub script: String,
    #[serde(default)]
    pub salience: i32,
    #[serde(default)]
    pub applicability: Applicability,
    #[serde(default)]
    pub effective: EffectiveWindow,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewRuleVersion {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: RuleCategory,
        script: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            category,
            script: script.into(),
            salience: 0,
            applicability: Applicability::default(),
            effective: EffectiveWindow::always(),
            tags: Vec::new(),
            notes: None,
            created_by: None,
        }
    }

    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn with_effective(mut self, effective: EffectiveWindow) -> Self {
        self.effective = effective;
        self
    }

    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    /// Checks the request before a version number is allocated
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.code.trim().is_empty() {
            return Err(RuleError::validation("rule code must not be empty"));
        }
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RuleError::validation(format!(
                "rule code {:?} may only contain letters, digits, '_' and '-'",
                self.code
            )));
        }
        if self.name.trim().is_empty() {
            return Err(RuleError::validation("rule name must not be empty"));
        }
        EffectiveWindow::new(self.effective.from, self.effective.to)
            .map_err(|e| RuleError::validation(e.to_string()))?;
        crate::script::compile(&self.script).map_err(|source| RuleError::Script {
            code: self.code.clone(),
            source,
        })?;
        Ok(())
    }

    /// Builds the draft rule for an allocated version number
    pub fn into_draft(
        self,
        tenant_id: TenantId,
        version: u32,
        previous_version_id: Option<RuleId>,
        now: DateTime<Utc>,
    ) -> Rule {
        let checksum = content_checksum(&self.script);
        Rule {
            id: RuleId::new_v7(),
            tenant_id,
            code: self.code,
            version,
            name: self.name,
            description: self.description,
            category: self.category,
            status: RuleStatus::Draft,
            script: self.script,
            salience: self.salience,
            applicability: self.applicability,
            effective: self.effective,
            checksum,
            is_latest: true,
            previous_version_id,
            tags: self.tags,
            notes: self.notes,
            created_by: self.created_by,
            approved_by: None,
            approved_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewRuleVersion {
        NewRuleVersion {
            code: "COVERAGE_LIMIT".into(),
            name: "Check coverage limit".into(),
            description: None,
            category: RuleCategory::Limit,
            script: "when Claim.RequestedAmount > Claim.RemainingLimit then Claim.ApprovedAmount = Claim.RemainingLimit".into(),
            salience: 10,
            applicability: Applicability::default(),
            effective: EffectiveWindow::always(),
            tags: vec![],
            notes: None,
            created_by: Some("analyst".into()),
        }
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let sum = content_checksum("");
        assert_eq!(sum, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_draft_carries_checksum() {
        let rule = request().into_draft(TenantId::new(), 1, None, Utc::now());
        assert_eq!(rule.status, RuleStatus::Draft);
        assert!(rule.verify_checksum());
        assert!(rule.is_latest);
    }

    #[test]
    fn test_activation_records_approver() {
        let mut rule = request().into_draft(TenantId::new(), 1, None, Utc::now());
        let at = Utc::now();
        rule.apply_transition(&RuleTransition::Activate { approved_by: "lead".into() }, at)
            .unwrap();
        assert_eq!(rule.status, RuleStatus::Active);
        assert_eq!(rule.approved_by.as_deref(), Some("lead"));
        assert_eq!(rule.approved_at, Some(at));
    }

    #[test]
    fn test_draft_cannot_be_deprecated() {
        let mut rule = request().into_draft(TenantId::new(), 1, None, Utc::now());
        let err = rule.apply_transition(&RuleTransition::Deprecate, Utc::now()).unwrap_err();
        assert!(matches!(err, RuleError::InvalidTransition { .. }));
        assert_eq!(rule.status, RuleStatus::Draft);
    }

    #[test]
    fn test_malformed_script_fails_validation() {
        let mut bad = request();
        bad.script = "when Claim.RequestedAmount > then".into();
        assert!(matches!(bad.validate(), Err(RuleError::Script { .. })));
    }

    #[test]
    fn test_applicability_filters() {
        let filter = Applicability::from_csv("outpatient, inpatient", "", "1,2");
        let mut ctx = ClaimContext::default();
        ctx.claim_type = "OUTPATIENT".into();
        ctx.provider_level = 2;
        assert!(filter.matches(&ctx));

        ctx.provider_level = 3;
        assert!(!filter.matches(&ctx));
    }
}
