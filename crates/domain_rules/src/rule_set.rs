//! Named groupings of rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use core_kernel::{RuleSetId, TenantId};

use crate::error::RuleError;
use crate::rule::Rule;

/// An ordered, named collection of rule codes.
///
/// Members are referenced by code, so a set always evaluates whichever
/// version of each member is effective at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: RuleSetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub version: u32,
    pub is_active: bool,
    pub rule_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleSet {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, rule_codes: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RuleSetId::new_v7(),
            tenant_id,
            name: name.into(),
            description: None,
            version: 1,
            is_active: true,
            rule_codes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::validation("rule set name must not be empty"));
        }
        let mut seen = HashSet::new();
        for code in &self.rule_codes {
            if !seen.insert(code.as_str()) {
                return Err(RuleError::validation(format!(
                    "rule set {} lists {} more than once",
                    self.name, code
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rule_codes.iter().any(|c| c == code)
    }

    /// Keeps only the members of this set, preserving the input order
    pub fn filter(&self, rules: Vec<Rule>) -> Vec<Rule> {
        rules.into_iter().filter(|r| self.contains(&r.code)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_members_rejected() {
        let set = RuleSet::new(TenantId::new(), "outpatient", vec!["A".into(), "A".into()]);
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_membership() {
        let set = RuleSet::new(TenantId::new(), "outpatient", vec!["LIMIT".into()]);
        assert!(set.validate().is_ok());
        assert!(set.contains("LIMIT"));
        assert!(!set.contains("FRANCHISE"));
    }
}
