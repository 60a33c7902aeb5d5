//! Knowledge base compilation
//!
//! A [`KnowledgeBase`] is the executable form of a set of rules: every script
//! compiled, the rules in firing order, and a build version derived from the
//! rule identities. Building is deterministic; the same rules in any input
//! order produce the same build version and the same evaluation behaviour.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use core_kernel::{RuleId, TenantId};
use domain_rules::{
    compile, content_checksum, sort_for_evaluation, Applicability, Rule, RuleCategory, Script,
};

use crate::error::{CompileError, CompileFailureReason, RuleCompileFailure};

/// One rule ready to fire
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_id: RuleId,
    pub code: String,
    pub version: u32,
    pub name: String,
    pub category: RuleCategory,
    pub salience: i32,
    pub checksum: String,
    pub applicability: Applicability,
    pub script: Script,
}

impl CompiledRule {
    pub fn label(&self) -> String {
        format!("{}@v{}", self.code, self.version)
    }
}

/// Compiled rules for one tenant, immutable once built
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    tenant_id: TenantId,
    build_version: String,
    rules: Vec<CompiledRule>,
    built_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// A knowledge base that fires nothing
    pub fn empty(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            build_version: fingerprint(&[]),
            rules: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Compiles `rules` for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any rule has a script that does not compile, a
    /// checksum that does not match its script, a code already seen in the
    /// input, or an owner other than `tenant_id`. No partial build is returned.
    pub fn build(tenant_id: TenantId, rules: &[Rule]) -> Result<Self, CompileError> {
        let mut ordered = rules.to_vec();
        sort_for_evaluation(&mut ordered);

        let mut failures = Vec::new();
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(ordered.len());

        for rule in &ordered {
            let fail = |reason| RuleCompileFailure {
                code: rule.code.clone(),
                version: rule.version,
                reason,
            };

            if rule.tenant_id != tenant_id {
                failures.push(fail(CompileFailureReason::ForeignTenant(rule.tenant_id)));
                continue;
            }
            if !seen.insert(rule.code.as_str()) {
                failures.push(fail(CompileFailureReason::DuplicateCode));
                continue;
            }
            let actual = content_checksum(&rule.script);
            if actual != rule.checksum {
                failures.push(fail(CompileFailureReason::ChecksumMismatch {
                    expected: rule.checksum.clone(),
                    actual,
                }));
                continue;
            }

            match compile(&rule.script) {
                Ok(script) => compiled.push(CompiledRule {
                    rule_id: rule.id,
                    code: rule.code.clone(),
                    version: rule.version,
                    name: rule.name.clone(),
                    category: rule.category,
                    salience: rule.salience,
                    checksum: rule.checksum.clone(),
                    applicability: rule.applicability.clone(),
                    script,
                }),
                Err(err) => failures.push(fail(CompileFailureReason::Script(err))),
            }
        }

        if !failures.is_empty() {
            return Err(CompileError { tenant_id, failures });
        }

        Ok(Self {
            tenant_id,
            build_version: fingerprint(&ordered),
            rules: compiled,
            built_at: Utc::now(),
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Identifies the rule set this was built from
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Rules in firing order
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build version for a set of rules.
///
/// Hashes code, version, salience and checksum of each rule in firing order,
/// so reordering the input does not change it but any content change does.
pub fn fingerprint(rules: &[Rule]) -> String {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by(|a, b| {
        b.salience
            .cmp(&a.salience)
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.version.cmp(&b.version))
    });

    let mut hasher = Sha256::new();
    for rule in ordered {
        hasher.update(
            format!("{}:{}:{}:{}\n", rule.code, rule.version, rule.salience, rule.checksum)
                .as_bytes(),
        );
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain_rules::{NewRuleVersion, RuleStatus};

    fn rule(tenant: TenantId, code: &str, salience: i32, script: &str) -> Rule {
        let mut rule = NewRuleVersion::new(code, code, RuleCategory::Coverage, script)
            .with_salience(salience)
            .into_draft(tenant, 1, None, Utc::now());
        rule.status = RuleStatus::Active;
        rule
    }

    #[test]
    fn test_build_orders_by_salience_then_code() {
        let tenant = TenantId::new();
        let rules = vec![
            rule(tenant, "LOW", 1, "when true then Claim.IsApproved = true"),
            rule(tenant, "B", 5, "when true then Claim.IsApproved = true"),
            rule(tenant, "A", 5, "when true then Claim.IsApproved = true"),
        ];
        let kb = KnowledgeBase::build(tenant, &rules).unwrap();
        let codes: Vec<_> = kb.rules().iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "LOW"]);
    }

    #[test]
    fn test_build_version_ignores_input_order() {
        let tenant = TenantId::new();
        let a = rule(tenant, "A", 5, "when true then Claim.IsApproved = true");
        let b = rule(tenant, "B", 3, "when true then Claim.IsApproved = false");
        let first = KnowledgeBase::build(tenant, &[a.clone(), b.clone()]).unwrap();
        let second = KnowledgeBase::build(tenant, &[b, a]).unwrap();
        assert_eq!(first.build_version(), second.build_version());
    }

    #[test]
    fn test_empty_rule_list_builds_empty_base() {
        let tenant = TenantId::new();
        let kb = KnowledgeBase::build(tenant, &[]).unwrap();
        assert!(kb.is_empty());
        assert_eq!(kb.build_version(), KnowledgeBase::empty(tenant).build_version());
    }

    #[test]
    fn test_one_bad_script_fails_the_whole_build() {
        let tenant = TenantId::new();
        let good = rule(tenant, "GOOD", 1, "when true then Claim.IsApproved = true");
        let mut bad = rule(tenant, "BAD", 2, "when true then Claim.IsApproved = true");
        bad.script = "when then".to_string();
        bad.checksum = content_checksum(&bad.script);

        let err = KnowledgeBase::build(tenant, &[good, bad]).unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].code, "BAD");
        assert!(matches!(err.failures[0].reason, CompileFailureReason::Script(_)));
    }

    #[test]
    fn test_checksum_mismatch_fails_build() {
        let tenant = TenantId::new();
        let mut tampered = rule(tenant, "T", 1, "when true then Claim.IsApproved = true");
        tampered.script = "when true then Claim.IsApproved = false".to_string();
        let err = KnowledgeBase::build(tenant, &[tampered]).unwrap_err();
        assert!(matches!(
            err.failures[0].reason,
            CompileFailureReason::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn test_duplicate_codes_and_foreign_rules_are_rejected() {
        let tenant = TenantId::new();
        let a1 = rule(tenant, "A", 1, "when true then Claim.IsApproved = true");
        let mut a2 = a1.clone();
        a2.version = 2;
        let foreign = rule(TenantId::new(), "F", 1, "when true then Claim.IsApproved = true");

        let err = KnowledgeBase::build(tenant, &[a1, a2, foreign]).unwrap_err();
        let reasons: Vec<_> = err.failures.iter().map(|f| f.reason.clone()).collect();
        assert!(reasons.contains(&CompileFailureReason::DuplicateCode));
        assert!(reasons
            .iter()
            .any(|r| matches!(r, CompileFailureReason::ForeignTenant(_))));
    }
}
