//! Rule Store port
//!
//! The engine reads rule definitions through [`RuleStorePort`]; administration
//! tooling writes through it. Two adapters exist:
//!
//! - **PostgreSQL**: `infra_db::adapters::PostgresRuleStore`
//! - **In-memory**: [`mock::InMemoryRuleStore`], behind the `mock` feature
//!
//! ```rust,ignore
//! let store: Arc<dyn RuleStorePort> = Arc::new(PostgresRuleStore::new(pool));
//! let rules = store.get_effective_rules(tenant_id, Utc::now(), None).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use core_kernel::{DomainPort, HealthCheckable, OperationMetadata, PortError, RuleSetId, TenantId};

use crate::rule::{NewRuleVersion, Rule, RuleTransition};
use crate::rule_set::RuleSet;

/// Storage for versioned, tenant-scoped rules
#[async_trait]
pub trait RuleStorePort: DomainPort + HealthCheckable {
    /// Returns the rules in force for a tenant at `as_of`
    ///
    /// # Returns
    ///
    /// Active rules whose effective window contains `as_of`, one version per
    /// code (the highest), ordered by descending salience then code. Unknown
    /// tenants yield `PortError::NotFound`.
    async fn get_effective_rules(
        &self,
        tenant_id: TenantId,
        as_of: DateTime<Utc>,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Rule>, PortError>;

    /// Returns one exact version of a rule regardless of status
    async fn get_rule_by_version(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
        metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError>;

    /// Returns every version of a rule, oldest first
    async fn list_versions(
        &self,
        tenant_id: TenantId,
        code: &str,
        metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Rule>, PortError>;

    /// Creates the next version of a rule as a draft
    ///
    /// The version number is `max(existing) + 1`, the previous latest version
    /// loses its `is_latest` flag and the checksum is computed from the
    /// script. Concurrent calls for the same code never allocate the same
    /// version.
    async fn create_version(
        &self,
        tenant_id: TenantId,
        request: NewRuleVersion,
        metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError>;

    /// Applies a lifecycle transition to one version
    async fn transition(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
        transition: RuleTransition,
        metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError>;

    /// Creates or replaces a rule set
    async fn save_rule_set(
        &self,
        rule_set: RuleSet,
        metadata: Option<OperationMetadata>,
    ) -> Result<RuleSet, PortError>;

    async fn get_rule_set(
        &self,
        tenant_id: TenantId,
        id: RuleSetId,
        metadata: Option<OperationMetadata>,
    ) -> Result<RuleSet, PortError>;
}

/// Reduces candidate rules to the effective set in evaluation order.
///
/// Drops anything not active at `as_of`, keeps the highest version when
/// several versions of one code are in force, and sorts by descending
/// salience with the code as tie-break.
pub fn select_effective(rules: impl IntoIterator<Item = Rule>, as_of: DateTime<Utc>) -> Vec<Rule> {
    let mut newest: HashMap<String, Rule> = HashMap::new();
    for rule in rules.into_iter().filter(|r| r.is_effective_at(as_of)) {
        match newest.get(&rule.code) {
            Some(existing) if existing.version >= rule.version => {}
            _ => {
                newest.insert(rule.code.clone(), rule);
            }
        }
    }

    let mut selected: Vec<Rule> = newest.into_values().collect();
    sort_for_evaluation(&mut selected);
    selected
}

/// Descending salience, then ascending code, then ascending version
pub fn sort_for_evaluation(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.salience
            .cmp(&a.salience)
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.version.cmp(&b.version))
    });
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    type RuleKey = (TenantId, String);

    /// In-memory rule store
    ///
    /// Version allocation happens under a single write lock, so concurrent
    /// `create_version` calls are serialized.
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryRuleStore {
        tenants: Arc<RwLock<HashSet<TenantId>>>,
        rules: Arc<RwLock<HashMap<RuleKey, Vec<Rule>>>>,
        rule_sets: Arc<RwLock<HashMap<RuleSetId, RuleSet>>>,
    }

    impl InMemoryRuleStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a tenant so lookups against it succeed
        pub async fn add_tenant(&self, tenant_id: TenantId) {
            self.tenants.write().await.insert(tenant_id);
        }

        /// Stores a fully formed rule as-is, registering its tenant
        pub async fn insert_rule(&self, rule: Rule) {
            self.tenants.write().await.insert(rule.tenant_id);
            let mut rules = self.rules.write().await;
            let versions = rules.entry((rule.tenant_id, rule.code.clone())).or_default();
            if rule.is_latest {
                for existing in versions.iter_mut() {
                    existing.is_latest = false;
                }
            }
            versions.retain(|r| r.version != rule.version);
            versions.push(rule);
            versions.sort_by_key(|r| r.version);
        }

        /// Rewrites a stored script without touching its version or checksum.
        ///
        /// Simulates out-of-band tampering for integrity tests.
        pub async fn overwrite_script_unchecked(
            &self,
            tenant_id: TenantId,
            code: &str,
            version: u32,
            script: impl Into<String>,
        ) -> Result<(), PortError> {
            let mut rules = self.rules.write().await;
            let rule = rules
                .get_mut(&(tenant_id, code.to_string()))
                .and_then(|versions| versions.iter_mut().find(|r| r.version == version))
                .ok_or_else(|| PortError::not_found("Rule", format!("{}@v{}", code, version)))?;
            rule.script = script.into();
            Ok(())
        }

        async fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), PortError> {
            if self.tenants.read().await.contains(&tenant_id) {
                Ok(())
            } else {
                Err(PortError::not_found("Tenant", tenant_id))
            }
        }
    }

    impl DomainPort for InMemoryRuleStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryRuleStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "in-memory-rule-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl RuleStorePort for InMemoryRuleStore {
        async fn get_effective_rules(
            &self,
            tenant_id: TenantId,
            as_of: DateTime<Utc>,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Vec<Rule>, PortError> {
            self.ensure_tenant(tenant_id).await?;
            let rules = self.rules.read().await;
            let candidates = rules
                .iter()
                .filter(|((tenant, _), _)| *tenant == tenant_id)
                .flat_map(|(_, versions)| versions.iter().cloned());
            Ok(select_effective(candidates, as_of))
        }

        async fn get_rule_by_version(
            &self,
            tenant_id: TenantId,
            code: &str,
            version: u32,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Rule, PortError> {
            self.ensure_tenant(tenant_id).await?;
            self.rules
                .read()
                .await
                .get(&(tenant_id, code.to_string()))
                .and_then(|versions| versions.iter().find(|r| r.version == version))
                .cloned()
                .ok_or_else(|| PortError::not_found("Rule", format!("{}@v{}", code, version)))
        }

        async fn list_versions(
            &self,
            tenant_id: TenantId,
            code: &str,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Vec<Rule>, PortError> {
            self.ensure_tenant(tenant_id).await?;
            Ok(self
                .rules
                .read()
                .await
                .get(&(tenant_id, code.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn create_version(
            &self,
            tenant_id: TenantId,
            request: NewRuleVersion,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Rule, PortError> {
            self.ensure_tenant(tenant_id).await?;
            request.validate()?;

            let mut rules = self.rules.write().await;
            let versions = rules.entry((tenant_id, request.code.clone())).or_default();
            let next = versions.iter().map(|r| r.version).max().unwrap_or(0) + 1;
            if versions.iter().any(|r| r.version == next) {
                return Err(PortError::conflict(format!(
                    "rule {} already has version {}",
                    request.code, next
                )));
            }
            let previous = versions.iter().find(|r| r.is_latest).map(|r| r.id);
            for existing in versions.iter_mut() {
                existing.is_latest = false;
            }

            let rule = request.into_draft(tenant_id, next, previous, Utc::now());
            versions.push(rule.clone());
            Ok(rule)
        }

        async fn transition(
            &self,
            tenant_id: TenantId,
            code: &str,
            version: u32,
            transition: RuleTransition,
            _metadata: Option<OperationMetadata>,
        ) -> Result<Rule, PortError> {
            self.ensure_tenant(tenant_id).await?;
            let mut rules = self.rules.write().await;
            let rule = rules
                .get_mut(&(tenant_id, code.to_string()))
                .and_then(|versions| versions.iter_mut().find(|r| r.version == version))
                .ok_or_else(|| PortError::not_found("Rule", format!("{}@v{}", code, version)))?;
            rule.apply_transition(&transition, Utc::now())?;
            Ok(rule.clone())
        }

        async fn save_rule_set(
            &self,
            rule_set: RuleSet,
            _metadata: Option<OperationMetadata>,
        ) -> Result<RuleSet, PortError> {
            self.ensure_tenant(rule_set.tenant_id).await?;
            rule_set.validate()?;
            self.rule_sets.write().await.insert(rule_set.id, rule_set.clone());
            Ok(rule_set)
        }

        async fn get_rule_set(
            &self,
            tenant_id: TenantId,
            id: RuleSetId,
            _metadata: Option<OperationMetadata>,
        ) -> Result<RuleSet, PortError> {
            self.rule_sets
                .read()
                .await
                .get(&id)
                .filter(|set| set.tenant_id == tenant_id)
                .cloned()
                .ok_or_else(|| PortError::not_found("RuleSet", id))
        }
    }
}
