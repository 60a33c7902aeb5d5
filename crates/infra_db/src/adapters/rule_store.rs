//! PostgreSQL rule store adapter
//!
//! Implements `RuleStorePort` over [`RuleRepository`]. Effective-rule
//! queries return every matching active row; the adapter reduces them to one
//! version per code with `select_effective` so both adapters share the same
//! selection rule.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresRuleStore;
//! use domain_rules::RuleStorePort;
//!
//! let store: Arc<dyn RuleStorePort> = Arc::new(PostgresRuleStore::new(pool));
//! let rules = store.get_effective_rules(tenant_id, Utc::now(), None).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use core_kernel::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, OperationMetadata, PortError,
    RuleSetId, TenantId,
};
use domain_rules::{select_effective, NewRuleVersion, Rule, RuleSet, RuleStorePort, RuleTransition};

use crate::error::DatabaseError;
use crate::repositories::RuleRepository;

/// PostgreSQL-backed [`RuleStorePort`]
#[derive(Debug, Clone)]
pub struct PostgresRuleStore {
    repository: RuleRepository,
    pool: PgPool,
}

impl PostgresRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: RuleRepository::new(pool.clone()),
            pool,
        }
    }

    /// Registers a tenant so rule lookups against it succeed
    #[instrument(skip(self))]
    pub async fn register_tenant(&self, tenant_id: TenantId, name: &str) -> Result<(), PortError> {
        self.repository.upsert_tenant(tenant_id, name).await?;
        info!("Tenant registered");
        Ok(())
    }

    pub fn repository(&self) -> &RuleRepository {
        &self.repository
    }

    async fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), PortError> {
        self.repository
            .ensure_tenant(tenant_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => PortError::not_found("Tenant", tenant_id),
                other => other.into(),
            })
    }
}

impl DomainPort for PostgresRuleStore {}

#[async_trait]
impl HealthCheckable for PostgresRuleStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: "postgres-rule-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: "postgres-rule-store".to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

fn rows_to_rules(rows: Vec<crate::repositories::rules::RuleRow>) -> Result<Vec<Rule>, PortError> {
    rows.into_iter()
        .map(|row| Rule::try_from(row).map_err(PortError::from))
        .collect()
}

#[async_trait]
impl RuleStorePort for PostgresRuleStore {
    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id))]
    async fn get_effective_rules(
        &self,
        tenant_id: TenantId,
        as_of: DateTime<Utc>,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Rule>, PortError> {
        self.ensure_tenant(tenant_id).await?;
        let rows = self.repository.find_active_at(tenant_id, as_of).await?;
        let rules = select_effective(rows_to_rules(rows)?, as_of);
        debug!(count = rules.len(), "Loaded effective rules");
        Ok(rules)
    }

    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id))]
    async fn get_rule_by_version(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError> {
        self.ensure_tenant(tenant_id).await?;
        let row = self
            .repository
            .get_version(tenant_id, code, version)
            .await
            .map_err(|e| rule_not_found(e, code, version))?;
        Ok(Rule::try_from(row)?)
    }

    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id))]
    async fn list_versions(
        &self,
        tenant_id: TenantId,
        code: &str,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Rule>, PortError> {
        self.ensure_tenant(tenant_id).await?;
        rows_to_rules(self.repository.list_versions(tenant_id, code).await?)
    }

    #[instrument(skip(self, request, _metadata), fields(tenant_id = %tenant_id, code = %request.code))]
    async fn create_version(
        &self,
        tenant_id: TenantId,
        request: NewRuleVersion,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError> {
        self.ensure_tenant(tenant_id).await?;
        request.validate()?;
        let rule = self.repository.insert_next_version(tenant_id, request).await?;
        info!(version = rule.version, checksum = %rule.checksum, "Created rule version");
        Ok(rule)
    }

    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id))]
    async fn transition(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
        transition: RuleTransition,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Rule, PortError> {
        self.ensure_tenant(tenant_id).await?;
        let rule = self
            .repository
            .apply_transition(tenant_id, code, version, &transition)
            .await
            .map_err(|e| rule_not_found(e, code, version))?;
        info!(status = %rule.status, "Rule version transitioned");
        Ok(rule)
    }

    #[instrument(skip(self, rule_set, _metadata), fields(tenant_id = %rule_set.tenant_id, rule_set_id = %rule_set.id))]
    async fn save_rule_set(
        &self,
        rule_set: RuleSet,
        _metadata: Option<OperationMetadata>,
    ) -> Result<RuleSet, PortError> {
        self.ensure_tenant(rule_set.tenant_id).await?;
        rule_set.validate()?;
        self.repository.save_rule_set(&rule_set).await?;
        Ok(rule_set)
    }

    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id, rule_set_id = %id))]
    async fn get_rule_set(
        &self,
        tenant_id: TenantId,
        id: RuleSetId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<RuleSet, PortError> {
        self.repository
            .get_rule_set(tenant_id, id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => PortError::not_found("RuleSet", id),
                other => other.into(),
            })
    }
}

/// Keeps the entity name on not-found errors for a specific version
fn rule_not_found(err: DatabaseError, code: &str, version: u32) -> PortError {
    match err {
        DatabaseError::NotFound(_) => PortError::not_found("Rule", format!("{}@v{}", code, version)),
        other => other.into(),
    }
}
