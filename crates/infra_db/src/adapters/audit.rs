//! PostgreSQL audit recorder adapter
//!
//! Implements `AuditPort` over [`AuditRepository`]. Writes are plain
//! inserts; a second decision for the same execution id hits the unique
//! constraint and surfaces as `PortError::Conflict`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, ClaimId, DomainPort, ExecutionId, HealthCheckResult, HealthCheckable,
    OperationMetadata, PortError, TenantId,
};
use domain_adjudication::{AuditPort, DecisionAudit, ExecutionLog};

use crate::error::DatabaseError;
use crate::repositories::AuditRepository;

#[derive(Debug, Clone)]
pub struct PostgresAuditRecorder {
    repository: AuditRepository,
    pool: PgPool,
}

impl PostgresAuditRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: AuditRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresAuditRecorder {}

#[async_trait]
impl HealthCheckable for PostgresAuditRecorder {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: "postgres-audit-recorder".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl AuditPort for PostgresAuditRecorder {
    #[instrument(
        skip(self, log, _metadata),
        fields(execution_id = %log.execution_id, sequence = log.sequence, rule = %log.rule_code)
    )]
    async fn log_execution(
        &self,
        log: &ExecutionLog,
        _metadata: Option<OperationMetadata>,
    ) -> Result<(), PortError> {
        self.repository.insert_log(log).await?;
        debug!("Execution log stored");
        Ok(())
    }

    #[instrument(
        skip(self, audit, _metadata),
        fields(execution_id = %audit.execution_id, tenant_id = %audit.tenant_id, claim_id = %audit.claim_id)
    )]
    async fn log_decision(
        &self,
        audit: &DecisionAudit,
        _metadata: Option<OperationMetadata>,
    ) -> Result<(), PortError> {
        self.repository
            .insert_decision(audit)
            .await
            .map_err(|e| match e {
                DatabaseError::DuplicateEntry(_) => PortError::conflict(format!(
                    "execution {} already has a decision",
                    audit.execution_id
                )),
                other => other.into(),
            })?;
        debug!("Decision audit stored");
        Ok(())
    }

    #[instrument(skip(self, _metadata), fields(execution_id = %execution_id))]
    async fn get_decision(
        &self,
        execution_id: ExecutionId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<DecisionAudit, PortError> {
        self.repository
            .get_decision(execution_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => PortError::not_found("DecisionAudit", execution_id),
                other => other.into(),
            })
    }

    #[instrument(skip(self, _metadata), fields(execution_id = %execution_id))]
    async fn list_execution_logs(
        &self,
        execution_id: ExecutionId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<ExecutionLog>, PortError> {
        Ok(self.repository.list_logs(execution_id).await?)
    }

    #[instrument(skip(self, _metadata), fields(tenant_id = %tenant_id, claim_id = %claim_id))]
    async fn list_decisions_for_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<DecisionAudit>, PortError> {
        Ok(self
            .repository
            .list_decisions_for_claim(tenant_id, claim_id)
            .await?)
    }
}
