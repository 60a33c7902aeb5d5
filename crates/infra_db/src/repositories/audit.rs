//! Audit repository
//!
//! Insert and read access to `rule_execution_logs` and
//! `claim_decision_audits`. There is no update or delete path; the schema
//! rejects both with a trigger.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{Amount, AuditId, ClaimId, ExecutionId, LogId, RuleId, TenantId};
use domain_adjudication::{DecisionAudit, ExecutionLog};

use crate::error::DatabaseError;

const LOG_COLUMNS: &str = r#"
    log_id, execution_id, sequence, tenant_id, claim_id, claim_type, rule_id,
    rule_code, rule_version, rule_name, category, fired, condition, action_taken,
    result, duration_ns, input_snapshot, output_snapshot, has_error, error_message,
    created_at
"#;

const DECISION_COLUMNS: &str = r#"
    audit_id, execution_id, tenant_id, claim_id, total_rules_evaluated, rules_fired,
    execution_time_ms, requested_amount, approved_amount, total_deductions,
    franchise_amount, basic_share, supplemental_share, decision_type, rejection_codes,
    claim_snapshot, output_snapshot, rules_snapshot, knowledge_base_version,
    has_error, error_message, processed_by, processing_note, created_at
"#;

#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_log(&self, log: &ExecutionLog) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO rule_execution_logs (
                log_id, execution_id, sequence, tenant_id, claim_id, claim_type, rule_id,
                rule_code, rule_version, rule_name, category, fired, condition, action_taken,
                result, duration_ns, input_snapshot, output_snapshot, has_error, error_message,
                created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(Uuid::from(log.id))
        .bind(Uuid::from(log.execution_id))
        .bind(to_i32(log.sequence, "sequence")?)
        .bind(Uuid::from(log.tenant_id))
        .bind(Uuid::from(log.claim_id))
        .bind(&log.claim_type)
        .bind(Uuid::from(log.rule_id))
        .bind(&log.rule_code)
        .bind(to_i32(log.rule_version, "rule_version")?)
        .bind(&log.rule_name)
        .bind(log.category.as_str())
        .bind(log.fired)
        .bind(&log.condition)
        .bind(&log.action_taken)
        .bind(&log.result)
        .bind(saturating_i64(log.duration_ns))
        .bind(&log.input_snapshot)
        .bind(&log.output_snapshot)
        .bind(log.has_error)
        .bind(&log.error_message)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_decision(&self, audit: &DecisionAudit) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO claim_decision_audits (
                audit_id, execution_id, tenant_id, claim_id, total_rules_evaluated, rules_fired,
                execution_time_ms, requested_amount, approved_amount, total_deductions,
                franchise_amount, basic_share, supplemental_share, decision_type, rejection_codes,
                claim_snapshot, output_snapshot, rules_snapshot, knowledge_base_version,
                has_error, error_message, processed_by, processing_note, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(Uuid::from(audit.id))
        .bind(Uuid::from(audit.execution_id))
        .bind(Uuid::from(audit.tenant_id))
        .bind(Uuid::from(audit.claim_id))
        .bind(to_i32(audit.total_rules_evaluated, "total_rules_evaluated")?)
        .bind(to_i32(audit.rules_fired, "rules_fired")?)
        .bind(saturating_i64(audit.execution_time_ms))
        .bind(audit.requested_amount.minor_units())
        .bind(audit.approved_amount.minor_units())
        .bind(audit.total_deductions.minor_units())
        .bind(audit.franchise_amount.minor_units())
        .bind(audit.basic_share.minor_units())
        .bind(audit.supplemental_share.minor_units())
        .bind(audit.decision_type.as_str())
        .bind(&audit.rejection_codes)
        .bind(&audit.claim_snapshot)
        .bind(&audit.output_snapshot)
        .bind(&audit.rules_snapshot)
        .bind(&audit.knowledge_base_version)
        .bind(audit.has_error)
        .bind(&audit.error_message)
        .bind(&audit.processed_by)
        .bind(&audit.processing_note)
        .bind(audit.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_decision(&self, execution_id: ExecutionId) -> Result<DecisionAudit, DatabaseError> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM claim_decision_audits WHERE execution_id = $1");
        sqlx::query_as::<_, DecisionAuditRow>(&sql)
            .bind(Uuid::from(execution_id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("DecisionAudit", execution_id))?
            .try_into()
    }

    pub async fn list_logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>, DatabaseError> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM rule_execution_logs WHERE execution_id = $1 ORDER BY sequence"
        );
        sqlx::query_as::<_, ExecutionLogRow>(&sql)
            .bind(Uuid::from(execution_id))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ExecutionLog::try_from)
            .collect()
    }

    pub async fn list_decisions_for_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
    ) -> Result<Vec<DecisionAudit>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {DECISION_COLUMNS}
            FROM claim_decision_audits
            WHERE tenant_id = $1 AND claim_id = $2
            ORDER BY created_at, execution_id
            "#
        );
        sqlx::query_as::<_, DecisionAuditRow>(&sql)
            .bind(Uuid::from(tenant_id))
            .bind(Uuid::from(claim_id))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DecisionAudit::try_from)
            .collect()
    }
}

fn to_i32(value: u32, column: &str) -> Result<i32, DatabaseError> {
    i32::try_from(value)
        .map_err(|_| DatabaseError::QueryFailed(format!("{} {} out of range", column, value)))
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_i32(value: i32, table: &'static str, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::corrupt(table, format!("{} is {}", column, value)))
}

/// A `rule_execution_logs` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExecutionLogRow {
    pub log_id: Uuid,
    pub execution_id: Uuid,
    pub sequence: i32,
    pub tenant_id: Uuid,
    pub claim_id: Uuid,
    pub claim_type: String,
    pub rule_id: Uuid,
    pub rule_code: String,
    pub rule_version: i32,
    pub rule_name: String,
    pub category: String,
    pub fired: bool,
    pub condition: String,
    pub action_taken: String,
    pub result: serde_json::Value,
    pub duration_ns: i64,
    pub input_snapshot: serde_json::Value,
    pub output_snapshot: serde_json::Value,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionLogRow> for ExecutionLog {
    type Error = DatabaseError;

    fn try_from(row: ExecutionLogRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "rule_execution_logs";
        Ok(ExecutionLog {
            id: LogId::from(row.log_id),
            execution_id: ExecutionId::from(row.execution_id),
            sequence: from_i32(row.sequence, TABLE, "sequence")?,
            tenant_id: TenantId::from(row.tenant_id),
            claim_id: ClaimId::from(row.claim_id),
            claim_type: row.claim_type,
            rule_id: RuleId::from(row.rule_id),
            rule_code: row.rule_code,
            rule_version: from_i32(row.rule_version, TABLE, "rule_version")?,
            rule_name: row.rule_name,
            category: row
                .category
                .parse()
                .map_err(|e| DatabaseError::corrupt(TABLE, format!("{}", e)))?,
            fired: row.fired,
            condition: row.condition,
            action_taken: row.action_taken,
            result: row.result,
            duration_ns: u64::try_from(row.duration_ns).unwrap_or(0),
            input_snapshot: row.input_snapshot,
            output_snapshot: row.output_snapshot,
            has_error: row.has_error,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

/// A `claim_decision_audits` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DecisionAuditRow {
    pub audit_id: Uuid,
    pub execution_id: Uuid,
    pub tenant_id: Uuid,
    pub claim_id: Uuid,
    pub total_rules_evaluated: i32,
    pub rules_fired: i32,
    pub execution_time_ms: i64,
    pub requested_amount: i64,
    pub approved_amount: i64,
    pub total_deductions: i64,
    pub franchise_amount: i64,
    pub basic_share: i64,
    pub supplemental_share: i64,
    pub decision_type: String,
    pub rejection_codes: Vec<String>,
    pub claim_snapshot: serde_json::Value,
    pub output_snapshot: serde_json::Value,
    pub rules_snapshot: serde_json::Value,
    pub knowledge_base_version: String,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub processed_by: String,
    pub processing_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DecisionAuditRow> for DecisionAudit {
    type Error = DatabaseError;

    fn try_from(row: DecisionAuditRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "claim_decision_audits";
        Ok(DecisionAudit {
            id: AuditId::from(row.audit_id),
            execution_id: ExecutionId::from(row.execution_id),
            tenant_id: TenantId::from(row.tenant_id),
            claim_id: ClaimId::from(row.claim_id),
            total_rules_evaluated: from_i32(row.total_rules_evaluated, TABLE, "total_rules_evaluated")?,
            rules_fired: from_i32(row.rules_fired, TABLE, "rules_fired")?,
            execution_time_ms: u64::try_from(row.execution_time_ms).unwrap_or(0),
            requested_amount: Amount::new(row.requested_amount),
            approved_amount: Amount::new(row.approved_amount),
            total_deductions: Amount::new(row.total_deductions),
            franchise_amount: Amount::new(row.franchise_amount),
            basic_share: Amount::new(row.basic_share),
            supplemental_share: Amount::new(row.supplemental_share),
            decision_type: row
                .decision_type
                .parse()
                .map_err(|e| DatabaseError::corrupt(TABLE, format!("{}", e)))?,
            rejection_codes: row.rejection_codes,
            claim_snapshot: row.claim_snapshot,
            output_snapshot: row.output_snapshot,
            rules_snapshot: row.rules_snapshot,
            knowledge_base_version: row.knowledge_base_version,
            has_error: row.has_error,
            error_message: row.error_message,
            processed_by: row.processed_by,
            processing_note: row.processing_note,
            created_at: row.created_at,
        })
    }
}
