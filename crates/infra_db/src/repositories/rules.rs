//! Rule store repository
//!
//! Versioned rules, tenants and rule sets. Version allocation for a
//! `(tenant, code)` pair runs under a transaction-scoped advisory lock so
//! concurrent publishers never compute the same next version.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{EffectiveWindow, RuleId, RuleSetId, TenantId};
use domain_rules::{Applicability, NewRuleVersion, Rule, RuleSet, RuleTransition};

use crate::error::DatabaseError;

const RULE_COLUMNS: &str = r#"
    rule_id, tenant_id, code, version, name, description, category, status,
    script, salience, claim_types, service_types, provider_levels,
    effective_from, effective_to, checksum, is_latest, previous_version_id,
    tags, notes, created_by, approved_by, approved_at, published_at,
    created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: PgPool,
}

impl RuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a tenant; re-registering an existing tenant renames it
    pub async fn upsert_tenant(&self, tenant_id: TenantId, name: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, name)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(Uuid::from(tenant_id))
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fails with `NotFound` unless the tenant is registered and active
    pub async fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DatabaseError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tenants WHERE tenant_id = $1 AND is_active)",
        )
        .bind(Uuid::from(tenant_id))
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(DatabaseError::not_found("Tenant", tenant_id))
        }
    }

    /// Active rows whose effective window contains `as_of`.
    ///
    /// Every matching version is returned; callers reduce to one per code.
    pub async fn find_active_at(
        &self,
        tenant_id: TenantId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RuleRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM rules
            WHERE tenant_id = $1
              AND status = 'active'
              AND (effective_from IS NULL OR effective_from <= $2)
              AND (effective_to IS NULL OR effective_to >= $2)
            ORDER BY salience DESC, code, version
            "#
        );
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(Uuid::from(tenant_id))
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_version(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
    ) -> Result<RuleRow, DatabaseError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE tenant_id = $1 AND code = $2 AND version = $3"
        );
        sqlx::query_as::<_, RuleRow>(&sql)
            .bind(Uuid::from(tenant_id))
            .bind(code)
            .bind(db_version(version)?)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Rule", format!("{}@v{}", code, version)))
    }

    pub async fn list_versions(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> Result<Vec<RuleRow>, DatabaseError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE tenant_id = $1 AND code = $2 ORDER BY version"
        );
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(Uuid::from(tenant_id))
            .bind(code)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Inserts the next version of `request.code` as a draft.
    ///
    /// The previous latest row loses `is_latest` in the same transaction.
    pub async fn insert_next_version(
        &self,
        tenant_id: TenantId,
        request: NewRuleVersion,
    ) -> Result<Rule, DatabaseError> {
        let tenant = Uuid::from(tenant_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text || ':' || $2))")
            .bind(tenant)
            .bind(&request.code)
            .execute(&mut *tx)
            .await?;

        let current: Option<i32> =
            sqlx::query_scalar("SELECT MAX(version) FROM rules WHERE tenant_id = $1 AND code = $2")
                .bind(tenant)
                .bind(&request.code)
                .fetch_one(&mut *tx)
                .await?;

        let previous: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE rules
            SET is_latest = FALSE, updated_at = NOW()
            WHERE tenant_id = $1 AND code = $2 AND is_latest
            RETURNING rule_id
            "#,
        )
        .bind(tenant)
        .bind(&request.code)
        .fetch_optional(&mut *tx)
        .await?;

        let next = current.unwrap_or(0) + 1;
        let version = u32::try_from(next)
            .map_err(|_| DatabaseError::corrupt("rules", format!("version {} out of range", next)))?;
        let rule = request.into_draft(tenant_id, version, previous.map(RuleId::from), Utc::now());

        sqlx::query(
            r#"
            INSERT INTO rules (
                rule_id, tenant_id, code, version, name, description, category, status,
                script, salience, claim_types, service_types, provider_levels,
                effective_from, effective_to, checksum, is_latest, previous_version_id,
                tags, notes, created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $22
            )
            "#,
        )
        .bind(Uuid::from(rule.id))
        .bind(tenant)
        .bind(&rule.code)
        .bind(next)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.category.as_str())
        .bind(rule.status.as_str())
        .bind(&rule.script)
        .bind(rule.salience)
        .bind(rule.applicability.claim_types.join(","))
        .bind(rule.applicability.service_types.join(","))
        .bind(rule.applicability.provider_levels.join(","))
        .bind(rule.effective.from)
        .bind(rule.effective.to)
        .bind(&rule.checksum)
        .bind(rule.is_latest)
        .bind(previous)
        .bind(&rule.tags)
        .bind(&rule.notes)
        .bind(&rule.created_by)
        .bind(rule.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rule)
    }

    /// Applies a lifecycle transition with the row locked.
    ///
    /// Only status and approval columns are written; scripts are immutable.
    pub async fn apply_transition(
        &self,
        tenant_id: TenantId,
        code: &str,
        version: u32,
        transition: &RuleTransition,
    ) -> Result<Rule, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE tenant_id = $1 AND code = $2 AND version = $3 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(Uuid::from(tenant_id))
            .bind(code)
            .bind(db_version(version)?)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Rule", format!("{}@v{}", code, version)))?;

        let mut rule = Rule::try_from(row)?;
        rule.apply_transition(transition, Utc::now())
            .map_err(|e| DatabaseError::InvalidState(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE rules
            SET status = $2, approved_by = $3, approved_at = $4, published_at = $5, updated_at = $6
            WHERE rule_id = $1
            "#,
        )
        .bind(Uuid::from(rule.id))
        .bind(rule.status.as_str())
        .bind(&rule.approved_by)
        .bind(rule.approved_at)
        .bind(rule.published_at)
        .bind(rule.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rule)
    }

    /// Creates or replaces a rule set and its member list
    pub async fn save_rule_set(&self, rule_set: &RuleSet) -> Result<(), DatabaseError> {
        let id = Uuid::from(rule_set.id);
        let mut tx = self.pool.begin().await?;

        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT tenant_id FROM rule_sets WHERE rule_set_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if matches!(owner, Some(tenant) if tenant != Uuid::from(rule_set.tenant_id)) {
            return Err(DatabaseError::InvalidState(format!(
                "rule set {} belongs to another tenant",
                rule_set.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO rule_sets (
                rule_set_id, tenant_id, name, description, version, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (rule_set_id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                version = EXCLUDED.version,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id)
        .bind(Uuid::from(rule_set.tenant_id))
        .bind(&rule_set.name)
        .bind(&rule_set.description)
        .bind(db_version(rule_set.version)?)
        .bind(rule_set.is_active)
        .bind(rule_set.created_at)
        .bind(rule_set.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM rule_set_rules WHERE rule_set_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, code) in rule_set.rule_codes.iter().enumerate() {
            sqlx::query(
                "INSERT INTO rule_set_rules (rule_set_id, rule_code, position) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(code)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_rule_set(
        &self,
        tenant_id: TenantId,
        id: RuleSetId,
    ) -> Result<RuleSet, DatabaseError> {
        let row = sqlx::query_as::<_, RuleSetRow>(
            r#"
            SELECT rule_set_id, tenant_id, name, description, version, is_active, created_at, updated_at
            FROM rule_sets
            WHERE rule_set_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(tenant_id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("RuleSet", id))?;

        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT rule_code FROM rule_set_rules WHERE rule_set_id = $1 ORDER BY position",
        )
        .bind(Uuid::from(id))
        .fetch_all(&self.pool)
        .await?;

        row.into_rule_set(codes)
    }
}

fn db_version(version: u32) -> Result<i32, DatabaseError> {
    i32::try_from(version)
        .map_err(|_| DatabaseError::QueryFailed(format!("version {} out of range", version)))
}

/// A `rules` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleRow {
    pub rule_id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub version: i32,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub script: String,
    pub salience: i32,
    pub claim_types: String,
    pub service_types: String,
    pub provider_levels: String,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub checksum: String,
    pub is_latest: bool,
    pub previous_version_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = DatabaseError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| DatabaseError::corrupt("rules", message);
        Ok(Rule {
            id: RuleId::from(row.rule_id),
            tenant_id: TenantId::from(row.tenant_id),
            version: u32::try_from(row.version)
                .map_err(|_| corrupt(format!("{} has version {}", row.code, row.version)))?,
            category: row.category.parse().map_err(|e| corrupt(format!("{}", e)))?,
            status: row.status.parse().map_err(|e| corrupt(format!("{}", e)))?,
            applicability: Applicability::from_csv(
                &row.claim_types,
                &row.service_types,
                &row.provider_levels,
            ),
            effective: EffectiveWindow::new(row.effective_from, row.effective_to)
                .map_err(|e| corrupt(e.to_string()))?,
            code: row.code,
            name: row.name,
            description: row.description,
            script: row.script,
            salience: row.salience,
            checksum: row.checksum,
            is_latest: row.is_latest,
            previous_version_id: row.previous_version_id.map(RuleId::from),
            tags: row.tags,
            notes: row.notes,
            created_by: row.created_by,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A `rule_sets` row, without its members
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleSetRow {
    pub rule_set_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleSetRow {
    fn into_rule_set(self, rule_codes: Vec<String>) -> Result<RuleSet, DatabaseError> {
        Ok(RuleSet {
            id: RuleSetId::from(self.rule_set_id),
            tenant_id: TenantId::from(self.tenant_id),
            name: self.name,
            description: self.description,
            version: u32::try_from(self.version).map_err(|_| {
                DatabaseError::corrupt("rule_sets", format!("version {}", self.version))
            })?,
            is_active: self.is_active,
            rule_codes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
