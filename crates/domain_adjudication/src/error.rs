//! Adjudication errors
//!
//! Three families, kept apart because callers react to each differently:
//!
//! - [`CompileError`] and [`EngineError`]: nothing was evaluated, no result
//! - [`EvaluationError`]: the batch aborted; the partial result is still returned
//! - [`AuditPersistenceError`]: the result is valid but its audit trail is incomplete

use std::fmt;
use thiserror::Error;

use core_kernel::{ExecutionId, PortError, RuleSetId, TenantId};
use domain_claims::ClaimError;
use domain_rules::{RuntimeError, ScriptError};

/// Why a single rule could not be added to a knowledge base
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileFailureReason {
    Script(ScriptError),
    ChecksumMismatch { expected: String, actual: String },
    DuplicateCode,
    ForeignTenant(TenantId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCompileFailure {
    pub code: String,
    pub version: u32,
    pub reason: CompileFailureReason,
}

impl fmt::Display for RuleCompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}: ", self.code, self.version)?;
        match &self.reason {
            CompileFailureReason::Script(err) => write!(f, "{}", err),
            CompileFailureReason::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum {} does not match script ({})", expected, actual)
            }
            CompileFailureReason::DuplicateCode => write!(f, "code appears more than once"),
            CompileFailureReason::ForeignTenant(owner) => {
                write!(f, "rule belongs to tenant {}", owner)
            }
        }
    }
}

/// A knowledge base could not be built.
///
/// Carries every failing rule, not just the first.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("knowledge base build for tenant {tenant_id} failed: {}", render_failures(.failures))]
pub struct CompileError {
    pub tenant_id: TenantId,
    pub failures: Vec<RuleCompileFailure>,
}

fn render_failures(failures: &[RuleCompileFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Abort reasons for a rule batch
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("rule {code}@v{version} action failed: {source}")]
    Action {
        code: String,
        version: u32,
        #[source]
        source: RuntimeError,
    },

    #[error("rule {code}@v{version} condition failed: {source}")]
    Condition {
        code: String,
        version: u32,
        #[source]
        source: RuntimeError,
    },

    #[error("no fixpoint after {ceiling} firings; rule {code} still matches")]
    CycleLimitExceeded { ceiling: usize, code: String },

    #[error("evaluation exceeded its {deadline_ms}ms deadline after {fired} firings")]
    DeadlineExceeded { deadline_ms: u64, fired: usize },
}

/// Failures that prevent an evaluation or replay from producing a result
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rule store failed for tenant {tenant_id}: {source}")]
    RuleStore {
        tenant_id: TenantId,
        #[source]
        source: PortError,
    },

    #[error(transparent)]
    Compilation(#[from] CompileError),

    #[error("rule set {rule_set_id} of tenant {tenant_id} is inactive")]
    InactiveRuleSet {
        tenant_id: TenantId,
        rule_set_id: RuleSetId,
    },

    #[error("claim context belongs to tenant {context_tenant}, evaluated under {tenant_id}")]
    TenantMismatch {
        tenant_id: TenantId,
        context_tenant: TenantId,
    },

    #[error("snapshot for execution {execution_id} is unreadable: {message}")]
    Snapshot {
        execution_id: ExecutionId,
        message: String,
    },

    #[error("integrity violation: rule {code}@v{version} has checksum {actual}, audit recorded {expected}")]
    Integrity {
        code: String,
        version: u32,
        expected: String,
        actual: String,
    },

    #[error("audit lookup for execution {execution_id} failed: {source}")]
    AuditLookup {
        execution_id: ExecutionId,
        #[source]
        source: PortError,
    },
}

impl EngineError {
    pub(crate) fn snapshot(execution_id: ExecutionId, err: ClaimError) -> Self {
        EngineError::Snapshot {
            execution_id,
            message: err.to_string(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, EngineError::Integrity { .. })
    }
}

/// Some audit writes for an evaluation did not reach the recorder.
///
/// The evaluation result it accompanies is still valid; callers may retry
/// the writes from the records on the outcome without re-evaluating.
#[derive(Debug, Error)]
#[error("audit persistence for execution {execution_id} failed ({failed_writes} of {attempted_writes} writes): {first_error}")]
pub struct AuditPersistenceError {
    pub execution_id: ExecutionId,
    pub attempted_writes: usize,
    pub failed_writes: usize,
    pub decision_persisted: bool,
    #[source]
    pub first_error: PortError,
}
