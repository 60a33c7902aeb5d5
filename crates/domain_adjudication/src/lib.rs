//! Adjudication Domain
//!
//! Turns a tenant's rules and one claim context into a decision with a
//! complete audit trail, and reproduces recorded decisions on demand.
//!
//! # Evaluation pipeline
//!
//! ```text
//! RuleStorePort -> KnowledgeBaseCache -> fixpoint loop -> EvaluationResult
//!                                              |
//!                                              +-> ExecutionLog* + DecisionAudit -> AuditPort
//! DecisionAudit -> pinned rule versions -> KnowledgeBase -> fixpoint loop (replay)
//! ```
//!
//! # Failure reporting
//!
//! | Failure | Surfaced as |
//! |---|---|
//! | Store unreachable, unknown tenant | `Err(EngineError::RuleStore)` |
//! | Script does not compile | `Err(EngineError::Compilation)` |
//! | Rule set deactivated | `Err(EngineError::InactiveRuleSet)` |
//! | Action error, cycle ceiling, deadline | `EvaluationResult::error` (audit `has_error`) |
//! | Audit write failed | `EvaluationOutcome::audit_error` |
//! | Replayed rule changed | `Err(EngineError::Integrity)` |

pub mod audit;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixpoint;
pub mod replay;

#[cfg(test)]
mod test_support;

pub use audit::{
    AuditPort, DecisionAudit, ExecutionLog, RuleSnapshotEntry, RulesSnapshot, SnapshotLimits,
    RULES_SNAPSHOT_FORMAT,
};
pub use cache::{CacheKey, KnowledgeBaseCache};
pub use compiler::{fingerprint, CompiledRule, KnowledgeBase};
pub use config::EngineConfig;
pub use engine::{
    AdjudicationEngine, EvaluationOutcome, EvaluationRequest, EvaluationResult, FiredRule,
    RuleSource,
};
pub use error::{
    AuditPersistenceError, CompileError, CompileFailureReason, EngineError, EvaluationError,
    RuleCompileFailure,
};
pub use fixpoint::{run_batch, BatchLimits, BatchOutcome, Firing};
pub use replay::ReplayReport;

#[cfg(any(test, feature = "mock"))]
pub use audit::mock::InMemoryAuditLog;
