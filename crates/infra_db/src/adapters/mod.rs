//! Port adapters
//!
//! Each adapter implements a domain port over its repository, translating
//! rows to domain types and `DatabaseError` to `PortError`.
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresAuditRecorder, PostgresRuleStore};
//!
//! let engine = AdjudicationEngine::new(
//!     Arc::new(PostgresRuleStore::new(pool.clone())),
//!     Arc::new(PostgresAuditRecorder::new(pool)),
//!     EngineConfig::default(),
//! );
//! ```

pub mod audit;
pub mod rule_store;

pub use audit::PostgresAuditRecorder;
pub use rule_store::PostgresRuleStore;
