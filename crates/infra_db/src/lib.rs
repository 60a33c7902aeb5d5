//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the adjudication engine: the versioned rule
//! store and the append-only audit trail, both behind the domain ports.
//!
//! # Layout
//!
//! - [`pool`]: connection pool configuration and embedded migrations
//! - [`repositories`]: SQL access returning rows or domain values
//! - [`adapters`]: `RuleStorePort` and `AuditPort` implementations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresRuleStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/adjudication")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresRuleStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PostgresAuditRecorder, PostgresRuleStore};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
