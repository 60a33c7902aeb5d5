//! Repositories
//!
//! SQL access for each stored aggregate. Queries are checked at runtime
//! (`sqlx::query` / `query_as`) so the workspace builds without a live
//! database.

pub mod audit;
pub mod rules;

pub use audit::AuditRepository;
pub use rules::RuleRepository;
