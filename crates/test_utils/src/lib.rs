//! Test Utilities Crate
//!
//! Shared test infrastructure for the adjudication workspace.
//!
//! # Modules
//!
//! - `fixtures`: the reference rules, fixed instants and claims with known outcomes
//! - `builders`: claim context and rule builders
//! - `database`: PostgreSQL container harness
//! - `assertions`: reconciliation and audit assertions
//! - `generators`: proptest strategies

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
