//! Claim Context Domain
//!
//! This crate defines the working memory a rule batch evaluates against:
//! the claim facts supplied by the caller, the outputs written by rules, the
//! field schema scripts are compiled against, and the decision classification.
//!
//! # Evaluation data flow
//!
//! ```text
//! claim + policy + pricing -> ClaimContext -> rules mutate outputs -> DecisionType
//! ```

pub mod context;
pub mod decision;
pub mod field;
pub mod snapshot;
pub mod error;

pub use context::{ClaimContext, FieldChange, WritePolicy};
pub use decision::{DecisionType, FinancialOutcome};
pub use field::{ContextField, FieldAccess, FieldType, FieldValue};
pub use snapshot::{ContextSnapshot, CONTEXT_SNAPSHOT_FORMAT};
pub use error::ClaimError;
