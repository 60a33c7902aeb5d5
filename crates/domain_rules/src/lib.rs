//! Rule Definition Domain
//!
//! Versioned, tenant-scoped adjudication rules, the script language they are
//! written in, and the store port the engine resolves them through.
//!
//! # Rule lifecycle
//!
//! ```text
//! Draft -> Active -> Inactive | Deprecated | Archived
//!   \-> Archived      Inactive -> Active
//! ```
//!
//! A change to a rule's script always creates a new version; status changes
//! are the only in-place updates.

pub mod rule;
pub mod rule_set;
pub mod script;
pub mod ports;
pub mod error;

pub use rule::{
    content_checksum, Applicability, NewRuleVersion, Rule, RuleCategory, RuleStatus,
    RuleTransition,
};
pub use rule_set::RuleSet;
pub use script::{compile, ActionEffects, RuntimeError, Script, ScriptError};
pub use ports::{select_effective, sort_for_evaluation, RuleStorePort};
pub use error::RuleError;

#[cfg(any(test, feature = "mock"))]
pub use ports::mock::InMemoryRuleStore;
