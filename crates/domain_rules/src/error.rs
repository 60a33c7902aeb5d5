//! Rule definition errors

use thiserror::Error;

use core_kernel::PortError;

use crate::rule::RuleStatus;
use crate::script::ScriptError;

/// Errors raised while defining or administering rules
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown rule category: {0}")]
    UnknownCategory(String),

    #[error("Unknown rule status: {0}")]
    UnknownStatus(String),

    #[error("Rule {code}@v{version} cannot move from {from} to {to}")]
    InvalidTransition {
        code: String,
        version: u32,
        from: RuleStatus,
        to: RuleStatus,
    },

    #[error("Rule {code} has an invalid script: {source}")]
    Script {
        code: String,
        #[source]
        source: ScriptError,
    },
}

impl RuleError {
    pub fn validation(message: impl Into<String>) -> Self {
        RuleError::Validation(message.into())
    }
}

impl From<RuleError> for PortError {
    fn from(err: RuleError) -> Self {
        match &err {
            RuleError::InvalidTransition { .. } => PortError::validation_field(err.to_string(), "status"),
            RuleError::Script { .. } => PortError::validation_field(err.to_string(), "script"),
            _ => PortError::validation(err.to_string()),
        }
    }
}
