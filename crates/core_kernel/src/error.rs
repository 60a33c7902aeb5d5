//! Kernel error type

use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

/// Errors raised by kernel value types and shared settings
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error("Invalid setting `{setting}`: {message}")]
    Configuration {
        setting: &'static str,
        message: String,
    },
}

impl CoreError {
    pub fn configuration(setting: &'static str, message: impl Into<String>) -> Self {
        CoreError::Configuration {
            setting,
            message: message.into(),
        }
    }

    /// Name of the offending setting, for configuration errors
    pub fn setting(&self) -> Option<&'static str> {
        match self {
            CoreError::Configuration { setting, .. } => Some(setting),
            _ => None,
        }
    }
}
