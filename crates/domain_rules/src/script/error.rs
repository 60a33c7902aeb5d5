//! Script compile and runtime errors

use thiserror::Error;

use core_kernel::MoneyError;
use domain_claims::ClaimError;

/// Errors found while compiling a script
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unknown field Claim.{name} at {line}:{column}")]
    UnknownField {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("unknown function {name} at {line}:{column}")]
    UnknownFunction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("{function} takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("type error at {line}:{column}: {message}")]
    Type {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("field Claim.{field} cannot be assigned by rules")]
    ReadOnlyField { field: String },
}

/// 1-based line and column of a byte offset
pub(crate) fn position(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

impl ScriptError {
    pub(crate) fn syntax(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = position(source, offset);
        ScriptError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = position(source, offset);
        ScriptError::Type {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Errors raised while a rule's condition or actions execute
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("division by zero in `{expression}`")]
    DivisionByZero { expression: String },

    #[error("arithmetic overflow in `{expression}`")]
    Overflow { expression: String },

    #[error("invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("unexpected value type in `{expression}`")]
    TypeMismatch { expression: String },

    #[error("write rejected: {0}")]
    Write(#[from] ClaimError),

    #[error("money error: {0}")]
    Money(#[from] MoneyError),
}
