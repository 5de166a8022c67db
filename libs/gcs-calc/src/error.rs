//! Error types for gcs-calc

use thiserror::Error;

/// Calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,

    #[error("Expression too complex: {0}")]
    TooComplex(String),
}

impl CalcError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound(name.into())
    }

    pub fn too_complex(msg: impl Into<String>) -> Self {
        Self::TooComplex(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
