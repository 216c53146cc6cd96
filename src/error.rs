// src/error.rs

use thiserror::Error;

/// Errors raised by the detection engine. Low-confidence or missing
/// landmarks are never errors; these cover contract violations only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl DetectError {
    pub(crate) fn input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
