//! Error taxonomy shared by every stage of a request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum characters of offending model output carried in a parse error.
pub const EXCERPT_LIMIT: usize = 200;

/// A caller-input defect on a single named field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field}: value {value} outside physiologic bound [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field}: value is not a finite number")]
    NotFinite { field: String },

    #[error("{field}: expected a number, found {found}")]
    InvalidType { field: String, found: String },

    #[error("{field}: {reason}")]
    Malformed { field: String, reason: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::OutOfRange { field, .. }
            | ValidationError::NotFinite { field }
            | ValidationError::InvalidType { field, .. }
            | ValidationError::Malformed { field, .. } => field,
        }
    }
}

/// Every failure the core can hand back to a caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BloodGasError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("At least one blood-gas indicator must be supplied")]
    EmptyPanel,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream model error: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Model output is not valid JSON: {message}")]
    Parse { message: String, excerpt: String },

    #[error("Model call exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type BloodGasResult<T> = Result<T, BloodGasError>;

/// Flat failure classification, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    EmptyPanel,
    Validation,
    Upstream,
    Parse,
    Timeout,
    Internal,
}

/// Structured, user-visible failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub detail: String,
    pub retryable: bool,
}

impl BloodGasError {
    /// Build a parse failure, keeping only a bounded excerpt of the raw text.
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        BloodGasError::Parse {
            message: message.into(),
            excerpt: excerpt(raw, EXCERPT_LIMIT),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BloodGasError::Configuration(_) => ErrorKind::Configuration,
            BloodGasError::EmptyPanel => ErrorKind::EmptyPanel,
            BloodGasError::Validation(_) => ErrorKind::Validation,
            BloodGasError::Upstream { .. } => ErrorKind::Upstream,
            BloodGasError::Parse { .. } => ErrorKind::Parse,
            BloodGasError::Timeout { .. } => ErrorKind::Timeout,
            BloodGasError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Upstream | ErrorKind::Parse | ErrorKind::Timeout
        )
    }

    pub fn report(&self) -> ErrorReport {
        let detail = match self {
            BloodGasError::Parse { message, excerpt } => {
                format!("{message}; output began with: {excerpt}")
            }
            other => other.to_string(),
        };
        ErrorReport {
            kind: self.kind(),
            detail,
            retryable: self.is_retryable(),
        }
    }
}

impl From<serde_json::Error> for BloodGasError {
    fn from(e: serde_json::Error) -> Self {
        BloodGasError::Internal(format!("Serialization failed: {e}"))
    }
}

/// Truncate `text` to at most `limit` characters, marking the cut.
pub fn excerpt(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
