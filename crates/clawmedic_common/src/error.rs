//! Error types for ClawMedic.

use thiserror::Error;

/// Hint returned to callers whose payload cannot be diagnosed
pub const REGENERATE_HINT: &str =
    "Re-run the ClawMedic collection script on the target machine and submit its output unchanged.";

/// Errors surfaced by the doctor pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DoctorError {
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String, hint: String },

    #[error("Fix '{0}' not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DoctorError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        DoctorError::InvalidPayload {
            reason: reason.into(),
            hint: REGENERATE_HINT.to_string(),
        }
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            DoctorError::InvalidPayload { .. } => "invalid_payload",
            DoctorError::NotFound(_) => "not_found",
            DoctorError::Storage(_) => "storage",
        }
    }
}

/// A payload field was present but not of the type a rule expected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field '{path}' expected {expected}, found {found}")]
pub struct FieldError {
    pub path: String,
    pub expected: &'static str,
    pub found: &'static str,
}
