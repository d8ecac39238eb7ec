//! Error taxonomy for the AMAS engine (§7). Most variants degrade
//! silently inside the engine (the caller gets a fallback decision, not
//! a 5xx) — only validation failures and persistence unavailability are
//! worth surfacing to HTTP callers.

use crate::response::AppError;

#[derive(Debug, thiserror::Error)]
pub enum AmasError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("native acceleration unavailable: {0}")]
    NativeUnavailable(String),

    #[error("persistence unavailable: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt state: {0}")]
    Corrupt(String),
}

impl AmasError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AmasError::Corrupt(_))
    }
}

impl From<AmasError> for AppError {
    fn from(err: AmasError) -> Self {
        match err {
            AmasError::Validation(msg) => AppError::validation(msg),
            AmasError::DimensionMismatch { expected, actual } => AppError::validation(format!(
                "feature dimension mismatch: expected {expected}, got {actual}"
            )),
            AmasError::Persistence(ref sqlx_err) => {
                AppError::internal(format!("persistence unavailable: {sqlx_err}"))
            }
            AmasError::InsufficientData(_)
            | AmasError::NativeUnavailable(_)
            | AmasError::Corrupt(_) => AppError::internal(err.to_string()),
        }
    }
}
