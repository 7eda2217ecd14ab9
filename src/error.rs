//! Error types for overlay loading.
//!
//! Only fetching can fail. Matching, derivation and styling are total and
//! report missing data as `None`.

use thiserror::Error;

pub type OverlayResult<T> = Result<T, OverlayError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OverlayError {
    /// A boundary or statistics source could not be read or parsed.
    #[error("unable to load {what}: {reason}")]
    SourceUnavailable { what: String, reason: String },

    /// The background enhancement task panicked or was cancelled.
    #[error("enhancement task failed: {0}")]
    Enhancement(String),

    #[error("unknown overlay: {0}")]
    UnknownOverlay(String),
}

impl OverlayError {
    pub fn unavailable(what: impl Into<String>, reason: impl ToString) -> Self {
        OverlayError::SourceUnavailable {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}
