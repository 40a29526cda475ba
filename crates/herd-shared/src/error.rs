//! Error types for herdd.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HerdError {
    /// The classifier or identifier could not be reached in time. Retryable;
    /// the photo was neither accepted nor rejected.
    #[error("classifier unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("user {user} does not own animal {animal}")]
    Ownership { user: String, animal: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HerdError {
    /// Whether the user should simply retry the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HerdError::ClassificationUnavailable(_))
    }
}
