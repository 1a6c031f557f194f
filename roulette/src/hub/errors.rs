//! Hub error types.

use thiserror::Error;

/// Hub errors
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub task has stopped
    #[error("notification hub is not running")]
    Closed,

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HubError {
    pub fn client_message(&self) -> String {
        "Notification service unavailable".to_string()
    }
}

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;
