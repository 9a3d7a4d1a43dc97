use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by every backend operation on a non-success status:
/// `{"error": "<message>"}`. The message is surfaced to the user verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{error}")]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
