use thiserror::Error;

/// Everything that can go wrong on the client side of the workflow.
///
/// `Validation` and `InvariantViolation` are resolved entirely locally and
/// never reach the backend; the offending operation simply does not apply.
/// `Transport` aborts the triggering action without advancing any stage.
/// A failed classification run is not an error value at all; it reaches
/// callers as a terminal monitor event carrying the backend's message.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("{0}")]
    Transport(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
