// Failure taxonomy for the result store collaborator.

use thiserror::Error;

/// Errors surfaced by a `ResultStore` implementation. The workflow never
/// sees transport details, only this classification.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("network failure during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("session expired or unauthorized: {0}")]
    AuthExpired(String),

    #[error("malformed response from result store: {0}")]
    Deserialize(String),

    #[error("result store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Transient failures are worth one more attempt; auth expiry is
    /// retried separately because the surrounding client refreshes tokens.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Network { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::AuthExpired(_))
    }

    /// The backend message, when the failure carries one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            StoreError::Backend(message) => Some(message),
            _ => None,
        }
    }
}
