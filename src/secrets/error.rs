//! Error types for secret backend and local secret store operations.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while talking to the secret backend or the local store.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Secret not found in the backend.
    #[error("Secret not found: {key}")]
    NotFound { key: String },

    /// The backend could not be reached within the request timeout.
    #[error("Secret backend unreachable at {address}: {message}")]
    Unreachable { address: String, message: String },

    /// The backend rejected the presented credentials.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Initialization was requested on an already initialized backend.
    #[error("Secret backend is already initialized")]
    AlreadyInitialized,

    /// An operation that needs an unsealed backend was attempted while sealed.
    #[error("Secret backend is sealed")]
    Sealed,

    /// Invalid secret path.
    #[error("Invalid secret path: {path} - {reason}")]
    InvalidPath { path: String, reason: String },

    /// Backend returned an error response.
    #[error("Backend error (status {status}): {message}")]
    BackendError { status: u16, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error against the local store.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an unreachable error.
    pub fn unreachable(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable { address: address.into(), message: message.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into(), reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend_error(status: u16, message: impl Into<String>) -> Self {
        Self::BackendError { status, message: message.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Transport-level failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            SecretsError::Unreachable { .. } => true,
            SecretsError::BackendError { status, .. } => *status >= 500 && *status != 503,
            _ => false,
        }
    }
}
