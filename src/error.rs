//! Error types for the Suggestion operator

use thiserror::Error;

/// Main error type for Suggestion reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invariant violation or malformed Suggestion spec
    #[error("validation error: {0}")]
    Validation(String),

    /// Algorithm configuration missing or unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A dependency (API server, algorithm service) could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The reconciliation pass was cancelled before it could finish
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an unavailable error with the given message
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether the failed operation may succeed if retried later.
    ///
    /// Kubernetes errors are retryable except for malformed requests (400, 422),
    /// which will keep failing until the desired object changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(ae)) => !matches!(ae.code, 400 | 422),
            Error::Kube(_) => true,
            Error::Unavailable(_) | Error::Cancelled => true,
            Error::Validation(_) | Error::Configuration(_) | Error::Serialization(_) => false,
        }
    }

    /// Whether this is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
