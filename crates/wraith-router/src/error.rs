//! Error types for routing and dispatch.

use thiserror::Error;

/// Router-specific errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid path pattern.
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),

    /// The request method is not one the router understands.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A handler or middleware tried to write a response twice.
    #[error("response already written")]
    ResponseAlreadyWritten,

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A typed store lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The handler chain did not finish before its deadline.
    #[error("handler timed out")]
    Timeout,

    /// A handler reported a failure.
    #[error("{0}")]
    Handler(String),

    /// Invalid server configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RouterError {
    /// Creates a handler error from any displayable message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

/// Errors from the typed accessors of the per-request store.
///
/// A missing key and a key holding a different type are distinct outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Nothing is stored under the key.
    #[error("no value stored under `{key}`")]
    Missing { key: String },

    /// A value is stored under the key but has another type.
    #[error("value under `{key}` is {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
