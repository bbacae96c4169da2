//! Error types for hubs.

use thiserror::Error;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// A client with this id is already registered.
    #[error("client already registered: {0}")]
    ClientExists(String),

    /// No client with this id is registered.
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// The client's receiver has been dropped.
    #[error("client disconnected: {0}")]
    Disconnected(String),

    /// A message could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
