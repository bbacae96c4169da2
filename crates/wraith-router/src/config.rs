//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::pool::DEFAULT_MAX_IDLE;

/// Settings for a [`Server`](crate::Server).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use wraith_router::ServerConfig;
///
/// let config = ServerConfig::from_json(r#"{"addr": ":9000", "dev_mode": true}"#).unwrap();
/// assert_eq!(config.addr, ":9000");
/// assert_eq!(config.read_timeout.as_secs(), 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: String,
    /// Maximum time to read a request, in seconds on the wire.
    #[serde(with = "seconds")]
    pub read_timeout: Duration,
    /// Maximum time to write a response.
    #[serde(with = "seconds")]
    pub write_timeout: Duration,
    /// Keep-alive idle timeout.
    #[serde(with = "seconds")]
    pub idle_timeout: Duration,
    /// Maximum size of request headers in bytes.
    pub max_header_bytes: usize,
    /// Drain in-flight requests on shutdown.
    pub graceful_shutdown: bool,
    /// Upper bound for a graceful shutdown.
    #[serde(with = "seconds")]
    pub shutdown_timeout: Duration,
    /// Development mode.
    pub dev_mode: bool,
    /// Idle contexts kept by the router's pool.
    pub max_idle_contexts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            max_header_bytes: 1 << 20,
            graceful_shutdown: true,
            shutdown_timeout: Duration::from_secs(30),
            dev_mode: false,
            max_idle_contexts: DEFAULT_MAX_IDLE,
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or an invalid configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] for an empty address or a zero
    /// shutdown timeout.
    pub fn validate(&self) -> Result<()> {
        if self.addr.trim().is_empty() {
            return Err(RouterError::Config("addr must not be empty".to_string()));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(RouterError::Config(
                "shutdown_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
