//! Client configuration: defaults, environment overrides and TOML files.
//!
//! Values are resolved in order: built-in defaults, then an optional TOML
//! file, then `GOCHAT_*` environment variables. The CLI applies its own
//! flags last.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default endpoints.
pub mod endpoints {
    pub const WEBSOCKET: &str = "ws://localhost:8081/ws";
    pub const API: &str = "http://localhost:8080";
}

/// Environment variable names.
pub mod env_vars {
    pub const WS_URL: &str = "GOCHAT_WS_URL";
    pub const API_URL: &str = "GOCHAT_API_URL";
    pub const HEARTBEAT_INTERVAL_SECS: &str = "GOCHAT_HEARTBEAT_INTERVAL_SECS";
    pub const IDLE_WARNING_SECS: &str = "GOCHAT_IDLE_WARNING_SECS";
    pub const MAX_CONSECUTIVE_ERRORS: &str = "GOCHAT_MAX_CONSECUTIVE_ERRORS";
    pub const RECEIVE_TIMEOUT_SECS: &str = "GOCHAT_RECEIVE_TIMEOUT_SECS";
    pub const LOG_JSON: &str = "GOCHAT_LOG_JSON";
}

/// Keep-alive timing.
pub mod heartbeat {
    /// Seconds between keep-alive frames.
    pub const DEFAULT_INTERVAL_SECS: u64 = 25;
    /// Idle time after which a liveness warning is logged.
    pub const DEFAULT_IDLE_WARNING_SECS: u64 = 55;
    /// Server closes connections idle for this long.
    pub const SERVER_IDLE_TIMEOUT_SECS: u64 = 60;
}

/// Configuration for a chat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the connect layer.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base URL of the HTTP API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Idle seconds before a liveness warning.
    #[serde(default = "default_idle_warning")]
    pub idle_warning_secs: u64,

    /// Consecutive transport errors tolerated per loop (0 = unbounded).
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Optional receive timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_timeout_secs: Option<u64>,

    /// Capacity of the consumer event channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_ws_url() -> String {
    endpoints::WEBSOCKET.to_string()
}

fn default_api_url() -> String {
    endpoints::API.to_string()
}

fn default_heartbeat_interval() -> u64 {
    heartbeat::DEFAULT_INTERVAL_SECS
}

fn default_idle_warning() -> u64 {
    heartbeat::DEFAULT_IDLE_WARNING_SECS
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_event_channel_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            idle_warning_secs: default_idle_warning(),
            max_consecutive_errors: default_max_consecutive_errors(),
            receive_timeout_secs: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }

    /// Load a TOML file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded client configuration");
        Ok(config)
    }

    /// Apply `GOCHAT_*` environment overrides in place.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(env_vars::WS_URL) {
            self.ws_url = url;
        }
        if let Ok(url) = std::env::var(env_vars::API_URL) {
            self.api_url = url;
        }
        if let Some(secs) = parse_env(env_vars::HEARTBEAT_INTERVAL_SECS)? {
            self.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = parse_env(env_vars::IDLE_WARNING_SECS)? {
            self.idle_warning_secs = secs;
        }
        if let Some(max) = parse_env(env_vars::MAX_CONSECUTIVE_ERRORS)? {
            self.max_consecutive_errors = max;
        }
        if let Some(secs) = parse_env(env_vars::RECEIVE_TIMEOUT_SECS)? {
            self.receive_timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Check the values against the server's idle timeout.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_secs >= heartbeat::SERVER_IDLE_TIMEOUT_SECS {
            return Err(Error::InvalidConfiguration(format!(
                "heartbeat_interval_secs ({}) must be shorter than the server idle timeout ({}s)",
                self.heartbeat_interval_secs,
                heartbeat::SERVER_IDLE_TIMEOUT_SECS
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.receive_timeout_secs == Some(0) {
            return Err(Error::InvalidConfiguration(
                "receive_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the WebSocket endpoint.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the keep-alive interval.
    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    /// Set the idle warning threshold.
    pub fn with_idle_warning(mut self, secs: u64) -> Self {
        self.idle_warning_secs = secs;
        self
    }

    /// Set the consecutive error budget.
    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    /// Set the receive timeout.
    pub fn with_receive_timeout(mut self, secs: u64) -> Self {
        self.receive_timeout_secs = Some(secs);
        self
    }

    /// Set the consumer channel capacity.
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn idle_warning(&self) -> Duration {
        Duration::from_secs(self.idle_warning_secs)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                Error::InvalidConfiguration(format!("{} has invalid value '{}'", name, raw))
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_url, endpoints::WEBSOCKET);
        assert_eq!(config.api_url, endpoints::API);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(25));
        assert_eq!(config.idle_warning(), Duration::from_secs(55));
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.receive_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new()
            .with_ws_url("ws://chat.example:9000/ws")
            .with_heartbeat_interval(10)
            .with_idle_warning(20)
            .with_receive_timeout(90)
            .with_max_consecutive_errors(0);

        assert_eq!(config.ws_url, "ws://chat.example:9000/ws");
        assert_eq!(config.heartbeat_interval_secs, 10);
        assert_eq!(config.idle_warning_secs, 20);
        assert_eq!(config.receive_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.max_consecutive_errors, 0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            ws_url = "ws://10.0.0.2:8081/ws"
            heartbeat_interval_secs = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.ws_url, "ws://10.0.0.2:8081/ws");
        assert_eq!(config.heartbeat_interval_secs, 20);
        assert_eq!(config.idle_warning_secs, heartbeat::DEFAULT_IDLE_WARNING_SECS);
        assert_eq!(config.api_url, endpoints::API);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ClientConfig::from_toml_str("heartbeat_interval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_intervals() {
        assert!(ClientConfig::new().with_heartbeat_interval(0).validate().is_err());
        assert!(ClientConfig::new().with_heartbeat_interval(60).validate().is_err());
        assert!(ClientConfig::new().with_heartbeat_interval(59).validate().is_ok());
        assert!(ClientConfig::new().with_event_channel_capacity(0).validate().is_err());
        assert!(ClientConfig::new().with_receive_timeout(0).validate().is_err());
    }
}
