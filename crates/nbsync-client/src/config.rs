//! Client configuration.
//!
//! Loaded from a RON file; every field is optional and falls back to the
//! defaults in [`crate::constants`].
//!
//! ```ron
//! (
//!     client_tab_id: "tab-4f2c",
//!     auth_retry_backoff_ms: 1000,
//!     subscribe_retry_delay_ms: 1000,
//!     event_channel_capacity: 256,
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{AUTH_RETRY_BACKOFF, EVENT_CHANNEL_CAPACITY, SUBSCRIBE_RETRY_DELAY};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON encode error: {0}")]
    Encode(#[from] ron::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one connection actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifies this client tab on every outbound envelope.
    pub client_tab_id: String,
    pub auth_retry_backoff_ms: u64,
    pub subscribe_retry_delay_ms: u64,
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_tab_id: uuid::Uuid::new_v4().to_string(),
            auth_retry_backoff_ms: AUTH_RETRY_BACKOFF.as_millis() as u64,
            subscribe_retry_delay_ms: SUBSCRIBE_RETRY_DELAY.as_millis() as u64,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Render as pretty RON.
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Builder: set the client tab id.
    pub fn with_client_tab_id(mut self, id: impl Into<String>) -> Self {
        self.client_tab_id = id.into();
        self
    }

    pub fn auth_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.auth_retry_backoff_ms)
    }

    pub fn subscribe_retry_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_retry_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_tab_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_tab_id is empty".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid("event_channel_capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.auth_retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.subscribe_retry_delay(), Duration::from_secs(1));
        assert!(!config.client_tab_id.is_empty());
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let config = ClientConfig::from_ron(r#"(client_tab_id: "tab-1")"#).unwrap();
        assert_eq!(config.client_tab_id, "tab-1");
        assert_eq!(config.event_channel_capacity, EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = ClientConfig::from_ron("(event_channel_capacity: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file_roundtrip() {
        let config = ClientConfig::default().with_client_tab_id("tab-9");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_ron().unwrap().as_bytes()).unwrap();

        let loaded = ClientConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(dir.path().join("nope.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
