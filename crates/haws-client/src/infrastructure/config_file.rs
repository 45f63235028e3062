//! TOML configuration file for the client binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [hub]
//! url = "http://homeassistant.local:8123"
//! token = "eyJhbGciOi..."
//!
//! [session]
//! auth_timeout_secs = 10
//! ping_interval_secs = 10
//! ping_count = 0
//! reconnect_interval_secs = 5
//! ```
//!
//! Every field is optional; a missing field takes the same default as
//! [`SessionConfig::default`].  Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{SessionConfig, DEFAULT_HUB_URL};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level contents of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// Where the hub is and how to authenticate.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct HubSection {
    /// Base URL of the hub; the websocket endpoint is derived from it.
    #[serde(default = "default_url")]
    pub url: String,
    /// Access token.  Empty means "fall back to the environment".
    #[serde(default)]
    pub token: String,
}

/// Handshake, keepalive and reconnect timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Keepalive probes per connection; `0` means unlimited.
    #[serde(default)]
    pub ping_count: u32,
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_url() -> String {
    DEFAULT_HUB_URL.to_string()
}
fn default_auth_timeout_secs() -> u64 {
    10
}
fn default_ping_interval_secs() -> u64 {
    10
}
fn default_reconnect_interval_secs() -> u64 {
    5
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            hub: HubSection::default(),
            session: SessionSection::default(),
        }
    }
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            auth_timeout_secs: default_auth_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_count: 0,
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

impl std::fmt::Debug for HubSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSection")
            .field("url", &self.url)
            .field("token", &if self.token.is_empty() { "<empty>" } else { "<redacted>" })
            .finish()
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FileConfig {
    /// Parses config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed or a field has
    /// the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read (including when
    /// it does not exist) and [`ConfigError::Parse`] if it is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Renders the config as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builds the session configuration described by this file.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.hub.url.clone(),
            token: self.hub.token.clone(),
            auth_timeout: Duration::from_secs(self.session.auth_timeout_secs),
            ping_interval: Duration::from_secs(self.session.ping_interval_secs),
            ping_count: self.session.ping_count,
            reconnect_interval: Duration::from_secs(self.session.reconnect_interval_secs),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_matches_session_defaults() {
        // Arrange / Act
        let cfg = FileConfig::from_toml_str("").unwrap();

        // Assert
        assert_eq!(cfg, FileConfig::default());
        assert_eq!(cfg.session_config(), SessionConfig::default());
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let cfg = FileConfig::from_toml_str(
            r#"
            [hub]
            url = "http://hub.local:8123"

            [session]
            ping_count = 3
            "#,
        )
        .unwrap();

        let session = cfg.session_config();
        assert_eq!(session.url, "http://hub.local:8123");
        assert_eq!(session.token, "");
        assert_eq!(session.ping_count, 3);
        assert_eq!(session.ping_interval, Duration::from_secs(10));
        assert_eq!(session.reconnect_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_full_file_is_mapped() {
        let cfg = FileConfig::from_toml_str(
            r#"
            log_level = "debug"

            [hub]
            url = "https://hub.example.com"
            token = "secret"

            [session]
            auth_timeout_secs = 3
            ping_interval_secs = 30
            ping_count = 0
            reconnect_interval_secs = 1
            "#,
        )
        .unwrap();

        let session = cfg.session_config();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(session.token, "secret");
        assert_eq!(session.auth_timeout, Duration::from_secs(3));
        assert_eq!(session.ping_interval, Duration::from_secs(30));
        assert_eq!(session.reconnect_interval, Duration::from_secs(1));
        assert_eq!(session.websocket_url(), "wss://hub.example.com/api/websocket");
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = FileConfig::from_toml_str("[session]\nping_count = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = FileConfig::load(Path::new("/nonexistent/haws/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let mut cfg = FileConfig::default();
        cfg.session.ping_count = 7;

        let text = cfg.to_toml_string().unwrap();

        assert_eq!(FileConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn test_debug_output_redacts_token() {
        let mut cfg = FileConfig::default();
        cfg.hub.token = "very-secret".to_string();
        assert!(!format!("{cfg:?}").contains("very-secret"));
    }
}
