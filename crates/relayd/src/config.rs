//! Server configuration.
//!
//! [`RelayConfig`] is read from an optional TOML file; every key has a
//! default, so an empty file (or no file) is a valid configuration. The
//! binary layers command-line overrides on top before calling
//! [`RelayConfig::validate`].
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 9000
//! max_sessions = 10
//! outbound_queue = 64
//! write_timeout_ms = 2000
//! handshake_timeout_secs = 30
//! flush_timeout_ms = 1000
//! session_logs = true
//! log_dir = "logs"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DEFAULT_MAX_SESSIONS;
use crate::server::DEFAULT_PORT;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Host or address to bind.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,
    /// Per-session outbound queue depth.
    pub outbound_queue: usize,
    /// Bound on writing one line to a peer.
    pub write_timeout_ms: u64,
    /// Bound on waiting for the handshake name.
    pub handshake_timeout_secs: u64,
    /// Bound on flushing queued lines when a session ends.
    pub flush_timeout_ms: u64,
    /// Whether to write per-session log files.
    pub session_logs: bool,
    /// Directory for per-session log files.
    pub log_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            outbound_queue: 64,
            write_timeout_ms: 2_000,
            handshake_timeout_secs: 30,
            flush_timeout_ms: 1_000,
            session_logs: true,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RelayConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or
    /// `ConfigError::Parse` if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for this type.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Rejects values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_sessions", self.max_sessions == 0),
            ("outbound_queue", self.outbound_queue == 0),
            ("write_timeout_ms", self.write_timeout_ms == 0),
            ("handshake_timeout_secs", self.handshake_timeout_secs == 0),
            ("flush_timeout_ms", self.flush_timeout_ms == 0),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        Ok(())
    }

    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection settings derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            outbound_queue: self.outbound_queue,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
        }
    }
}

/// Settings every connection handler runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Outbound queue depth.
    pub outbound_queue: usize,
    /// Bound on writing one line.
    pub write_timeout: Duration,
    /// Bound on receiving the handshake name.
    pub handshake_timeout: Duration,
    /// Bound on flushing queued lines at teardown.
    pub flush_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        RelayConfig::default().session_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = RelayConfig::from_toml_str(
            r#"
            port = 4000
            max_sessions = 3
            log_dir = "/var/log/relay"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/relay"));
        assert_eq!(config.outbound_queue, 64);
        assert!(config.session_logs);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = RelayConfig::from_toml_str("max_clients = 5");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = RelayConfig {
            outbound_queue: 0,
            ..RelayConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: outbound_queue must be greater than 0"
        );

        let config = RelayConfig {
            host: " ".to_string(),
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_settings() {
        let settings = RelayConfig::default().session_settings();
        assert_eq!(settings.outbound_queue, 64);
        assert_eq!(settings.write_timeout, Duration::from_secs(2));
        assert_eq!(settings.handshake_timeout, Duration::from_secs(30));
        assert_eq!(settings.flush_timeout, Duration::from_secs(1));
        assert_eq!(SessionSettings::default(), settings);
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = RelayConfig {
            port: 7777,
            session_logs: false,
            ..RelayConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("port = 7777"));
        assert_eq!(RelayConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RelayConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
