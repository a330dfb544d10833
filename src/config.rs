//! Bridge configuration.
//!
//! Loaded from a YAML file; every field has a default so a missing or empty
//! file yields a working local configuration. Unknown fields are ignored for
//! forward compatibility.

use crate::error::{Result, RlinkError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the interpreter server.
pub const DEFAULT_SESSION_PORT: u16 = 6412;

fn default_port() -> u16 {
    DEFAULT_SESSION_PORT
}

fn default_tailer_poll_ms() -> u64 {
    100
}

fn default_tailer_join_timeout_ms() -> u64 {
    6000
}

/// Configuration for the evaluation bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Session connection settings
    // =========================================================================
    /// Host of the interpreter server (default: local).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port of the interpreter server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login for the interpreter server, if it requires authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,

    /// Password for the interpreter server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connect timeout in milliseconds (no timeout when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Whether the interpreter server runs as a daemon.
    pub daemon: bool,

    /// Whether to enable backend debug tracing.
    pub debug: bool,

    /// Environment variables passed through to the interpreter process.
    pub session_env: BTreeMap<String, String>,

    // =========================================================================
    // Bridge settings
    // =========================================================================
    /// Poll interval of the output tailer, in milliseconds.
    #[serde(default = "default_tailer_poll_ms")]
    pub tailer_poll_ms: u64,

    /// Bounded join timeout for the tailer thread at teardown, in milliseconds.
    #[serde(default = "default_tailer_join_timeout_ms")]
    pub tailer_join_timeout_ms: u64,

    /// Path of the NDJSON event log (disabled when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,

    /// Whether the host runs tasks in forked per-task processes.
    ///
    /// Session evaluation assumes one durable session shared by a long-lived
    /// host process; the bridge refuses to start under a forked executor.
    pub forked_executor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            login: None,
            password: None,
            timeout_ms: None,
            daemon: false,
            debug: false,
            session_env: BTreeMap::new(),
            tailer_poll_ms: default_tailer_poll_ms(),
            tailer_join_timeout_ms: default_tailer_join_timeout_ms(),
            event_log: None,
            forked_executor: false,
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            RlinkError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| RlinkError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| RlinkError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RlinkError::Config(
                "config validation failed: port must be greater than 0".to_string(),
            ));
        }
        if self.tailer_poll_ms == 0 {
            return Err(RlinkError::Config(
                "config validation failed: tailer_poll_ms must be greater than 0".to_string(),
            ));
        }
        if self.tailer_join_timeout_ms == 0 {
            return Err(RlinkError::Config(
                "config validation failed: tailer_join_timeout_ms must be greater than 0"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval of the output tailer.
    pub fn tailer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tailer_poll_ms)
    }

    /// Bounded join timeout for the tailer thread.
    pub fn tailer_join_timeout(&self) -> Duration {
        Duration::from_millis(self.tailer_join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.port, 6412);
        assert_eq!(config.tailer_poll_ms, 100);
        assert_eq!(config.tailer_join_timeout_ms, 6000);
        assert!(config.host.is_none());
        assert!(config.event_log.is_none());
        assert!(!config.forked_executor);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.port, 6412);
        assert!(config.session_env.is_empty());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = r#"
port: 7777
tailer_poll_ms: 25
session_env:
  R_LIBS: /opt/r/libs
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.port, 7777);
        assert_eq!(config.tailer_poll_ms, 25);
        assert_eq!(
            config.session_env.get("R_LIBS"),
            Some(&"/opt/r/libs".to_string())
        );
        // Untouched fields keep their defaults
        assert_eq!(config.tailer_join_timeout_ms, 6000);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let yaml = r#"
port: 6412
some_future_knob: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.port, 6412);
    }

    #[test]
    fn zero_port_fails_validation() {
        let err = Config::from_yaml("port: 0").unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let err = Config::from_yaml("tailer_poll_ms: 0").unwrap_err();
        assert!(err.to_string().contains("tailer_poll_ms"));
    }

    #[test]
    fn zero_join_timeout_fails_validation() {
        let err = Config::from_yaml("tailer_join_timeout_ms: 0").unwrap_err();
        assert!(err.to_string().contains("tailer_join_timeout_ms"));
    }

    #[test]
    fn yaml_roundtrip_preserves_values() {
        let mut config = Config::default();
        config.host = Some("compute-7".to_string());
        config.timeout_ms = Some(3000);
        config.forked_executor = true;

        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("compute-7"));
        assert_eq!(parsed.timeout_ms, Some(3000));
        assert!(parsed.forked_executor);
    }

    #[test]
    fn durations_are_derived_from_millis() {
        let config = Config::default();
        assert_eq!(config.tailer_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.tailer_join_timeout(), Duration::from_millis(6000));
    }
}
