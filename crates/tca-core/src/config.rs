//! Configuration resolution for the conformance agent.
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Command-line flags (passed as [`ConfigOverrides`])
//! 2. Environment variables (`TCA_MANAGER_HOST`, `TCA_MANAGER_PORT`,
//!    `TCA_TRANSPORT`)
//! 3. Config file (`tca.toml` in the working directory, or an explicit
//!    `--config` path)
//! 4. Defaults

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default Test Manager host.
pub const DEFAULT_MANAGER_HOST: &str = "127.0.0.5";
/// Default Test Manager port.
pub const DEFAULT_MANAGER_PORT: u16 = 33333;
/// Default transport implementation name.
pub const DEFAULT_TRANSPORT: &str = "loopback";

/// Name of the config file looked up in the working directory when no
/// explicit path is given.
const DEFAULT_CONFIG_FILE: &str = "tca.toml";

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Host the Test Manager listens on.
    pub manager_host: String,
    /// Port the Test Manager listens on.
    pub manager_port: u16,
    /// Name of the transport implementation to drive.
    pub transport: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manager_host: DEFAULT_MANAGER_HOST.to_string(),
            manager_port: DEFAULT_MANAGER_PORT,
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }
}

/// Highest-priority overrides, typically sourced from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file path. When set, the file must exist.
    pub config_path: Option<PathBuf>,
    pub manager_host: Option<String>,
    pub manager_port: Option<u16>,
    pub transport: Option<String>,
}

/// On-disk config file shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    manager_host: Option<String>,
    manager_port: Option<u16>,
    transport: Option<String>,
}

/// Errors raised during configuration resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable holds a value of the wrong shape.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
}

/// Resolve the effective configuration from overrides, process
/// environment, config file, and defaults.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<AgentConfig, ConfigError> {
    resolve_with_env(overrides, |var| std::env::var(var).ok())
}

/// Resolution core with an injectable environment lookup, so precedence
/// can be tested without mutating process state.
fn resolve_with_env(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AgentConfig, ConfigError> {
    let mut config = AgentConfig::default();

    // Layer 3: config file
    if let Some(file) = load_file(overrides.config_path.as_deref())? {
        if let Some(host) = file.manager_host {
            config.manager_host = host;
        }
        if let Some(port) = file.manager_port {
            config.manager_port = port;
        }
        if let Some(transport) = file.transport {
            config.transport = transport;
        }
    }

    // Layer 2: environment variables
    if let Some(host) = env("TCA_MANAGER_HOST") {
        config.manager_host = host;
    }
    if let Some(port) = env("TCA_MANAGER_PORT") {
        config.manager_port = port
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                var: "TCA_MANAGER_PORT".to_string(),
                value: port,
            })?;
    }
    if let Some(transport) = env("TCA_TRANSPORT") {
        config.transport = transport;
    }

    // Layer 1: explicit overrides
    if let Some(host) = &overrides.manager_host {
        config.manager_host = host.clone();
    }
    if let Some(port) = overrides.manager_port {
        config.manager_port = port;
    }
    if let Some(transport) = &overrides.transport {
        config.transport = transport.clone();
    }

    Ok(config)
}

/// Load the config file. An explicit path must exist; the default path is
/// optional and silently skipped when absent.
fn load_file(explicit: Option<&Path>) -> Result<Option<FileConfig>, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !required && !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let parsed = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
    Ok(Some(parsed))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_var: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = resolve_with_env(&ConfigOverrides::default(), no_env).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.manager_host, DEFAULT_MANAGER_HOST);
        assert_eq!(config.manager_port, DEFAULT_MANAGER_PORT);
        assert_eq!(config.transport, DEFAULT_TRANSPORT);
    }

    #[test]
    fn test_file_layer_applies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manager_host = \"10.0.0.9\"\nmanager_port = 4000").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = resolve_with_env(&overrides, no_env).unwrap();
        assert_eq!(config.manager_host, "10.0.0.9");
        assert_eq!(config.manager_port, 4000);
        // untouched field keeps its default
        assert_eq!(config.transport, DEFAULT_TRANSPORT);
    }

    #[test]
    fn test_env_beats_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manager_host = \"10.0.0.9\"").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = resolve_with_env(&overrides, |var| {
            (var == "TCA_MANAGER_HOST").then(|| "192.168.1.1".to_string())
        })
        .unwrap();
        assert_eq!(config.manager_host, "192.168.1.1");
    }

    #[test]
    fn test_overrides_beat_env() {
        let overrides = ConfigOverrides {
            manager_host: Some("flag-host".to_string()),
            manager_port: Some(9),
            transport: Some("loopback".to_string()),
            ..Default::default()
        };
        let config = resolve_with_env(&overrides, |var| {
            (var == "TCA_MANAGER_HOST").then(|| "env-host".to_string())
        })
        .unwrap();
        assert_eq!(config.manager_host, "flag-host");
        assert_eq!(config.manager_port, 9);
    }

    #[test]
    fn test_invalid_env_port_is_an_error() {
        let result = resolve_with_env(&ConfigOverrides::default(), |var| {
            (var == "TCA_MANAGER_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/tca.toml")),
            ..Default::default()
        };
        let result = resolve_with_env(&overrides, no_env);
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manager_port = \"not a number").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let result = resolve_with_env(&overrides, no_env);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
