//! Configuration loading for witr.
//!
//! A single optional `config.json` is looked up in the first directory of:
//! 1. `--config <DIR>`
//! 2. `WITR_CONFIG_DIR`
//! 3. `$XDG_CONFIG_HOME/witr`
//! 4. `~/.config/witr`
//!
//! A missing file means defaults. A broken file in a directory the user
//! named (flag or env) is an error; elsewhere it is logged and ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::collect::tool_runner::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS};
use crate::collect::ToolConfig;

const CONFIG_DIR_NAME: &str = "witr";
const CONFIG_FILE_NAME: &str = "config.json";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

impl From<ConfigError> for witr_common::Error {
    fn from(err: ConfigError) -> Self {
        witr_common::Error::Config(err.to_string())
    }
}

/// User settings from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Timeout for each external tool call, in milliseconds.
    pub tool_timeout_ms: u64,
    /// Output cap per tool stream, in bytes.
    pub max_output_bytes: usize,
    /// Ask docker about ports nobody on the host owns.
    pub docker_fallback: bool,
    pub color: bool,
    /// Name queries compare the command name exactly.
    pub exact: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tool_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            docker_fallback: true,
            color: true,
            exact: false,
        }
    }
}

impl Config {
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            default_timeout: Duration::from_millis(self.tool_timeout_ms),
            max_output_bytes: self.max_output_bytes,
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if self.tool_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "tool_timeout_ms must be positive".to_string(),
            });
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "max_output_bytes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config directory (highest priority).
    pub config_dir: Option<PathBuf>,
}

/// Loaded configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// File the settings came from; `None` when defaults are used.
    pub path: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

/// Where a config directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirOrigin {
    Explicit,
    Implicit,
}

/// Load configuration with the standard resolution order.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with(options, |key| std::env::var(key).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with(
    options: &ConfigOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let Some((dir, origin)) = resolve_config_dir(options, &lookup) else {
        debug!("no config directory; using defaults");
        return Ok(ResolvedConfig {
            config: Config::default(),
            path: None,
            config_dir: None,
        });
    };

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        debug!(path = %path.display(), "config file absent; using defaults");
        return Ok(ResolvedConfig {
            config: Config::default(),
            path: None,
            config_dir: Some(dir),
        });
    }

    match load_config_file(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "loaded config");
            Ok(ResolvedConfig {
                config,
                path: Some(path),
                config_dir: Some(dir),
            })
        }
        Err(e) if origin == DirOrigin::Implicit => {
            warn!(error = %e, "ignoring unreadable config file");
            Ok(ResolvedConfig {
                config: Config::default(),
                path: None,
                config_dir: Some(dir),
            })
        }
        Err(e) => Err(e),
    }
}

/// Parse and validate one config file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate(path)?;
    Ok(config)
}

fn resolve_config_dir(
    options: &ConfigOptions,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Option<(PathBuf, DirOrigin)> {
    if let Some(dir) = &options.config_dir {
        return Some((dir.clone(), DirOrigin::Explicit));
    }

    if let Some(dir) = lookup("WITR_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return Some((PathBuf::from(dir), DirOrigin::Explicit));
    }

    let base = lookup("XDG_CONFIG_HOME")
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))?;
    Some((base.join(CONFIG_DIR_NAME), DirOrigin::Implicit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn explicit(dir: &Path) -> ConfigOptions {
        ConfigOptions {
            config_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let resolved = load_config_with(&explicit(dir.path()), no_env).unwrap();
        assert_eq!(resolved.config, Config::default());
        assert!(resolved.path.is_none());
        assert_eq!(resolved.config.tool_timeout_ms, 3000);
        assert_eq!(resolved.config.max_output_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"tool_timeout_ms": 500, "color": false}"#,
        )
        .unwrap();
        let resolved = load_config_with(&explicit(dir.path()), no_env).unwrap();
        assert_eq!(resolved.config.tool_timeout_ms, 500);
        assert!(!resolved.config.color);
        assert!(resolved.config.docker_fallback);
        assert_eq!(
            resolved.config.tool_config().default_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_broken_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let err = load_config_with(&explicit(dir.path()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let shared: witr_common::Error = err.into();
        assert!(matches!(shared, witr_common::Error::Config(_)));
    }

    #[test]
    fn test_broken_xdg_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let witr_dir = dir.path().join("witr");
        std::fs::create_dir_all(&witr_dir).unwrap();
        std::fs::write(witr_dir.join("config.json"), "[]").unwrap();

        let xdg = dir.path().to_string_lossy().to_string();
        let resolved = load_config_with(&ConfigOptions::default(), move |key| {
            (key == "XDG_CONFIG_HOME").then(|| xdg.clone())
        })
        .unwrap();
        assert_eq!(resolved.config, Config::default());
        assert_eq!(resolved.config_dir, Some(witr_dir));
    }

    #[test]
    fn test_env_dir_beats_xdg() {
        let env_dir = TempDir::new().unwrap();
        std::fs::write(env_dir.path().join("config.json"), r#"{"exact": true}"#).unwrap();
        let env_path = env_dir.path().to_string_lossy().to_string();

        let resolved = load_config_with(&ConfigOptions::default(), move |key| match key {
            "WITR_CONFIG_DIR" => Some(env_path.clone()),
            "XDG_CONFIG_HOME" => Some("/nonexistent".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(resolved.config.exact);
    }

    #[test]
    fn test_unknown_field_and_zero_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"colour": true}"#).unwrap();
        assert!(load_config_with(&explicit(dir.path()), no_env).is_err());

        std::fs::write(dir.path().join("config.json"), r#"{"tool_timeout_ms": 0}"#).unwrap();
        assert!(matches!(
            load_config_with(&explicit(dir.path()), no_env),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
