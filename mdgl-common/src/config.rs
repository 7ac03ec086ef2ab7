//! Bootstrap configuration loading and path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file at the default location is not an error: the
//! defaults are used and the caller is told so through [`ConfigSource`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the clinical database
pub const DATABASE_ENV_VAR: &str = "MDGL_DATABASE";

/// Environment variable naming the bootstrap config file
pub const CONFIG_ENV_VAR: &str = "MDGL_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite file holding the clinical tables
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Specification catalog (TOML)
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Directory under which the timestamped output folder is created
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Worker count override; hardware parallelism when absent
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            catalog_path: None,
            output_root: default_output_root(),
            concurrency: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Cannot serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Where the bootstrap config was taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file
    File(PathBuf),
    /// Built-in defaults; `looked_at` is the default location that had no
    /// file, `None` when no config directory exists on this platform
    Defaults { looked_at: Option<PathBuf> },
}

/// Locate and load the bootstrap config.
///
/// An explicit path (CLI or `MDGL_CONFIG`) must exist. The platform default
/// location is optional; when absent the built-in defaults are returned.
/// The caller reports the [`ConfigSource`] once tracing is running.
pub fn load_config(cli_path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    load_config_from(cli_path, default_config_path())
}

fn load_config_from(
    cli_path: Option<&Path>,
    default_path: Option<PathBuf>,
) -> Result<(TomlConfig, ConfigSource)> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    if let Some(path) = explicit {
        let config = load_toml_config(&path)?;
        return Ok((config, ConfigSource::File(path)));
    }

    match default_path {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            Ok((config, ConfigSource::File(path)))
        }
        looked_at => Ok((TomlConfig::default(), ConfigSource::Defaults { looked_at })),
    }
}

/// Platform config file location (`<config dir>/mdgl/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mdgl").join("config.toml"))
}

/// Resolve the clinical database path following the priority order
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    get_default_database_path()
}

/// Get OS-dependent default database path
fn get_default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mdgl").join("mimic.db"))
        .unwrap_or_else(|| PathBuf::from("./mimic.db"))
}
