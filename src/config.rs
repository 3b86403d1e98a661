//! Configuration file handling for photobooth.
//!
//! Loads configuration from `~/.config/photobooth/config.toml` or a custom
//! path, with upload settings optionally supplied through the environment
//! (`.env` is loaded by `main` before anything reads these).

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_UPLOAD_ENDPOINT: &str = "API_UPLOAD_ENDPOINT";
pub const ENV_AUTH_TOKEN: &str = "API_AUTH_TOKEN";
pub const ENV_UPLOAD_TIMEOUT: &str = "API_TIMEOUT";

/// Configuration file structure for photobooth.
/// Loaded from ~/.config/photobooth/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub countdown_delay_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CaptureConfig {
    pub cameras: Option<usize>,
    pub probe_ceiling: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UploadConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit path the file must exist and parse. With no path,
    /// the default location is tried and a missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read_file(path),
            None => {
                let path = default_path();
                if path.exists() {
                    Self::read_file(&path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Fill upload settings from the environment where the file left them
    /// unset. CLI and config file take precedence over the environment.
    pub fn apply_env(&mut self) {
        if self.upload.endpoint.is_none() {
            self.upload.endpoint = std::env::var(ENV_UPLOAD_ENDPOINT).ok();
        }
        if self.upload.token.is_none() {
            self.upload.token = std::env::var(ENV_AUTH_TOKEN).ok();
        }
        if self.upload.timeout_secs.is_none() {
            self.upload.timeout_secs = std::env::var(ENV_UPLOAD_TIMEOUT)
                .ok()
                .and_then(|v| v.parse().ok());
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("photobooth").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/photobooth/config.toml")
        })
}
