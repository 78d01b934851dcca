//! TOML configuration file loading
//!
//! Supports `~/.config/africon/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AfriconConfigFile {
    /// Provider (Gemini) configuration
    #[serde(default)]
    pub provider: ProviderFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Request quota configuration
    #[serde(default)]
    pub rate_limit: RateLimitFileConfig,

    /// Session lifetime configuration
    #[serde(default)]
    pub sessions: SessionsFileConfig,

    /// Provider retry configuration
    #[serde(default)]
    pub retry: RetryFileConfig,
}

/// Provider-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct ProviderFileConfig {
    /// Gemini API key
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: Option<String>,

    /// API base URL
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Static web UI directory
    pub static_dir: Option<String>,
}

/// Request quota configuration
#[derive(Debug, Default, Deserialize)]
pub struct RateLimitFileConfig {
    pub requests_per_minute: Option<u32>,
    pub requests_per_day: Option<u32>,
}

/// Session lifetime configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionsFileConfig {
    /// Idle lifetime before a session is swept
    pub ttl_secs: Option<u64>,
    /// Interval between sweeps
    pub sweep_interval_secs: Option<u64>,
    /// Send a reminder turn every N messages
    pub reminder_every: Option<u32>,
}

/// Provider retry configuration
#[derive(Debug, Default, Deserialize)]
pub struct RetryFileConfig {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AfriconConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AfriconConfigFile {
    config_file_path().map_or_else(AfriconConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> AfriconConfigFile {
    if !path.exists() {
        return AfriconConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AfriconConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AfriconConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/africon/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("africon").join("config.toml"))
}
