//! Configuration management for Africon gateway
//!
//! Precedence is environment > `config.toml` > built-in defaults.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::provider::RetryPolicy;
use crate::{Error, Result};

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default Gemini REST base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Africon gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Generative language provider
    pub provider: ProviderConfig,

    /// HTTP API server
    pub server: ServerConfig,

    /// Request quotas
    pub rate_limit: RateLimitConfig,

    /// Session lifetimes
    pub sessions: SessionConfig,

    /// Retry policy for provider calls
    pub retry: RetryPolicy,
}

/// Provider connection configuration
#[derive(Debug)]
pub struct ProviderConfig {
    /// Gemini API key (from `GEMINI_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// REST base URL
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

/// Request quota configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub requests_per_minute: u32,

    /// Requests allowed per day
    pub requests_per_day: u32,

    /// Length of the short window
    pub window: Duration,

    /// Length of the daily window
    pub day: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            requests_per_day: 20,
            window: Duration::from_secs(60),
            day: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Session lifetime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted
    pub ttl: Duration,

    /// How often the sweeper runs
    pub sweep_interval: Duration,

    /// Send a reminder turn every N messages (0 disables)
    pub reminder_every: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(15 * 60),
            reminder_every: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is present but invalid
    pub fn load() -> Result<Self> {
        Self::from_file(file::load_config_file())
    }

    /// Build configuration from a parsed file overlay plus environment
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is present but invalid
    pub fn from_file(fc: file::AfriconConfigFile) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .or(fc.provider.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let provider = ProviderConfig {
            api_key,
            model: std::env::var("AFRICON_MODEL")
                .ok()
                .or(fc.provider.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .ok()
                .or(fc.provider.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(
                env_parse("AFRICON_REQUEST_TIMEOUT_SECS")?
                    .or(fc.provider.request_timeout_secs)
                    .unwrap_or(30),
            ),
        };

        let port = match env_parse("AFRICON_PORT")? {
            Some(port) => Some(port),
            None => env_parse("PORT")?,
        };
        let server = ServerConfig {
            port: port.or(fc.server.port).unwrap_or(3000),
            static_dir: std::env::var("AFRICON_STATIC_DIR")
                .ok()
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            requests_per_minute: env_parse("AFRICON_REQUESTS_PER_MINUTE")?
                .or(fc.rate_limit.requests_per_minute)
                .unwrap_or(defaults.requests_per_minute),
            requests_per_day: env_parse("AFRICON_REQUESTS_PER_DAY")?
                .or(fc.rate_limit.requests_per_day)
                .unwrap_or(defaults.requests_per_day),
            ..defaults
        };

        let session_defaults = SessionConfig::default();
        let sessions = SessionConfig {
            ttl: env_parse("AFRICON_SESSION_TTL_SECS")?
                .or(fc.sessions.ttl_secs)
                .map_or(session_defaults.ttl, Duration::from_secs),
            sweep_interval: env_parse("AFRICON_SWEEP_INTERVAL_SECS")?
                .or(fc.sessions.sweep_interval_secs)
                .map_or(session_defaults.sweep_interval, Duration::from_secs),
            reminder_every: fc
                .sessions
                .reminder_every
                .unwrap_or(session_defaults.reminder_every),
        };
        if sessions.sweep_interval.is_zero() {
            return Err(Error::Config(
                "AFRICON_SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: fc.retry.max_retries.unwrap_or(retry_defaults.max_retries),
            base_delay: fc
                .retry
                .base_delay_ms
                .map_or(retry_defaults.base_delay, Duration::from_millis),
        };

        Ok(Self {
            provider,
            server,
            rate_limit,
            sessions,
            retry,
        })
    }

    /// The provider API key, required for anything that talks to Gemini
    ///
    /// # Errors
    ///
    /// Returns error if `GEMINI_API_KEY` is not configured
    pub fn api_key(&self) -> Result<&SecretString> {
        self.provider
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("missing GEMINI_API_KEY environment variable".to_string()))
    }
}

/// Parse an optional environment variable, failing loudly on garbage
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(None),
    }
}
