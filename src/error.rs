//! Error types for Africon gateway

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias for Africon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Africon gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generative language provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// HTTP server error
    #[error("server error: {0}")]
    Server(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
