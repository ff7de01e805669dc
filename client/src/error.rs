//! Unified error handling for the sync agent.

use crate::config::ConfigError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] tally_engine::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
