//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
///
/// Being over quota is not an error; it is reported through
/// [`LimitResult::allowed`](crate::ratelimit::LimitResult).
#[derive(Error, Debug)]
pub enum TollgateError {
    /// A quota, key or limiter setting the caller should never have passed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration file or environment parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
