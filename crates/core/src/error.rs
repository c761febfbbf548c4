//! Error types for mm-core
//!
//! A single error enum shared by the core, the AWS adapter and the CLI.

use thiserror::Error;

/// Result alias used throughout multimanager
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by transfers, item stores and configuration
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The remote rejected a write because provisioned capacity was exceeded.
    #[error("Throughput exceeded: {0}")]
    ThroughputExceeded(String),

    #[error("invalid value for retries: {0}")]
    InvalidRetry(i64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    General(String),
}

impl Error {
    /// True only for the throttling kind; message text is never inspected.
    pub fn is_throughput_exceeded(&self) -> bool {
        matches!(self, Error::ThroughputExceeded(_))
    }

    /// True for the invalid retry configuration kind
    pub fn is_invalid_retry(&self) -> bool {
        matches!(self, Error::InvalidRetry(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
