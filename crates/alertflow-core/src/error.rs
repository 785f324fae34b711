//! Error types for AlertFlow

use thiserror::Error;

/// Result type alias using AlertFlow's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AlertFlow operations
///
/// Only `Config` is fatal, and only at startup. The batch pipeline recovers
/// from every other variant and reports it as a warning.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Alert history could not be read or written
    #[error("History store error: {0}")]
    Store(String),

    /// A notification channel failed to deliver
    #[error("{channel} delivery failed: {message}")]
    Transport {
        /// Channel name, as in `slack`
        channel: String,
        /// Failure detail
        message: String,
    },

    /// A metric value in the snapshot could not be used
    #[error("Invalid metric input: {0}")]
    Input(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a history store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a transport error
    pub fn transport(channel: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            channel: channel.into(),
            message: msg.into(),
        }
    }

    /// Create an input error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
