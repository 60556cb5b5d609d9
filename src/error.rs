//! Crate-wide configuration errors.

use thiserror::Error;

/// Errors raised while resolving settings from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A variable holds bytes that are not valid UTF-8.
    #[error("Environment variable {key} is not valid UTF-8")]
    NotUnicode { key: String },
}
