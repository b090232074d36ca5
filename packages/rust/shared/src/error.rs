//! Error types for keywatch.
//!
//! Library crates use [`KeywatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for keywatch operations.
#[derive(Debug, thiserror::Error)]
pub enum KeywatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the per-URL fetch path.
    #[error("network error: {0}")]
    Network(String),

    /// Parsing error (keyword patterns, payloads).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The subscriber directory does not know this id.
    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// The subscriber directory could not be read.
    #[error("subscriber directory error: {0}")]
    Directory(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KeywatchError>;

impl KeywatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KeywatchError::config("scan interval must be positive");
        assert_eq!(
            err.to_string(),
            "config error: scan interval must be positive"
        );

        let err = KeywatchError::SubscriberNotFound("alice".into());
        assert_eq!(err.to_string(), "subscriber not found: alice");
    }
}
