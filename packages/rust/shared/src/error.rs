//! Error types for tabdivider.
//!
//! Library crates use [`DividerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Rejected user input (duplicate names, unknown dividers, out-of-range
//! indices) is *not* an error: divider operations report it as `Ok(false)`.
//! Errors are reserved for failures of the store or the document host.

use std::path::PathBuf;

/// Top-level error type for all tabdivider operations.
#[derive(Debug, thiserror::Error)]
pub enum DividerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Key-value store error (backend failure, serialization on write).
    #[error("storage error: {0}")]
    Storage(String),

    /// Document host rejected a call.
    #[error("document host error: {0}")]
    Host(String),

    /// Malformed JSON supplied by the user (import payloads).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A persisted value does not have the shape its key family requires.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DividerError>;

impl DividerError {
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

    /// Create a document host error.
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
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
        let err = DividerError::config("missing home directory");
        assert_eq!(err.to_string(), "config error: missing home directory");

        let err = DividerError::validation("key `dividers` is not a list of names");
        assert!(err.to_string().contains("`dividers`"));

        let err = DividerError::host("document 7 is gone");
        assert_eq!(err.to_string(), "document host error: document 7 is gone");
    }
}
