//! Error types for Rewritex.
//!
//! Library crates use [`RewritexError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Rewritex operations.
#[derive(Debug, thiserror::Error)]
pub enum RewritexError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search, page fetch, or scraping.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Completion API error (transport, status, or empty response).
    #[error("llm error: {0}")]
    Llm(String),

    /// The rewriter was called with unusable input; no model call was made.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Model output could not be recovered into a JSON object.
    #[error("malformed model output ({} bytes)", raw.len())]
    MalformedOutput { raw: String },

    /// Data validation error (missing fields, bad identifiers, bad enum values).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A record addressed by id does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Another article already uses this source URL.
    #[error("duplicate source url: {source_url}")]
    Duplicate { source_url: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RewritexError>;

impl RewritexError {
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

    /// Create an invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
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

    /// Whether this error belongs to the client-error class at the CRUD boundary.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::InvalidInput { .. } | Self::Duplicate { .. }
        )
    }
}
