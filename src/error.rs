//! Error types for speakdrill

use std::time::Duration;

use thiserror::Error;

/// Result type alias for speakdrill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in speakdrill
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller supplied unusable input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generative service returned a non-success status
    #[error("service error {status}: {message}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body or provider message
        message: String,
        /// Server-requested wait before retrying
        retry_after: Option<Duration>,
    },

    /// Structured output did not match the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Microphone or speaker access was refused
    #[error("permission denied: {0}")]
    Permission(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio decoding error
    #[error("decode error: {0}")]
    Decode(String),

    /// Recording error
    #[error("capture error: {0}")]
    Capture(String),

    /// Playback sequencing error
    #[error("playback error: {0}")]
    Playback(String),

    /// Document import rejected
    #[error("import error at line {line}: {reason}")]
    Import {
        /// 1-based line number where parsing stopped
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Persisted state could not be read or written
    #[error("store error: {0}")]
    Store(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the failure is worth retrying
    ///
    /// Rate limits, overload and internal server errors are transient, as are
    /// connection-level HTTP failures. Everything else (bad request, schema
    /// mismatch, permission, decode) is permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Service {
                status, message, ..
            } => crate::ai::retry::is_transient_status(*status, message),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Server-requested retry delay, if any
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Service { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Shorthand for an import failure at `line`
    pub(crate) fn import(line: usize, reason: impl Into<String>) -> Self {
        Self::Import {
            line,
            reason: reason.into(),
        }
    }
}
