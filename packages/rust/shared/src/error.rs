//! Error types for newsdigest.
//!
//! Library crates use [`NewsDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all newsdigest operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsDigestError {
    /// Configuration loading or validation error (missing keys, bad values).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure: connection, timeout, unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// A remote API answered with a non-success status.
    #[error("{service} API error: HTTP {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The remote job reached the `failed` terminal state.
    #[error("job {job_id} failed: {detail}")]
    JobFailed { job_id: String, detail: String },

    /// Response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Audio synthesis or email delivery failure.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty topic, bad recipient, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsDigestError>;

impl NewsDigestError {
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

    /// Whether a retry of the same idempotent request could succeed.
    ///
    /// Network failures, 429 and 5xx responses are transient; everything
    /// else (bad key, bad payload, job failure) will fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NewsDigestError::config("missing EXA_API_KEY");
        assert_eq!(err.to_string(), "config error: missing EXA_API_KEY");

        let err = NewsDigestError::Api {
            service: "exa",
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "exa API error: HTTP 401: unauthorized");
    }

    #[test]
    fn transient_classification() {
        assert!(NewsDigestError::Network("reset".into()).is_transient());
        let throttled = NewsDigestError::Api {
            service: "exa",
            status: 429,
            body: String::new(),
        };
        assert!(throttled.is_transient());
        let bad_key = NewsDigestError::Api {
            service: "exa",
            status: 401,
            body: String::new(),
        };
        assert!(!bad_key.is_transient());
        assert!(!NewsDigestError::config("x").is_transient());
    }
}
