//! Error types for AdventureMap.
//!
//! Library crates use [`AdventureMapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-POI and per-stage failures are not errors in this sense: they travel
//! as data (`Poi::error`, `StageOutput::Failed`) so a run always completes.

use std::path::PathBuf;

/// Top-level error type for all AdventureMap operations.
#[derive(Debug, thiserror::Error)]
pub enum AdventureMapError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an upstream API.
    #[error("network error: {0}")]
    Network(String),

    /// Response body or payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Object store or artifact store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Credential exchange or URL signing failure.
    #[error("signing error: {0}")]
    Signing(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty description, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AdventureMapError>;

impl AdventureMapError {
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
        let err = AdventureMapError::config("missing bucket");
        assert_eq!(err.to_string(), "config error: missing bucket");

        let err = AdventureMapError::Signing("signBlob returned 403".into());
        assert!(err.to_string().starts_with("signing error:"));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn io_error_carries_path() {
        let err = AdventureMapError::io(
            "/tmp/out.kml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/out.kml"));
        assert!(msg.contains("denied"));
    }
}
