//! Error types for SyncHub
//!
//! This module defines all error types used throughout the control-plane,
//! including the HTTP status each failure maps to at the API boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// Main error type for SyncHub operations
#[derive(Error, Debug)]
pub enum SyncHubError {
    /// I/O error during registry or data-directory operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown job id
    #[error("Cannot find job with id '{0}'")]
    JobNotFound(String),

    /// Malformed job descriptor, rejected before any registry mutation
    #[error("Invalid job descriptor: {0}")]
    Validation(String),

    /// Remote discovery failure, already mapped to the stable taxonomy
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Failure persisting the registry document
    #[error("Persistence error at '{path}': {message}")]
    Persistence { path: PathBuf, message: String },

    /// Command not understood by the scheduler surface
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Scheduler command channel failure
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SyncHubError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a persistence error
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// HTTP status this error maps to at the control-plane boundary
    pub fn http_status(&self) -> u16 {
        match self {
            Self::JobNotFound(_) => 404,
            Self::Validation(_) | Self::UnknownCommand(_) => 400,
            Self::Remote(e) => e.status(),
            Self::Io { .. } | Self::Persistence { .. } => 500,
            Self::Scheduler(_) | Self::ConfigError(_) => 500,
        }
    }
}

/// Result type alias for SyncHub operations
pub type Result<T> = std::result::Result<T, SyncHubError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| SyncHubError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(SyncHubError::JobNotFound("x".into()).http_status(), 404);
        assert_eq!(SyncHubError::validation("bad").http_status(), 400);
        assert_eq!(
            SyncHubError::Remote(RemoteError::Unauthorized).http_status(),
            401
        );
        let io = SyncHubError::io("/tmp/x", std::io::Error::other("disk"));
        assert_eq!(io.http_status(), 500);
    }

    #[test]
    fn test_io_error_with_path() {
        let res: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = res.with_path("/data/configs.json").unwrap_err();
        assert!(err.to_string().contains("/data/configs.json"));
    }
}
