//! Custom error types for seekloop.
//!
//! Only conditions that stop the seek loop are errors. A validation run that
//! completes but is classified as failing is recorded as data on the
//! [`Attempt`](crate::attempt::Attempt), and running out of iterations is the
//! [`TerminalOutcome::Exhausted`](crate::engine::TerminalOutcome) outcome.

use std::path::PathBuf;
use thiserror::Error;

use crate::oracle::OracleError;

/// Main error type for seekloop operations
#[derive(Error, Debug)]
pub enum SeekError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration or a required value is missing
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Loop Errors
    // =========================================================================
    /// The validation command could not be started
    #[error("Failed to spawn validation command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The generative service failed or returned nothing usable
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// The editing surface could not be read or written
    #[error("Editing surface error: {message}")]
    Surface { message: String },

    /// An operation was requested in a state that does not allow it
    #[error("Invalid engine state: {message}")]
    InvalidState { message: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Snapshot save or load failed
    #[error("Persistence error at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// No snapshot exists to resume from
    #[error("No saved session found in {dir}")]
    NoSnapshot { dir: PathBuf },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SeekError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an editing surface error
    pub fn surface(message: impl Into<String>) -> Self {
        Self::Surface {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if this error aborts a running seek loop.
    ///
    /// Persistence failures are reported but the loop keeps going without
    /// history.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Persistence { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            Self::Spawn { .. } => 4,
            Self::Oracle(_) => 5,
            Self::NoSnapshot { .. } => 6,
            _ => 1,
        }
    }
}

/// Type alias for seekloop results
pub type Result<T> = std::result::Result<T, SeekError>;
