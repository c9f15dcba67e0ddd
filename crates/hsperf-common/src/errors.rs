//! Error types for the measurement harness.
//!
//! Startup failures (`Config`, `Spawn`, `Channel`, `Bootstrap`, `Endpoint`)
//! stop the whole run. A supervised child exiting during normal operation is
//! not an error at all: the restart loop logs it and respawns. A child that
//! ignores a terminate request is reported as `ShutdownTimeout`, which
//! callers log and move past.

use crate::types::Role;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for hsperf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hsperf operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, detected before anything is spawned.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// A process could not be launched.
    #[error("Spawn failed for {role}: {reason}")]
    Spawn { role: Role, reason: String },

    /// The control channel could not be opened, authenticated or subscribed.
    #[error("Control channel error for {role}: {reason}")]
    Channel { role: Role, reason: String },

    /// A service never finished bootstrapping.
    #[error("Bootstrap failed for {role}: {reason}")]
    Bootstrap { role: Role, reason: String },

    /// The published service endpoint could not be read.
    #[error("Service endpoint unavailable at {}: {reason}", path.display())]
    Endpoint { path: PathBuf, reason: String },

    /// A child did not exit within its grace period after a terminate request.
    #[error("Shutdown timeout for {role}: still running after {grace:?}")]
    ShutdownTimeout { role: Role, grace: Duration },

    /// Post-run cleanup failed.
    #[error("Cleanup of {} failed: {reason}", path.display())]
    Cleanup { path: PathBuf, reason: String },

    /// The operation was abandoned because shutdown was requested.
    #[error("Cancelled: shutdown requested during {operation}")]
    Cancelled { operation: String },

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error with extra context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn spawn(role: Role, reason: impl Into<String>) -> Self {
        Self::Spawn {
            role,
            reason: reason.into(),
        }
    }

    pub fn channel(role: Role, reason: impl Into<String>) -> Self {
        Self::Channel {
            role,
            reason: reason.into(),
        }
    }

    pub fn bootstrap(role: Role, reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            role,
            reason: reason.into(),
        }
    }

    pub fn endpoint(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Endpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn cleanup(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Adds context to an error.
    ///
    /// # Example
    /// ```
    /// use hsperf_common::{Error, Result};
    ///
    /// fn inner() -> Result<()> {
    ///     Err(Error::config("burst count must be at least 1"))
    /// }
    ///
    /// fn outer() -> Result<()> {
    ///     inner().map_err(|e| e.context("Failed to load measurement config"))
    /// }
    ///
    /// assert!(outer().unwrap_err().to_string().contains("burst count"));
    /// ```
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// True when the error only reflects a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
