//! Error types for tether-pkg

use thiserror::Error;

/// Errors that can occur while installing device tools
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// A tool the installer itself relies on is missing
    #[error("prerequisite not found: {0}")]
    PrerequisiteMissing(String),

    /// Tool name not in the configured tool table
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Repository is unavailable
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// Lock file conflict (another process running)
    #[error("lock file conflict: {0}")]
    LockConflict(String),

    /// Insufficient permissions
    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),

    /// Command execution failed
    #[error("command failed: {status} - {message}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// Error message
        message: String,
    },

    /// Execution error from the dispatcher or transfer client
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl PackageError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PackageError::LockConflict(_) | PackageError::RepositoryUnavailable(_)
        )
    }

    /// Check if error indicates need for root
    #[must_use]
    pub fn needs_sudo(&self) -> bool {
        matches!(self, PackageError::PermissionDenied(_))
    }

    /// Classify a failed package command by its stderr
    pub(crate) fn from_failure(status: i32, stderr: &str) -> Self {
        if stderr.contains("Could not get lock") {
            PackageError::LockConflict(stderr.to_string())
        } else if stderr.contains("Permission denied") || stderr.contains("are you root?") {
            PackageError::PermissionDenied(stderr.to_string())
        } else {
            PackageError::CommandFailed {
                status,
                message: stderr.to_string(),
            }
        }
    }
}
