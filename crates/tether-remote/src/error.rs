//! Error types for tether-remote

use tether_exec::ExecError;
use thiserror::Error;

/// Errors from dispatch and file operations
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// Transport failure or non-zero remote exit
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Background launch did not echo a process id
    #[error("could not parse process id from {line:?}")]
    PidParse {
        /// Line the remote shell printed
        line: String,
    },

    /// No process id was captured for a background command
    #[error("no process id recorded for `{command}`")]
    PidUnavailable {
        /// Command that was backgrounded
        command: String,
    },

    /// Precondition failed: path does not exist on the device
    #[error("remote path not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Exec(e) => e.is_retryable(),
            _ => false,
        }
    }
}
