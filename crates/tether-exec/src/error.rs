//! Error types for tether-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a device
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server host key did not pass the verification policy
    #[error("host key rejected for {0}")]
    HostKeyRejected(String),

    /// Command exited with a non-zero status
    #[error("command execution failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Credential could not be resolved
    #[error("credential error: {0}")]
    CredentialError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl ExecError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_) | ExecError::Timeout { .. } | ExecError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ExecError::ConnectionFailed("refused".into()).is_retryable());
        assert!(
            ExecError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            !ExecError::CommandFailed {
                status: 1,
                stderr: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_command_failed_display() {
        let err = ExecError::CommandFailed {
            status: 2,
            stderr: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "command execution failed: 2 - No such file or directory"
        );
    }
}
