//! Result and connection types for command execution

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ExecError;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Drop trailing whitespace from stdout
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        let len = self.stdout.trim_end().len();
        self.stdout.truncate(len);
        self
    }

    /// Turn a non-zero exit into `ExecError::CommandFailed`
    ///
    /// # Errors
    /// Returns `ExecError::CommandFailed` when the status is not 0
    pub fn into_checked(self) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                status: self.status,
                stderr: self.stderr,
            })
        }
    }
}

/// Line-by-line output of a command that may outlive the caller's interest
///
/// Produced by `RemoteExecutor::stream`. The producing task keeps draining
/// the command's output after this value is dropped.
#[derive(Debug)]
pub struct CommandStream {
    lines: mpsc::Receiver<String>,
}

impl CommandStream {
    /// Wrap a receiver fed by a draining task
    #[must_use]
    pub fn new(lines: mpsc::Receiver<String>) -> Self {
        Self { lines }
    }

    /// Build a stream over output that is already complete
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let lines: Vec<String> = lines.into_iter().collect();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // capacity covers every line
            let _ = tx.try_send(line);
        }
        Self::new(rx)
    }

    /// Next line of output, `None` once the command closed its output
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}

/// Split complete lines off the front of `buf`, leaving any partial line
pub(crate) fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
    }
    lines
}

/// Server host key policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostVerification {
    /// Only accept keys already in `known_hosts`
    Strict,
    /// Record unknown keys, reject changed ones
    AcceptNew,
    /// Accept any key (`StrictHostKeyChecking=no`)
    #[default]
    Disabled,
}

/// Connection information for a device
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Optional password secret
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Optional SSH key path
    #[serde(default)]
    pub ssh_key: Option<String>,
    /// Host key policy
    #[serde(default)]
    pub host_verification: HostVerification,
}

fn default_port() -> u16 {
    22
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key)
            .field("host_verification", &self.host_verification)
            .finish()
    }
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            password: None,
            ssh_key: None,
            host_verification: HostVerification::default(),
        }
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_ssh_key(mut self, path: impl Into<String>) -> Self {
        self.ssh_key = Some(path.into());
        self
    }

    /// Set password secret
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set host key policy
    #[must_use]
    pub fn with_host_verification(mut self, policy: HostVerification) -> Self {
        self.host_verification = policy;
        self
    }

    /// `user@host`, the login half of a transfer specification
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32, stdout: &str) -> CommandResult {
        CommandResult {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_trimmed_keeps_leading_whitespace() {
        let r = result(0, "  indented\n\n \t").trimmed();
        assert_eq!(r.stdout, "  indented");
    }

    #[test]
    fn test_into_checked() {
        assert!(result(0, "ok").into_checked().is_ok());
        let err = result(3, "").into_checked().unwrap_err();
        assert!(matches!(err, ExecError::CommandFailed { status: 3, .. }));
    }

    #[test]
    fn test_drain_lines_keeps_partial() {
        let mut buf = b"4821\r\nsecond\npart".to_vec();
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["4821", "second"]);
        assert_eq!(buf, b"part");
    }

    #[tokio::test]
    async fn test_stream_from_lines() {
        let mut stream = CommandStream::from_lines(vec!["1".to_string(), "2".to_string()]);
        assert_eq!(stream.next_line().await.as_deref(), Some("1"));
        assert_eq!(stream.next_line().await.as_deref(), Some("2"));
        assert_eq!(stream.next_line().await, None);
    }

    #[test]
    fn test_password_not_serialized_or_printed() {
        let info = ConnectionInfo::new("10.0.0.2", "root").with_password("alpine");
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("alpine"));
        assert!(!format!("{info:?}").contains("alpine"));
        assert_eq!(info.destination(), "root@10.0.0.2");
    }
}
