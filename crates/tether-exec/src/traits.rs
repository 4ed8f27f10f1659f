//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, CommandStream};

/// A shell that commands can be sent to, on the device or locally
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Like `run`, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Start a command and hand back its stdout line by line, without
    /// waiting for it to close its output.
    ///
    /// The default implementation runs the command to completion first,
    /// which suits executors whose commands always terminate promptly.
    async fn stream(&self, cmd: &str) -> Result<CommandStream, ExecError> {
        let result = self.run(cmd).await?;
        Ok(CommandStream::from_lines(
            result.stdout.lines().map(str::to_string),
        ))
    }

    /// Whether a connection is currently held
    fn is_connected(&self) -> bool {
        true
    }

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}

/// Bound `run` by `limit`, mapping expiry to `ExecError::Timeout`
pub(crate) async fn with_deadline<F>(cmd: &str, limit: Duration, run: F) -> Result<CommandResult, ExecError>
where
    F: Future<Output = Result<CommandResult, ExecError>>,
{
    let started = std::time::Instant::now();
    tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
        tracing::error!(
            command = %cmd,
            timeout = ?limit,
            elapsed = ?started.elapsed(),
            "command timed out"
        );
        Err(ExecError::Timeout { timeout: limit })
    })
}
