//! Local command execution using `tokio::process`

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::{CommandResult, CommandStream};
use crate::traits::{RemoteExecutor, with_deadline};

/// Local command executor
///
/// Executes commands on the controlling machine through `sh -c`. Used to
/// drive `scp`, and as the device shell when the device is this machine.
#[derive(Clone, Default)]
pub struct LocalExecutor {
    /// Extra environment for spawned commands
    env: Vec<(String, String)>,
}

impl fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values may hold secrets
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("LocalExecutor").field("env", &keys).finish()
    }
}

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self { env: Vec::new() }
    }

    /// Set an environment variable for every command
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn shell(&self, cmd: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }

    /// Spawn `cmd` and collect both output buffers once it exits
    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        debug!(command = %cmd, "running local shell");
        let started = Instant::now();

        let output = self
            .shell(cmd)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let result = CommandResult {
            // killed by a signal
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };

        debug!(
            command = %cmd,
            status = result.status,
            duration = ?result.duration,
            "local shell exited"
        );
        Ok(result)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        with_deadline(cmd, timeout, self.execute(cmd)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn stream(&self, cmd: &str) -> Result<CommandStream, ExecError> {
        debug!(command = %cmd, "streaming local command");

        let mut child = self
            .shell(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::IoError("stdout not captured".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let command = cmd.to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        // keep draining once the receiver is gone
                        let _ = tx.send(line).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(command = %command, error = %e, "stream read failed");
                        break;
                    }
                }
            }
            if let Err(e) = child.wait().await {
                warn!(command = %command, error = %e, "failed to reap streamed command");
            }
        });

        Ok(CommandStream::new(rx))
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
