//! Background process records and kill signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_exec::CommandResult;
use tracing::{debug, info, instrument, warn};

use crate::dispatch::CommandDispatcher;
use crate::error::RemoteError;
use crate::escape::escape_double_quoted;

/// What is known about a background process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Launched with a known pid, not stopped by us
    Running,
    /// A kill was sent
    Stopped,
    /// The pid could not be captured
    Unknown,
}

/// A command detached at the remote shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundProcess {
    /// Remote process id, if the launch echoed one
    pub pid: Option<u32>,
    /// Lifecycle state
    pub state: ProcessState,
    /// Command as given by the caller
    pub command: String,
    /// When the launch returned
    pub started_at: DateTime<Utc>,
}

impl BackgroundProcess {
    /// Record for a launch that echoed `pid`
    pub fn running(command: impl Into<String>, pid: u32) -> Self {
        Self {
            pid: Some(pid),
            state: ProcessState::Running,
            command: command.into(),
            started_at: Utc::now(),
        }
    }

    /// Record for a launch whose pid was not captured
    pub fn unknown(command: impl Into<String>) -> Self {
        Self {
            pid: None,
            state: ProcessState::Unknown,
            command: command.into(),
            started_at: Utc::now(),
        }
    }

    /// Whether we believe the process is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// The pid, or an error naming the command
    ///
    /// # Errors
    /// Returns `RemoteError::PidUnavailable` when no pid was captured
    pub fn require_pid(&self) -> Result<u32, RemoteError> {
        self.pid.ok_or_else(|| RemoteError::PidUnavailable {
            command: self.command.clone(),
        })
    }
}

/// Sends kill signals to device processes
///
/// Kills are fire-and-forget: termination is not verified, and a
/// non-zero exit of `kill`/`killall` is only logged.
#[derive(Debug, Clone)]
pub struct ProcessTracker {
    dispatcher: CommandDispatcher,
}

impl ProcessTracker {
    /// Create a tracker issuing commands through `dispatcher`
    #[must_use]
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Stop a background process and mark it `Stopped`
    ///
    /// Already stopped processes are left alone.
    ///
    /// # Errors
    /// Returns `RemoteError::PidUnavailable` if no pid was captured, or a
    /// transport error
    #[instrument(skip(self, process), fields(command = %process.command))]
    pub async fn stop(&self, process: &mut BackgroundProcess) -> Result<(), RemoteError> {
        if process.state == ProcessState::Stopped {
            debug!(pid = ?process.pid, "process already stopped");
            return Ok(());
        }
        let pid = process.require_pid()?;
        self.stop_pid(pid).await?;
        process.state = ProcessState::Stopped;
        Ok(())
    }

    /// `kill <pid>`
    ///
    /// # Errors
    /// Returns a transport error
    pub async fn stop_pid(&self, pid: u32) -> Result<CommandResult, RemoteError> {
        debug!(pid, "stopping remote background command");
        let result = self.dispatcher.blocking(&format!("kill {pid}"), false).await?;
        if !result.success() {
            warn!(pid, stderr = %result.stderr.trim(), "kill reported failure");
        }
        Ok(result)
    }

    /// `killall -9 "<name>"`, for when no pid is known or all instances must go
    ///
    /// # Errors
    /// Returns a transport error
    pub async fn kill_by_name(&self, name: &str) -> Result<CommandResult, RemoteError> {
        info!(name, "killing process by name");
        let cmd = format!("killall -9 \"{}\"", escape_double_quoted(name));
        let result = self.dispatcher.blocking(&cmd, false).await?;
        if !result.success() {
            warn!(name, stderr = %result.stderr.trim(), "killall reported failure");
        }
        Ok(result)
    }
}
