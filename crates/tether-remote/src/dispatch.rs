//! Command dispatch in four execution modes
//!
//! Blocking and background commands go through the shared session.
//! Interactive commands spawn their own `ssh -t` process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_exec::{
    CommandResult, ConnectionInfo, ExecError, OpenSshClient, RemoteExecutor, SshExecutor,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::error::RemoteError;
use crate::process::BackgroundProcess;

/// How a command is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Wait for completion on the shared session
    #[default]
    Blocking,
    /// Fresh `ssh -t`, output captured
    Interactive,
    /// Fresh `ssh -t` attached to the caller's terminal
    InteractiveTty,
    /// Detached at the remote shell, pid captured
    Background,
}

/// A command string tagged with how to run it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell text sent to the device
    pub text: String,
    /// Execution mode
    pub mode: ExecMode,
    /// Bookkeeping command; logged at debug instead of info
    pub internal: bool,
}

impl RemoteCommand {
    /// Blocking, user-visible command
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ExecMode::Blocking,
            internal: false,
        }
    }

    /// Set the execution mode
    #[must_use]
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark as internal bookkeeping
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// Outcome of `CommandDispatcher::send`, one variant per mode
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Blocking result, stdout trimmed
    Output(CommandResult),
    /// Interactive result with both buffers
    Captured(CommandResult),
    /// Exit code of a tty command
    Status(i32),
    /// Launched background process
    Background(BackgroundProcess),
}

/// Parse the line a background launch echoes
///
/// # Errors
/// Returns `RemoteError::PidParse` if the line is not a process id
pub fn parse_pid(line: &str) -> Result<u32, RemoteError> {
    line.trim()
        .parse::<u32>()
        .map_err(|_| RemoteError::PidParse {
            line: line.to_string(),
        })
}

/// Sends commands to one device
#[derive(Clone)]
pub struct CommandDispatcher {
    /// Shared session for blocking and background commands
    session: Arc<dyn RemoteExecutor>,
    /// External client for interactive modes
    client: Option<OpenSshClient>,
    /// Limit for blocking commands
    timeout: Option<Duration>,
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("session", &self.session.executor_type())
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CommandDispatcher {
    /// Dispatcher over an existing session, without interactive modes
    pub fn new(session: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            session,
            client: None,
            timeout: None,
        }
    }

    /// Dispatcher with a persistent SSH session and interactive modes
    ///
    /// # Errors
    /// Returns `ExecError::CredentialError` if the credential cannot be resolved
    pub fn connect(conn_info: ConnectionInfo) -> Result<Self, RemoteError> {
        let session = SshExecutor::from_connection(conn_info.clone())?;
        Ok(Self::new(Arc::new(session)).with_client(OpenSshClient::new(conn_info)))
    }

    /// Enable interactive modes through this client
    #[must_use]
    pub fn with_client(mut self, client: OpenSshClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Give up on blocking commands after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The shared session
    #[must_use]
    pub fn session(&self) -> &Arc<dyn RemoteExecutor> {
        &self.session
    }

    fn client(&self) -> Result<&OpenSshClient, RemoteError> {
        self.client.as_ref().ok_or_else(|| {
            RemoteError::Exec(ExecError::ConfigError(
                "interactive modes need connection details".to_string(),
            ))
        })
    }

    /// Route a tagged command to its mode
    ///
    /// # Errors
    /// Returns the error of the selected mode
    pub async fn send(&self, command: &RemoteCommand) -> Result<Dispatched, RemoteError> {
        match command.mode {
            ExecMode::Blocking => self
                .blocking(&command.text, command.internal)
                .await
                .map(Dispatched::Output),
            ExecMode::Interactive => self.interactive(&command.text).await.map(Dispatched::Captured),
            ExecMode::InteractiveTty => self
                .interactive_tty(&command.text)
                .await
                .map(Dispatched::Status),
            ExecMode::Background => self
                .background(&command.text)
                .await
                .map(Dispatched::Background),
        }
    }

    /// Run on the shared session and wait for completion
    ///
    /// A non-zero exit is reported in `status`, not as an error.
    ///
    /// # Errors
    /// Returns `RemoteError::Exec` on transport failure or timeout
    #[instrument(skip(self), level = "debug", fields(executor = self.session.executor_type()))]
    pub async fn blocking(&self, cmd: &str, internal: bool) -> Result<CommandResult, RemoteError> {
        if internal {
            debug!(command = %cmd, "remote command");
        } else {
            info!(command = %cmd, "remote command");
        }

        let result = match self.timeout {
            Some(timeout) => self.session.run_with_timeout(cmd, timeout).await?,
            None => self.session.run(cmd).await?,
        };

        if !result.success() {
            debug!(
                command = %cmd,
                status = result.status,
                stderr = %result.stderr.trim(),
                "remote command exited non-zero"
            );
        }

        Ok(result.trimmed())
    }

    /// Like `blocking`, with a non-zero exit as an error
    ///
    /// # Errors
    /// Returns `ExecError::CommandFailed` (wrapped) on non-zero exit
    pub async fn blocking_checked(
        &self,
        cmd: &str,
        internal: bool,
    ) -> Result<CommandResult, RemoteError> {
        Ok(self.blocking(cmd, internal).await?.into_checked()?)
    }

    /// Run over a one-off `ssh -t` and capture both output buffers
    ///
    /// # Errors
    /// Returns `RemoteError::Exec` if the client is not configured or fails to start
    pub async fn interactive(&self, cmd: &str) -> Result<CommandResult, RemoteError> {
        let client = self.client()?;
        debug!(command = %cmd, "remote interactive command");
        Ok(client.run_captured(cmd).await?)
    }

    /// Run over a one-off `ssh -t` attached to this terminal; returns the exit code
    ///
    /// # Errors
    /// Returns `RemoteError::Exec` if the client is not configured or fails to start
    pub async fn interactive_tty(&self, cmd: &str) -> Result<i32, RemoteError> {
        let client = self.client()?;
        debug!(command = %cmd, "remote interactive tty command");
        Ok(client.run_attached(cmd).await?)
    }

    /// Detach `cmd` at the remote shell and capture its pid
    ///
    /// Returns once the pid line arrives. The command's later output is
    /// drained and discarded. A line that is not a pid is logged and gives
    /// a process in the `Unknown` state rather than an error.
    ///
    /// # Errors
    /// Returns `RemoteError::Exec` if the command cannot be started
    #[instrument(skip(self), fields(executor = self.session.executor_type()))]
    pub async fn background(&self, cmd: &str) -> Result<BackgroundProcess, RemoteError> {
        debug!(command = %cmd, "remote background command");

        let launch = format!("{cmd} & echo $!");
        let mut stream = self.session.stream(&launch).await?;
        let line = stream.next_line().await.unwrap_or_default();

        match parse_pid(&line) {
            Ok(pid) => {
                info!(command = %cmd, pid, "monitoring in background");
                Ok(BackgroundProcess::running(cmd, pid))
            }
            Err(e) => {
                error!(command = %cmd, error = %e, "error while parsing process pid, skipping");
                Ok(BackgroundProcess::unknown(cmd))
            }
        }
    }

    /// `background` on its own task, for callers that must not await it
    #[must_use]
    pub fn spawn_background(
        &self,
        cmd: impl Into<String>,
    ) -> JoinHandle<Result<BackgroundProcess, RemoteError>> {
        let dispatcher = self.clone();
        let cmd = cmd.into();
        tokio::spawn(async move { dispatcher.background(&cmd).await })
    }
}

#[cfg(test)]
mod tests {
    use tether_exec::LocalExecutor;

    use super::*;
    use crate::process::ProcessState;

    fn local() -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(LocalExecutor::new()))
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("4821").unwrap(), 4821);
        assert_eq!(parse_pid(" 4821\r").unwrap(), 4821);
        assert!(matches!(
            parse_pid("[1] 4821"),
            Err(RemoteError::PidParse { .. })
        ));
        assert!(parse_pid("").is_err());
    }

    #[tokio::test]
    async fn test_blocking_trims_and_keeps_status() {
        let result = local().blocking("printf 'out  \\n\\n'; exit 3", true).await.unwrap();
        assert_eq!(result.stdout, "out");
        assert_eq!(result.status, 3);
    }

    #[tokio::test]
    async fn test_blocking_checked() {
        let err = local().blocking_checked("false", false).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Exec(ExecError::CommandFailed { status: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_applies() {
        let dispatcher = local().with_timeout(Duration::from_millis(100));
        let err = dispatcher.blocking("sleep 5", true).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_interactive_requires_client() {
        let err = local().interactive("id").await.unwrap_err();
        assert!(matches!(err, RemoteError::Exec(ExecError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_send_routes_mode() {
        let dispatched = local()
            .send(&RemoteCommand::new("echo routed").internal())
            .await
            .unwrap();
        assert!(matches!(dispatched, Dispatched::Output(r) if r.stdout == "routed"));

        let dispatched = local()
            .send(&RemoteCommand::new("sleep 2").with_mode(ExecMode::Background))
            .await
            .unwrap();
        match dispatched {
            Dispatched::Background(process) => assert_eq!(process.state, ProcessState::Running),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_background() {
        let process = local().spawn_background("sleep 2").await.unwrap().unwrap();
        assert!(process.pid.is_some());
    }
}
