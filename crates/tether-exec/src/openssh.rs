//! One-off `ssh`/`scp` invocations through the system OpenSSH client
//!
//! These bypass the persistent session: each call spawns a fresh
//! transport process. Password secrets are handed to `sshpass -e`
//! through the `SSHPASS` environment variable, never through argv.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::auth::Credential;
use crate::error::ExecError;
use crate::result::{CommandResult, ConnectionInfo, HostVerification};

/// Environment variable read by `sshpass -e`
pub const SSHPASS_ENV: &str = "SSHPASS";

/// `-o` options for a host key policy
#[must_use]
pub fn host_verification_options(policy: HostVerification) -> &'static [&'static str] {
    match policy {
        HostVerification::Strict => &["-o", "StrictHostKeyChecking=yes"],
        HostVerification::AcceptNew => &["-o", "StrictHostKeyChecking=accept-new"],
        HostVerification::Disabled => &[
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
        ],
    }
}

/// Builder and runner for external client invocations against one device
#[derive(Debug, Clone)]
pub struct OpenSshClient {
    conn_info: ConnectionInfo,
}

impl OpenSshClient {
    /// Create a client for a device
    #[must_use]
    pub fn new(conn_info: ConnectionInfo) -> Self {
        Self { conn_info }
    }

    /// Get connection info
    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    /// Secret to export for `sshpass -e`, when password auth is in use
    #[must_use]
    pub fn secret_env(&self) -> Option<(&'static str, &str)> {
        match Credential::from_connection(&self.conn_info) {
            Credential::Password(_) => self
                .conn_info
                .password
                .as_deref()
                .map(|p| (SSHPASS_ENV, p)),
            _ => None,
        }
    }

    /// Program words and shared options; `port_flag` is `-p` for ssh, `-P` for scp
    fn invocation(&self, program: &str, port_flag: &str) -> Vec<String> {
        let mut args = Vec::new();
        if self.secret_env().is_some() {
            args.push("sshpass".to_string());
            args.push("-e".to_string());
        }
        args.push(program.to_string());
        args.extend(
            host_verification_options(self.conn_info.host_verification)
                .iter()
                .map(ToString::to_string),
        );
        if let Credential::KeyFile(key) = Credential::from_connection(&self.conn_info) {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(port_flag.to_string());
        args.push(self.conn_info.port.to_string());
        args
    }

    /// Full argv of an interactive `ssh -t` invocation
    #[must_use]
    pub fn ssh_args(&self, cmd: &str) -> Vec<String> {
        let mut args = self.invocation("ssh", "-p");
        args.push("-t".to_string());
        args.push(self.conn_info.destination());
        args.push(cmd.to_string());
        args
    }

    /// Leading argv of an `scp` invocation, up to (not including) the paths
    #[must_use]
    pub fn scp_args(&self, recursive: bool) -> Vec<String> {
        let mut args = self.invocation("scp", "-P");
        if recursive {
            args.push("-r".to_string());
        }
        args
    }

    /// Process for an interactive command, stdio left at defaults
    #[must_use]
    pub fn ssh_command(&self, cmd: &str) -> Command {
        let args = self.ssh_args(cmd);
        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);
        if let Some((key, value)) = self.secret_env() {
            command.env(key, value);
        }
        command
    }

    /// Run over a fresh `ssh -t`, capturing stdout and stderr after exit
    ///
    /// # Errors
    /// Returns `ExecError::SpawnError` if the client cannot be started
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    pub async fn run_captured(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        let output = self
            .ssh_command(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let status = output.status.code().unwrap_or(-1);
        let duration = start.elapsed();

        debug!(command = %cmd, status, duration = ?duration, "interactive command completed");

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        })
    }

    /// Run over a fresh `ssh -t` attached to this process's terminal
    ///
    /// # Errors
    /// Returns `ExecError::SpawnError` if the client cannot be started
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    pub async fn run_attached(&self, cmd: &str) -> Result<i32, ExecError> {
        let status = self
            .ssh_command(cmd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let code = status.code().unwrap_or(-1);
        debug!(command = %cmd, status = code, "tty command completed");
        Ok(code)
    }
}
