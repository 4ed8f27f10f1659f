//! Bulk file transfer with `scp`
//!
//! Transfers run on the controlling machine, not through the device
//! session. The remote path is backslash-escaped for the remote shell
//! that legacy `scp` starts, and the whole `user@host:path` word is then
//! quoted again for the local shell.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_exec::{CommandResult, ConnectionInfo, LocalExecutor, OpenSshClient, RemoteExecutor};
use tracing::{debug, info, instrument};

use crate::error::RemoteError;
use crate::escape::{escape, escape_for_transfer};

/// Which side the source is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local source, device destination
    Upload,
    /// Device source, local destination
    Download,
}

/// One transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Path to copy from
    pub source: String,
    /// Path to copy to
    pub destination: String,
    /// Which side `source` is on
    pub direction: Direction,
    /// Copy directory trees
    pub recursive: bool,
}

impl TransferRequest {
    /// Local `source` to device `destination`
    pub fn upload(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            direction: Direction::Upload,
            recursive: false,
        }
    }

    /// Device `source` to local `destination`
    pub fn download(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            direction: Direction::Download,
            recursive: false,
        }
    }

    /// Copy directory trees
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// A local path as an scp argument
fn local_arg(path: &str) -> String {
    // scp reads `name:rest` as a host unless a slash comes first
    let colon_before_slash = match (path.find(':'), path.find('/')) {
        (Some(colon), Some(slash)) => colon < slash,
        (Some(_), None) => true,
        _ => false,
    };
    if colon_before_slash || path.starts_with('-') {
        escape(&format!("./{path}"))
    } else {
        escape(path)
    }
}

/// Copies files between this machine and a device
pub struct TransferClient {
    client: OpenSshClient,
    /// Runs the scp command line on this machine
    local: Arc<dyn RemoteExecutor>,
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("client", &self.client)
            .field("local", &self.local.executor_type())
            .finish()
    }
}

impl TransferClient {
    /// Client for a device, running scp through a local shell
    #[must_use]
    pub fn new(conn_info: ConnectionInfo) -> Self {
        let client = OpenSshClient::new(conn_info);
        let mut local = LocalExecutor::new();
        if let Some((key, value)) = client.secret_env() {
            local = local.with_env(key, value);
        }
        Self {
            client,
            local: Arc::new(local),
        }
    }

    /// Client running scp through a given executor
    #[must_use]
    pub fn with_executor(conn_info: ConnectionInfo, local: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            client: OpenSshClient::new(conn_info),
            local,
        }
    }

    fn remote_arg(&self, path: &str) -> String {
        let spec = format!(
            "{}:{}",
            self.client.connection_info().destination(),
            escape_for_transfer(path)
        );
        escape(&spec)
    }

    /// The shell command line that performs `request`
    #[must_use]
    pub fn command_line(&self, request: &TransferRequest) -> String {
        let mut words: Vec<String> = self
            .client
            .scp_args(request.recursive)
            .iter()
            .map(|arg| escape(arg))
            .collect();

        match request.direction {
            Direction::Download => {
                words.push(self.remote_arg(&request.source));
                words.push(local_arg(&request.destination));
            }
            Direction::Upload => {
                words.push(local_arg(&request.source));
                words.push(self.remote_arg(&request.destination));
            }
        }

        words.join(" ")
    }

    /// Perform a transfer
    ///
    /// # Errors
    /// Returns `ExecError::CommandFailed` (wrapped) if scp exits non-zero
    #[instrument(skip(self), fields(host = %self.client.connection_info().host))]
    pub async fn transfer(&self, request: &TransferRequest) -> Result<CommandResult, RemoteError> {
        let arrow = match request.direction {
            Direction::Upload => "uploading",
            Direction::Download => "downloading",
        };
        info!(
            source = %request.source,
            destination = %request.destination,
            recursive = request.recursive,
            "{arrow}"
        );

        let line = self.command_line(request);
        debug!(command = %line, "running scp");

        Ok(self.local.run(&line).await?.into_checked()?)
    }

    /// Copy a device path to this machine
    ///
    /// # Errors
    /// See `transfer`
    pub async fn download(
        &self,
        remote_src: &str,
        local_dst: &str,
        recursive: bool,
    ) -> Result<CommandResult, RemoteError> {
        self.transfer(&TransferRequest::download(remote_src, local_dst).recursive(recursive))
            .await
    }

    /// Copy a local path to the device
    ///
    /// # Errors
    /// See `transfer`
    pub async fn upload(
        &self,
        local_src: &str,
        remote_dst: &str,
        recursive: bool,
    ) -> Result<CommandResult, RemoteError> {
        self.transfer(&TransferRequest::upload(local_src, remote_dst).recursive(recursive))
            .await
    }
}
