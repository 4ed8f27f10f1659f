//! Persistent SSH session using the russh crate
//!
//! One `SshExecutor` owns one connection per device. Commands issued
//! through `run` hold the session lock from channel open until exit, so
//! concurrent callers are serialized rather than interleaved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::auth::{Credential, ResolvedCredential};
use crate::error::ExecError;
use crate::result::{CommandResult, CommandStream, ConnectionInfo, HostVerification, drain_lines};
use crate::traits::{RemoteExecutor, with_deadline};

/// SSH client handler applying the host key policy
#[derive(Debug)]
struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostVerification,
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.policy == HostVerification::Disabled {
            return Ok(true);
        }

        match check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if self.policy == HostVerification::AcceptNew => {
                if let Err(e) = learn_known_hosts(&self.host, self.port, server_public_key) {
                    warn!(host = %self.host, error = %e, "could not record host key");
                }
                info!(host = %self.host, "accepted new host key");
                Ok(true)
            }
            Ok(false) => {
                warn!(host = %self.host, "host key not in known_hosts");
                Ok(false)
            }
            Err(e) => {
                error!(host = %self.host, error = %e, "host key verification failed");
                Ok(false)
            }
        }
    }
}

/// SSH command executor
///
/// Manages the persistent session used for blocking commands.
/// The connection is established on first use.
pub struct SshExecutor {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// Resolved login credential
    credential: ResolvedCredential,
    /// SSH session (initialized on first use)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("credential", &self.credential)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    ///
    /// # Arguments
    /// * `conn_info` - Connection details (host, user, port, secret, policy)
    /// * `credential` - How to authenticate
    ///
    /// # Errors
    /// Returns `ExecError::CredentialError` if credential resolution fails
    pub fn new(conn_info: ConnectionInfo, credential: &Credential) -> Result<Self, ExecError> {
        let credential = credential
            .resolve()
            .map_err(|e| ExecError::CredentialError(e.to_string()))?;

        Ok(Self {
            conn_info,
            credential,
            session: Mutex::new(None),
        })
    }

    /// Create an executor using the credential the profile describes
    ///
    /// # Errors
    /// Returns `ExecError::CredentialError` if credential resolution fails
    pub fn from_connection(conn_info: ConnectionInfo) -> Result<Self, ExecError> {
        let credential = Credential::from_connection(&conn_info);
        Self::new(conn_info, &credential)
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    /// Connect to the remote host
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let handler = SshClientHandler {
            host: self.conn_info.host.clone(),
            port: self.conn_info.port,
            policy: self.conn_info.host_verification,
        };

        let mut session = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => ExecError::HostKeyRejected(self.conn_info.host.clone()),
            other => ExecError::ConnectionFailed(other.to_string()),
        })?;

        let authenticated = match &self.credential {
            ResolvedCredential::Password(password) => session
                .authenticate_password(&self.conn_info.user, password)
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
                .success(),
            ResolvedCredential::Key(key_path) => {
                let key_pair = load_secret_key(key_path, None)
                    .map_err(|e| ExecError::CredentialError(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                session
                    .authenticate_publickey(
                        &self.conn_info.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
                    .success()
            }
            ResolvedCredential::Agent => {
                return Err(ExecError::AuthenticationFailed(
                    "agent authentication is only available to the ssh/scp client paths"
                        .to_string(),
                ));
            }
        };

        if !authenticated {
            return Err(ExecError::AuthenticationFailed(format!(
                "{} rejected credentials for {}",
                self.conn_info.host, self.conn_info.user
            )));
        }

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    /// Execute command on remote host
    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        // held until the exit status arrives
        let mut session_lock = self.session.lock().await;

        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit-status may follow EOF, so read until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status.cast_signed()),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(command = %cmd, signal = ?signal_name, "remote command killed by signal");
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let status = status.unwrap_or(-1);
        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        debug!(
            command = %cmd,
            status,
            duration = ?duration,
            "remote command finished"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Disconnect from remote host
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if disconnection fails
    pub async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.connect().await?;
        self.execute_remote(cmd).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        // connecting does not count against the limit
        self.connect().await?;
        with_deadline(cmd, timeout_duration, self.execute_remote(cmd)).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn stream(&self, cmd: &str) -> Result<CommandStream, ExecError> {
        self.connect().await?;

        // lock only while the channel is opened; the job may run for hours
        let channel = {
            let mut session_lock = self.session.lock().await;
            let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

            debug!(command = %cmd, "streaming remote command");

            let mut channel = session
                .channel_open_session()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            channel
                .exec(true, cmd)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            channel
        };

        let (tx, rx) = mpsc::channel(64);
        let host = self.conn_info.host.clone();

        tokio::spawn(async move {
            let mut channel = channel;
            let mut pending = Vec::new();
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        pending.extend_from_slice(&data);
                        for line in drain_lines(&mut pending) {
                            // keep draining once the receiver is gone
                            let _ = tx.send(line).await;
                        }
                    }
                    Some(ChannelMsg::Eof) | None => break,
                    _ => {}
                }
            }
            if !pending.is_empty() {
                let _ = tx
                    .send(String::from_utf8_lossy(&pending).trim_end().to_string())
                    .await;
            }
            debug!(host = %host, "streamed command closed its output");
        });

        Ok(CommandStream::new(rx))
    }

    fn is_connected(&self) -> bool {
        // A held handle may still be dead; only use proves otherwise
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_profile(host: &str) -> ConnectionInfo {
        ConnectionInfo::new(host, "root").with_password("alpine")
    }

    #[test]
    fn test_executor_keeps_profile() {
        let info = ConnectionInfo::new("10.0.0.7", "mobile")
            .with_password("alpine")
            .with_port(2222)
            .with_host_verification(HostVerification::AcceptNew);
        let executor = SshExecutor::from_connection(info).unwrap();

        let info = executor.connection_info();
        assert_eq!(info.port, 2222);
        assert_eq!(info.user, "mobile");
        assert_eq!(info.host_verification, HostVerification::AcceptNew);
        assert!(!executor.is_connected());
        assert_eq!(executor.executor_type(), "ssh");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let info = ConnectionInfo::new("10.0.0.7", "root").with_ssh_key("/nonexistent/tether/id_ed25519");
        let err = SshExecutor::from_connection(info).unwrap_err();
        assert!(matches!(err, ExecError::CredentialError(_)));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let executor = SshExecutor::from_connection(password_profile("10.0.0.7")).unwrap();
        assert!(executor.disconnect().await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_round_trip() {
        let executor = SshExecutor::from_connection(password_profile("127.0.0.1")).unwrap();
        let result = executor.run("echo hello").await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
    }
}
