//! Builds the dispatcher and helpers for the configured device

use std::sync::Arc;

use eyre::{Result, WrapErr};
use tether_exec::{LocalExecutor, OpenSshClient, RemoteExecutor, SshExecutor};
use tether_pkg::DependencyInstaller;
use tether_remote::{CommandDispatcher, ProcessTracker, RemoteFs, TransferClient};
use tracing::debug;

use crate::config::Config;

/// Everything the subcommands talk to
pub struct Device {
    pub dispatcher: CommandDispatcher,
    pub fs: RemoteFs,
    pub tracker: ProcessTracker,
    pub transfer: TransferClient,
}

impl Device {
    /// Set up the session for the profile's device
    ///
    /// A `local` profile gets a local shell; anything else a persistent SSH
    /// session plus the external client for interactive modes.
    ///
    /// # Errors
    /// Returns error if the credential cannot be resolved
    pub fn open(config: &Config) -> Result<Self> {
        let device = &config.device;
        let conn_info = device.connection_info();

        let mut dispatcher = if device.is_local() {
            debug!("using local executor");
            let session: Arc<dyn RemoteExecutor> = Arc::new(LocalExecutor::new());
            CommandDispatcher::new(session)
        } else {
            debug!(host = %device.host, "using ssh executor");
            let session = SshExecutor::from_connection(conn_info.clone())
                .wrap_err("failed to create SSH executor")?;
            CommandDispatcher::new(Arc::new(session))
                .with_client(OpenSshClient::new(conn_info.clone()))
        };
        if let Some(timeout) = device.timeout() {
            dispatcher = dispatcher.with_timeout(timeout);
        }

        let fs = RemoteFs::new(dispatcher.clone()).with_temp_folder(&device.temp_folder);
        let tracker = ProcessTracker::new(dispatcher.clone());
        let transfer = TransferClient::new(conn_info);

        Ok(Self {
            dispatcher,
            fs,
            tracker,
            transfer,
        })
    }

    /// Installer for the profile's tool table
    pub fn installer(self, config: &Config) -> DependencyInstaller {
        DependencyInstaller::new(self.fs, self.transfer, config.installer.clone())
    }
}
