//! Checks the device for the tools it needs and installs what is missing

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tether_remote::{RemoteError, RemoteFs, TransferClient, escape};
use tracing::{debug, error, info, instrument, warn};

use crate::apt::AptManager;
use crate::error::PackageError;
use crate::traits::PackageManager;
use crate::types::{
    InstallMethod, InstallOutcome, InstallReport, InstallerConfig, ToolReport, ToolSpec,
};

fn exec_err(e: RemoteError) -> PackageError {
    PackageError::ExecutionError(e.to_string())
}

/// Configures the tools listed in an [`InstallerConfig`]
pub struct DependencyInstaller {
    fs: RemoteFs,
    transfer: TransferClient,
    manager: Arc<dyn PackageManager>,
    config: InstallerConfig,
    /// Packages on the device as of the last refresh, plus any installed since
    installed: HashSet<String>,
    /// Repositories in the sources list as of the last refresh
    repos: Vec<String>,
}

impl std::fmt::Debug for DependencyInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyInstaller")
            .field("manager", &self.manager.manager_name())
            .field("tools", &self.config.tools.len())
            .field("installed", &self.installed.len())
            .finish_non_exhaustive()
    }
}

impl DependencyInstaller {
    /// Installer using apt over the dispatcher behind `fs`
    #[must_use]
    pub fn new(fs: RemoteFs, transfer: TransferClient, config: InstallerConfig) -> Self {
        let manager = Arc::new(AptManager::new(fs.dispatcher().clone(), &config));
        Self::with_manager(fs, transfer, manager, config)
    }

    /// Installer with a given package manager
    #[must_use]
    pub fn with_manager(
        fs: RemoteFs,
        transfer: TransferClient,
        manager: Arc<dyn PackageManager>,
        config: InstallerConfig,
    ) -> Self {
        Self {
            fs,
            transfer,
            manager,
            config,
            installed: HashSet::new(),
            repos: Vec::new(),
        }
    }

    /// Installer settings
    #[must_use]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Whether `tool` resolves on the device `PATH`
    ///
    /// # Errors
    /// Returns `PackageError::ExecutionError` on transport failure
    pub async fn is_tool_available(&self, tool: &str) -> Result<bool, PackageError> {
        let cmd = format!("{} {}", self.config.which, escape(tool));
        let result = self
            .fs
            .dispatcher()
            .blocking(&cmd, true)
            .await
            .map_err(exec_err)?;
        Ok(!result.stdout.is_empty())
    }

    /// Fail unless every prerequisite is on the device
    ///
    /// # Errors
    /// Returns `PackageError::PrerequisiteMissing` naming the first missing tool
    #[instrument(skip(self))]
    pub async fn check_prerequisites(&self) -> Result<(), PackageError> {
        info!("checking prerequisites");
        for tool in &self.config.prerequisites {
            if !self.is_tool_available(tool).await? {
                error!(tool = %tool, "prerequisite not found");
                return Err(PackageError::PrerequisiteMissing(tool.clone()));
            }
        }
        Ok(())
    }

    /// Update indexes and reload the installed package and repository lists
    ///
    /// # Errors
    /// Returns the package manager's error
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<(), PackageError> {
        info!("refreshing package list");
        self.manager.update().await?;
        self.installed = self.manager.installed_packages().await?.into_iter().collect();
        self.repos = self.manager.repositories().await?;
        debug!(
            packages = self.installed.len(),
            repos = self.repos.len(),
            "package list refreshed"
        );
        Ok(())
    }

    /// Install one tool if it is missing
    ///
    /// Uses the first configured method: packages, then a pushed local
    /// binary, then setup commands.
    ///
    /// # Errors
    /// Returns `PackageError::UnknownTool` if `name` is not in the tool table,
    /// or the error of the install method
    #[instrument(skip(self))]
    pub async fn configure_tool(&mut self, name: &str) -> Result<InstallOutcome, PackageError> {
        let spec = self
            .config
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| PackageError::UnknownTool(name.to_string()))?;

        if !spec.packages.is_empty() {
            self.install_packages(name, &spec).await
        } else if let Some(local) = &spec.local {
            self.install_local(name, local, spec.command.as_deref()).await
        } else if !spec.setup.is_empty() {
            self.install_commands(name, &spec.setup).await
        } else {
            debug!(tool = name, "installation method not provided, skipping");
            Ok(InstallOutcome::Skipped)
        }
    }

    async fn install_packages(
        &mut self,
        name: &str,
        spec: &ToolSpec,
    ) -> Result<InstallOutcome, PackageError> {
        let mut outcome = InstallOutcome::AlreadyPresent;

        for package in &spec.packages {
            if self.installed.contains(package) {
                debug!(package = %package, "already installed");
                continue;
            }

            info!(tool = name, package = %package, "installing via {}", self.manager.manager_name());
            if let Some(repo) = &spec.repo
                && !self.repos.contains(repo)
            {
                // a broken repository entry should not stop the install attempt
                match self.manager.add_repository(repo).await {
                    Ok(_) => self.repos.push(repo.clone()),
                    Err(e) => warn!(repo = %repo, error = %e, "could not add repository, trying to continue anyway"),
                }
            }
            self.manager.install(package).await?;
            self.installed.insert(package.clone());
            outcome = InstallOutcome::Installed(InstallMethod::Packages);
        }

        Ok(outcome)
    }

    async fn install_local(
        &self,
        name: &str,
        local: &Path,
        command: Option<&str>,
    ) -> Result<InstallOutcome, PackageError> {
        let binary = command
            .and_then(|c| Path::new(c).file_name())
            .map_or_else(|| name.to_string(), |n| n.to_string_lossy().to_string());

        if self.is_tool_available(&binary).await? {
            debug!(tool = name, "tool already available");
            return Ok(InstallOutcome::AlreadyPresent);
        }

        if !local.exists() {
            return Err(PackageError::ConfigError(format!(
                "local binary for {name} not found: {}",
                local.display()
            )));
        }

        let dst = format!("{}/{binary}", self.config.install_dir.trim_end_matches('/'));
        info!(tool = name, destination = %dst, "manually installing");

        self.transfer
            .upload(&local.display().to_string(), &dst, false)
            .await
            .map_err(exec_err)?;
        self.fs.chmod_x(&dst).await.map_err(exec_err)?;

        Ok(InstallOutcome::Installed(InstallMethod::LocalBinary))
    }

    async fn install_commands(
        &self,
        name: &str,
        setup: &[String],
    ) -> Result<InstallOutcome, PackageError> {
        info!(tool = name, steps = setup.len(), "manually installing");
        for cmd in setup {
            self.fs
                .dispatcher()
                .blocking_checked(cmd, false)
                .await
                .map_err(exec_err)?;
        }
        Ok(InstallOutcome::Installed(InstallMethod::SetupCommands))
    }

    /// Configure each tool in `selection`, continuing past failures
    pub async fn install(&mut self, selection: &[String]) -> InstallReport {
        info!(tools = ?selection, "installing tools");

        let mut report = InstallReport::default();
        for tool in selection {
            let entry = match self.configure_tool(tool).await {
                Ok(outcome) => ToolReport {
                    tool: tool.clone(),
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => {
                    warn!(tool = %tool, error = %e, "error occurred during installation, trying to continue anyway");
                    ToolReport {
                        tool: tool.clone(),
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.tools.push(entry);
        }
        report
    }

    /// Full run: prerequisites, bootstrap tools, refresh, then `selection`
    ///
    /// # Errors
    /// Returns an error if prerequisites are missing or the refresh fails.
    /// Per-tool failures are reported, not returned.
    #[instrument(skip(self))]
    pub async fn run(&mut self, selection: &[String]) -> Result<InstallReport, PackageError> {
        self.check_prerequisites().await?;

        let bootstrap = self.config.bootstrap.clone();
        let mut report = self.install(&bootstrap).await;

        self.refresh().await?;

        let rest: Vec<String> = selection
            .iter()
            .filter(|t| !bootstrap.contains(t))
            .cloned()
            .collect();
        report.tools.extend(self.install(&rest).await.tools);

        Ok(report)
    }
}
