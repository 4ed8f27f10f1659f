//! APT package manager on the device

use async_trait::async_trait;
use tether_exec::CommandResult;
use tether_remote::{CommandDispatcher, escape, escape_double_quoted};
use tracing::{debug, info, instrument, warn};

use crate::error::PackageError;
use crate::traits::PackageManager;
use crate::types::InstallerConfig;

/// APT package manager implementation
#[derive(Debug, Clone)]
pub struct AptManager {
    /// Dispatcher for the device session
    dispatcher: CommandDispatcher,
    /// apt front end binary
    apt: String,
    /// dpkg binary
    dpkg: String,
    /// Sources list repositories are appended to
    sources_list: String,
}

impl AptManager {
    /// Create a new APT manager
    ///
    /// # Arguments
    /// * `dispatcher` - Dispatcher for the device session
    /// * `config` - Installer settings naming the binaries and sources list
    #[must_use]
    pub fn new(dispatcher: CommandDispatcher, config: &InstallerConfig) -> Self {
        Self {
            dispatcher,
            apt: config.apt.clone(),
            dpkg: config.dpkg.clone(),
            sources_list: config.sources_list.clone(),
        }
    }

    /// Build apt command
    fn apt_cmd(&self, args: &str) -> String {
        format!("{} {args}", self.apt)
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, PackageError> {
        self.dispatcher
            .blocking(cmd, true)
            .await
            .map_err(|e| PackageError::ExecutionError(e.to_string()))
    }

    /// Parse a sources list into repository URLs
    ///
    /// Accepts `deb <url> <suite> [components]` lines and skips comments.
    fn parse_sources(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("deb"), Some(url)) => Some(url.to_string()),
                    _ => None,
                }
            })
            .collect()
    }

    /// Parse `dpkg --get-selections` output, already cut to the name column
    fn parse_selections(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl PackageManager for AptManager {
    #[instrument(skip(self))]
    async fn update(&self) -> Result<(), PackageError> {
        debug!("updating package indexes");

        let result = self.run(&self.apt_cmd("update")).await?;
        if !result.success() {
            // stale indexes still let most installs through
            warn!(
                status = result.status,
                stderr = %result.stderr.trim(),
                "apt update failed, trying to continue anyway"
            );
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn install(&self, package: &str) -> Result<(), PackageError> {
        info!(package, "installing package");

        let cmd = self.apt_cmd(&format!("install -y --force-yes {}", escape(package)));
        let result = self.run(&cmd).await?;

        if !result.success() {
            return Err(PackageError::from_failure(result.status, &result.stderr));
        }

        debug!(package, "package installed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn installed_packages(&self) -> Result<Vec<String>, PackageError> {
        let cmd = format!(
            "{} --get-selections | grep -v \"deinstall\" | cut -f1",
            self.dpkg
        );
        let result = self.run(&cmd).await?;

        if !result.success() {
            return Err(PackageError::CommandFailed {
                status: result.status,
                message: result.stderr,
            });
        }

        let packages = Self::parse_selections(&result.stdout);
        debug!(count = packages.len(), "listed installed packages");
        Ok(packages)
    }

    #[instrument(skip(self))]
    async fn repositories(&self) -> Result<Vec<String>, PackageError> {
        let result = self
            .run(&format!("cat {}", escape(&self.sources_list)))
            .await?;

        // a missing sources list just means no extra repositories yet
        if !result.success() {
            debug!(sources_list = %self.sources_list, "sources list not readable");
            return Ok(Vec::new());
        }

        Ok(Self::parse_sources(&result.stdout))
    }

    #[instrument(skip(self))]
    async fn add_repository(&self, repo: &str) -> Result<bool, PackageError> {
        if self.repositories().await?.iter().any(|r| r == repo) {
            debug!(repo, "repository already listed");
            return Ok(false);
        }

        info!(repo, sources_list = %self.sources_list, "adding repository");
        let cmd = format!(
            "echo \"deb {} ./\" >> {}",
            escape_double_quoted(repo),
            escape(&self.sources_list)
        );
        let result = self.run(&cmd).await?;
        if !result.success() {
            return Err(PackageError::RepositoryUnavailable(format!(
                "{repo}: {}",
                result.stderr.trim()
            )));
        }

        self.update().await?;
        Ok(true)
    }

    fn manager_name(&self) -> &'static str {
        "apt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        let output = "\
# added by tether
deb http://apt.thebigboss.org/repofiles/cydia/ stable main
deb https://build.frida.re ./

not a source line
";
        let repos = AptManager::parse_sources(output);
        assert_eq!(
            repos,
            vec![
                "http://apt.thebigboss.org/repofiles/cydia/",
                "https://build.frida.re"
            ]
        );
    }

    #[test]
    fn test_parse_selections() {
        let output = "adv-cmds\napt7-strict\n\n  coreutils \n";
        assert_eq!(
            AptManager::parse_selections(output),
            vec!["adv-cmds", "apt7-strict", "coreutils"]
        );
    }
}
