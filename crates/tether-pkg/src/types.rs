//! Type definitions for tool installation

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a single tool gets onto the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Packages to install with the package manager
    #[serde(default)]
    pub packages: Vec<String>,
    /// Repository the packages come from
    pub repo: Option<String>,
    /// Local binary to push when there is no package
    pub local: Option<PathBuf>,
    /// Command the tool is invoked as on the device
    pub command: Option<String>,
    /// Shell commands that install the tool
    #[serde(default)]
    pub setup: Vec<String>,
}

impl ToolSpec {
    /// Whether any install method is configured
    #[must_use]
    pub fn is_installable(&self) -> bool {
        !self.packages.is_empty() || self.local.is_some() || !self.setup.is_empty()
    }
}

/// Installer settings, usually the `[installer]` table of the device profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// `which` binary on the device
    #[serde(default = "default_which")]
    pub which: String,
    /// apt front end on the device
    #[serde(default = "default_apt")]
    pub apt: String,
    /// dpkg binary on the device
    #[serde(default = "default_dpkg")]
    pub dpkg: String,
    /// Sources list new repositories are appended to
    #[serde(default = "default_sources_list")]
    pub sources_list: String,
    /// Directory pushed binaries go to
    #[serde(default = "default_install_dir")]
    pub install_dir: String,
    /// Commands that must already exist on the device
    #[serde(default = "default_prerequisites")]
    pub prerequisites: Vec<String>,
    /// Tools configured before any others
    #[serde(default)]
    pub bootstrap: Vec<String>,
    /// Tool table
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

fn default_which() -> String {
    "which".to_string()
}

fn default_apt() -> String {
    "apt-get".to_string()
}

fn default_dpkg() -> String {
    "dpkg".to_string()
}

fn default_sources_list() -> String {
    "/etc/apt/sources.list.d/tether.list".to_string()
}

fn default_install_dir() -> String {
    "/usr/bin".to_string()
}

fn default_prerequisites() -> Vec<String> {
    vec!["apt-get".to_string(), "dpkg".to_string()]
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            which: default_which(),
            apt: default_apt(),
            dpkg: default_dpkg(),
            sources_list: default_sources_list(),
            install_dir: default_install_dir(),
            prerequisites: default_prerequisites(),
            bootstrap: Vec::new(),
            tools: BTreeMap::new(),
        }
    }
}

impl InstallerConfig {
    /// Names of tools with an install method, in table order
    #[must_use]
    pub fn installable(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, spec)| spec.is_installable())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Which method installed a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Package manager
    Packages,
    /// Pushed local binary
    LocalBinary,
    /// Setup commands
    SetupCommands,
}

/// Result of configuring one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Installed now
    Installed(InstallMethod),
    /// Nothing to do, already on the device
    AlreadyPresent,
    /// No install method configured
    Skipped,
}

/// Per-tool line of an install run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReport {
    /// Tool name
    pub tool: String,
    /// Outcome, if configuring succeeded
    pub outcome: Option<InstallOutcome>,
    /// Error message, if it failed
    pub error: Option<String>,
}

/// Result of an install run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallReport {
    /// One entry per requested tool
    pub tools: Vec<ToolReport>,
}

impl InstallReport {
    /// Tools that failed
    pub fn failed(&self) -> impl Iterator<Item = &ToolReport> {
        self.tools.iter().filter(|t| t.error.is_some())
    }

    /// Whether every tool was configured
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installer_config_from_toml() {
        let config: InstallerConfig = toml::from_str(
            r#"
            sources_list = "/etc/apt/sources.list.d/cydia.list"
            prerequisites = ["apt-get", "dpkg", "which"]
            bootstrap = ["coreutils"]

            [tools.coreutils]
            packages = ["coreutils", "coreutils-bin"]

            [tools.frida]
            packages = ["re.frida.server"]
            repo = "https://build.frida.re"

            [tools.class-dump]
            local = "deps/class-dump"
            command = "class-dump"

            [tools.notes]
            "#,
        )
        .unwrap();

        assert_eq!(config.apt, "apt-get");
        assert_eq!(config.install_dir, "/usr/bin");
        assert_eq!(config.prerequisites.len(), 3);
        assert_eq!(
            config.tools["frida"].repo.as_deref(),
            Some("https://build.frida.re")
        );
        assert_eq!(
            config.installable(),
            vec!["class-dump", "coreutils", "frida"]
        );
    }

    #[test]
    fn test_report_success() {
        let mut report = InstallReport::default();
        assert!(report.success());
        report.tools.push(ToolReport {
            tool: "frida".to_string(),
            outcome: None,
            error: Some("unknown tool: frida".to_string()),
        });
        assert!(!report.success());
        assert_eq!(report.failed().count(), 1);
    }
}
