//! Device profile loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_exec::{ConnectionInfo, HostVerification};
use tether_pkg::InstallerConfig;

/// Top-level device profile (`tether.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device connection settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
    /// Tool installation settings
    #[serde(default)]
    pub installer: InstallerConfig,
}

/// Device connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Run commands on this machine instead of over SSH
    ///
    /// A profile without a `[device]` table is local; one with it is an
    /// SSH target unless this is set, whatever the host.
    #[serde(default)]
    pub local: bool,
    /// Address of the device
    #[serde(default = "default_host")]
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    #[serde(default = "default_user")]
    pub user: String,
    /// Password secret
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Private key path
    #[serde(default)]
    pub ssh_key: Option<String>,
    /// Host key policy
    #[serde(default)]
    pub host_verification: HostVerification,
    /// Scratch folder on the device
    #[serde(default = "default_temp_folder")]
    pub temp_folder: String,
    /// Limit for blocking commands, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("local", &self.local)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key)
            .field("temp_folder", &self.temp_folder)
            .finish_non_exhaustive()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            local: true,
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            ssh_key: None,
            host_verification: HostVerification::default(),
            temp_folder: default_temp_folder(),
            timeout_secs: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

fn default_temp_folder() -> String {
    "/tmp".to_string()
}

impl DeviceConfig {
    /// Connection details handed to the executors
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        let mut info = ConnectionInfo::new(&self.host, &self.user)
            .with_port(self.port)
            .with_host_verification(self.host_verification);
        if let Some(password) = &self.password {
            info = info.with_password(password);
        }
        if let Some(key) = &self.ssh_key {
            info = info.with_ssh_key(key);
        }
        info
    }

    /// Whether commands run on this machine instead of over SSH
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Blocking command limit
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// First profile found on the default search path
    ///
    /// `$TETHER_CONFIG` wins, then `./tether.toml`, `/etc/tether/tether.toml`
    /// and the user config directory.
    #[must_use]
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TETHER_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("tether.toml")),
            Some(PathBuf::from("/etc/tether/tether.toml")),
            dirs::config_dir().map(|p| p.join("tether/tether.toml")),
        ];

        paths.into_iter().flatten().find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.device.is_local());
        assert_eq!(config.device.user, "root");
        assert_eq!(config.device.temp_folder, "/tmp");
        assert_eq!(config.log.level, "info");
        assert!(config.installer.tools.is_empty());
        assert_eq!(config.device.timeout(), None);
    }

    #[test]
    fn test_device_profile() {
        let config: Config = toml::from_str(
            r#"
            [device]
            host = "192.168.1.20"
            port = 2222
            password = "alpine"
            host_verification = "accept_new"
            temp_folder = "/var/root/tether"
            timeout_secs = 30

            [log]
            level = "debug"

            [installer]
            bootstrap = ["coreutils"]

            [installer.tools.coreutils]
            packages = ["coreutils"]
            "#,
        )
        .unwrap();

        assert!(!config.device.is_local());
        assert_eq!(config.device.timeout(), Some(Duration::from_secs(30)));

        let info = config.device.connection_info();
        assert_eq!(info.destination(), "root@192.168.1.20");
        assert_eq!(info.port, 2222);
        assert_eq!(info.password.as_deref(), Some("alpine"));
        assert_eq!(info.host_verification, HostVerification::AcceptNew);
        assert_eq!(config.installer.installable(), vec!["coreutils"]);
    }

    #[test]
    fn test_localhost_with_port_is_ssh() {
        let config: Config = toml::from_str(
            r#"
            [device]
            host = "localhost"
            port = 2222
            "#,
        )
        .unwrap();
        assert!(!config.device.is_local());
        assert_eq!(config.device.connection_info().port, 2222);

        let config: Config = toml::from_str("[device]\nlocal = true\n").unwrap();
        assert!(config.device.is_local());
    }

    #[test]
    fn test_password_is_not_printed() {
        let device = DeviceConfig {
            password: Some("alpine".to_string()),
            ..Default::default()
        };
        assert!(!format!("{device:?}").contains("alpine"));
        assert!(!toml::to_string(&device).unwrap().contains("alpine"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\nhost = \"10.0.0.2\"\nuser = \"mobile\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.device.connection_info().destination(), "mobile@10.0.0.2");
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device\nhost = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
