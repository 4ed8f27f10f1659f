//! tether-pkg: tool installation on a device
//!
//! Checks prerequisites and installs the tools named in the device profile
//! through apt, a pushed binary, or setup commands.

pub mod apt;
pub mod error;
pub mod installer;
pub mod traits;
pub mod types;

pub use apt::AptManager;
pub use error::PackageError;
pub use installer::DependencyInstaller;
pub use traits::PackageManager;
pub use types::{
    InstallMethod, InstallOutcome, InstallReport, InstallerConfig, ToolReport, ToolSpec,
};
