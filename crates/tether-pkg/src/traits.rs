//! Package manager trait

use async_trait::async_trait;

use crate::error::PackageError;

/// Package manager on the device
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Refresh package indexes
    async fn update(&self) -> Result<(), PackageError>;

    /// Install one package non-interactively
    async fn install(&self, package: &str) -> Result<(), PackageError>;

    /// Names of installed packages
    async fn installed_packages(&self) -> Result<Vec<String>, PackageError>;

    /// Repositories listed in the sources list
    async fn repositories(&self) -> Result<Vec<String>, PackageError>;

    /// Add a repository; `false` if it was already listed
    async fn add_repository(&self, repo: &str) -> Result<bool, PackageError>;

    /// Short name for logs
    fn manager_name(&self) -> &'static str;
}
