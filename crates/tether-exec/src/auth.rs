//! Credential resolution for device logins

use std::fmt;
use std::path::{Path, PathBuf};

use crate::result::ConnectionInfo;

/// Where the login secret comes from
#[derive(Clone)]
pub enum Credential {
    /// Password secret
    Password(String),
    /// Explicit path to a private key file
    KeyFile(PathBuf),
    /// Use SSH agent
    Agent,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credential::Agent => f.write_str("Agent"),
        }
    }
}

impl Credential {
    /// Pick the credential described by a connection profile
    ///
    /// A key path wins over a password; with neither, the agent is used.
    #[must_use]
    pub fn from_connection(info: &ConnectionInfo) -> Self {
        if let Some(key) = &info.ssh_key {
            Credential::KeyFile(PathBuf::from(key))
        } else if let Some(password) = &info.password {
            Credential::Password(password.clone())
        } else {
            Credential::Agent
        }
    }

    /// Resolve to something an SSH client can use
    ///
    /// # Errors
    /// Returns `CredentialError` if the key file is missing or too open
    pub fn resolve(&self) -> Result<ResolvedCredential, CredentialError> {
        match self {
            Credential::Password(password) => Ok(ResolvedCredential::Password(password.clone())),
            Credential::KeyFile(path) => {
                validate_key_permissions(path)?;
                Ok(ResolvedCredential::Key(path.clone()))
            }
            Credential::Agent => Ok(ResolvedCredential::Agent),
        }
    }
}

/// Resolved credential
pub enum ResolvedCredential {
    /// Password secret
    Password(String),
    /// Path to key file
    Key(PathBuf),
    /// Use SSH agent
    Agent,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedCredential::Password(_) => f.write_str("Password(<redacted>)"),
            ResolvedCredential::Key(path) => f.debug_tuple("Key").field(path).finish(),
            ResolvedCredential::Agent => f.write_str("Agent"),
        }
    }
}

impl ResolvedCredential {
    /// Key file path, if this is key based
    #[must_use]
    pub fn key_path(&self) -> Option<&Path> {
        match self {
            ResolvedCredential::Key(p) => Some(p),
            ResolvedCredential::Password(_) | ResolvedCredential::Agent => None,
        }
    }

    /// Password secret, if this is password based
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match self {
            ResolvedCredential::Password(p) => Some(p),
            _ => None,
        }
    }
}

/// Credential resolution errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn validate_key_permissions(path: &Path) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CredentialError::NotFound(path.display().to_string()),
        _ => CredentialError::Io(e),
    })?;

    // group/other bits must be clear
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(CredentialError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_from_connection_precedence() {
        let info = ConnectionInfo::new("device", "root").with_password("alpine");
        assert!(matches!(
            Credential::from_connection(&info),
            Credential::Password(_)
        ));

        let info = info.with_ssh_key("/home/me/.ssh/id_ed25519");
        assert!(matches!(
            Credential::from_connection(&info),
            Credential::KeyFile(_)
        ));

        let info = ConnectionInfo::new("device", "root");
        assert!(matches!(Credential::from_connection(&info), Credential::Agent));
    }

    #[test]
    fn test_key_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_test");
        std::fs::write(&key, b"not really a key").unwrap();

        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = Credential::KeyFile(key.clone()).resolve().unwrap_err();
        assert!(matches!(err, CredentialError::BadPermissions(_)));

        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o600)).unwrap();
        let resolved = Credential::KeyFile(key.clone()).resolve().unwrap();
        assert_eq!(resolved.key_path(), Some(key.as_path()));
    }

    #[test]
    fn test_missing_key() {
        let err = Credential::KeyFile(PathBuf::from("/nonexistent/tether/id_rsa"))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[test]
    fn test_password_redacted() {
        let cred = Credential::Password("alpine".into());
        assert!(!format!("{cred:?}").contains("alpine"));
        let resolved = cred.resolve().unwrap();
        assert_eq!(resolved.password(), Some("alpine"));
        assert!(!format!("{resolved:?}").contains("alpine"));
    }
}
