//! tether-exec: transport layer for remote devices
//!
//! Provides the `RemoteExecutor` abstraction with a persistent SSH session,
//! a local shell executor, and builders for one-off `ssh`/`scp` invocations.

pub mod auth;
pub mod error;
pub mod local;
pub mod openssh;
pub mod result;
pub mod ssh;
pub mod traits;

pub use auth::{Credential, CredentialError, ResolvedCredential};
pub use error::ExecError;
pub use local::LocalExecutor;
pub use openssh::OpenSshClient;
pub use result::{CommandResult, CommandStream, ConnectionInfo, HostVerification};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
