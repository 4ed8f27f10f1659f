//! tether-remote: command dispatch and file operations on a device
//!
//! Builds shell commands from sanitized paths, sends them through one of
//! four execution modes, tracks backgrounded processes, and moves files
//! with `scp`.

pub mod dispatch;
pub mod error;
pub mod escape;
pub mod fs;
pub mod process;
pub mod transfer;

pub use dispatch::{CommandDispatcher, Dispatched, ExecMode, RemoteCommand};
pub use error::RemoteError;
pub use escape::{PathToken, escape, escape_double_quoted, escape_for_transfer, escape_operand};
pub use fs::{DirEntries, RemoteFs};
pub use process::{BackgroundProcess, ProcessState, ProcessTracker};
pub use transfer::{Direction, TransferClient, TransferRequest};
