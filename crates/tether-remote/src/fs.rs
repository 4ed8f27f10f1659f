//! File and directory primitives on the device
//!
//! Existence is checked with a shell test that prints a `yes`/`no`
//! sentinel, so only POSIX `sh`, `test`, `ls` and coreutils are needed
//! on the device. Paths are passed as operands, so one starting with `-`
//! is never read as an option.

use std::path::Path;

use tracing::{debug, error, instrument};

use crate::dispatch::CommandDispatcher;
use crate::error::RemoteError;
use crate::escape::{escape_double_quoted, escape_operand};

const DEFAULT_TEMP_FOLDER: &str = "/tmp";

/// Names printed by `ls`, trimmed, blank lines skipped
///
/// Owns the captured output and splits off one line per call.
#[derive(Debug, Clone)]
pub struct DirEntries {
    stdout: String,
    pos: usize,
}

impl DirEntries {
    fn new(stdout: String) -> Self {
        Self { stdout, pos: 0 }
    }
}

impl Iterator for DirEntries {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.pos < self.stdout.len() {
            let rest = &self.stdout[self.pos..];
            let (line, advance) = match rest.find('\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;

            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.stdout.len() - self.pos;
        (0, Some(left.div_ceil(2)))
    }
}

/// Filesystem operations on one device
#[derive(Debug, Clone)]
pub struct RemoteFs {
    dispatcher: CommandDispatcher,
    /// Device folder for scratch files
    temp_folder: String,
}

impl RemoteFs {
    /// Create over a dispatcher, using `/tmp` for scratch files
    #[must_use]
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self {
            dispatcher,
            temp_folder: DEFAULT_TEMP_FOLDER.to_string(),
        }
    }

    /// Use a different device temp folder
    #[must_use]
    pub fn with_temp_folder(mut self, folder: impl Into<String>) -> Self {
        self.temp_folder = folder.into();
        self
    }

    /// The dispatcher commands go through
    #[must_use]
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    async fn test(&self, flag: char, path: &str) -> Result<bool, RemoteError> {
        let cmd = format!(
            "if [ -{flag} {} ]; then echo \"yes\"; else echo \"no\"; fi",
            escape_operand(path)
        );
        let result = self.dispatcher.blocking(&cmd, true).await?;
        Ok(result.stdout.trim() == "yes")
    }

    // FILES

    /// Whether `path` is a regular file
    ///
    /// # Errors
    /// Returns a transport error
    pub async fn file_exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.test('f', path).await
    }

    /// `touch`, unless the file already exists
    ///
    /// # Errors
    /// Returns a transport error or the failing `touch`
    pub async fn file_create(&self, path: &str) -> Result<(), RemoteError> {
        if self.file_exists(path).await? {
            debug!(path, "file already exists");
            return Ok(());
        }
        self.dispatcher
            .blocking_checked(&format!("touch {}", escape_operand(path)), false)
            .await?;
        Ok(())
    }

    /// `rm`, if the file exists
    ///
    /// # Errors
    /// Returns a transport error or the failing `rm`
    pub async fn file_delete(&self, path: &str) -> Result<(), RemoteError> {
        if !self.file_exists(path).await? {
            return Ok(());
        }
        self.dispatcher
            .blocking_checked(&format!("rm {} 2> /dev/null", escape_operand(path)), false)
            .await?;
        Ok(())
    }

    /// `cp <src> <dst>`
    ///
    /// # Errors
    /// Returns a transport error or the failing `cp`
    pub async fn file_copy(&self, src: &str, dst: &str) -> Result<(), RemoteError> {
        let cmd = format!("cp {} {}", escape_operand(src), escape_operand(dst));
        self.dispatcher.blocking_checked(&cmd, false).await?;
        Ok(())
    }

    /// `mv <src> <dst>`
    ///
    /// # Errors
    /// Returns a transport error or the failing `mv`
    pub async fn file_move(&self, src: &str, dst: &str) -> Result<(), RemoteError> {
        let cmd = format!("mv {} {}", escape_operand(src), escape_operand(dst));
        self.dispatcher.blocking_checked(&cmd, false).await?;
        Ok(())
    }

    // DIRECTORIES

    /// Whether `path` is a directory
    ///
    /// # Errors
    /// Returns a transport error
    pub async fn dir_exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.test('d', path).await
    }

    /// `mkdir`, unless the directory already exists
    ///
    /// # Errors
    /// Returns a transport error or the failing `mkdir`
    pub async fn dir_create(&self, path: &str) -> Result<(), RemoteError> {
        if self.dir_exists(path).await? {
            debug!(path, "directory already exists");
            return Ok(());
        }
        self.dispatcher
            .blocking_checked(&format!("mkdir {}", escape_operand(path)), false)
            .await?;
        Ok(())
    }

    /// `rm -rf`, if the directory exists or `force` is set
    ///
    /// # Errors
    /// Returns a transport error or the failing `rm`
    pub async fn dir_delete(&self, path: &str, force: bool) -> Result<(), RemoteError> {
        if !force && !self.dir_exists(path).await? {
            return Ok(());
        }
        self.dispatcher
            .blocking_checked(&format!("rm -rf {} 2> /dev/null", escape_operand(path)), false)
            .await?;
        Ok(())
    }

    /// Entries of a directory, `None` if it does not exist
    ///
    /// Recursive listings use `ls -aR` and so include `.`, `..` and the
    /// `dir:` headers.
    ///
    /// # Errors
    /// Returns a transport error or the failing `ls`
    #[instrument(skip(self))]
    pub async fn dir_list(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Option<DirEntries>, RemoteError> {
        if !self.dir_exists(path).await? {
            return Ok(None);
        }
        let opts = if recursive { "-aR" } else { "" };
        let cmd = format!("ls {opts} {}", escape_operand(path));
        let result = self.dispatcher.blocking_checked(&cmd, true).await?;
        Ok(Some(DirEntries::new(result.stdout)))
    }

    /// Leave `path` as an existing, empty directory
    ///
    /// # Errors
    /// Returns a transport error or a failing `rm`/`mkdir`
    pub async fn dir_reset(&self, path: &str) -> Result<(), RemoteError> {
        if self.dir_exists(path).await? {
            self.dir_delete(path, true).await?;
        }
        self.dir_create(path).await
    }
}

// FILE CONTENT
impl RemoteFs {
    /// `cat` a file, optionally through `grep <grep_args>`
    ///
    /// `grep_args` is shell text and is passed through as given. With a
    /// filter, a non-matching `grep` yields empty output, not an error.
    ///
    /// # Errors
    /// Returns `RemoteError::NotFound` if the file does not exist
    pub async fn read_file(&self, path: &str, grep_args: Option<&str>) -> Result<String, RemoteError> {
        if !self.file_exists(path).await? {
            error!(path, "file not found");
            return Err(RemoteError::NotFound(path.to_string()));
        }
        let mut cmd = format!("cat {}", escape_operand(path));
        let result = match grep_args {
            Some(args) => {
                cmd.push_str(&format!(" | grep {args}"));
                self.dispatcher.blocking(&cmd, true).await?
            }
            None => self.dispatcher.blocking_checked(&cmd, true).await?,
        };
        Ok(result.stdout)
    }

    /// Replace a file's content with `body` and a trailing newline
    ///
    /// Backslash sequences in `body` may still be expanded by the device's
    /// `echo` builtin (dash does this).
    ///
    /// # Errors
    /// Returns a transport error or the failing write
    pub async fn write_file(&self, path: &str, body: &str) -> Result<(), RemoteError> {
        let cmd = format!("echo \"{}\" > {}", escape_double_quoted(body), escape_operand(path));
        self.dispatcher.blocking_checked(&cmd, false).await?;
        Ok(())
    }

    /// `chmod +x`
    ///
    /// # Errors
    /// Returns a transport error or the failing `chmod`
    pub async fn chmod_x(&self, path: &str) -> Result<(), RemoteError> {
        self.dispatcher
            .blocking_checked(&format!("chmod +x {}", escape_operand(path)), false)
            .await?;
        Ok(())
    }

    /// Path in the device temp folder with the file name of `fname`
    #[must_use]
    pub fn temp_path_for(&self, fname: &str) -> String {
        let name = Path::new(fname)
            .file_name()
            .map_or_else(|| fname.to_string(), |n| n.to_string_lossy().to_string());
        format!("{}/{name}", self.temp_folder.trim_end_matches('/'))
    }

    /// Touch a reference file in the temp folder and return its path
    ///
    /// Its modification time marks "now" for later `find -newer` style checks.
    ///
    /// # Errors
    /// Returns a transport error or the failing `touch`
    pub async fn create_timestamp_file(&self, fname: &str) -> Result<String, RemoteError> {
        let path = self.temp_path_for(fname);
        self.dispatcher
            .blocking_checked(&format!("touch {}", escape_operand(&path)), false)
            .await?;
        Ok(path)
    }
}
