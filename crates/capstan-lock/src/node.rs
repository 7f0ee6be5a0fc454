//! The remote node capability consumed by the lock layer.
//!
//! Transports (SSH or otherwise) implement [`Node`]; the lock layer only
//! issues shell commands and file transfers through it. All operations are
//! synchronous and attempted exactly once — retry and timeout policy
//! belongs to the transport.

use std::path::Path;

use anyhow::Result;

/// Outcome of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
}

impl CommandResult {
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily for line-oriented parsing.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Capability to run commands on and transfer files to/from a remote node.
pub trait Node {
    /// Node name for messages and error context.
    fn name(&self) -> &str;

    /// Run a shell command.
    ///
    /// A non-zero exit code is reported through [`CommandResult`], never as
    /// an `Err`, when `may_fail` is set; with `may_fail` false the transport
    /// treats non-zero exit as an error.
    ///
    /// # Errors
    ///
    /// Transport-level failures (connection loss, and non-zero exit when
    /// `may_fail` is false).
    fn run(&self, command: &str, may_fail: bool) -> Result<CommandResult>;

    /// Upload a local file, optionally chmod'ing it to `mode` (e.g. `"0644"`).
    ///
    /// # Errors
    ///
    /// Transport-level failures.
    fn upload(&self, local: &Path, remote: &str, mode: Option<&str>) -> Result<()>;

    /// Download a remote file. With `ignore_failure` set, a missing remote
    /// file is not an error; the local path is simply left unwritten.
    ///
    /// # Errors
    ///
    /// Transport-level failures (and a missing remote file when
    /// `ignore_failure` is false).
    fn download(&self, remote: &str, local: &Path, ignore_failure: bool) -> Result<()>;
}

/// Quote a path for interpolation into a remote shell command.
///
/// Plain path-safe strings pass through unchanged; anything else is
/// single-quoted with embedded quotes escaped.
#[must_use]
pub fn shell_quote(path: &str) -> String {
    const fn is_safe(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'-' | b'_' | b'+' | b':' | b'@' | b',' | b'=')
    }

    if !path.is_empty() && path.bytes().all(is_safe) {
        path.to_string()
    } else {
        format!("'{}'", path.replace('\'', r"'\''"))
    }
}
