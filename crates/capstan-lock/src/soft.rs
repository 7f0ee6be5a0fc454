//! Advisory, multi-holder, expiring soft locks.
//!
//! Soft locks never block anything by themselves — they are records other
//! operators (and tooling) consult before acting. Each lock is one JSON
//! line in its own file under a shared directory on the node, scoped to a
//! set of operation kinds and expiring at a fixed time. Expiry is evaluated
//! lazily at read time; there is no background reclamation.

use std::io::Write;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use capstan_core::config::LockConfig;
use capstan_core::duration::{DurationError, parse_duration};
use capstan_core::error::ErrorCode;
use capstan_core::identity::identity;
use capstan_core::report::Reporter;

use crate::node::{Node, shell_quote};

const ID_LENGTH: usize = 4;
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One soft-lock record. Field order is alphabetical so the serialized
/// form has deterministic key ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLock {
    /// Free-form reason, single line.
    pub comment: String,
    /// Creation time, epoch seconds.
    pub date: i64,
    /// Expiry time, epoch seconds; the record is purged at first read past
    /// this point.
    pub expiry: i64,
    /// Short random uppercase token, unique per node at any instant.
    pub id: String,
    /// Operation kinds this lock applies to.
    pub ops: Vec<String>,
    /// Holder identity, diagnostic only.
    pub user: String,
}

/// Errors from soft-lock operations.
#[derive(Debug, thiserror::Error)]
pub enum SoftLockError {
    /// The comment contained a newline; rejected before any remote I/O.
    #[error("lock comments must not contain any newlines")]
    CommentNewline,

    /// The expiry duration string did not parse.
    #[error(transparent)]
    Expiry(#[from] DurationError),

    /// A required remote command or transfer failed.
    #[error("remote operation failed on {node}")]
    Remote {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// Staging the record file locally failed.
    #[error("could not stage soft-lock record locally")]
    Staging(#[from] std::io::Error),
}

impl SoftLockError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CommentNewline => ErrorCode::LockCommentInvalid,
            Self::Expiry(_) => ErrorCode::DurationParseError,
            Self::Remote { .. } | Self::Staging(_) => ErrorCode::RemoteCommandFailed,
        }
    }
}

/// Soft-lock store on one node.
///
/// This registry only stores and reports; honoring a lock's operation
/// scope — refusing to run — is the caller's responsibility.
pub struct SoftLockRegistry<'a, N: Node + ?Sized> {
    node: &'a N,
    config: &'a LockConfig,
}

impl<'a, N: Node + ?Sized> SoftLockRegistry<'a, N> {
    #[must_use]
    pub const fn new(node: &'a N, config: &'a LockConfig) -> Self {
        Self { node, config }
    }

    /// Create a soft lock and return its ID.
    ///
    /// `expiry` and `ops` fall back to the configured defaults. The ID is
    /// a short random token; collisions are acceptable at the concurrency
    /// levels this is designed for.
    ///
    /// # Errors
    ///
    /// [`SoftLockError::CommentNewline`] (no remote call is made),
    /// [`SoftLockError::Expiry`] for a bad duration string, or a remote
    /// failure creating the shared directory / uploading the record.
    pub fn add(
        &self,
        comment: &str,
        expiry: Option<&str>,
        ops: Option<Vec<String>>,
    ) -> Result<String, SoftLockError> {
        if comment.contains('\n') {
            return Err(SoftLockError::CommentNewline);
        }

        let expiry_delta = parse_duration(expiry.unwrap_or(&self.config.default_expiry))?;
        let now = Utc::now().timestamp();
        let lock = SoftLock {
            comment: comment.to_string(),
            date: now,
            expiry: now + expiry_delta.num_seconds(),
            id: random_id(),
            ops: ops.unwrap_or_else(|| self.config.default_ops.clone()),
            user: identity(),
        };

        let mut staged = tempfile::NamedTempFile::new()?;
        let line = serde_json::to_string(&lock).unwrap_or_default();
        writeln!(staged, "{line}")?;
        staged.flush()?;

        self.run_checked(&format!(
            "mkdir -p {}",
            shell_quote(&self.config.soft_lock_dir)
        ))?;
        self.node
            .upload(
                staged.path(),
                &self.config.soft_lock_file(&lock.id),
                Some("0644"),
            )
            .map_err(|source| SoftLockError::Remote {
                node: self.node.name().to_string(),
                source,
            })?;

        debug!(node = self.node.name(), id = %lock.id, "added soft lock");
        Ok(lock.id)
    }

    /// List the active soft locks on the node.
    ///
    /// A missing shared directory yields an empty list, not an error.
    /// Malformed records are skipped with a warning rather than aborting
    /// the listing. Expired records are deleted as a side effect and
    /// excluded from the result; a failed purge is a warning only.
    ///
    /// # Errors
    ///
    /// Transport-level failure of the listing command itself.
    pub fn list(&self, reporter: &dyn Reporter) -> Result<Vec<SoftLock>, SoftLockError> {
        debug!(node = self.node.name(), "checking soft locks");
        let cat = self
            .node
            .run(
                &format!("cat {}/*", shell_quote(&self.config.soft_lock_dir)),
                true,
            )
            .map_err(|source| SoftLockError::Remote {
                node: self.node.name().to_string(),
                source,
            })?;
        if !cat.ok() {
            // No directory or no lock files; the glob itself failed.
            return Ok(Vec::new());
        }

        let now = Utc::now().timestamp();
        let mut locks = Vec::new();
        for line in cat.stdout_text().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let lock: SoftLock = match serde_json::from_str(line) {
                Ok(lock) => lock,
                Err(err) => {
                    reporter.warn(&format!(
                        "skipping malformed soft lock record on {}: {err}",
                        self.node.name(),
                    ));
                    continue;
                }
            };
            if lock.expiry < now {
                debug!(
                    node = self.node.name(),
                    id = %lock.id,
                    "removing expired soft lock",
                );
                if let Err(err) = self.remove(&lock.id) {
                    reporter.warn(&format!(
                        "could not remove expired soft lock {} on {}: {err}",
                        lock.id,
                        self.node.name(),
                    ));
                }
                continue;
            }
            locks.push(lock);
        }
        Ok(locks)
    }

    /// Delete one soft-lock record by ID.
    ///
    /// Removal of an already-absent ID is transport-dependent; this layer
    /// does not guarantee idempotency.
    ///
    /// # Errors
    ///
    /// Remote failure of the removal command.
    pub fn remove(&self, id: &str) -> Result<(), SoftLockError> {
        debug!(node = self.node.name(), id, "removing soft lock");
        self.run_checked(&format!(
            "rm {}",
            shell_quote(&self.config.soft_lock_file(id))
        ))
    }

    fn run_checked(&self, command: &str) -> Result<(), SoftLockError> {
        self.node
            .run(command, false)
            .map_err(|source| SoftLockError::Remote {
                node: self.node.name().to_string(),
                source,
            })?;
        Ok(())
    }
}

fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}
