//! Exclusive per-node hard lock.
//!
//! At most one operator applies configuration to a node at a time. The lock
//! is the atomic creation of a directory on the node itself; a metadata file
//! inside it records who holds it and since when, so a second operator can
//! decide whether a lock has gone stale and override it. Overriding never
//! clears the other holder's record first — the new run simply proceeds in
//! parallel and overwrites the metadata.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use capstan_core::config::LockConfig;
use capstan_core::duration::format_duration;
use capstan_core::error::ErrorCode;
use capstan_core::identity::identity;
use capstan_core::report::Reporter;

use crate::node::{Node, shell_quote};

/// Holder metadata read back from a contended lock.
///
/// Fields are `None` when the metadata file was missing, unreadable, or
/// corrupt; displays substitute `<unknown>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolderInfo {
    pub user: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl HolderInfo {
    #[must_use]
    pub fn user_display(&self) -> &str {
        self.user.as_deref().unwrap_or("<unknown>")
    }

    /// Absolute acquisition time, `YYYY-MM-DD HH:MM:SS` UTC.
    #[must_use]
    pub fn acquired_display(&self) -> String {
        self.acquired_at.map_or_else(
            || "<unknown>".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
    }

    /// How long the lock has been held, relative to `now`.
    #[must_use]
    pub fn held_for_display(&self, now: DateTime<Utc>) -> String {
        self.acquired_at.map_or_else(
            || "<unknown>".to_string(),
            |at| format_duration(now.signed_duration_since(at)),
        )
    }
}

/// On-disk metadata record, one per lock directory.
#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    /// Epoch seconds.
    date: i64,
    user: String,
}

/// Errors from hard-lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum HardLockError {
    /// The node is locked and the operator chose not to (or could not)
    /// override. Carries whatever holder metadata could be read.
    #[error("node {node} is hard-locked by {}", .holder.user_display())]
    NodeLocked { node: String, holder: HolderInfo },

    /// A required remote command or transfer failed.
    #[error("remote operation failed on {node}")]
    Remote {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// Staging the metadata file locally failed.
    #[error("could not stage lock metadata locally")]
    Staging(#[from] std::io::Error),
}

impl HardLockError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NodeLocked { .. } => ErrorCode::NodeLocked,
            Self::Remote { .. } | Self::Staging(_) => ErrorCode::RemoteCommandFailed,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Acquisition policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardLockOptions {
    /// Prompt the operator (through the reporter) when the node is locked.
    pub interactive: bool,
    /// Proceed over an existing lock without asking.
    pub override_existing: bool,
}

/// Exclusive hard lock over one node's configuration run.
#[derive(Debug)]
pub struct HardLock;

impl HardLock {
    /// Acquire the hard lock on `node`.
    ///
    /// Attempts atomic creation of the lock directory. On contention the
    /// holder metadata is fetched and the decision follows
    /// [`HardLockOptions`]: unconditional override, or an interactive
    /// confirmation showing holder, elapsed and absolute acquisition time.
    /// Corrupt metadata downgrades to a warning with a cleanup hint but
    /// still requires an explicit decision. On proceeding (fresh or
    /// overridden) the current identity and timestamp are written into the
    /// metadata file.
    ///
    /// # Errors
    ///
    /// [`HardLockError::NodeLocked`] when the lock is held and not
    /// overridden; [`HardLockError::Remote`] / [`HardLockError::Staging`]
    /// on failed remote or local I/O.
    pub fn acquire<'a, N: Node + ?Sized>(
        node: &'a N,
        config: &LockConfig,
        options: HardLockOptions,
        reporter: &dyn Reporter,
    ) -> Result<HardLockGuard<'a, N>, HardLockError> {
        debug!(node = node.name(), "checking hard lock status");
        let mkdir = node
            .run(
                &format!("mkdir {}", shell_quote(&config.hard_lock_dir)),
                true,
            )
            .map_err(|source| HardLockError::Remote {
                node: node.name().to_string(),
                source,
            })?;

        if !mkdir.ok() {
            let holder = fetch_holder(node, config, reporter)?;
            let overridden = options.override_existing
                || (options.interactive
                    && reporter.ask(&override_question(node.name(), &holder), false));
            if !overridden {
                return Err(HardLockError::NodeLocked {
                    node: node.name().to_string(),
                    holder,
                });
            }
        }

        debug!(node = node.name(), "uploading lock metadata");
        let record = LockRecord {
            date: Utc::now().timestamp(),
            user: identity(),
        };
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(
            serde_json::to_string(&record)
                .unwrap_or_default()
                .as_bytes(),
        )?;
        staged.flush()?;
        node.upload(staged.path(), &config.hard_lock_file(), None)
            .map_err(|source| HardLockError::Remote {
                node: node.name().to_string(),
                source,
            })?;

        Ok(HardLockGuard {
            node,
            dir: config.hard_lock_dir.clone(),
            released: false,
        })
    }
}

/// Guard over an acquired hard lock.
///
/// Call [`HardLockGuard::release`] on every exit path. Dropping an
/// unreleased guard only logs — release needs remote I/O, which a `Drop`
/// impl cannot fail loudly about, so the lock directory is left for manual
/// cleanup instead.
#[derive(Debug)]
pub struct HardLockGuard<'a, N: Node + ?Sized> {
    node: &'a N,
    dir: String,
    released: bool,
}

impl<N: Node + ?Sized> HardLockGuard<'_, N> {
    /// Release the lock by removing the lock directory.
    ///
    /// A failed removal is a warning, never an error: a stuck lock needs
    /// manual cleanup but must not abort an otherwise successful run.
    pub fn release(mut self, reporter: &dyn Reporter) {
        self.released = true;
        debug!(node = self.node.name(), "removing hard lock");
        let removed = self
            .node
            .run(&format!("rm -R {}", shell_quote(&self.dir)), true);
        if !matches!(removed, Ok(result) if result.ok()) {
            reporter.warn(&format!(
                "Could not release hard lock for node '{}'",
                self.node.name(),
            ));
        }
    }
}

impl<N: Node + ?Sized> Drop for HardLockGuard<'_, N> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                node = self.node.name(),
                dir = %self.dir,
                "hard lock guard dropped without release; remove the lock directory manually",
            );
        }
    }
}

/// Download and parse the holder metadata of a contended lock.
///
/// Unreadable or unparsable metadata is downgraded to a warning with a
/// remediation hint; each field that can be salvaged is kept.
fn fetch_holder<N: Node + ?Sized>(
    node: &N,
    config: &LockConfig,
    reporter: &dyn Reporter,
) -> Result<HolderInfo, HardLockError> {
    let staged = tempfile::NamedTempFile::new()?;
    node.download(&config.hard_lock_file(), staged.path(), true)
        .map_err(|source| HardLockError::Remote {
            node: node.name().to_string(),
            source,
        })?;

    let parsed = std::fs::read_to_string(staged.path())
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
    let Some(value) = parsed else {
        reporter.warn(&format!(
            "[{code}] corrupted lock on {node}: unable to read or parse lock file contents \
             (clear it with `rm -R {dir}` on the node)",
            code = ErrorCode::LockCorrupt,
            node = node.name(),
            dir = config.hard_lock_dir,
        ));
        return Ok(HolderInfo::default());
    };

    Ok(HolderInfo {
        user: value
            .get("user")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        acquired_at: value
            .get("date")
            .and_then(serde_json::Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

fn override_question(node_name: &str, holder: &HolderInfo) -> String {
    let now = Utc::now();
    format!(
        "NODE LOCKED: {node_name}\n\
         Looks like somebody is currently applying configuration to this node.\n\
         You should let them finish or override the lock if it has gone stale.\n\
         \n\
         locked by: {user}\n\
         lock acquired: {elapsed} ago ({date})\n\
         \n\
         Override lock?",
        user = holder.user_display(),
        elapsed = holder.held_for_display(now),
        date = holder.acquired_display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryNode, RecordingReporter};
    use chrono::TimeDelta;

    fn config() -> LockConfig {
        LockConfig::default()
    }

    #[test]
    fn fresh_acquire_creates_dir_and_writes_metadata() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();

        let guard = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("fresh acquire succeeds");

        assert!(node.has_dir("/tmp/capstan.lock"));
        let raw = node.file("/tmp/capstan.lock/info").expect("metadata uploaded");
        let record: serde_json::Value = serde_json::from_slice(&raw).expect("valid JSON");
        assert_eq!(
            record.get("user").and_then(serde_json::Value::as_str),
            Some(identity().as_str())
        );
        assert!(record.get("date").and_then(serde_json::Value::as_i64).is_some());
        assert!(reporter.warnings().is_empty());

        guard.release(&reporter);
    }

    #[test]
    fn contended_acquire_fails_with_holder_metadata() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();

        let first = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("first acquire succeeds");
        let written = node.file("/tmp/capstan.lock/info").expect("metadata");

        let err = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect_err("second acquire must fail");
        match &err {
            HardLockError::NodeLocked { node: name, holder } => {
                assert_eq!(name, "web01");
                assert_eq!(holder.user.as_deref(), Some(identity().as_str()));
                let record: serde_json::Value =
                    serde_json::from_slice(&written).expect("valid JSON");
                assert_eq!(
                    holder.acquired_at.map(|at| at.timestamp()),
                    record.get("date").and_then(serde_json::Value::as_i64),
                );
            }
            other => panic!("expected NodeLocked, got {other:?}"),
        }
        assert_eq!(err.code(), ErrorCode::NodeLocked);

        first.release(&reporter);
    }

    #[test]
    fn release_allows_follow_up_acquire() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();

        let guard = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("acquire");
        guard.release(&reporter);
        assert!(!node.has_dir("/tmp/capstan.lock"));

        let again = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("acquire after release needs no override");
        again.release(&reporter);
        assert!(reporter.warnings().is_empty());
    }

    #[test]
    fn unconditional_override_proceeds_without_asking() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();

        let first = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("first acquire");

        let options = HardLockOptions {
            override_existing: true,
            ..HardLockOptions::default()
        };
        let second = HardLock::acquire(&node, &config(), options, &reporter)
            .expect("override proceeds");
        assert!(reporter.questions().is_empty());
        // The other holder's record was overwritten, not cleared first.
        assert!(node.file("/tmp/capstan.lock/info").is_some());

        second.release(&reporter);
        drop(first); // released remotely by the override's release
    }

    #[test]
    fn interactive_confirmation_shows_holder_and_is_respected() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();
        let first = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("first acquire");

        let interactive = HardLockOptions {
            interactive: true,
            ..HardLockOptions::default()
        };

        let declined = RecordingReporter::answering(false);
        let err = HardLock::acquire(&node, &config(), interactive, &declined)
            .expect_err("declined prompt keeps the lock");
        assert!(matches!(err, HardLockError::NodeLocked { .. }));
        assert_eq!(declined.questions().len(), 1);
        assert!(declined.questions()[0].contains(&identity()));
        assert!(declined.questions()[0].contains("Override lock?"));

        let confirmed = RecordingReporter::answering(true);
        let guard = HardLock::acquire(&node, &config(), interactive, &confirmed)
            .expect("confirmed prompt proceeds");
        guard.release(&confirmed);
        drop(first);
    }

    #[test]
    fn corrupt_metadata_warns_and_still_requires_a_decision() {
        let node = MemoryNode::new("web01");
        node.put_dir("/tmp/capstan.lock");
        node.put_file("/tmp/capstan.lock/info", b"not json at all");

        let reporter = RecordingReporter::default();
        let err = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect_err("corrupt lock is still a lock");
        match err {
            HardLockError::NodeLocked { holder, .. } => {
                assert_eq!(holder, HolderInfo::default());
                assert_eq!(holder.user_display(), "<unknown>");
                assert_eq!(holder.acquired_display(), "<unknown>");
            }
            other => panic!("expected NodeLocked, got {other:?}"),
        }
        let warnings = reporter.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("corrupted lock on web01"));
        assert!(warnings[0].contains("rm -R /tmp/capstan.lock"));
        // Tagged with the stable code for machine-side filtering.
        assert!(warnings[0].starts_with(&format!("[{}]", ErrorCode::LockCorrupt)));
    }

    #[test]
    fn missing_metadata_file_is_treated_as_unknown_holder() {
        let node = MemoryNode::new("web01");
        node.put_dir("/tmp/capstan.lock"); // locked, but no info file

        let reporter = RecordingReporter::default();
        let err = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect_err("locked without metadata");
        assert!(matches!(
            err,
            HardLockError::NodeLocked { holder, .. } if holder == HolderInfo::default()
        ));
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[test]
    fn failed_release_warns_but_does_not_panic() {
        let node = MemoryNode::new("web01");
        let reporter = RecordingReporter::default();
        let guard = HardLock::acquire(&node, &config(), HardLockOptions::default(), &reporter)
            .expect("acquire");

        node.fail_commands_matching("rm -R ");
        guard.release(&reporter);

        let warnings = reporter.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Could not release hard lock for node 'web01'"));
    }

    #[test]
    fn holder_displays_render_elapsed_and_absolute_time() {
        let acquired = DateTime::from_timestamp(1_000_000, 0).expect("valid timestamp");
        let holder = HolderInfo {
            user: Some("alice@workstation".to_string()),
            acquired_at: Some(acquired),
        };
        let now = acquired + TimeDelta::hours(2) + TimeDelta::minutes(5);
        assert_eq!(holder.user_display(), "alice@workstation");
        assert_eq!(holder.held_for_display(now), "2h 5m");
        assert_eq!(holder.acquired_display(), "1970-01-12 13:46:40");
    }
}
