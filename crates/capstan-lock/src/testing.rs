//! In-memory [`Node`] double and a recording reporter for lock tests.
//!
//! `MemoryNode` models just enough of a remote filesystem for the lock
//! protocol: atomic `mkdir`, recursive removal, glob `cat`, and file
//! transfer. Every command is logged so tests can assert on the exact
//! remote traffic (including its absence).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Result, anyhow};

use capstan_core::report::Reporter;

use crate::node::{CommandResult, Node};

#[derive(Debug, Default)]
pub(crate) struct MemoryNode {
    name: String,
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    dirs: RefCell<BTreeSet<String>>,
    commands: RefCell<Vec<String>>,
    /// Command prefixes forced to exit non-zero.
    fail_prefixes: RefCell<Vec<String>>,
}

impl MemoryNode {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub(crate) fn fail_commands_matching(&self, prefix: &str) {
        self.fail_prefixes.borrow_mut().push(prefix.to_string());
    }

    pub(crate) fn has_dir(&self, path: &str) -> bool {
        self.dirs.borrow().contains(path)
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    pub(crate) fn put_file(&self, path: &str, content: &[u8]) {
        self.files.borrow_mut().insert(path.to_string(), content.to_vec());
    }

    pub(crate) fn put_dir(&self, path: &str) {
        self.dirs.borrow_mut().insert(path.to_string());
    }

    fn execute(&self, command: &str) -> CommandResult {
        let fail = CommandResult {
            exit_code: 1,
            stdout: Vec::new(),
        };
        let ok = CommandResult {
            exit_code: 0,
            stdout: Vec::new(),
        };

        if let Some(path) = command.strip_prefix("mkdir -p ") {
            self.dirs.borrow_mut().insert(unquote(path));
            return ok;
        }
        if let Some(path) = command.strip_prefix("mkdir ") {
            let path = unquote(path);
            if self.dirs.borrow().contains(&path) {
                return fail;
            }
            self.dirs.borrow_mut().insert(path);
            return ok;
        }
        if let Some(path) = command.strip_prefix("rm -R ") {
            let path = unquote(path);
            let existed = self.dirs.borrow_mut().remove(&path);
            let prefix = format!("{path}/");
            let mut files = self.files.borrow_mut();
            let removed: Vec<String> = files
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect();
            let any_files = !removed.is_empty();
            for key in removed {
                files.remove(&key);
            }
            if existed || any_files { ok } else { fail }
        } else if let Some(glob) = command.strip_prefix("cat ") {
            let Some(dir) = glob.strip_suffix("/*").map(unquote) else {
                return fail;
            };
            let prefix = format!("{dir}/");
            let files = self.files.borrow();
            let mut stdout = Vec::new();
            let mut matched = false;
            for (key, content) in &*files {
                if key.starts_with(&prefix) {
                    matched = true;
                    stdout.extend_from_slice(content);
                }
            }
            if matched {
                CommandResult {
                    exit_code: 0,
                    stdout,
                }
            } else {
                fail
            }
        } else if let Some(path) = command.strip_prefix("rm ") {
            if self.files.borrow_mut().remove(&unquote(path)).is_some() {
                ok
            } else {
                fail
            }
        } else {
            panic!("MemoryNode: unsupported command {command:?}");
        }
    }
}

impl Node for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, command: &str, may_fail: bool) -> Result<CommandResult> {
        self.commands.borrow_mut().push(command.to_string());

        let forced_failure = self
            .fail_prefixes
            .borrow()
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()));
        let result = if forced_failure {
            CommandResult {
                exit_code: 1,
                stdout: Vec::new(),
            }
        } else {
            self.execute(command)
        };

        if !may_fail && !result.ok() {
            return Err(anyhow!(
                "command {command:?} failed on {} with exit code {}",
                self.name,
                result.exit_code
            ));
        }
        Ok(result)
    }

    fn upload(&self, local: &Path, remote: &str, _mode: Option<&str>) -> Result<()> {
        self.commands.borrow_mut().push(format!("upload {remote}"));
        let content = std::fs::read(local)?;
        self.files.borrow_mut().insert(remote.to_string(), content);
        Ok(())
    }

    fn download(&self, remote: &str, local: &Path, ignore_failure: bool) -> Result<()> {
        self.commands.borrow_mut().push(format!("download {remote}"));
        match self.files.borrow().get(remote) {
            Some(content) => {
                std::fs::write(local, content)?;
                Ok(())
            }
            None if ignore_failure => Ok(()),
            None => Err(anyhow!("no such remote file: {remote}")),
        }
    }
}

fn unquote(path: &str) -> String {
    path.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .map_or_else(|| path.to_string(), |inner| inner.replace(r"'\''", "'"))
}

/// Reporter that records messages and answers questions with a fixed value.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) answer: bool,
    warns: RefCell<Vec<String>>,
    questions: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub(crate) fn answering(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.warns.borrow().clone()
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, _message: &str) {}

    fn warn(&self, message: &str) {
        self.warns.borrow_mut().push(message.to_string());
    }

    fn ask(&self, question: &str, _default: bool) -> bool {
        self.questions.borrow_mut().push(question.to_string());
        self.answer
    }
}
