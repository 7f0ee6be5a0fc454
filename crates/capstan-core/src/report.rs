//! Run-scoped reporting and interactive decisions.
//!
//! The scheduler and lock components never own a global output handle;
//! instead a [`Reporter`] is injected per run. This keeps user-facing
//! output testable and lets non-interactive contexts (CI, agents) answer
//! questions deterministically.

use tracing::{info, warn};

/// Sink for user-facing messages and interactive questions.
pub trait Reporter {
    /// Informational progress message.
    fn info(&self, message: &str);

    /// Non-fatal problem the operator should see.
    fn warn(&self, message: &str);

    /// Ask a yes/no question. Non-interactive implementations return
    /// `default` without blocking.
    fn ask(&self, question: &str, default: bool) -> bool;
}

/// Reporter backed by `tracing`; never prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn ask(&self, question: &str, default: bool) -> bool {
        info!(answer = default, "non-interactive, auto-answering: {question}");
        default
    }
}
