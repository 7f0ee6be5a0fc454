#![forbid(unsafe_code)]
//! capstan-core library.
//!
//! Item model, dependency-ordered scheduling, and the shared run plumbing
//! (identity, durations, config, reporting) used by the lock layer.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per concern, each mapped to a stable
//!   [`error::ErrorCode`] with an optional remediation hint.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`,
//!   `trace!`). User-facing messages and interactive questions go through an
//!   injected [`report::Reporter`], never a global.

pub mod config;
pub mod duration;
pub mod error;
pub mod graph;
pub mod identity;
pub mod item;
pub mod queue;
pub mod report;

pub use error::ErrorCode;
pub use graph::{DependencyGraph, GraphError};
pub use item::{Item, ItemId};
pub use queue::{ItemQueue, QueuedItem};
