#![forbid(unsafe_code)]
//! capstan-lock library.
//!
//! Coordinates concurrent operators over a remote node's own filesystem:
//! an exclusive *hard* lock wrapping a whole apply run, and advisory,
//! expiring, operation-scoped *soft* locks. The remote side is reached
//! only through the opaque [`node::Node`] capability — no transport lives
//! here.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums mapped to `capstan_core::ErrorCode`.
//! - **Logging**: `tracing` macros; operator-facing messages go through the
//!   injected `capstan_core::report::Reporter`.

pub mod hard;
pub mod node;
pub mod soft;

#[cfg(test)]
pub(crate) mod testing;

pub use hard::{HardLock, HardLockGuard, HardLockOptions, HolderInfo};
pub use node::{CommandResult, Node};
pub use soft::{SoftLock, SoftLockRegistry};
