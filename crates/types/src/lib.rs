#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Entity Kernel Types
//!
//! This crate is the foundational library for the entity kernel, containing
//! all core data structures, error types, and configuration objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `entity-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `Event`, `State`, `OperationSpec`, and the error
//! enums.

/// Maximum generation depth for specialized operations.
pub const MAX_GENERATION_DEPTH: u32 = 5;
/// Hard cap on the number of operations the agent may self-produce.
pub const SELF_PRODUCTION_CAP: usize = 10;
/// Energy debited when a coupling session starts.
pub const SESSION_DECAY: f64 = 0.05;
/// Budget for acquiring the event-log write lock, in milliseconds.
pub const LOCK_TIMEOUT_MS: u64 = 5_000;
/// Poll interval while waiting on the event-log write lock, in milliseconds.
pub const LOCK_POLL_MS: u64 = 50;
/// Width of zero-padded event file names (`000001`, `000002`, ...).
pub const EVENT_FILE_WIDTH: usize = 6;

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::KernelError> = std::result::Result<T, E>;

/// Chain-link verification over an ordered event sequence.
pub mod chain;
/// The canonical JSON codec and SHA-256 content identity.
pub mod codec;
/// Shared configuration structures and the on-disk path layout.
pub mod config;
/// Error types used across the workspace.
pub mod error;
/// The append-only event record and its closed kind set.
pub mod event;
/// Operation definitions, generated-operation lifecycle, and outcomes.
pub mod ops;
/// The derived state record and its sub-blocks.
pub mod state;
