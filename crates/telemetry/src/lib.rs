#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Entity Kernel Telemetry
//!
//! Structured-logging initialization for the entity kernel. Every component
//! logs through `tracing` with a module target; this crate wires the global
//! subscriber.

/// The initialization routine for global structured logging.
pub mod init;

pub use init::{init_tracing, init_tracing_with, LogFormat};
