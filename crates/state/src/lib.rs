#![forbid(unsafe_code)]

//! State derivation and the atomic write path for the entity kernel.
//!
//! This crate owns the four pieces that make replay determinism an
//! enforceable invariant rather than a wish:
//!
//! - [`replay`]: the single event applier. Both the replay path and the
//!   in-place write path run the same function, so they cannot diverge.
//! - [`manager`]: the [`StateManager`](manager::StateManager), the only
//!   component allowed to append events or write the state cache, under the
//!   event-log lock.
//! - [`verifier`]: the five named invariant checks, in a pure
//!   (observation-only) and a logged (event-appending) variant.
//! - [`recovery`]: invariant-specific repair with terminal detection.

/// Genesis bootstrap for a fresh entity directory.
pub mod genesis;
/// The Lyapunov distance-from-attractor function.
pub mod lyapunov;
/// The atomic `(append event + apply state)` write path.
pub mod manager;
/// The recovery engine.
pub mod recovery;
/// The single event applier and full-log replay.
pub mod replay;
/// Snapshot bundles.
pub mod snapshot;
/// The invariant verifier.
pub mod verifier;

pub use manager::StateManager;
pub use replay::{apply_event, replay};
pub use verifier::{pure_verify, VerificationReport};
