#![forbid(unsafe_code)]

//! The sense-making agent of the entity kernel.
//!
//! A periodic control loop that reads state through the StateManager, runs
//! pure verification, classifies the situation into a feeling, responds
//! through a strict constitutional priority hierarchy augmented by active
//! inference and cycle-memory learning, adapts its own parameters
//! (ultrastability), and records every acting cycle as an atomic event.
//!
//! Three seals bound what the loop may do to itself: generated operations
//! pass a quarantine lifecycle before the policy may select them, cycle
//! context separates observation from action so audits never teach the
//! system, and specialization can only restrict, never escalate.

/// The agent itself and its cycle engine.
pub mod agent;
/// Cycle-context derivation (test / audit / production).
pub mod context;
/// The FEEL phase.
pub mod feeling;
/// Active inference action selection.
pub mod inference;
/// The bounded cycle-memory window.
pub mod memory;
/// Ultrastability parameter adaptation.
pub mod ultrastability;

pub use agent::{Agent, CycleOutcome};
pub use context::CycleContext;
pub use feeling::Feeling;
