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

//! Durable storage for the entity kernel: the one-file-per-event log, the
//! advisory write lock that serialises every mutation, the derived state
//! cache, and the organization fingerprint.
//!
//! The event log exclusively owns history. The state file is a cache the
//! write path refreshes inside the same critical section that appends the
//! event, so readers never observe a state ahead of the log.

/// The derived state cache (`state/current.json`).
pub mod cache;
/// The organization fingerprint over the immutable specification documents.
pub mod fingerprint;
/// The exclusive-write advisory lock with stale-holder eviction.
pub mod lock;
/// The append-only, one-file-per-event log.
pub mod log;

pub use cache::StateCache;
pub use fingerprint::fingerprint_spec_dir;
pub use lock::LogLock;
pub use log::EventLog;
