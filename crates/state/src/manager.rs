//! The atomic `(append event + apply state)` write path.
//!
//! Every state-mutating path in the system enters through this type. The
//! event-log lock is held across sequence assignment, event write, state
//! computation, and cache write; releasing earlier would expose a window
//! where `replay(events) ≠ state`.

use crate::replay::{apply_event, replay};
use chrono::Utc;
use entity_storage::{EventLog, LogLock, StateCache};
use entity_types::config::EntityPaths;
use entity_types::error::{StateError, StorageError};
use entity_types::event::{Event, EventKind};
use entity_types::state::State;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// The exclusive owner of the write path.
///
/// Readers never take the durable lock; they observe the in-process cached
/// state, which may trail the latest commit by at most one write.
pub struct StateManager {
    paths: EntityPaths,
    log: EventLog,
    cache: StateCache,
    holder_id: String,
    // Invalidated (replaced) on every committed write.
    cached: Mutex<Option<State>>,
}

impl StateManager {
    /// Opens the manager over an existing entity directory.
    pub fn open(paths: EntityPaths) -> Result<Self, StateError> {
        let log = EventLog::open(paths.events_dir()).map_err(StateError::Storage)?;
        let cache = StateCache::open(paths.state_file()).map_err(StateError::Storage)?;
        let holder_id = format!("entity-{}", std::process::id());
        Ok(Self {
            paths,
            log,
            cache,
            holder_id,
            cached: Mutex::new(None),
        })
    }

    /// The on-disk layout this manager operates on.
    pub fn paths(&self) -> &EntityPaths {
        &self.paths
    }

    /// Loads the full event list, in order. Lock-free.
    pub fn events(&self) -> Result<Vec<Event>, StorageError> {
        self.log.load()
    }

    /// Reads the current state. Lock-free; at most one commit behind.
    pub fn read_state(&self) -> Result<State, StateError> {
        if let Some(state) = self.cached.lock().clone() {
            return Ok(state);
        }
        let state = self.cache.read().map_err(StateError::Storage)?;
        *self.cached.lock() = Some(state.clone());
        Ok(state)
    }

    /// Atomically appends an event and applies its state transition.
    ///
    /// Under the lock: read the head, build the next event (sequence and
    /// link assigned inside the critical section), run the replay applier,
    /// write the event file, write the state cache, release. Returns the
    /// committed state and event.
    pub fn append_event(&self, kind: EventKind, data: Value) -> Result<(State, Event), StateError> {
        let _lock = LogLock::acquire(self.paths.lock_file(), &self.holder_id)
            .map_err(StateError::Storage)?;

        let head = self.log.head().map_err(StateError::Storage)?;
        let prior = match &head {
            Some(_) => {
                let state = self.cache.read().map_err(StateError::Storage)?;
                if state.integrity.status.refuses_mutation() {
                    return Err(StateError::Terminal);
                }
                self.guard_disturbance(&state, &kind, &data)?;
                Some(state)
            }
            None => None,
        };

        let (seq, prev_hash) = match head {
            Some((seq, hash)) => (seq + 1, Some(hash)),
            None => (1, None),
        };
        let event = Event::build(seq, kind, Utc::now(), data, prev_hash)?;
        let state = apply_event(prior, &event)?;

        self.log.append(&event).map_err(StateError::Storage)?;
        self.cache.write(&state).map_err(StateError::Storage)?;
        *self.cached.lock() = Some(state.clone());

        tracing::debug!(target: "state", seq = event.seq, kind = ?event.kind, "committed event");
        Ok((state, event))
    }

    /// Blocks a STATE_UPDATE whose Lyapunov increase exceeds the admissible
    /// disturbance capacity (the current energy level).
    fn guard_disturbance(
        &self,
        state: &State,
        kind: &EventKind,
        data: &Value,
    ) -> Result<(), StateError> {
        if *kind != EventKind::StateUpdate {
            return Ok(());
        }
        let Some(new_v) = data.get("lyapunov").and_then(Value::as_f64) else {
            return Ok(());
        };
        let delta = new_v - state.lyapunov.v;
        if delta > 0.0 && delta > state.energy.current {
            return Err(StateError::DisturbanceRejected {
                delta,
                capacity: state.energy.current,
            });
        }
        Ok(())
    }

    /// Rebuilds the state cache from full replay, under the lock.
    ///
    /// This is the recovery primitive for a replay mismatch; it is the only
    /// write that does not append an event, because it restores the cache to
    /// what the log already says.
    pub fn rebuild_from_replay(&self) -> Result<State, StateError> {
        let _lock = LogLock::acquire(self.paths.lock_file(), &self.holder_id)
            .map_err(StateError::Storage)?;
        let events = self.log.load().map_err(StateError::Storage)?;
        let state = replay(&events)?;
        self.cache.write(&state).map_err(StateError::Storage)?;
        *self.cached.lock() = Some(state.clone());
        tracing::info!(target: "state", events = events.len(), "state cache rebuilt from replay");
        Ok(state)
    }

    /// Drops the in-process cached state so the next read hits the disk
    /// cache. Used by tests and by callers that tampered with the directory.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Replaces the cache with a state that must match the current log head.
    ///
    /// Snapshot restore uses this: the log stays authoritative, so a bundle
    /// may only repair the cache, never rewind history.
    pub(crate) fn restore_cache_checked(&self, state: State) -> Result<State, StateError> {
        let _lock = LogLock::acquire(self.paths.lock_file(), &self.holder_id)
            .map_err(StateError::Storage)?;
        let head = self.log.head().map_err(StateError::Storage)?;
        let matches_head = match &head {
            Some((seq, hash)) => {
                state.memory.event_count == *seq
                    && state.memory.last_event_hash.as_deref() == Some(hash.as_str())
            }
            None => false,
        };
        if !matches_head {
            return Err(StateError::ReplayMismatch {
                field: "memory.last_event_hash",
            });
        }
        self.cache.write(&state).map_err(StateError::Storage)?;
        *self.cached.lock() = Some(state.clone());
        Ok(state)
    }
}

/// A shared handle to a manager.
pub type SharedManager = Arc<StateManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;
    use serde_json::json;
    use tempfile::tempdir;

    fn instantiated_manager(dir: &std::path::Path) -> StateManager {
        let paths = EntityPaths::new(dir);
        std::fs::create_dir_all(paths.spec_dir()).unwrap();
        std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
        genesis::instantiate(&paths, "entity/1.0", "operator", Some("aria")).unwrap();
        StateManager::open(paths).unwrap()
    }

    #[test]
    fn append_updates_log_and_cache_atomically() {
        let dir = tempdir().unwrap();
        let manager = instantiated_manager(dir.path());

        let (state, event) = manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.7}))
            .unwrap();
        assert_eq!(event.seq, 2);
        assert_eq!(state.energy.current, 0.7);
        assert_eq!(state.memory.event_count, 2);

        // A subsequent read observes the committed effects.
        let read = manager.read_state().unwrap();
        assert_eq!(read, state);

        // And replay agrees with the cache.
        let replayed = replay(&manager.events().unwrap()).unwrap();
        assert_eq!(replayed.memory.last_event_hash, read.memory.last_event_hash);
        assert_eq!(replayed.memory.event_count, read.memory.event_count);
    }

    #[test]
    fn terminal_state_refuses_mutation() {
        let dir = tempdir().unwrap();
        let manager = instantiated_manager(dir.path());

        manager
            .append_event(
                EventKind::Verification,
                json!({
                    "passed": false,
                    "violations": ["INV-001"],
                    "status": "terminal",
                    "v": 0.4
                }),
            )
            .unwrap();

        let err = manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.5}))
            .unwrap_err();
        assert!(matches!(err, StateError::Terminal));
    }

    #[test]
    fn inadmissible_disturbance_is_blocked() {
        let dir = tempdir().unwrap();
        let manager = instantiated_manager(dir.path());

        // Drain energy so capacity is tiny, then try a huge V jump.
        manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.02}))
            .unwrap();
        let err = manager
            .append_event(EventKind::StateUpdate, json!({"lyapunov": 0.9}))
            .unwrap_err();
        assert!(matches!(err, StateError::DisturbanceRejected { .. }));

        // A decrease is always admissible.
        manager
            .append_event(EventKind::StateUpdate, json!({"lyapunov": 0.0}))
            .unwrap();
    }

    #[test]
    fn rebuild_restores_a_tampered_cache() {
        let dir = tempdir().unwrap();
        let manager = instantiated_manager(dir.path());
        manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.6}))
            .unwrap();

        // Corrupt the cache out-of-band.
        let mut broken = manager.read_state().unwrap();
        broken.memory.event_count = 999;
        StateCache::open(manager.paths().state_file())
            .unwrap()
            .write(&broken)
            .unwrap();
        manager.invalidate();
        assert_eq!(manager.read_state().unwrap().memory.event_count, 999);

        let rebuilt = manager.rebuild_from_replay().unwrap();
        assert_eq!(rebuilt.memory.event_count, 2);
        assert_eq!(rebuilt.energy.current, 0.6);
    }
}
