//! Snapshot bundles.
//!
//! A snapshot pairs a SNAPSHOT event with a JSON bundle of the state as of
//! that event. Bundles live under `snapshots/` and exist for inspection and
//! cache repair; the event log stays authoritative, so a restore only ever
//! repairs the cache of the history the log already holds.

use crate::manager::StateManager;
use chrono::{DateTime, Utc};
use entity_types::chain::verify_chain;
use entity_types::error::{RecoveryError, StateError, StorageError};
use entity_types::event::{EventKind, SnapshotData};
use entity_types::state::State;
use serde::{Deserialize, Serialize};
use std::fs;

/// A snapshot bundle on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotBundle {
    /// Snapshot identifier (also the bundle file stem).
    pub id: String,
    /// Operator-supplied description.
    pub description: String,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Sequence number of the SNAPSHOT event itself.
    pub last_seq: u64,
    /// The state as of `last_seq`.
    pub state: State,
}

/// Summary row for listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot identifier.
    pub id: String,
    /// Operator-supplied description.
    pub description: String,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Sequence number of the SNAPSHOT event.
    pub last_seq: u64,
}

/// Takes a snapshot: appends the SNAPSHOT event and writes the bundle.
pub fn create(manager: &StateManager, description: &str) -> Result<SnapshotInfo, StateError> {
    let head = manager.read_state()?.memory.event_count;
    let id = format!("snap-{:06}", head + 1);
    let data = SnapshotData {
        id: id.clone(),
        description: description.to_string(),
    };
    let (state, event) = manager.append_event(
        EventKind::Snapshot,
        serde_json::to_value(&data).map_err(|e| StateError::MalformedPayload {
            seq: head + 1,
            detail: e.to_string(),
        })?,
    )?;

    let bundle = SnapshotBundle {
        id: id.clone(),
        description: description.to_string(),
        created_at: event.timestamp,
        last_seq: event.seq,
        state,
    };
    let dir = manager.paths().snapshots_dir();
    fs::create_dir_all(&dir).map_err(|e| StateError::Storage(StorageError::Io(e)))?;
    let bytes = entity_types::codec::to_json_pretty(&bundle)?;
    fs::write(dir.join(format!("{id}.json")), bytes)
        .map_err(|e| StateError::Storage(StorageError::Io(e)))?;

    tracing::info!(target: "snapshot", id = %id, seq = event.seq, "snapshot created");
    Ok(SnapshotInfo {
        id,
        description: bundle.description,
        created_at: bundle.created_at,
        last_seq: bundle.last_seq,
    })
}

/// Lists snapshot bundles, oldest first.
pub fn list(manager: &StateManager) -> Result<Vec<SnapshotInfo>, StateError> {
    let dir = manager.paths().snapshots_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut infos = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| StateError::Storage(StorageError::Io(e)))? {
        let entry = entry.map_err(|e| StateError::Storage(StorageError::Io(e)))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path).map_err(|e| StateError::Storage(StorageError::Io(e)))?;
        let bundle: SnapshotBundle = entity_types::codec::from_json_bytes(&bytes)
            .map_err(|e| StateError::Storage(StorageError::Corrupt(format!("snapshot: {e}"))))?;
        infos.push(SnapshotInfo {
            id: bundle.id,
            description: bundle.description,
            created_at: bundle.created_at,
            last_seq: bundle.last_seq,
        });
    }
    infos.sort_by_key(|i| i.last_seq);
    Ok(infos)
}

/// Restores the state cache from a bundle.
///
/// The restore refuses when the chain no longer verifies, and when the
/// bundle does not match the current log head: rewinding history through a
/// snapshot would fork the log.
pub fn restore(manager: &StateManager, id: &str) -> Result<State, RecoveryError> {
    let events = manager.events().map_err(StateError::Storage)?;
    verify_chain(&events).map_err(|e| {
        RecoveryError::ManualRequired(format!("chain does not verify; restore refused: {e}"))
    })?;

    let path = manager.paths().snapshots_dir().join(format!("{id}.json"));
    let bytes = fs::read(&path).map_err(|e| {
        RecoveryError::ManualRequired(format!("snapshot {id} unavailable: {e}"))
    })?;
    let bundle: SnapshotBundle = entity_types::codec::from_json_bytes(&bytes)
        .map_err(|e| RecoveryError::ManualRequired(format!("snapshot {id} corrupt: {e}")))?;

    let state = manager
        .restore_cache_checked(bundle.state)
        .map_err(|e| match e {
            StateError::ReplayMismatch { .. } => RecoveryError::ManualRequired(format!(
                "snapshot {id} does not match the log head; the log is authoritative"
            )),
            other => RecoveryError::State(other),
        })?;
    tracing::info!(target: "snapshot", id = %id, "state cache restored from snapshot");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;
    use entity_storage::StateCache;
    use entity_types::config::EntityPaths;
    use serde_json::json;
    use tempfile::tempdir;

    fn instantiated(dir: &std::path::Path) -> StateManager {
        let paths = EntityPaths::new(dir);
        std::fs::create_dir_all(paths.spec_dir()).unwrap();
        std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
        genesis::instantiate(&paths, "entity/1.0", "operator", None).unwrap();
        StateManager::open(paths).unwrap()
    }

    #[test]
    fn create_then_list() {
        let dir = tempdir().unwrap();
        let manager = instantiated(dir.path());

        let info = create(&manager, "first checkpoint").unwrap();
        assert_eq!(info.last_seq, 2);

        let listed = list(&manager).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, info.id);
        assert_eq!(listed[0].description, "first checkpoint");

        let state = manager.read_state().unwrap();
        assert!(state.memory.last_snapshot_at.is_some());
    }

    #[test]
    fn restore_repairs_the_cache_at_head() {
        let dir = tempdir().unwrap();
        let manager = instantiated(dir.path());
        let info = create(&manager, "checkpoint").unwrap();

        // Corrupt the cache, then restore from the bundle taken at head.
        let mut broken = manager.read_state().unwrap();
        broken.energy.current = 0.123;
        StateCache::open(manager.paths().state_file())
            .unwrap()
            .write(&broken)
            .unwrap();
        manager.invalidate();

        let restored = restore(&manager, &info.id).unwrap();
        assert_eq!(restored.energy.current, 1.0);
    }

    #[test]
    fn restore_refuses_a_stale_snapshot() {
        let dir = tempdir().unwrap();
        let manager = instantiated(dir.path());
        let info = create(&manager, "checkpoint").unwrap();

        // History moved on; the bundle no longer matches the head.
        manager
            .append_event(EventKind::StateUpdate, json!({"energy": 0.5}))
            .unwrap();
        assert!(matches!(
            restore(&manager, &info.id),
            Err(RecoveryError::ManualRequired(_))
        ));
    }

    #[test]
    fn restore_refuses_on_broken_chain() {
        let dir = tempdir().unwrap();
        let manager = instantiated(dir.path());
        let info = create(&manager, "checkpoint").unwrap();

        let path = manager.paths().events_dir().join("000002");
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("checkpoint", "tampered!!!")).unwrap();

        assert!(matches!(
            restore(&manager, &info.id),
            Err(RecoveryError::ManualRequired(_))
        ));
    }
}
