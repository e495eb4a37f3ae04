//! Genesis bootstrap.
//!
//! Instantiation is the one moment an external caller writes history
//! directly: it fingerprints the immutable specification documents, records
//! the fingerprint, and appends the GENESIS event through the same atomic
//! write path every later event uses.

use crate::manager::StateManager;
use crate::replay;
use entity_storage::fingerprint::{fingerprint_spec_dir, write_recorded_fingerprint};
use entity_types::config::EntityPaths;
use entity_types::error::{StateError, StorageError};
use entity_types::event::{EventKind, GenesisData};
use entity_types::state::State;

/// Current log format version written into GENESIS.
pub const LOG_VERSION: u32 = 1;

/// Instantiates a fresh entity at `paths`.
///
/// The base directory must contain a populated `spec/` directory and no
/// prior events. Returns the initial state.
pub fn instantiate(
    paths: &EntityPaths,
    specification: &str,
    instantiated_by: &str,
    name: Option<&str>,
) -> Result<State, StateError> {
    let spec_dir = paths.spec_dir();
    if !spec_dir.is_dir() {
        return Err(StateError::Storage(StorageError::NotInstantiated(format!(
            "missing specification directory {}",
            spec_dir.display()
        ))));
    }

    let manager = StateManager::open(paths.clone())?;
    if !manager.events().map_err(StateError::Storage)?.is_empty() {
        return Err(StateError::Storage(StorageError::AlreadyInstantiated(
            paths.base().display().to_string(),
        )));
    }

    let organization_hash = fingerprint_spec_dir(&spec_dir).map_err(StateError::Storage)?;
    write_recorded_fingerprint(&paths.organization_file(), &organization_hash)
        .map_err(StateError::Storage)?;

    let data = GenesisData {
        version: LOG_VERSION,
        specification: specification.to_string(),
        organization_hash,
        instantiated_by: instantiated_by.to_string(),
        name: name.map(str::to_string),
    };
    let (state, event) = manager.append_event(
        EventKind::Genesis,
        serde_json::to_value(&data).map_err(|e| StateError::MalformedPayload {
            seq: 1,
            detail: e.to_string(),
        })?,
    )?;
    tracing::info!(target: "state", hash = %event.hash, "entity instantiated");
    Ok(state)
}

/// Opens a manager over an instantiated entity, verifying the cache exists
/// and replaying if it was lost.
pub fn open_existing(paths: &EntityPaths) -> Result<StateManager, StateError> {
    let manager = StateManager::open(paths.clone())?;
    match manager.read_state() {
        Ok(_) => Ok(manager),
        Err(StateError::Storage(StorageError::NotInstantiated(_))) => {
            let events = manager.events().map_err(StateError::Storage)?;
            if events.is_empty() {
                return Err(StateError::Storage(StorageError::NotInstantiated(
                    paths.base().display().to_string(),
                )));
            }
            // The log survived but the cache did not; replay restores it.
            replay::replay(&events)?;
            manager.rebuild_from_replay()?;
            Ok(manager)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn prepared_paths(dir: &std::path::Path) -> EntityPaths {
        let paths = EntityPaths::new(dir);
        std::fs::create_dir_all(paths.spec_dir()).unwrap();
        std::fs::write(paths.spec_dir().join("01-identity.md"), b"# Test Spec").unwrap();
        paths
    }

    #[test]
    fn instantiate_writes_genesis_and_fingerprint() {
        let dir = tempdir().unwrap();
        let paths = prepared_paths(dir.path());

        let state = instantiate(&paths, "entity/1.0", "operator", Some("aria")).unwrap();
        assert_eq!(state.memory.event_count, 1);
        assert_eq!(state.identity.name.as_deref(), Some("aria"));
        assert!(paths.organization_file().exists());

        let recorded =
            entity_storage::fingerprint::read_recorded_fingerprint(&paths.organization_file())
                .unwrap();
        assert_eq!(recorded, state.organization_hash);
    }

    #[test]
    fn double_instantiation_is_refused() {
        let dir = tempdir().unwrap();
        let paths = prepared_paths(dir.path());
        instantiate(&paths, "entity/1.0", "operator", None).unwrap();
        assert!(matches!(
            instantiate(&paths, "entity/1.0", "operator", None),
            Err(StateError::Storage(StorageError::AlreadyInstantiated(_)))
        ));
    }

    #[test]
    fn open_existing_restores_a_lost_cache() {
        let dir = tempdir().unwrap();
        let paths = prepared_paths(dir.path());
        let state = instantiate(&paths, "entity/1.0", "operator", None).unwrap();

        std::fs::remove_file(paths.state_file()).unwrap();
        let manager = open_existing(&paths).unwrap();
        let restored = manager.read_state().unwrap();
        assert_eq!(restored.memory.last_event_hash, state.memory.last_event_hash);
    }
}
