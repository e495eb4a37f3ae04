//! The derived state cache (`state/current.json`).
//!
//! The cache exists so reads never replay the full log. It is authoritative
//! on reads but always rebuildable: the event log remains the canonical
//! source. Writes go through a temp-file-and-rename so a crash mid-write
//! leaves the previous cache intact.

use entity_types::codec;
use entity_types::error::StorageError;
use entity_types::state::State;
use std::fs;
use std::path::{Path, PathBuf};

/// Handle on an entity's state cache file.
#[derive(Clone, Debug)]
pub struct StateCache {
    path: PathBuf,
}

impl StateCache {
    /// Creates a handle on the cache at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// The cache file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a cached state exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the cached state.
    pub fn read(&self) -> Result<State, StorageError> {
        let bytes = fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotInstantiated(self.path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        codec::from_json_bytes(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("state cache: {e}")))
    }

    /// Writes the state atomically (temp file, fsync, rename).
    pub fn write(&self, state: &State) -> Result<(), StorageError> {
        let bytes = codec::canonical_bytes(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        let file = fs::OpenOptions::new().write(true).open(&tmp)?;
        file.sync_data()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample_state() -> State {
        State::genesis(
            "entity/1.0".into(),
            "abc123".into(),
            "operator".into(),
            Some("aria".into()),
            Utc::now(),
        )
    }

    #[test]
    fn write_read_round_trip() {
        let dir = tempdir().unwrap();
        let cache = StateCache::open(dir.path().join("state").join("current.json")).unwrap();
        assert!(!cache.exists());

        let state = sample_state();
        cache.write(&state).unwrap();
        assert!(cache.exists());
        assert_eq!(cache.read().unwrap(), state);
    }

    #[test]
    fn missing_cache_reports_not_instantiated() {
        let dir = tempdir().unwrap();
        let cache = StateCache::open(dir.path().join("state").join("current.json")).unwrap();
        assert!(matches!(
            cache.read(),
            Err(StorageError::NotInstantiated(_))
        ));
    }

    #[test]
    fn malformed_cache_reports_corrupt() {
        let dir = tempdir().unwrap();
        let cache = StateCache::open(dir.path().join("state").join("current.json")).unwrap();
        fs::write(cache.path(), b"{not json").unwrap();
        assert!(matches!(cache.read(), Err(StorageError::Corrupt(_))));
    }
}
