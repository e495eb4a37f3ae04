//! The append-only, one-file-per-event log.
//!
//! Each event lives in its own file named by zero-padded sequence number
//! (`000001`, `000002`, ...). File contents are the canonical serialisation
//! of the event. Appends happen under the write lock; loads are lock-free
//! and return events in sequence order.

use entity_types::codec;
use entity_types::error::StorageError;
use entity_types::event::Event;
use entity_types::EVENT_FILE_WIDTH;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle on an entity's event directory.
#[derive(Clone, Debug)]
pub struct EventLog {
    dir: PathBuf,
}

impl EventLog {
    /// Opens the log at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The event directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The zero-padded file name for a sequence number.
    pub fn file_name(seq: u64) -> String {
        format!("{seq:0width$}", width = EVENT_FILE_WIDTH)
    }

    fn event_path(&self, seq: u64) -> PathBuf {
        self.dir.join(Self::file_name(seq))
    }

    /// Sequence numbers present on disk, ascending.
    fn sequences(&self) -> Result<Vec<u64>, StorageError> {
        let mut seqs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // The lock file and any temp droppings are not events.
            if let Ok(seq) = name.parse::<u64>() {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    /// Reads a single event by sequence number.
    pub fn read(&self, seq: u64) -> Result<Event, StorageError> {
        let path = self.event_path(seq);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::Corrupt(format!("missing event file {}", Self::file_name(seq)))
            } else {
                StorageError::Io(e)
            }
        })?;
        let event: Event = codec::from_json_bytes(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("event {seq}: {e}")))?;
        if event.seq != seq {
            return Err(StorageError::Corrupt(format!(
                "event file {} claims sequence {}",
                Self::file_name(seq),
                event.seq
            )));
        }
        Ok(event)
    }

    /// Loads all events in sequence order. Lock-free.
    pub fn load(&self) -> Result<Vec<Event>, StorageError> {
        let seqs = self.sequences()?;
        let mut events = Vec::with_capacity(seqs.len());
        for seq in seqs {
            events.push(self.read(seq)?);
        }
        Ok(events)
    }

    /// The last sequence number and event hash, without loading the full log.
    pub fn head(&self) -> Result<Option<(u64, String)>, StorageError> {
        let Some(last) = self.sequences()?.into_iter().next_back() else {
            return Ok(None);
        };
        let event = self.read(last)?;
        Ok(Some((event.seq, event.hash)))
    }

    /// Appends an event. The caller must hold the write lock and must have
    /// derived `event.seq` and `event.prev_hash` from [`EventLog::head`]
    /// inside the same critical section.
    pub fn append(&self, event: &Event) -> Result<(), StorageError> {
        let path = self.event_path(event.seq);
        let bytes = codec::canonical_bytes(event)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::Corrupt(format!(
                        "event file {} already exists",
                        Self::file_name(event.seq)
                    ))
                } else {
                    StorageError::Io(e)
                }
            })?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        tracing::debug!(target: "storage", seq = event.seq, "appended event");
        Ok(())
    }
}
