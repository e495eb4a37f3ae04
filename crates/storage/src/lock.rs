//! The exclusive-write advisory lock.
//!
//! A single lock file under the event directory guards every write. A holder
//! record `{holder_id, timestamp}` goes into the file on acquisition; a
//! holder whose timestamp is older than the acquisition budget is presumed
//! dead and evicted. Waiters spin at a fixed poll interval until the budget
//! runs out.

use chrono::{DateTime, Utc};
use entity_types::error::StorageError;
use entity_types::{LOCK_POLL_MS, LOCK_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// The holder record stored inside the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    holder_id: String,
    timestamp: DateTime<Utc>,
}

/// An acquired write lock; released on drop.
#[derive(Debug)]
pub struct LogLock {
    path: PathBuf,
    holder_id: String,
}

impl LogLock {
    /// Acquires the lock at `path`, waiting up to the acquisition budget.
    ///
    /// A stale holder (timestamp older than the budget) is evicted and the
    /// acquisition retried. An unreadable lock file counts as stale: the
    /// previous holder died mid-write.
    pub fn acquire(path: impl Into<PathBuf>, holder_id: &str) -> Result<Self, StorageError> {
        let path = path.into();
        let budget = Duration::from_millis(LOCK_TIMEOUT_MS);
        let poll = Duration::from_millis(LOCK_POLL_MS);
        let started = std::time::Instant::now();

        loop {
            match Self::try_create(&path, holder_id) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::holder_is_stale(&path) {
                        tracing::warn!(target: "storage", lock = %path.display(), "evicting stale lock holder");
                        // Best effort: a concurrent evictor may have won the race.
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                }
                Err(e) => return Err(StorageError::Io(e)),
            }

            if started.elapsed() >= budget {
                return Err(StorageError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            std::thread::sleep(poll);
        }
    }

    fn try_create(path: &PathBuf, holder_id: &str) -> Result<Self, std::io::Error> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let holder = LockHolder {
            holder_id: holder_id.to_string(),
            timestamp: Utc::now(),
        };
        // Serialization of this two-field record cannot fail; fall back to an
        // empty body (treated as stale) rather than poisoning the lock path.
        let body = serde_json::to_vec(&holder).unwrap_or_default();
        file.write_all(&body)?;
        file.sync_data()?;
        Ok(Self {
            path: path.clone(),
            holder_id: holder_id.to_string(),
        })
    }

    fn holder_is_stale(path: &PathBuf) -> bool {
        let Ok(bytes) = fs::read(path) else {
            // Gone already; the next create attempt decides.
            return false;
        };
        let Ok(holder) = serde_json::from_slice::<LockHolder>(&bytes) else {
            return true;
        };
        let age = Utc::now().signed_duration_since(holder.timestamp);
        age.num_milliseconds() >= LOCK_TIMEOUT_MS as i64
    }

    /// The identifier this lock was acquired with.
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

impl Drop for LogLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(target: "storage", lock = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}
