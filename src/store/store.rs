use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::compaction;
use super::keydir::Keydir;
use super::manager::SegmentManager;
use super::record::Record;
use super::segment::Segment;
use super::tasks::CompactionTask;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flock::FileLock;
use crate::scheduler::Scheduler;

const LOCK_FILE: &str = "emberdb.lock";

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_keys: usize,
    pub total_value_bytes: u64,
    pub segment_count: usize,
}

/// A Bitcask-style append-only log key-value store.
///
/// Writes append a record to the active segment and update the in-memory
/// keydir; reads resolve the keydir entry and fetch the record from its
/// segment. A background compaction pass periodically rewrites live records
/// out of sealed segments and deletes the originals.
pub struct Store {
    pub(super) base_path: PathBuf,
    pub(super) config: Config,
    /// Coordinates segment manager + keydir mutation. Readers of the pair
    /// take the read half; Set/Delete/Close and the compaction commit window
    /// take the write half.
    pub(super) lock: RwLock<()>,
    pub(super) segment_manager: Option<SegmentManager>,
    pub(super) keydir: Keydir,
    pub(super) is_merging: AtomicBool,
    scheduler: Scheduler,
    flock: Mutex<Option<FileLock>>,
}

impl Store {
    /// Opens a store over `config.data_dir`, replaying existing segments into
    /// the keydir and starting the periodic compaction task.
    ///
    /// When the segment manager cannot be constructed the store degrades:
    /// writes fail and reads return not-found. A replay failure aborts the
    /// open.
    pub fn open(config: Config) -> Result<Arc<Self>> {
        let base_path = config.data_dir.clone();

        if let Err(e) = fs::create_dir_all(&base_path) {
            tracing::warn!(path = %base_path.display(), error = %e, "could not create data directory");
        }

        let flock = FileLock::lock(base_path.join(LOCK_FILE))?;

        let segment_manager = match SegmentManager::new(&base_path, &config) {
            Ok(manager) => Some(manager),
            Err(e) => {
                tracing::warn!(path = %base_path.display(), error = %e, "could not initialize segment manager");
                None
            }
        };

        let store = Self {
            base_path,
            config,
            lock: RwLock::new(()),
            segment_manager,
            keydir: Keydir::new(),
            is_merging: AtomicBool::new(false),
            scheduler: Scheduler::new(),
            flock: Mutex::new(Some(flock)),
        };

        if store.segment_manager.is_none() {
            // Degraded: no replay and no background compaction.
            return Ok(Arc::new(store));
        }

        store.replay()?;

        let store = Arc::new(store);
        store.scheduler.register(Arc::new(CompactionTask::new(
            Arc::downgrade(&store),
            store.config.merge_interval,
        )));

        Ok(store)
    }

    /// Rebuilds the keydir by replaying every segment in ascending id order,
    /// so newer segments overwrite older ones.
    fn replay(&self) -> Result<()> {
        let manager = self
            .segment_manager
            .as_ref()
            .ok_or_else(|| Error::Io("segment manager is not initialized".to_string()))?;

        for id in manager.segment_ids()? {
            let segment = match manager.get_segment(id)? {
                Some(segment) => segment,
                None => continue,
            };
            self.replay_segment(&segment)?;
        }

        Ok(())
    }

    fn replay_segment(&self, segment: &Segment) -> Result<()> {
        let size = segment.size();
        let mut pos = 0;

        while pos < size {
            let record = segment.read(pos)?;
            let key = String::from_utf8_lossy(&record.key).into_owned();

            if record.is_tombstone() {
                self.keydir.delete(&key)?;
            } else {
                self.keydir
                    .put(key, segment.id(), pos, record.value_size(), record.timestamp)?;
            }

            pos += record.size() as u64;
        }

        Ok(())
    }

    /// Retrieves the value for a key.
    ///
    /// A degraded store reports `KeyNotFound` here because its keydir is
    /// empty; a keydir hit without a segment manager is an internal error,
    /// not a missing key.
    pub fn get(&self, key: &str) -> Result<String> {
        let _guard = self.lock.read()?;

        let entry = self.keydir.get(key).ok_or(Error::KeyNotFound)?;
        let manager = self
            .segment_manager
            .as_ref()
            .ok_or_else(|| Error::Io("store is not initialized".to_string()))?;

        let record = manager.read(entry.segment_id, entry.value_pos)?;
        let value = record.value.unwrap_or_default();
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    /// Stores a key-value pair.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.write()?;

        let manager = self
            .segment_manager
            .as_ref()
            .ok_or_else(|| Error::Io("store is not initialized".to_string()))?;

        let record = Record::put(key, value);
        let (segment_id, offset) = manager.append(&record)?;
        self.keydir
            .put(key, segment_id, offset, record.value_size(), record.timestamp)?;

        Ok(())
    }

    /// Removes a key by appending a tombstone record.
    pub fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.write()?;

        let manager = self
            .segment_manager
            .as_ref()
            .ok_or_else(|| Error::Io("store is not initialized".to_string()))?;

        if self.keydir.get(key).is_none() {
            return Err(Error::KeyNotFound);
        }

        manager.append(&Record::tombstone(key))?;
        self.keydir.delete(key)?;

        Ok(())
    }

    /// All live keys, in unspecified order.
    pub fn list(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read()?;
        self.keydir.list()
    }

    pub fn stats(&self) -> Result<Stats> {
        let _guard = self.lock.read()?;

        let (total_keys, total_value_bytes) = self.keydir.stats()?;
        let segment_count = match &self.segment_manager {
            Some(manager) => manager.segment_ids()?.len(),
            None => 0,
        };

        Ok(Stats {
            total_keys,
            total_value_bytes,
            segment_count,
        })
    }

    /// Runs one compaction pass over the sealed segments. Returns
    /// `MergeInProgress` when another pass is already running.
    pub fn merge(&self) -> Result<()> {
        compaction::run(self)
    }

    /// Stops the background compaction task, closes all segments, and
    /// releases the directory lock.
    pub fn close(&self) -> Result<()> {
        self.scheduler.shutdown();

        let _guard = self.lock.write()?;

        if let Some(manager) = &self.segment_manager {
            manager.close()?;
        }

        self.flock.lock()?.take();

        Ok(())
    }
}
