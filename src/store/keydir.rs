use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::Result;

/// Location of a key's latest record: segment id and the record's start
/// offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeydirEntry {
    pub segment_id: u64,
    pub value_pos: u64,
    pub value_size: u32,
    pub timestamp: u32,
    /// Stamp assigned on insertion, unique within the owning keydir. The
    /// conditional merge compares stamps to detect entries superseded since a
    /// snapshot; structural equality would not do, because timestamps have
    /// one-second resolution.
    version: u64,
}

/// In-memory hash index from key to the on-disk location of its latest
/// record.
pub struct Keydir {
    index: RwLock<HashMap<String, KeydirEntry>>,
    next_version: AtomicU64,
}

impl Keydir {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(0),
        }
    }

    /// Inserts or overwrites the entry for a key.
    pub fn put(
        &self,
        key: impl Into<String>,
        segment_id: u64,
        value_pos: u64,
        value_size: u32,
        timestamp: u32,
    ) -> Result<()> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        self.index.write()?.insert(
            key.into(),
            KeydirEntry {
                segment_id,
                value_pos,
                value_size,
                timestamp,
                version,
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<KeydirEntry> {
        self.index.read().ok()?.get(key).copied()
    }

    /// Removes a key. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.index.write()?.remove(key);
        Ok(())
    }

    /// All keys, in unspecified order.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.index.read()?.keys().cloned().collect())
    }

    /// Number of live keys and the sum of their value sizes.
    pub fn stats(&self) -> Result<(usize, u64)> {
        let index = self.index.read()?;
        let total_size = index.values().map(|e| u64::from(e.value_size)).sum();
        Ok((index.len(), total_size))
    }

    /// A shallow snapshot of the keydir, preserving entry version stamps.
    pub fn snapshot(&self) -> Result<Keydir> {
        let index = self.index.read()?.clone();
        Ok(Keydir {
            index: RwLock::new(index),
            next_version: AtomicU64::new(self.next_version.load(Ordering::SeqCst)),
        })
    }

    /// Applies relocated entries from `src`, but only for keys whose live
    /// entry is still the one captured in `snap`. A foreground write since
    /// the snapshot produced a fresh version stamp, so the comparison fails
    /// and the newer write wins; the relocated copy becomes unreachable
    /// garbage for a later compaction pass.
    pub fn merge_from(&self, src: &Keydir, snap: &Keydir) -> Result<()> {
        let src_index = src.index.read()?;
        let snap_index = snap.index.read()?;
        let mut index = self.index.write()?;

        for (key, entry) in src_index.iter() {
            let cur = match index.get(key) {
                Some(cur) => cur,
                None => continue,
            };
            let snapped = match snap_index.get(key) {
                Some(snapped) => snapped,
                None => continue,
            };
            if cur.version != snapped.version {
                continue;
            }

            // Re-stamp on insertion so stamps stay unique in this keydir.
            let mut relocated = *entry;
            relocated.version = self.next_version.fetch_add(1, Ordering::SeqCst);
            index.insert(key.clone(), relocated);
        }

        Ok(())
    }
}

impl Default for Keydir {
    fn default() -> Self {
        Self::new()
    }
}
