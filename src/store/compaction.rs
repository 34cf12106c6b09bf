use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use super::keydir::Keydir;
use super::manager::SegmentManager;
use super::store::Store;
use crate::error::{Error, Result};

const MERGE_DIR: &str = "merge_tmp";

/// Runs one compaction pass: rewrites the live records of every sealed
/// segment into fresh segments under `merge_tmp/`, then commits the result
/// under the store write lock. Only one pass runs at a time.
pub(super) fn run(store: &Store) -> Result<()> {
    let _guard = match MergeGuard::acquire(&store.is_merging) {
        Some(guard) => guard,
        None => return Err(Error::MergeInProgress),
    };
    merge(store)
}

/// Clears the merge flag on exit, success or failure.
struct MergeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> MergeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn merge(store: &Store) -> Result<()> {
    let manager = store
        .segment_manager
        .as_ref()
        .ok_or_else(|| Error::Io("store is not initialized".to_string()))?;

    let targets = manager.inactive_segment_ids()?;
    if targets.is_empty() {
        tracing::info!("no inactive segments to compact");
        return Ok(());
    }

    tracing::info!(segments = ?targets, "starting compaction");

    // Fresh workspace; a leftover from an aborted pass is discarded.
    let tmp_dir = store.base_path.join(MERGE_DIR);
    let _ = fs::remove_dir_all(&tmp_dir);

    let merge_manager = SegmentManager::new(&tmp_dir, &store.config)?;
    let merge_keydir = Keydir::new();
    let snap = store.keydir.snapshot()?;

    // Copy phase. No store lock is held: foreground writes proceed
    // concurrently and the commit below reconciles them.
    let mut copied = 0usize;
    for id in &targets {
        let segment = match manager.get_segment(*id)? {
            Some(segment) => segment,
            None => continue,
        };

        let size = segment.size();
        let mut pos = 0;
        while pos < size {
            let record = segment.read(pos)?;
            let old_offset = pos;
            pos += record.size() as u64; // advance before any branch below

            if record.is_tombstone() {
                continue;
            }

            let key = String::from_utf8_lossy(&record.key).into_owned();
            let snapped = match snap.get(&key) {
                Some(entry) => entry,
                None => continue,
            };
            if snapped.segment_id != *id || snapped.value_pos != old_offset {
                // Not the live version at snapshot time.
                continue;
            }

            let (new_id, new_offset) = merge_manager.append(&record)?;
            merge_keydir.put(key, new_id, new_offset, record.size() as u32, record.timestamp)?;
            copied += 1;
        }
    }

    // Merged files must be durable before the originals go away.
    merge_manager.flush_all()?;

    // Commit: short stop-the-world window. Delete the originals, move the
    // merged files into the data directory, and relocate keydir entries that
    // foreground writes have not superseded.
    let _guard = store.lock.write()?;

    for id in &targets {
        manager.delete_segment(*id)?;
    }

    manager.absorb(merge_manager)?;
    store.keydir.merge_from(&merge_keydir, &snap)?;

    tracing::info!(segments = targets.len(), records = copied, "compaction complete");

    Ok(())
}
