use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::record::Record;
use super::segment::Segment;
use crate::config::Config;
use crate::error::{Error, Result};

/// Owns the collection of segments in one directory, tracks the active
/// segment, and rotates to a fresh one when it fills up.
pub struct SegmentManager {
    base_path: PathBuf,
    max_segment_size: u64,
    max_segment_entries: usize,
    inner: RwLock<Inner>,
}

struct Inner {
    segments: HashMap<u64, Arc<Segment>>,
    /// 0 when no segment is active.
    active_id: u64,
    next_id: u64,
}

impl Inner {
    fn create_active_segment(
        &mut self,
        base_path: &Path,
        max_size: u64,
        max_entries: usize,
    ) -> Result<()> {
        let segment = Segment::create(self.next_id, base_path, max_size, max_entries)?;
        self.segments.insert(self.next_id, Arc::new(segment));
        self.active_id = self.next_id;
        self.next_id += 1;
        Ok(())
    }
}

impl SegmentManager {
    /// Opens the manager over `base_path`, discovering existing segment files
    /// and creating a fresh active segment when none of them is active.
    pub fn new(base_path: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let mut inner = Inner {
            segments: HashMap::new(),
            active_id: 0,
            next_id: 1,
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&base_path)? {
            let entry = entry?;
            let id = match parse_segment_id(&entry.file_name().to_string_lossy()) {
                Some(id) => id,
                None => continue, // not a segment file
            };

            let segment = Segment::open(
                id,
                &base_path,
                config.max_segment_size,
                config.max_segment_entries,
            )?;
            inner.segments.insert(id, Arc::new(segment));
            ids.push(id);

            if id >= inner.next_id {
                inner.next_id = id + 1;
            }
        }

        // Highest id wins if any discovered segment still reports active.
        // Opened segments are read-only, so this normally finds none.
        ids.sort_unstable();
        for id in ids.iter().rev() {
            if inner.segments[id].is_active() {
                inner.active_id = *id;
                break;
            }
        }

        if inner.active_id == 0 {
            inner.create_active_segment(
                &base_path,
                config.max_segment_size,
                config.max_segment_entries,
            )?;
        }

        Ok(Self {
            base_path,
            max_segment_size: config.max_segment_size,
            max_segment_entries: config.max_segment_entries,
            inner: RwLock::new(inner),
        })
    }

    /// Appends a record to the active segment, rotating to a new segment when
    /// the active one reports full. Returns the segment id and record offset.
    pub fn append(&self, record: &Record) -> Result<(u64, u64)> {
        let mut inner = self.inner.write()?;

        // Resolve the active segment from the map directly; a locking
        // accessor here would deadlock on the manager lock.
        let segment = active_segment(&inner)?;

        match segment.append(record) {
            Ok(offset) => Ok((segment.id(), offset)),
            Err(Error::SegmentFull) => {
                inner.create_active_segment(
                    &self.base_path,
                    self.max_segment_size,
                    self.max_segment_entries,
                )?;
                let segment = active_segment(&inner)?;
                let offset = segment.append(record)?;
                Ok((segment.id(), offset))
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the record at `offset` within segment `id`.
    pub fn read(&self, id: u64, offset: u64) -> Result<Record> {
        let inner = self.inner.read()?;
        let segment = inner.segments.get(&id).ok_or(Error::SegmentNotFound(id))?;
        segment.read(offset)
    }

    pub fn get_segment(&self, id: u64) -> Result<Option<Arc<Segment>>> {
        Ok(self.inner.read()?.segments.get(&id).cloned())
    }

    pub fn active_segment(&self) -> Result<Arc<Segment>> {
        let inner = self.inner.read()?;
        active_segment(&inner)
    }

    /// All segment ids, sorted ascending.
    pub fn segment_ids(&self) -> Result<Vec<u64>> {
        let inner = self.inner.read()?;
        let mut ids: Vec<u64> = inner.segments.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Ids of all sealed segments, sorted ascending.
    pub fn inactive_segment_ids(&self) -> Result<Vec<u64>> {
        let inner = self.inner.read()?;
        let mut ids: Vec<u64> = inner
            .segments
            .iter()
            .filter(|(_, segment)| !segment.is_active())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Removes a segment and unlinks its file. Unknown ids are a no-op.
    pub fn delete_segment(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.write()?;
        match inner.segments.remove(&id) {
            Some(segment) => segment.delete(),
            None => Ok(()),
        }
    }

    /// Adopts all segments from `src`, moving their files into this manager's
    /// directory. Adopted segments are sealed on the way in: they are inputs
    /// to the next compaction pass, never append targets. Sealing also keeps
    /// merge-space ids disjoint from live ids across passes, since every
    /// sealed segment is deleted before its id can be reused.
    pub fn absorb(&self, src: SegmentManager) -> Result<()> {
        let mut inner = self.inner.write()?;
        let src_inner = src.inner.into_inner()?;

        for (id, segment) in src_inner.segments {
            segment.seal()?;
            segment.relocate(&self.base_path)?;
            inner.segments.insert(id, segment);
        }

        Ok(())
    }

    /// Fsyncs every segment in the manager.
    pub fn flush_all(&self) -> Result<()> {
        let inner = self.inner.read()?;
        for segment in inner.segments.values() {
            segment.flush()?;
        }
        Ok(())
    }

    /// Closes every segment and resets the manager.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write()?;

        let mut last_err = None;
        for segment in inner.segments.values() {
            if let Err(e) = segment.close() {
                last_err = Some(e);
            }
        }

        inner.segments.clear();
        inner.active_id = 0;

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn active_segment(inner: &Inner) -> Result<Arc<Segment>> {
    if inner.active_id == 0 {
        return Err(Error::Io("no active segment".to_string()));
    }
    inner
        .segments
        .get(&inner.active_id)
        .cloned()
        .ok_or(Error::SegmentNotFound(inner.active_id))
}

/// Parses `segment_<n>.log` file names; `<n>` must be a positive integer.
fn parse_segment_id(file_name: &str) -> Option<u64> {
    let id = file_name
        .strip_prefix("segment_")?
        .strip_suffix(".log")?
        .parse::<u64>()
        .ok()?;
    if id == 0 {
        return None;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;

    fn small_config(dir: &TempDir) -> Config {
        Config::new(dir.path()).max_segment_entries(2)
    }

    #[test]
    fn test_new_creates_active_segment() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager =
            SegmentManager::new(dir.path(), &Config::new(dir.path())).expect("Failed to create");

        assert_eq!(manager.segment_ids().unwrap(), vec![1]);
        assert!(manager.active_segment().unwrap().is_active());
        assert!(dir.path().join("segment_1.log").exists());
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager =
            SegmentManager::new(dir.path(), &Config::new(dir.path())).expect("Failed to create");

        let record = Record::put("key1", "value1");
        let (segment_id, offset) = manager.append(&record).expect("Failed to append");

        assert_eq!(segment_id, 1);
        assert_eq!(offset, 0);
        assert_eq!(manager.read(segment_id, offset).expect("Failed to read"), record);
    }

    #[test]
    fn test_read_unknown_segment() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager =
            SegmentManager::new(dir.path(), &Config::new(dir.path())).expect("Failed to create");

        assert_eq!(manager.read(42, 0), Err(Error::SegmentNotFound(42)));
    }

    #[test]
    fn test_rotation_on_full_segment() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager = SegmentManager::new(dir.path(), &small_config(&dir)).expect("Failed to create");

        manager.append(&Record::put("a", "1")).expect("Failed to append");
        manager.append(&Record::put("b", "2")).expect("Failed to append");

        // Third append rotates: segment 1 seals itself, segment 2 takes over.
        let (segment_id, offset) = manager.append(&Record::put("c", "3")).expect("Failed to append");
        assert_eq!(segment_id, 2);
        assert_eq!(offset, 0);

        assert_eq!(manager.segment_ids().unwrap(), vec![1, 2]);
        assert_eq!(manager.inactive_segment_ids().unwrap(), vec![1]);
        assert_eq!(manager.active_segment().unwrap().id(), 2);
    }

    #[test]
    fn test_startup_discovers_existing_segments() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        {
            let manager =
                SegmentManager::new(dir.path(), &small_config(&dir)).expect("Failed to create");
            for i in 0..5 {
                manager
                    .append(&Record::put(format!("key{i}"), "v"))
                    .expect("Failed to append");
            }
            manager.flush_all().expect("Failed to flush");
        }

        let manager = SegmentManager::new(dir.path(), &small_config(&dir)).expect("Failed to reopen");

        // Segments 1-3 were found on disk and reopened read-only, so a fresh
        // active segment was created after them.
        assert_eq!(manager.segment_ids().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(manager.active_segment().unwrap().id(), 4);
        assert_eq!(manager.inactive_segment_ids().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_startup_skips_unparsable_file_names() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("segment_abc.log"), b"junk").unwrap();
        std::fs::write(dir.path().join("segment_0.log"), b"junk").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"junk").unwrap();

        let manager =
            SegmentManager::new(dir.path(), &Config::new(dir.path())).expect("Failed to create");
        assert_eq!(manager.segment_ids().unwrap(), vec![1]);
    }

    #[test]
    fn test_delete_segment() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager = SegmentManager::new(dir.path(), &small_config(&dir)).expect("Failed to create");

        for i in 0..3 {
            manager
                .append(&Record::put(format!("key{i}"), "v"))
                .expect("Failed to append");
        }

        manager.delete_segment(1).expect("Failed to delete");
        assert!(!dir.path().join("segment_1.log").exists());
        assert_eq!(manager.segment_ids().unwrap(), vec![2]);

        // Unknown ids are a no-op.
        manager.delete_segment(42).expect("Deleting unknown id should succeed");
    }

    #[test]
    fn test_absorb_moves_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let main_dir = dir.path().join("main");
        let side_dir = dir.path().join("side");

        let manager =
            SegmentManager::new(&main_dir, &Config::new(&main_dir)).expect("Failed to create");
        let side = SegmentManager::new(&side_dir, &Config::new(&side_dir)).expect("Failed to create");

        let record = Record::put("key1", "value1");
        // Main already has active segment 1; pick a disjoint id for the side
        // segment the way compaction does after deleting the originals.
        manager.delete_segment(1).expect("Failed to delete");
        let (side_id, offset) = side.append(&record).expect("Failed to append");

        manager.absorb(side).expect("Failed to absorb");

        assert!(main_dir.join("segment_1.log").exists());
        assert!(!side_dir.join("segment_1.log").exists());
        assert_eq!(manager.read(side_id, offset).expect("Failed to read"), record);

        // Adopted segments come in sealed.
        assert_eq!(manager.inactive_segment_ids().unwrap(), vec![side_id]);
    }

    #[test]
    fn test_close_resets_manager() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let manager =
            SegmentManager::new(dir.path(), &Config::new(dir.path())).expect("Failed to create");

        manager.append(&Record::put("k", "v")).expect("Failed to append");
        manager.close().expect("Failed to close");

        assert!(manager.segment_ids().unwrap().is_empty());
        assert_eq!(manager.read(1, 0), Err(Error::SegmentNotFound(1)));
        assert!(manager.append(&Record::put("k", "v")).is_err());
    }

    #[test]
    fn test_parse_segment_id() {
        assert_eq!(parse_segment_id("segment_1.log"), Some(1));
        assert_eq!(parse_segment_id("segment_42.log"), Some(42));
        assert_eq!(parse_segment_id("segment_0.log"), None);
        assert_eq!(parse_segment_id("segment_.log"), None);
        assert_eq!(parse_segment_id("segment_x.log"), None);
        assert_eq!(parse_segment_id("wal_1.log"), None);
        assert_eq!(parse_segment_id("segment_1.dat"), None);
    }
}
