use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use byteorder::{LittleEndian, ReadBytesExt};

use super::record::{Record, HEADER_SIZE};
use crate::error::{Error, Result};

/// A single append-only segment file.
///
/// The active segment accepts appends until it reaches its size or entry
/// capacity, at which point it seals itself and stays readable until
/// compaction deletes it. Reads are positional and never disturb the append
/// position.
pub struct Segment {
    id: u64,
    inner: RwLock<Inner>,
}

struct Inner {
    path: PathBuf,
    file: Option<File>,
    size: u64,
    entry_count: usize,
    max_size: u64,
    max_entries: usize,
    active: bool,
    closed: bool,
}

pub(crate) fn segment_path(base_path: &Path, id: u64) -> PathBuf {
    base_path.join(format!("segment_{id}.log"))
}

impl Segment {
    /// Creates a segment open for appending. An existing file is picked up at
    /// its current size.
    pub fn create(id: u64, base_path: &Path, max_size: u64, max_entries: usize) -> Result<Self> {
        let path = segment_path(base_path, id);
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            inner: RwLock::new(Inner {
                path,
                file: Some(file),
                size,
                entry_count: 0,
                max_size,
                max_entries,
                active: true,
                closed: false,
            }),
        })
    }

    /// Opens an existing segment read-only. The segment is inactive and will
    /// reject appends.
    pub fn open(id: u64, base_path: &Path, max_size: u64, max_entries: usize) -> Result<Self> {
        let path = segment_path(base_path, id);
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            inner: RwLock::new(Inner {
                path,
                file: Some(file),
                size,
                entry_count: 0,
                max_size,
                max_entries,
                active: false,
                closed: false,
            }),
        })
    }

    /// Appends a record, returning the offset at which it was written.
    ///
    /// When the segment is at capacity it seals itself and returns
    /// `SegmentFull` without writing; the caller rotates to a new segment.
    pub fn append(&self, record: &Record) -> Result<u64> {
        let mut inner = self.inner.write()?;

        if inner.closed || !inner.active {
            return Err(Error::SegmentClosed);
        }

        if inner.size >= inner.max_size || inner.entry_count >= inner.max_entries {
            inner.active = false;
            return Err(Error::SegmentFull);
        }

        let data = record.encode();
        let offset = inner.size;

        match inner.file.as_mut() {
            Some(file) => file.write_all(&data)?,
            None => return Err(Error::SegmentClosed),
        }

        inner.size += data.len() as u64;
        inner.entry_count += 1;

        Ok(offset)
    }

    /// Reads the record starting at the given offset.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let inner = self.inner.read()?;

        if offset >= inner.size {
            return Err(Error::Io(format!(
                "offset {} is beyond segment size {}",
                offset, inner.size
            )));
        }

        let file = inner
            .file
            .as_ref()
            .ok_or_else(|| Error::Io("segment file is closed".to_string()))?;

        let mut header = [0u8; HEADER_SIZE];
        read_exact_at(file, &mut header, offset)?;

        let key_size = (&header[4..8]).read_u32::<LittleEndian>()? as usize;
        let value_size = (&header[8..12]).read_u32::<LittleEndian>()? as usize;

        let mut buf = vec![0u8; HEADER_SIZE + key_size + value_size];
        buf[..HEADER_SIZE].copy_from_slice(&header);
        read_exact_at(file, &mut buf[HEADER_SIZE..], offset + HEADER_SIZE as u64)?;

        Record::decode(&buf)
    }

    /// Closes the segment. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write()?;

        if inner.closed {
            return Ok(());
        }

        inner.active = false;
        inner.closed = true;
        inner.file = None;

        Ok(())
    }

    /// Marks the segment inactive without closing it. Subsequent appends
    /// return `SegmentClosed`; reads are unaffected.
    pub(crate) fn seal(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        inner.active = false;
        Ok(())
    }

    /// Fsyncs the segment file.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.read()?;
        if let Some(file) = &inner.file {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Closes the segment and unlinks its file.
    pub fn delete(&self) -> Result<()> {
        let mut inner = self.inner.write()?;

        inner.active = false;
        inner.closed = true;
        inner.file = None;
        fs::remove_file(&inner.path)?;

        Ok(())
    }

    /// Moves the segment file into a new directory, keeping its file name.
    /// The open handle survives the rename; reads continue to work.
    pub(crate) fn relocate(&self, new_dir: &Path) -> Result<()> {
        let mut inner = self.inner.write()?;

        let file_name = inner
            .path
            .file_name()
            .ok_or_else(|| Error::Io(format!("segment path {:?} has no file name", inner.path)))?
            .to_os_string();
        let new_path = new_dir.join(file_name);

        fs::rename(&inner.path, &new_path)?;
        inner.path = new_path;

        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .read()
            .map(|inner| inner.active && !inner.closed)
            .unwrap_or(false)
    }

    pub fn size(&self) -> u64 {
        self.inner.read().map(|inner| inner.size).unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().map(|inner| inner.entry_count).unwrap_or(0)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> PathBuf {
        self.inner
            .read()
            .map(|inner| inner.path.clone())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, offset)?;
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(Error::Io("unexpected end of segment file".to_string()));
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}
