use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an EmberDB store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for segment files (default: "data")
    pub data_dir: PathBuf,

    /// How often the background compaction pass runs (default: 30 minutes)
    pub merge_interval: Duration,

    /// Maximum segment file size in bytes before rotation (default: 10 MiB)
    pub max_segment_size: u64,

    /// Maximum number of records per segment before rotation (default: 10 000)
    pub max_segment_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            merge_interval: Duration::from_secs(30 * 60),
            max_segment_size: 10 * 1024 * 1024, // 10 MiB
            max_segment_entries: 10_000,
        }
    }
}

impl Config {
    /// Create a new config with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the background compaction period
    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval = interval;
        self
    }

    /// Set the maximum segment file size in bytes
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Set the maximum number of records per segment
    pub fn max_segment_entries(mut self, entries: usize) -> Self {
        self.max_segment_entries = entries;
        self
    }
}
