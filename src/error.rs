use std::fmt::Display;

/// EmberDB errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The key is not present in the store, or has been deleted.
    KeyNotFound,
    /// A record failed to decode: the buffer is shorter than the fixed header,
    /// or the header sizes disagree with the buffer length.
    InvalidEntry,
    /// A write was attempted on a segment that is closed or no longer active.
    SegmentClosed,
    /// The segment has reached capacity. Internal: the segment manager handles
    /// this by rotating to a fresh active segment.
    SegmentFull,
    /// The referenced segment id is not present in the manager.
    SegmentNotFound(u64),
    /// A compaction pass is already running.
    MergeInProgress,
    /// An IO error.
    Io(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::KeyNotFound => write!(f, "key not found"),
            Error::InvalidEntry => write!(f, "invalid entry"),
            Error::SegmentClosed => write!(f, "segment is closed"),
            Error::SegmentFull => write!(f, "segment is full"),
            Error::SegmentNotFound(id) => write!(f, "segment {id} not found"),
            Error::MergeInProgress => write!(f, "merge in progress"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// An EmberDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}
