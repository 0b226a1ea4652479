//! Error types for tileset archive operations.
//!
//! Every fallible operation in this crate returns [`Result<T>`]. A missing
//! entry is not an error: lookups return `Ok(None)`. Index integrity findings
//! are not errors either, they are reported through
//! [`ValidationReport`](crate::archive3tz::ValidationReport).

use std::path::PathBuf;

use thiserror::Error;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle state an archive object was expected to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Open,
    Closed,
}

impl std::fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveState::Open => f.write_str("open"),
            ArchiveState::Closed => f.write_str("closed"),
        }
    }
}

/// Archive error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation invoked in the wrong lifecycle state
    #[error("Cannot {operation}: archive must be {expected}")]
    State {
        operation: &'static str,
        expected: ArchiveState,
    },

    /// Output exists and overwriting was not requested
    #[error("Archive already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// Malformed ZIP structure or 3TZ index
    #[error("Corrupt archive at offset {offset:#x}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Entry payload does not fit a 32-bit local header size field
    #[error("Entry {key} is too large for a stored entry: {size} bytes")]
    EntryTooLarge { key: String, size: u64 },

    /// Key is reserved or would escape the archive root
    #[error("Invalid entry key: {key:?}")]
    InvalidKey { key: String },

    /// No backend handles this path
    #[error("Unsupported archive type: {}", path.display())]
    UnsupportedArchive { path: PathBuf },

    /// Remote range read failed
    #[error("HTTP error: {0}")]
    Http(String),
}

impl Error {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_open(operation: &'static str) -> Self {
        Error::State {
            operation,
            expected: ArchiveState::Open,
        }
    }

    pub(crate) fn not_closed(operation: &'static str) -> Self {
        Error::State {
            operation,
            expected: ArchiveState::Closed,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}
