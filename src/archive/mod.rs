//! The archive interface shared by every tileset storage backend.
//!
//! A tileset is a set of entries addressed by relative, forward-slash keys
//! such as `tileset.json` or `tiles/0/0/0.b3dm`. A [`TilesetSource`] serves
//! entries from an opened archive; a [`TilesetTarget`] receives them while
//! an archive is being created.
//!
//! Backends:
//!
//! - [`Archive3tzReader`] / [`Archive3tzWriter`]: 3TZ files (`*.3tz`), local or over HTTP
//! - [`FsSource`] / [`FsTarget`]: plain directories

pub mod fs;

use std::path::{Component, Path, PathBuf};

use crate::archive3tz::{Archive3tzReader, Archive3tzWriter};
use crate::error::{Error, Result};
use crate::io::{HttpOptions, is_http_url};

pub use fs::{FsSource, FsTarget};

/// Read access to an opened tileset archive.
pub trait TilesetSource {
    /// Open the archive at `path`. Fails if this source is already open.
    fn open(&mut self, path: &str) -> Result<()>;

    /// Iterate over all entry keys. Every call starts a fresh iteration.
    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>>;

    /// Read one entry. A key that is not present yields `Ok(None)`.
    fn entry(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Release the archive. Fails if this source is not open.
    fn close(&mut self) -> Result<()>;
}

/// Write access to a tileset archive under construction.
pub trait TilesetTarget {
    /// Start a new archive at `path`, replacing an existing one only when
    /// `overwrite` is set.
    fn begin(&mut self, path: &str, overwrite: bool) -> Result<()>;

    /// Add one entry under an already normalized key.
    fn add_entry(&mut self, key: &str, content: &[u8]) -> Result<()>;

    /// Finish the archive. The target can then `begin` again.
    fn end(&mut self) -> Result<()>;
}

/// Normalize an entry key: backslashes become forward slashes, and leading
/// `./` and `/` prefixes are removed.
pub fn normalize_key(key: &str) -> String {
    let key = key.replace('\\', "/");
    let mut rest = key.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

/// Turn a normalized key into a path below `root`, refusing keys that would
/// escape it.
pub(crate) fn key_to_path(root: &Path, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if key.is_empty() || escapes {
        return Err(Error::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(root.join(relative))
}

/// Storage backend chosen for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `*.3tz` files and remote URLs
    ThreeTz,
    /// Plain directories
    Directory,
}

impl ArchiveKind {
    /// Pick the backend for `path` from its form and extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedArchive`] for SQLite `*.3dtiles` files.
    pub fn detect(path: &str) -> Result<Self> {
        let lower = path.to_ascii_lowercase();
        if is_http_url(path) || lower.ends_with(".3tz") {
            Ok(ArchiveKind::ThreeTz)
        } else if lower.ends_with(".3dtiles") {
            Err(Error::UnsupportedArchive {
                path: PathBuf::from(path),
            })
        } else {
            Ok(ArchiveKind::Directory)
        }
    }
}

/// Open the tileset archive at `path` with the matching backend.
pub fn open_source(path: &str, http: &HttpOptions) -> Result<Box<dyn TilesetSource>> {
    let mut source: Box<dyn TilesetSource> = match ArchiveKind::detect(path)? {
        ArchiveKind::ThreeTz => Box::new(Archive3tzReader::with_http_options(http.clone())),
        ArchiveKind::Directory => Box::new(FsSource::new()),
    };
    source.open(path)?;
    Ok(source)
}

/// Begin a new tileset archive at `path` with the matching backend.
pub fn create_target(path: &str, overwrite: bool) -> Result<Box<dyn TilesetTarget>> {
    if is_http_url(path) {
        return Err(Error::UnsupportedArchive {
            path: PathBuf::from(path),
        });
    }
    let mut target: Box<dyn TilesetTarget> = match ArchiveKind::detect(path)? {
        ArchiveKind::ThreeTz => Box::new(Archive3tzWriter::new()),
        ArchiveKind::Directory => Box::new(FsTarget::new()),
    };
    target.begin(path, overwrite)?;
    Ok(target)
}
