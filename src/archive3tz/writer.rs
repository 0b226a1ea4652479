use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::index::{INDEX_ENTRY_NAME, IndexBuilder};
use crate::archive::TilesetTarget;
use crate::error::{Error, Result};
use crate::zip::ZipWriter;

struct OpenWriter {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
    index: IndexBuilder,
}

/// Creates 3TZ archives.
///
/// Entries are streamed into the file as they are added; the index is
/// appended as the last entry by [`end`](Self::end). After `end` the writer
/// can `begin` a new archive.
///
/// ```no_run
/// use tiles3tz::Archive3tzWriter;
///
/// let mut writer = Archive3tzWriter::new();
/// writer.begin("tiles.3tz", false)?;
/// writer.add_entry("tileset.json", br#"{"asset":{"version":"1.1"}}"#)?;
/// writer.add_entry("0/0/0.b3dm", &[0u8; 64])?;
/// writer.end()?;
/// # Ok::<(), tiles3tz::Error>(())
/// ```
#[derive(Default)]
pub struct Archive3tzWriter {
    state: Option<OpenWriter>,
}

impl Archive3tzWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Create the output file, truncating an existing one only if
    /// `overwrite` is set.
    pub fn begin(&mut self, path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::not_closed("begin"));
        }
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create_new(!overwrite)
            .create(overwrite)
            .truncate(overwrite)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::AlreadyExists {
                    path: path.to_path_buf(),
                },
                _ => Error::Io(e),
            })?;
        self.state = Some(OpenWriter {
            path: path.to_path_buf(),
            zip: ZipWriter::new(BufWriter::new(file)),
            index: IndexBuilder::new(),
        });
        debug!(path = %path.display(), "began 3TZ archive");
        Ok(())
    }

    /// Append one stored entry. `key` must already be normalized.
    ///
    /// An I/O failure leaves a partial entry in the file, so the writer is
    /// closed and the archive has to be started again.
    pub fn add_entry(&mut self, key: &str, content: &[u8]) -> Result<()> {
        let state = self.state.as_mut().ok_or_else(|| Error::not_open("add entry"))?;
        if key == INDEX_ENTRY_NAME {
            return Err(Error::InvalidKey {
                key: key.to_string(),
            });
        }

        match state.zip.add_stored(key, content) {
            Ok(offset) => {
                debug_assert_eq!(offset, state.index.current_offset());
                state.index.add_entry(key, content.len() as u64);
                Ok(())
            }
            // Rejected before anything was written
            Err(e @ Error::EntryTooLarge { .. }) => Err(e),
            Err(e) => {
                if let Some(state) = self.state.take() {
                    warn!(path = %state.path.display(), key, error = %e, "abandoned 3TZ archive");
                }
                Err(e)
            }
        }
    }

    /// Write the index entry and the central directory, then close the file.
    pub fn end(&mut self) -> Result<()> {
        let OpenWriter {
            path,
            mut zip,
            index,
        } = self.state.take().ok_or_else(|| Error::not_open("end"))?;

        let buffer = index.create_buffer();
        zip.add_stored(INDEX_ENTRY_NAME, &buffer)?;
        let file = zip
            .finish()?
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;

        info!(path = %path.display(), entries = index.len(), "wrote 3TZ archive");
        Ok(())
    }
}

impl TilesetTarget for Archive3tzWriter {
    fn begin(&mut self, path: &str, overwrite: bool) -> Result<()> {
        Archive3tzWriter::begin(self, path, overwrite)
    }

    fn add_entry(&mut self, key: &str, content: &[u8]) -> Result<()> {
        Archive3tzWriter::add_entry(self, key, content)
    }

    fn end(&mut self) -> Result<()> {
        Archive3tzWriter::end(self)
    }
}
