use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::index::{INDEX_ENTRY_NAME, IndexEntry, KeyHash, find_entry, parse_index};
use super::validate::{ValidationReport, validate_index};
use crate::archive::{TilesetSource, normalize_key};
use crate::error::{Error, Result};
use crate::io::{HttpOptions, HttpRangeReader, LocalFileReader, ReadAt, is_http_url};
use crate::zip::{ZipParser, parse_central_directory_entry};

struct OpenArchive {
    parser: ZipParser<dyn ReadAt>,
    index: Vec<IndexEntry>,
}

/// Reads 3TZ archives through their hash index.
///
/// Opening reads only the end of the central directory and the index
/// entry. Each lookup then costs one binary search and two positioned
/// reads (local header and data), independent of the number of entries.
///
/// ```no_run
/// use tiles3tz::Archive3tzReader;
///
/// let mut reader = Archive3tzReader::new();
/// reader.open("tiles.3tz")?;
/// if let Some(tileset) = reader.entry("tileset.json")? {
///     println!("{} bytes", tileset.len());
/// }
/// reader.close()?;
/// # Ok::<(), tiles3tz::Error>(())
/// ```
#[derive(Default)]
pub struct Archive3tzReader {
    state: Option<OpenArchive>,
    http: HttpOptions,
}

impl Archive3tzReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader whose remote archives are fetched with `options`
    pub fn with_http_options(options: HttpOptions) -> Self {
        Self {
            state: None,
            http: options,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Open a local file, or a remote one when `path` is an HTTP(S) URL.
    pub fn open(&mut self, path: &str) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::not_closed("open"));
        }
        let reader: Arc<dyn ReadAt> = if is_http_url(path) {
            Arc::new(HttpRangeReader::new(path.to_string(), &self.http)?)
        } else {
            Arc::new(LocalFileReader::new(Path::new(path))?)
        };
        self.open_with(reader)
    }

    /// Open an archive from any positioned reader.
    pub fn open_with(&mut self, reader: Arc<dyn ReadAt>) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::not_closed("open"));
        }
        let parser = ZipParser::new(reader);
        let index = load_index(&parser)?;
        self.state = Some(OpenArchive { parser, index });
        Ok(())
    }

    fn state(&self, operation: &'static str) -> Result<&OpenArchive> {
        self.state.as_ref().ok_or_else(|| Error::not_open(operation))
    }

    /// The sorted index as loaded from the archive
    pub fn index(&self) -> Result<&[IndexEntry]> {
        Ok(&self.state("read index")?.index)
    }

    /// Iterate over entry keys in index order, reading each name from its
    /// local file header.
    pub fn keys(&self) -> Result<Keys<'_>> {
        let state = self.state("list keys")?;
        Ok(Keys {
            parser: &state.parser,
            entries: state.index.iter(),
        })
    }

    /// Read the entry stored under `key`, or `None` if the index has no
    /// record for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the indexed local header is invalid or
    /// names a different key, which happens for keys whose hash collides.
    pub fn entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state("read entry")?;
        let key = normalize_key(key);
        let Some(pos) = find_entry(&state.index, &KeyHash::of(&key)) else {
            return Ok(None);
        };

        let offset = state.index[pos].offset;
        let local = state.parser.parse_local_file_header(offset, &key)?;
        state.parser.read_entry_data(offset, &local).map(Some)
    }

    /// Check the index against the archive. With `quick` set the central
    /// directory is not cross-checked.
    pub fn validate(&self, quick: bool) -> Result<ValidationReport> {
        let state = self.state("validate")?;
        Ok(validate_index(&state.parser, &state.index, quick))
    }

    /// Release the file handle and the index.
    pub fn close(&mut self) -> Result<()> {
        self.state
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::not_open("close"))
    }
}

/// Locate the index entry through the last central directory record and
/// deserialize it.
fn load_index(parser: &ZipParser<dyn ReadAt>) -> Result<Vec<IndexEntry>> {
    let tail = parser.find_central_directory_tail()?;
    let record = parse_central_directory_entry(&parser.read_range(tail)?, tail.start, INDEX_ENTRY_NAME)?;
    let local = parser.parse_local_file_header(record.lfh_offset, INDEX_ENTRY_NAME)?;
    let data = parser.read_entry_data(record.lfh_offset, &local)?;
    let index = parse_index(&data, local.data_offset(record.lfh_offset))?;

    debug!(
        entries = index.len(),
        index_offset = record.lfh_offset,
        "loaded 3TZ index"
    );
    Ok(index)
}

/// Iterator over the keys of an open [`Archive3tzReader`], in index order.
pub struct Keys<'a> {
    parser: &'a ZipParser<dyn ReadAt>,
    entries: std::slice::Iter<'a, IndexEntry>,
}

impl Iterator for Keys<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries
            .next()
            .map(|entry| self.parser.read_file_name_at(entry.offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}

impl TilesetSource for Archive3tzReader {
    fn open(&mut self, path: &str) -> Result<()> {
        Archive3tzReader::open(self, path)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>> {
        Ok(Box::new(Archive3tzReader::keys(self)?))
    }

    fn entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Archive3tzReader::entry(self, key)
    }

    fn close(&mut self) -> Result<()> {
        Archive3tzReader::close(self)
    }
}
