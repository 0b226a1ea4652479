//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD
//! 3. Either read the whole Central Directory, or only its last record
//!    (which is all a 3TZ reader needs to find the index entry)
//! 4. For lookups, read a single Local File Header and the data after it
//!
//! Only the file's tail and the headers actually asked for are fetched,
//! which keeps remote (HTTP Range) access cheap.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Bytes read before the end of the central directory when looking for its
/// last record.
pub const CD_TAIL_WINDOW: u64 = 4096;

/// Bytes read in one go when a file name is wanted but its length is unknown.
const FILE_NAME_WINDOW: u64 = 512;

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type to support
/// both local files and HTTP sources.
///
/// ## Usage
///
/// Typically used through [`Archive3tzReader`](crate::archive3tz::Archive3tzReader)
/// rather than directly.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let tail = parser.find_central_directory_tail()?;
/// let record = parse_central_directory_entry(&parser.read_range(tail)?, tail.start, "name")?;
/// let local = parser.parse_local_file_header(record.lfh_offset, "name")?;
/// let data = parser.read_entry_data(record.lfh_offset, &local)?;
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Total size of the archive in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the bytes of `range` into a new buffer.
    pub fn read_range(&self, range: ByteRange) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; range.len() as usize];
        self.reader.read_exact_at(range.start, &mut buf)?;
        Ok(buf)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if no valid EOCD can be found, indicating
    /// the file is not a valid ZIP archive.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::corrupt(
                0,
                format!("file of {} bytes is too small to be a ZIP archive", self.size),
            ));
        }

        // Optimization: First try the simple case where there's no comment.
        // This avoids reading extra data in the common case.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf)?;

        // Check for signature and zero-length comment
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf, offset)?;
            return Ok((eocd, offset));
        }

        // EOCD not at expected location - search for it.
        // The EOCD could be earlier if there's a ZIP comment.
        // We need to search backwards from the end of the file.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // Found a potential EOCD - verify the comment length is correct.
                // The comment length field should match the remaining bytes.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                        search_start + i as u64,
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(Error::corrupt(
            search_start,
            "end of central directory signature not found",
        ))
    }

    /// Read the ZIP64 End of Central Directory Locator preceding the EOCD,
    /// if there is one.
    fn read_zip64_locator(&self, eocd_offset: u64) -> Result<Option<Zip64EOCDLocator>> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(None);
        };
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader.read_exact_at(locator_offset, &mut locator_buf)?;

        if &locator_buf[0..4] != Zip64EOCDLocator::SIGNATURE {
            return Ok(None);
        }
        Zip64EOCDLocator::from_bytes(&locator_buf, locator_offset).map(Some)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    ///
    /// # Errors
    ///
    /// Returns an error if the ZIP64 structures are missing or invalid.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator = self.read_zip64_locator(eocd_offset)?.ok_or_else(|| {
            Error::corrupt(eocd_offset, "ZIP64 end of central directory locator missing")
        })?;

        // Read the actual ZIP64 EOCD from the offset specified in the locator
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;

        Zip64EOCD::from_bytes(&eocd64_buf, locator.eocd64_offset)
    }

    /// Locate the last Central Directory File Header.
    ///
    /// Reads at most [`CD_TAIL_WINDOW`] bytes ending where the central
    /// directory ends (the ZIP64 EOCD record when present, the EOCD
    /// otherwise) and scans backwards for a CDFH signature whose declared
    /// name, extra field and comment lengths reach exactly to that end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the archive has no entries or no
    /// consistent record is found in the window.
    pub fn find_central_directory_tail(&self) -> Result<ByteRange> {
        let (eocd, eocd_offset) = self.find_eocd()?;
        if eocd.total_entries == 0 {
            return Err(Error::corrupt(eocd_offset, "archive has no entries"));
        }

        let cd_end = match self.read_zip64_locator(eocd_offset)? {
            Some(locator) if locator.eocd64_offset < eocd_offset => locator.eocd64_offset,
            _ => eocd_offset,
        };

        let window_start = cd_end.saturating_sub(CD_TAIL_WINDOW);
        let buf = self.read_range(ByteRange {
            start: window_start,
            end: cd_end,
        })?;

        if buf.len() >= CDFH_MIN_SIZE {
            for i in (0..=buf.len() - CDFH_MIN_SIZE).rev() {
                if &buf[i..i + 4] != CDFH_SIGNATURE {
                    continue;
                }
                let name_len = u16::from_le_bytes([buf[i + 28], buf[i + 29]]) as usize;
                let extra_len = u16::from_le_bytes([buf[i + 30], buf[i + 31]]) as usize;
                let comment_len = u16::from_le_bytes([buf[i + 32], buf[i + 33]]) as usize;

                if i + CDFH_MIN_SIZE + name_len + extra_len + comment_len == buf.len() {
                    let range = ByteRange {
                        start: window_start + i as u64,
                        end: cd_end,
                    };
                    debug!(start = range.start, end = range.end, "found last central directory record");
                    return Ok(range);
                }
            }
        }

        Err(Error::corrupt(
            window_start,
            format!("no central directory file header ends at offset {cd_end:#x}"),
        ))
    }

    /// List all files in the ZIP archive.
    ///
    /// Reads the EOCD first, then fetches and parses the entire
    /// Central Directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid or cannot be read.
    pub fn list_entries(&self) -> Result<Vec<ZipFileEntry>> {
        // Find and parse the EOCD to get Central Directory location
        let (eocd, eocd_offset) = self.find_eocd()?;

        // Get Central Directory info, using ZIP64 if needed
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.checked_add(cd_size).is_none_or(|end| end > eocd_offset) {
            return Err(Error::corrupt(
                eocd_offset,
                format!("central directory at {cd_offset:#x} of {cd_size} bytes overlaps its end record"),
            ));
        }

        // Read the entire Central Directory in one request
        // (efficient for HTTP as it's a single Range request)
        let cd_data = self.read_range(ByteRange {
            start: cd_offset,
            end: cd_offset + cd_size,
        })?;

        // Parse each Central Directory File Header entry
        let mut entries = Vec::with_capacity(total_entries.min(u16::MAX as u64) as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            let entry = parse_cdfh(&mut cursor)
                .map_err(|e| into_corrupt(e, cd_offset, "central directory record"))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse the Local File Header at `offset`, requiring its file name to be
    /// `expected_name`.
    ///
    /// Reads the fixed 30-byte header and the expected name in a single read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] on a bad signature, a file name mismatch,
    /// or a zero size whose real value was deferred to a data descriptor.
    pub fn parse_local_file_header(&self, offset: u64, expected_name: &str) -> Result<LocalEntry> {
        let expected = expected_name.as_bytes();
        let mut buf = vec![0u8; LFH_SIZE + expected.len()];
        self.reader.read_exact_at(offset, &mut buf)?;

        let header = LocalFileHeader::from_bytes(&buf, offset)?;
        let name = &buf[LFH_SIZE..];
        if header.file_name_length as usize != expected.len() || name != expected {
            let found_len = (header.file_name_length as usize).min(name.len());
            return Err(Error::corrupt(
                offset,
                format!(
                    "expected file name {:?}, found {:?} ({} bytes)",
                    expected_name,
                    String::from_utf8_lossy(&name[..found_len]),
                    header.file_name_length
                ),
            ));
        }

        if header.compression_method != CompressionMethod::Stored {
            return Err(Error::corrupt(
                offset,
                format!(
                    "entry {:?} uses compression method {}, only stored entries are supported",
                    expected_name,
                    header.compression_method.as_u16()
                ),
            ));
        }

        let mut compressed_size = header.compressed_size as u64;
        if compressed_size == 0 && header.flags & FLAG_DATA_DESCRIPTOR != 0 {
            return Err(Error::corrupt(
                offset,
                format!("entry {expected_name:?} has no size in its local header"),
            ));
        }

        if header.compressed_size == ZIP64_MAGIC_U32 {
            // Local ZIP64 extra fields carry both sizes, uncompressed first
            let mut extra = vec![0u8; header.extra_field_length as usize];
            let extra_offset = offset + LFH_SIZE as u64 + expected.len() as u64;
            self.reader.read_exact_at(extra_offset, &mut extra)?;
            let mut values = zip64_extra_values(&extra)
                .map(Cursor::new)
                .ok_or_else(|| {
                    Error::corrupt(extra_offset, "ZIP64 extra field missing from local header")
                })?;
            compressed_size = values
                .read_u64::<LittleEndian>()
                .and_then(|_uncompressed| values.read_u64::<LittleEndian>())
                .map_err(|_| {
                    Error::corrupt(
                        extra_offset,
                        "ZIP64 extra field of local header lacks the compressed size",
                    )
                })?;
        }

        Ok(LocalEntry {
            compressed_size,
            file_name_size: header.file_name_length as u64,
            extra_size: header.extra_field_length as u64,
        })
    }

    /// Read the file name from the Local File Header at `offset` without
    /// knowing it in advance.
    pub fn read_file_name_at(&self, offset: u64) -> Result<String> {
        let available = self.size.saturating_sub(offset);
        let window = (LFH_SIZE as u64 + FILE_NAME_WINDOW).min(available) as usize;
        let mut buf = vec![0u8; window];
        self.reader.read_exact_at(offset, &mut buf)?;

        let header = LocalFileHeader::from_bytes(&buf, offset)?;
        let name_end = LFH_SIZE + header.file_name_length as usize;
        if name_end > buf.len() {
            let old_len = buf.len();
            buf.resize(name_end, 0);
            self.reader
                .read_exact_at(offset + old_len as u64, &mut buf[old_len..])?;
        }

        Ok(String::from_utf8_lossy(&buf[LFH_SIZE..name_end]).into_owned())
    }

    /// Read the raw data of the entry whose header at `lfh_offset` was parsed
    /// into `local`.
    pub fn read_entry_data(&self, lfh_offset: u64, local: &LocalEntry) -> Result<Vec<u8>> {
        let start = local.data_offset(lfh_offset);
        let end = start
            .checked_add(local.compressed_size)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                Error::corrupt(
                    lfh_offset,
                    format!(
                        "entry data of {} bytes extends past end of archive",
                        local.compressed_size
                    ),
                )
            })?;
        self.read_range(ByteRange { start, end })
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Parse the Central Directory File Header at the start of `buf`, requiring
/// its file name to be `expected_name`.
///
/// `base_offset` is the archive offset of `buf[0]` and is only used for
/// error reporting. When the 32-bit local header offset holds the ZIP64
/// sentinel, the true offset is taken from the ZIP64 extended information
/// extra field.
pub fn parse_central_directory_entry(
    buf: &[u8],
    base_offset: u64,
    expected_name: &str,
) -> Result<CentralDirectoryEntry> {
    let mut cursor = Cursor::new(buf);
    let entry = parse_cdfh(&mut cursor)
        .map_err(|e| into_corrupt(e, base_offset, "central directory record"))?;

    if entry.file_name != expected_name {
        return Err(Error::corrupt(
            base_offset,
            format!(
                "expected central directory entry {:?}, found {:?}",
                expected_name, entry.file_name
            ),
        ));
    }

    Ok(CentralDirectoryEntry {
        compressed_size: entry.compressed_size,
        lfh_offset: entry.lfh_offset,
    })
}

/// Parse a Central Directory File Header from a cursor.
///
/// The CDFH contains metadata about a file in the archive, including
/// its name, sizes, and location of the actual file data.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let record_start = cursor.position();

    // Read and verify the signature (PK\x01\x02)
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(Error::corrupt(
            record_start,
            format!("expected signature {CDFH_SIGNATURE:02x?}, found {sig:02x?}"),
        ));
    }

    // Read fixed-size header fields
    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let _flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    // Read the variable-length file name
    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Use lossy conversion to handle non-UTF8 filenames gracefully
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra)?;

    // ZIP64 fields are present only if the corresponding header field is
    // 0xFFFFFFFF, in the order uncompressed, compressed, offset
    let wants_zip64 = uncompressed_size == ZIP64_MAGIC_U32 as u64
        || compressed_size == ZIP64_MAGIC_U32 as u64
        || lfh_offset == ZIP64_MAGIC_U32 as u64;
    if wants_zip64 {
        let block = zip64_extra_values(&extra).ok_or_else(|| {
            Error::corrupt(record_start, format!("{file_name:?} needs a ZIP64 extra field but has none"))
        })?;
        let mut values = Cursor::new(block);
        let missing = |what: &str| {
            Error::corrupt(record_start, format!("ZIP64 extra field of {file_name:?} lacks the {what}"))
        };
        if uncompressed_size == ZIP64_MAGIC_U32 as u64 {
            uncompressed_size = values
                .read_u64::<LittleEndian>()
                .map_err(|_| missing("uncompressed size"))?;
        }
        if compressed_size == ZIP64_MAGIC_U32 as u64 {
            compressed_size = values
                .read_u64::<LittleEndian>()
                .map_err(|_| missing("compressed size"))?;
        }
        if lfh_offset == ZIP64_MAGIC_U32 as u64 {
            lfh_offset = values
                .read_u64::<LittleEndian>()
                .map_err(|_| missing("local header offset"))?;
        }
    }

    // Skip over the file comment (we don't use it)
    cursor.set_position(cursor.position() + file_comment_length as u64);

    Ok(ZipFileEntry {
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
    })
}

/// Find the ZIP64 extended information block in an extra field and return
/// its data.
fn zip64_extra_values(extra: &[u8]) -> Option<&[u8]> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let header_id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let field_size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let data_start = pos + 4;
        let data_end = (data_start + field_size).min(extra.len());

        if header_id == ZIP64_EXTRA_TAG {
            return Some(&extra[data_start..data_end]);
        }
        // Skip unknown extra fields
        pos = data_start + field_size;
    }
    None
}

/// Rebase errors from parsing an in-memory buffer onto the archive offset
/// `base` of that buffer. Short reads mean the record itself is truncated.
fn into_corrupt(err: Error, base: u64, what: &str) -> Error {
    match err {
        Error::Io(e) => Error::corrupt(base, format!("truncated {what}: {e}")),
        Error::Corrupt { offset, reason } => Error::corrupt(base + offset, reason),
        other => other,
    }
}
