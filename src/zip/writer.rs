//! Streaming writer for stored (uncompressed) ZIP entries.
//!
//! Entries are written front to back as local header, name and data. Local
//! headers never carry an extra field, so an entry named `n` with `s` bytes
//! of data always occupies exactly `30 + n.len() + s` bytes. The central
//! directory is buffered in memory and emitted by [`ZipWriter::finish`].

use std::io::Write;
use tracing::debug;

use crate::error::{Error, Result};

use super::structures::*;

/// Writes stored entries followed by a central directory.
pub struct ZipWriter<W: Write> {
    inner: W,
    /// Bytes written so far, i.e. the offset of the next local header
    position: u64,
    central: Vec<CentralDirectoryRecord>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            position: 0,
            central: Vec::new(),
        }
    }

    /// Offset at which the next entry's local header will be written
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> usize {
        self.central.len()
    }

    /// Write one stored entry and return the offset of its local header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryTooLarge`] if the data or name does not fit the
    /// 32-bit size or 16-bit name length of a local header.
    pub fn add_stored(&mut self, name: &str, data: &[u8]) -> Result<u64> {
        let size = u32::try_from(data.len())
            .ok()
            .filter(|&s| s != ZIP64_MAGIC_U32)
            .ok_or_else(|| Error::EntryTooLarge {
                key: name.to_string(),
                size: data.len() as u64,
            })?;
        let name_len = u16::try_from(name.len()).map_err(|_| Error::EntryTooLarge {
            key: name.to_string(),
            size: data.len() as u64,
        })?;

        let crc32 = crc32fast::hash(data);
        let offset = self.position;

        LocalFileHeader::stored(name_len, crc32, size).write_to(&mut self.inner)?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(data)?;
        self.position += LFH_SIZE as u64 + name.len() as u64 + data.len() as u64;

        self.central.push(CentralDirectoryRecord {
            file_name: name.to_string(),
            crc32,
            size,
            lfh_offset: offset,
        });

        Ok(offset)
    }

    /// Write the central directory and end records, flush, and hand back the
    /// underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let cd_offset = self.position;
        for record in &self.central {
            record.write_to(&mut self.inner)?;
        }
        let cd_size: u64 = self.central.iter().map(|r| r.encoded_len() as u64).sum();
        let total_entries = self.central.len() as u64;

        let eocd = EndOfCentralDirectory::new(total_entries, cd_size, cd_offset);
        if eocd.is_zip64() {
            let eocd64_offset = cd_offset + cd_size;
            Zip64EOCD::new(total_entries, cd_size, cd_offset).write_to(&mut self.inner)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut self.inner)?;
            debug!(eocd64_offset, "wrote ZIP64 end of central directory");
        }
        eocd.write_to(&mut self.inner)?;
        self.inner.flush()?;

        debug!(entries = total_entries, cd_offset, cd_size, "finished ZIP container");
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::ZipParser;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn offsets_follow_fixed_header_size() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        assert_eq!(writer.add_stored("a.txt", b"hello").unwrap(), 0);
        assert_eq!(writer.add_stored("b", b"").unwrap(), 30 + 5 + 5);
        assert_eq!(writer.position(), 40 + 30 + 1);
        assert_eq!(writer.entry_count(), 2);
    }

    #[test]
    fn written_archive_lists_back() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_stored("dir/one.bin", &[1, 2, 3]).unwrap();
        writer.add_stored("two.json", b"{}").unwrap();
        let bytes = writer.finish().unwrap();

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let entries = parser.list_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "dir/one.bin");
        assert_eq!(entries[0].crc32, crc32fast::hash(&[1, 2, 3]));
        assert_eq!(entries[1].file_name, "two.json");
        assert_eq!(entries[1].lfh_offset, 30 + 11 + 3);
        assert_eq!(entries[1].compression_method, CompressionMethod::Stored);

        let tail = parser.find_central_directory_tail().unwrap();
        let last = parser.read_range(tail).unwrap();
        assert_eq!(&last[46..54], b"two.json");
    }

    #[test]
    fn many_entries_switch_to_zip64_end_records() {
        let mut writer = ZipWriter::new(Vec::new());
        for i in 0..70_000u32 {
            writer.add_stored(&format!("{i}"), &[]).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let (eocd, _) = parser.find_eocd().unwrap();
        assert!(eocd.is_zip64());
        assert_eq!(parser.list_entries().unwrap().len(), 70_000);

        let tail = parser.find_central_directory_tail().unwrap();
        let last = parser.read_range(tail).unwrap();
        assert_eq!(&last[46..], b"69999");
    }
}
