use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::error::{Error, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Sentinel stored in 16-bit fields whose real value lives in ZIP64 records
pub const ZIP64_MAGIC_U16: u16 = 0xFFFF;
/// Sentinel stored in 32-bit fields whose real value lives in ZIP64 records
pub const ZIP64_MAGIC_U32: u32 = 0xFFFF_FFFF;
/// Header ID of the ZIP64 extended information extra field
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// General purpose flag: sizes and CRC follow the data in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: file name is UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// Version needed to extract a plain stored entry (2.0)
pub const VERSION_DEFAULT: u16 = 20;
/// Version needed once ZIP64 records are involved (4.5)
pub const VERSION_ZIP64: u16 = 45;

/// MS-DOS date for 1980-01-01, the earliest representable timestamp
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Build a single-disk EOCD, substituting ZIP64 sentinels for values
    /// that do not fit.
    pub fn new(total_entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        let entries = u16::try_from(total_entries)
            .ok()
            .filter(|&n| n != ZIP64_MAGIC_U16)
            .unwrap_or(ZIP64_MAGIC_U16);
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: clamp_u32(cd_size),
            cd_offset: clamp_u32(cd_offset),
            comment_len: 0,
        }
    }

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt(offset, "truncated end of central directory"));
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt(
                offset,
                format!(
                    "expected end of central directory signature {:02x?}, found {:02x?}",
                    Self::SIGNATURE,
                    &data[0..4]
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.disk_number)?;
        w.write_u16::<LittleEndian>(self.disk_with_cd)?;
        w.write_u16::<LittleEndian>(self.disk_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP64_MAGIC_U16
            || self.total_entries == ZIP64_MAGIC_U16
            || self.cd_size == ZIP64_MAGIC_U32
            || self.cd_offset == ZIP64_MAGIC_U32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt(offset, "invalid ZIP64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        w.write_u64::<LittleEndian>(self.eocd64_offset)?;
        w.write_u32::<LittleEndian>(self.total_disks)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn new(total_entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        Self {
            // Size of the remaining record, excluding signature and this field
            eocd64_size: (Self::MIN_SIZE - 12) as u64,
            version_made_by: VERSION_ZIP64,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
        }
    }

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt(offset, "invalid ZIP64 end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u64::<LittleEndian>(self.eocd64_size)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u32::<LittleEndian>(self.disk_number)?;
        w.write_u32::<LittleEndian>(self.disk_with_cd)?;
        w.write_u64::<LittleEndian>(self.disk_entries)?;
        w.write_u64::<LittleEndian>(self.total_entries)?;
        w.write_u64::<LittleEndian>(self.cd_size)?;
        w.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Static part of a Local File Header, i.e. everything before the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Header for a stored entry with sizes known up front and no extra field.
    pub fn stored(name_len: u16, crc32: u32, size: u32) -> Self {
        Self {
            version_needed: VERSION_DEFAULT,
            flags: FLAG_UTF8,
            compression_method: CompressionMethod::Stored,
            last_mod_time: 0,
            last_mod_date: DOS_EPOCH_DATE,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            file_name_length: name_len,
            extra_field_length: 0,
        }
    }

    /// Parse the first [`LFH_SIZE`] bytes of `data`; `offset` is only used
    /// for error reporting.
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < LFH_SIZE {
            return Err(Error::corrupt(offset, "truncated local file header"));
        }

        // Verify LFH signature (PK\x03\x04)
        if &data[0..4] != LFH_SIGNATURE {
            return Err(Error::corrupt(
                offset,
                format!(
                    "expected local file header signature {:02x?}, found {:02x?}",
                    LFH_SIGNATURE,
                    &data[0..4]
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..LFH_SIZE]);

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(LFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        w.write_u16::<LittleEndian>(self.last_mod_time)?;
        w.write_u16::<LittleEndian>(self.last_mod_date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name_length)?;
        w.write_u16::<LittleEndian>(self.extra_field_length)?;
        Ok(())
    }
}

/// A stored entry's central directory record, as emitted by the writer.
#[derive(Debug, Clone)]
pub struct CentralDirectoryRecord {
    pub file_name: String,
    pub crc32: u32,
    pub size: u32,
    pub lfh_offset: u64,
}

impl CentralDirectoryRecord {
    fn needs_zip64(&self) -> bool {
        self.lfh_offset >= ZIP64_MAGIC_U32 as u64
    }

    /// Encoded length of this record including name and extra field
    pub fn encoded_len(&self) -> usize {
        let extra = if self.needs_zip64() { 12 } else { 0 };
        CDFH_MIN_SIZE + self.file_name.len() + extra
    }

    /// Write the record. Offsets that overflow 32 bits are moved into a ZIP64
    /// extended information field holding only the local header offset.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let zip64 = self.needs_zip64();
        let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };

        w.write_all(CDFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?; // made by
        w.write_u16::<LittleEndian>(version)?;
        w.write_u16::<LittleEndian>(FLAG_UTF8)?;
        w.write_u16::<LittleEndian>(CompressionMethod::Stored.as_u16())?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(DOS_EPOCH_DATE)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        w.write_u16::<LittleEndian>(if zip64 { 12 } else { 0 })?;
        w.write_u16::<LittleEndian>(0)?; // comment
        w.write_u16::<LittleEndian>(0)?; // disk number start
        w.write_u16::<LittleEndian>(0)?; // internal attributes
        w.write_u32::<LittleEndian>(0)?; // external attributes
        w.write_u32::<LittleEndian>(clamp_u32(self.lfh_offset))?;
        w.write_all(self.file_name.as_bytes())?;
        if zip64 {
            w.write_u16::<LittleEndian>(ZIP64_EXTRA_TAG)?;
            w.write_u16::<LittleEndian>(8)?;
            w.write_u64::<LittleEndian>(self.lfh_offset)?;
        }
        Ok(())
    }
}

/// Half-open byte range `[start, end)` within an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Size and location of an entry, resolved from its central directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectoryEntry {
    pub compressed_size: u64,
    pub lfh_offset: u64,
}

/// Variable-length layout of a parsed local file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEntry {
    pub compressed_size: u64,
    pub file_name_size: u64,
    pub extra_size: u64,
}

impl LocalEntry {
    /// Offset of the first data byte for a header located at `lfh_offset`
    pub fn data_offset(&self, lfh_offset: u64) -> u64 {
        lfh_offset + LFH_SIZE as u64 + self.file_name_size + self.extra_size
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value)
        .ok()
        .filter(|&v| v != ZIP64_MAGIC_U32)
        .unwrap_or(ZIP64_MAGIC_U32)
}
