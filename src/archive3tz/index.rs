//! The 3TZ hash index.
//!
//! The index is the payload of the last entry in the archive, named
//! [`INDEX_ENTRY_NAME`]. It is a flat array of 24-byte records, each an MD5
//! hash of an entry key followed by the little-endian offset of that
//! entry's local file header. Records are sorted by [`KeyHash`]'s ordering
//! so a key is found with a binary search over the array.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::zip::LFH_SIZE;

/// Name of the entry holding the serialized index
pub const INDEX_ENTRY_NAME: &str = "@3dtilesIndex1@";

/// Size of one serialized [`IndexEntry`]
pub const INDEX_RECORD_SIZE: usize = 24;

/// MD5 hash of an entry key.
///
/// Ordering compares the second eight bytes as a little-endian `u64`
/// first, then the first eight bytes the same way. Archives are sorted and
/// searched with this ordering, so it is part of the on-disk format even
/// though it is not the numeric order of the 128-bit value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHash(pub [u8; 16]);

impl KeyHash {
    /// Hash a normalized entry key
    pub fn of(key: &str) -> Self {
        Self(md5::compute(key.as_bytes()).0)
    }

    /// Bytes 8..16 as a little-endian integer, compared first
    pub fn low(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[8..16]);
        u64::from_le_bytes(buf)
    }

    /// Bytes 0..8 as a little-endian integer, compared on ties
    pub fn high(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[0..8]);
        u64::from_le_bytes(buf)
    }
}

impl Ord for KeyHash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.low()
            .cmp(&other.low())
            .then_with(|| self.high().cmp(&other.high()))
    }
}

impl PartialOrd for KeyHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({self})")
    }
}

/// One record of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: KeyHash,
    /// Offset of the entry's local file header
    pub offset: u64,
}

impl IndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_RECORD_SIZE] {
        let mut buf = [0u8; INDEX_RECORD_SIZE];
        buf[..16].copy_from_slice(&self.hash.0);
        buf[16..].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(record: &[u8; INDEX_RECORD_SIZE]) -> Self {
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&record[..16]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&record[16..]);
        Self {
            hash: KeyHash(hash),
            offset: u64::from_le_bytes(offset),
        }
    }
}

/// Deserialize an index payload read from archive offset `data_offset`.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the payload is not a whole number of
/// records.
pub fn parse_index(data: &[u8], data_offset: u64) -> Result<Vec<IndexEntry>> {
    if data.len() % INDEX_RECORD_SIZE != 0 {
        return Err(Error::corrupt(
            data_offset,
            format!(
                "index of {} bytes is not a multiple of {INDEX_RECORD_SIZE}",
                data.len()
            ),
        ));
    }

    Ok(data
        .chunks_exact(INDEX_RECORD_SIZE)
        .map(|record| {
            let mut buf = [0u8; INDEX_RECORD_SIZE];
            buf.copy_from_slice(record);
            IndexEntry::from_bytes(&buf)
        })
        .collect())
}

/// Binary search a sorted index for `hash`.
///
/// If several records share the hash, any one of them may be returned.
pub fn find_entry(index: &[IndexEntry], hash: &KeyHash) -> Option<usize> {
    index.binary_search_by(|entry| entry.hash.cmp(hash)).ok()
}

#[derive(Debug, Clone)]
struct IndexBuilderEntry {
    key: String,
    offset: u64,
}

/// Collects entry keys and their local header offsets while an archive is
/// written, then produces the sorted index payload.
///
/// Offsets are derived, not observed: each entry advances the cursor by its
/// 30-byte local header, its key, and its data, which matches a writer that
/// emits no local extra fields.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: Vec<IndexBuilderEntry>,
    current_offset: u64,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` at the current offset and advance past its local record.
    ///
    /// `key` must already be normalized.
    pub fn add_entry(&mut self, key: &str, size: u64) {
        self.entries.push(IndexBuilderEntry {
            key: key.to_string(),
            offset: self.current_offset,
        });
        self.current_offset += size + LFH_SIZE as u64 + key.len() as u64;
    }

    /// Offset the next added entry will be recorded at
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash, sort and serialize every recorded entry.
    pub fn create_buffer(&self) -> Vec<u8> {
        let mut index: Vec<IndexEntry> = self
            .entries
            .iter()
            .map(|e| IndexEntry {
                hash: KeyHash::of(&e.key),
                offset: e.offset,
            })
            .collect();
        index.sort_unstable_by(|a, b| a.hash.cmp(&b.hash).then(a.offset.cmp(&b.offset)));

        let mut buf = Vec::with_capacity(index.len() * INDEX_RECORD_SIZE);
        for entry in &index {
            buf.extend_from_slice(&entry.to_bytes());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(low: u64, high: u64) -> KeyHash {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&high.to_le_bytes());
        bytes[8..].copy_from_slice(&low.to_le_bytes());
        KeyHash(bytes)
    }

    #[test]
    fn md5_of_key() {
        assert_eq!(
            KeyHash::of("tileset.json").0,
            md5::compute(b"tileset.json").0
        );
        assert_eq!(KeyHash::of("").to_string(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn ordering_compares_second_half_first() {
        assert!(hash(1, 9) < hash(2, 0));
        assert!(hash(5, 1) < hash(5, 2));
        assert_eq!(hash(5, 5).cmp(&hash(5, 5)), Ordering::Equal);

        // Byte 15 is the most significant byte of the part compared first
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[0] = 0xFF;
        b[15] = 0x01;
        assert!(KeyHash(a) < KeyHash(b));
    }

    #[test]
    fn builder_offsets_account_for_header_and_name() {
        let mut builder = IndexBuilder::new();
        builder.add_entry("tileset.json", 2);
        builder.add_entry("0/0/0.b3dm", 256);
        assert_eq!(builder.current_offset(), (30 + 12 + 2) + (30 + 10 + 256));
        assert_eq!(builder.len(), 2);

        let index = parse_index(&builder.create_buffer(), 0).unwrap();
        let root = find_entry(&index, &KeyHash::of("tileset.json")).unwrap();
        let tile = find_entry(&index, &KeyHash::of("0/0/0.b3dm")).unwrap();
        assert_eq!(index[root].offset, 0);
        assert_eq!(index[tile].offset, 44);
        assert_eq!(find_entry(&index, &KeyHash::of("missing")), None);
    }

    #[test]
    fn buffer_is_sorted_and_sized() {
        let mut builder = IndexBuilder::new();
        for i in 0..100 {
            builder.add_entry(&format!("tiles/{i}.pnts"), i);
        }
        let buf = builder.create_buffer();
        assert_eq!(buf.len(), 100 * INDEX_RECORD_SIZE);

        let index = parse_index(&buf, 0).unwrap();
        assert!(index.windows(2).all(|w| w[0].hash < w[1].hash));
    }

    #[test]
    fn empty_builder_gives_empty_buffer() {
        assert!(IndexBuilder::new().create_buffer().is_empty());
    }

    #[test]
    fn partial_record_is_corrupt() {
        let err = parse_index(&[0u8; 25], 0x100).unwrap_err();
        assert!(matches!(err, Error::Corrupt { offset: 0x100, .. }));
    }

    #[test]
    fn duplicate_hashes_still_resolve_to_one_of_them() {
        let h = hash(7, 7);
        let index = vec![
            IndexEntry { hash: hash(1, 0), offset: 0 },
            IndexEntry { hash: h, offset: 10 },
            IndexEntry { hash: h, offset: 20 },
            IndexEntry { hash: hash(9, 0), offset: 30 },
        ];
        let pos = find_entry(&index, &h).unwrap();
        assert!(pos == 1 || pos == 2);
    }
}
