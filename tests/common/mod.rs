//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::Path;

use tiles3tz::Archive3tzWriter;
use tiles3tz::archive3tz::{INDEX_ENTRY_NAME, INDEX_RECORD_SIZE};

/// Writes a 3TZ archive at `path` holding `entries` in the given order.
pub fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = Archive3tzWriter::new();
    writer.begin(path, true).unwrap();
    for (key, data) in entries {
        writer.add_entry(key, data).unwrap();
    }
    writer.end().unwrap();
}

/// Deterministic pseudo-random bytes.
pub fn tile_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

/// Byte position of the index payload inside an archive written by
/// [`Archive3tzWriter`]: the first occurrence of the index name is its local
/// header, and the writer emits no local extra fields.
pub fn index_payload_offset(archive: &[u8]) -> usize {
    let name = INDEX_ENTRY_NAME.as_bytes();
    let pos = archive
        .windows(name.len())
        .position(|w| w == name)
        .expect("index entry name present");
    pos + name.len()
}

/// Byte range of index record `position` inside an archive.
pub fn index_record_range(archive: &[u8], position: usize) -> std::ops::Range<usize> {
    let start = index_payload_offset(archive) + position * INDEX_RECORD_SIZE;
    start..start + INDEX_RECORD_SIZE
}

/// Sample tileset: a root manifest and a few tiles.
pub fn sample_entries() -> Vec<(String, Vec<u8>)> {
    let mut entries = vec![(
        "tileset.json".to_string(),
        br#"{"asset":{"version":"1.1"},"geometricError":100}"#.to_vec(),
    )];
    for (i, name) in ["0/0/0.b3dm", "1/0/0.b3dm", "1/1/0.b3dm", "1/0/1.pnts", "1/1/1.i3dm"]
        .iter()
        .enumerate()
    {
        entries.push((name.to_string(), tile_bytes(100 + i * 37, i as u32)));
    }
    entries
}

pub fn as_refs(entries: &[(String, Vec<u8>)]) -> Vec<(&str, &[u8])> {
    entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_slice()))
        .collect()
}
