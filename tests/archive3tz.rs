//! Writing and reading 3TZ archives.

mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tiles3tz::archive3tz::{INDEX_ENTRY_NAME, KeyHash};
use tiles3tz::error::ArchiveState;
use tiles3tz::zip::{ZipParser, ZipWriter};
use tiles3tz::{Archive3tzReader, Archive3tzWriter, Error, LocalFileReader, MemoryReader};

use common::{as_refs, sample_entries, tile_bytes, write_archive};

#[test]
fn tileset_and_tile_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scenario.3tz");
    let tile = tile_bytes(256, 42);
    write_archive(&path, &[("tileset.json", b"{}" as &[u8]), ("0/0/0.b3dm", tile.as_slice())]);

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();

    let keys: Vec<String> = reader.keys().unwrap().map(|k| k.unwrap()).collect();
    let mut expected = vec!["tileset.json".to_string(), "0/0/0.b3dm".to_string()];
    expected.sort_by_key(|k| KeyHash::of(k));
    assert_eq!(keys, expected);

    assert_eq!(reader.entry("tileset.json").unwrap().unwrap(), b"{}");
    assert_eq!(reader.entry("0/0/0.b3dm").unwrap().unwrap(), tile);
    assert_eq!(reader.index().unwrap().len(), 2);

    let parser = ZipParser::new(Arc::new(LocalFileReader::new(&path).unwrap()));
    let entries = parser.list_entries().unwrap();
    let index_entry = entries.last().unwrap();
    assert_eq!(index_entry.file_name, INDEX_ENTRY_NAME);
    assert_eq!(index_entry.compressed_size, 48);

    reader.close().unwrap();
}

#[test]
fn every_key_reads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    let entries = sample_entries();
    write_archive(&path, &as_refs(&entries));

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();
    for (key, data) in &entries {
        assert_eq!(reader.entry(key).unwrap().as_ref(), Some(data), "{key}");
    }

    let parser = ZipParser::new(Arc::new(LocalFileReader::new(&path).unwrap()));
    for record in reader.index().unwrap() {
        let name = parser.read_file_name_at(record.offset).unwrap();
        assert_eq!(KeyHash::of(&name), record.hash);
    }
}

#[test]
fn missing_key_is_none() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    write_archive(&path, &as_refs(&sample_entries()));

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();
    assert!(reader.entry("nonexistent/key").unwrap().is_none());
    assert!(reader.entry("").unwrap().is_none());
}

#[test]
fn lookups_normalize_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    write_archive(&path, &[("tileset.json", b"{}" as &[u8]), ("a/b.txt", b"hello")]);

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();
    let plain = reader.entry("a/b.txt").unwrap();
    assert_eq!(plain.as_deref(), Some(&b"hello"[..]));
    assert_eq!(reader.entry("./a/b.txt").unwrap(), plain);
    assert_eq!(reader.entry("a\\b.txt").unwrap(), plain);
}

#[test]
fn keys_restart_on_every_call() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    write_archive(&path, &as_refs(&sample_entries()));

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();

    let mut partial = reader.keys().unwrap();
    let first = partial.next().unwrap().unwrap();
    assert_eq!(partial.len(), 5);

    let all: Vec<String> = reader.keys().unwrap().map(|k| k.unwrap()).collect();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0], first);
}

#[test]
fn empty_entries_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.3tz");
    write_archive(&path, &[("tileset.json", b"{}" as &[u8]), ("empty.bin", b"")]);

    let mut reader = Archive3tzReader::new();
    reader.open(path.to_str().unwrap()).unwrap();
    assert_eq!(reader.entry("empty.bin").unwrap(), Some(Vec::new()));
}

#[test]
fn reads_from_memory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    let entries = sample_entries();
    write_archive(&path, &as_refs(&entries));
    let bytes = std::fs::read(&path).unwrap();

    let mut reader = Archive3tzReader::new();
    reader
        .open_with(Arc::new(MemoryReader::new(bytes)))
        .unwrap();
    assert_eq!(reader.entry("1/1/1.i3dm").unwrap().unwrap(), entries[5].1);
}

#[test]
fn writer_refuses_existing_file_without_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    std::fs::write(&path, b"keep me").unwrap();

    let mut writer = Archive3tzWriter::new();
    let err = writer.begin(&path, false).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }), "{err}");
    assert!(!writer.is_open());
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");

    writer.begin(&path, true).unwrap();
    writer.add_entry("tileset.json", b"{}").unwrap();
    writer.end().unwrap();
    assert_ne!(std::fs::read(&path).unwrap(), b"keep me");
}

#[test]
fn writer_state_machine() {
    let dir = TempDir::new().unwrap();
    let mut writer = Archive3tzWriter::new();

    assert!(matches!(
        writer.add_entry("a", b"x"),
        Err(Error::State {
            expected: ArchiveState::Open,
            ..
        })
    ));
    assert!(matches!(writer.end(), Err(Error::State { .. })));

    writer.begin(dir.path().join("one.3tz"), false).unwrap();
    assert!(matches!(
        writer.begin(dir.path().join("two.3tz"), false),
        Err(Error::State {
            expected: ArchiveState::Closed,
            ..
        })
    ));
    assert!(matches!(
        writer.add_entry(INDEX_ENTRY_NAME, b""),
        Err(Error::InvalidKey { .. })
    ));
    writer.add_entry("tileset.json", b"1").unwrap();
    writer.end().unwrap();

    // Reusable after end
    writer.begin(dir.path().join("two.3tz"), false).unwrap();
    writer.add_entry("tileset.json", b"2").unwrap();
    writer.end().unwrap();

    let mut reader = Archive3tzReader::new();
    reader
        .open(dir.path().join("two.3tz").to_str().unwrap())
        .unwrap();
    assert_eq!(reader.entry("tileset.json").unwrap().unwrap(), b"2");
}

#[test]
fn reader_state_machine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.3tz");
    write_archive(&path, &[("tileset.json", b"{}" as &[u8])]);
    let path = path.to_str().unwrap();

    let mut reader = Archive3tzReader::new();
    assert!(matches!(reader.entry("tileset.json"), Err(Error::State { .. })));
    assert!(reader.keys().is_err());
    assert!(reader.close().is_err());

    reader.open(path).unwrap();
    assert!(matches!(
        reader.open(path),
        Err(Error::State {
            expected: ArchiveState::Closed,
            ..
        })
    ));
    reader.close().unwrap();
    assert!(!reader.is_open());
    assert!(reader.index().is_err());

    reader.open(path).unwrap();
    assert!(reader.entry("tileset.json").unwrap().is_some());
}

#[test]
fn open_rejects_plain_zip_without_index() {
    let mut zip = ZipWriter::new(Vec::new());
    zip.add_stored("tileset.json", b"{}").unwrap();
    let bytes = zip.finish().unwrap();

    let mut reader = Archive3tzReader::new();
    let err = reader
        .open_with(Arc::new(MemoryReader::new(bytes)))
        .unwrap_err();
    match err {
        Error::Corrupt { reason, .. } => assert!(reason.contains(INDEX_ENTRY_NAME), "{reason}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!reader.is_open());
}

#[test]
fn open_rejects_partial_index_record() {
    let mut zip = ZipWriter::new(Vec::new());
    zip.add_stored("tileset.json", b"{}").unwrap();
    zip.add_stored(INDEX_ENTRY_NAME, &[0u8; 25]).unwrap();
    let bytes = zip.finish().unwrap();

    let mut reader = Archive3tzReader::new();
    let err = reader
        .open_with(Arc::new(MemoryReader::new(bytes)))
        .unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }), "{err}");
}

#[test]
fn open_rejects_non_zip_and_truncated_files() {
    let mut reader = Archive3tzReader::new();
    let err = reader
        .open_with(Arc::new(MemoryReader::new(vec![0u8; 100])))
        .unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }), "{err}");

    let err = reader
        .open_with(Arc::new(MemoryReader::new(b"PK".to_vec())))
        .unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }), "{err}");
}

#[test]
fn open_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.3tz");
    let mut reader = Archive3tzReader::new();
    assert!(matches!(
        reader.open(path.to_str().unwrap()),
        Err(Error::Io(_))
    ));
}

#[test]
fn writer_begin_reports_io_failures_as_io() {
    let dir = TempDir::new().unwrap();
    let mut writer = Archive3tzWriter::new();
    let err = writer
        .begin(dir.path().join("missing/tiles.3tz"), false)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
    assert!(!writer.is_open());
}

#[cfg(target_os = "linux")]
#[test]
fn failed_write_closes_writer() {
    let mut writer = Archive3tzWriter::new();
    writer.begin("/dev/full", true).unwrap();

    // Larger than the write buffer, so it reaches the device
    let tile = tile_bytes(64 * 1024, 7);
    assert!(matches!(
        writer.add_entry("0/0/0.b3dm", &tile),
        Err(Error::Io(_))
    ));
    assert!(!writer.is_open());
    assert!(matches!(
        writer.end(),
        Err(Error::State {
            expected: ArchiveState::Open,
            ..
        })
    ));
}
