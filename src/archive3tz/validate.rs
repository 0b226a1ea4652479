//! Integrity checks for a loaded 3TZ index.
//!
//! Validation is explicit: opening an archive never runs it. Findings are
//! collected into a [`ValidationReport`] instead of being returned as
//! errors, so one run reports everything it can find.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use tracing::{debug, warn};

use super::index::{INDEX_ENTRY_NAME, IndexEntry, KeyHash, find_entry};
use crate::io::ReadAt;
use crate::zip::{CompressionMethod, ZipParser};

/// Key of the tileset's root manifest, which every 3TZ archive must hold
pub const ROOT_KEY: &str = "tileset.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The archive works, but some entry may be unreachable
    Warning,
    /// The archive does not satisfy the 3TZ format
    Error,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Several index records share one hash; only one of them can be found
    HashCollision { hash: KeyHash, positions: Vec<usize> },
    /// Record `position` sorts before record `position - 1`
    OrderViolation { position: usize },
    /// No record for the root manifest
    MissingRoot,
    /// The root manifest's record points at an unusable local header
    UnreachableRoot { offset: u64, reason: String },
    /// The central directory could not be read for the full check
    CentralDirectoryUnreadable { reason: String },
    /// A ZIP entry has no index record
    MissingFromIndex { name: String, offset: u64 },
    /// A ZIP entry's index record points elsewhere
    OffsetMismatch {
        name: String,
        zip_offset: u64,
        index_offset: u64,
    },
    /// A ZIP entry is compressed and cannot be served
    NotStored { name: String, method: u16 },
    /// Number of ZIP entries differs from the number of index records
    EntryCountMismatch {
        zip_entries: usize,
        index_entries: usize,
    },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::HashCollision { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::HashCollision { hash, positions } => {
                write!(f, "hash collision for {hash} at index positions {positions:?}")
            }
            Diagnostic::OrderViolation { position } => write!(
                f,
                "index is not sorted: record {} sorts before record {}",
                position,
                position - 1
            ),
            Diagnostic::MissingRoot => write!(f, "index has no record for {ROOT_KEY}"),
            Diagnostic::UnreachableRoot { offset, reason } => {
                write!(f, "{ROOT_KEY} at offset {offset:#x} is unreadable: {reason}")
            }
            Diagnostic::CentralDirectoryUnreadable { reason } => {
                write!(f, "central directory is unreadable: {reason}")
            }
            Diagnostic::MissingFromIndex { name, offset } => {
                write!(f, "entry {name:?} at offset {offset:#x} is not in the index")
            }
            Diagnostic::OffsetMismatch {
                name,
                zip_offset,
                index_offset,
            } => write!(
                f,
                "entry {name:?} is at offset {zip_offset:#x} but indexed at {index_offset:#x}"
            ),
            Diagnostic::NotStored { name, method } => {
                write!(f, "entry {name:?} uses compression method {method}, expected stored")
            }
            Diagnostic::EntryCountMismatch {
                zip_entries,
                index_entries,
            } => write!(
                f,
                "archive has {zip_entries} entries but the index has {index_entries} records"
            ),
        }
    }
}

/// Outcome of [`validate_index`]
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// True when no diagnostic has [`Severity::Error`]
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let valid = diagnostics.iter().all(|d| d.severity() < Severity::Error);
        Self { valid, diagnostics }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Error)
    }
}

/// Check `index` against the archive behind `parser`.
///
/// In order: the index must be strictly sorted (equal neighbours are
/// collisions, reported as warnings); [`ROOT_KEY`] must be found and its
/// local header must parse. Unless `quick` is set, every ZIP entry other
/// than the index itself, directory entries included, must also be indexed
/// at its real offset, and the entry count must match the record count.
pub fn validate_index<R: ReadAt + ?Sized>(
    parser: &ZipParser<R>,
    index: &[IndexEntry],
    quick: bool,
) -> ValidationReport {
    let mut diagnostics = check_order(index);

    match find_entry(index, &KeyHash::of(ROOT_KEY)) {
        None => diagnostics.push(Diagnostic::MissingRoot),
        Some(pos) => {
            let offset = index[pos].offset;
            if let Err(e) = parser.parse_local_file_header(offset, ROOT_KEY) {
                diagnostics.push(Diagnostic::UnreachableRoot {
                    offset,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !quick {
        check_entries(parser, index, &mut diagnostics);
    }

    for diagnostic in &diagnostics {
        match diagnostic.severity() {
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Error => debug!("{diagnostic}"),
        }
    }
    ValidationReport::from_diagnostics(diagnostics)
}

fn check_order(index: &[IndexEntry]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut collision: Option<Vec<usize>> = None;

    for i in 1..index.len() {
        match index[i - 1].hash.cmp(&index[i].hash) {
            Ordering::Less => {
                if let Some(positions) = collision.take() {
                    diagnostics.push(Diagnostic::HashCollision {
                        hash: index[i - 1].hash,
                        positions,
                    });
                }
            }
            Ordering::Equal => collision.get_or_insert_with(|| vec![i - 1]).push(i),
            Ordering::Greater => {
                if let Some(positions) = collision.take() {
                    diagnostics.push(Diagnostic::HashCollision {
                        hash: index[i - 1].hash,
                        positions,
                    });
                }
                diagnostics.push(Diagnostic::OrderViolation { position: i });
            }
        }
    }
    if let (Some(positions), Some(last)) = (collision, index.last()) {
        diagnostics.push(Diagnostic::HashCollision {
            hash: last.hash,
            positions,
        });
    }
    diagnostics
}

/// Positions of all records sharing the hash at `pos`; duplicates are
/// adjacent in a sorted index.
fn same_hash_run(index: &[IndexEntry], pos: usize) -> Range<usize> {
    let hash = index[pos].hash;
    let start = index[..pos]
        .iter()
        .rposition(|e| e.hash != hash)
        .map_or(0, |p| p + 1);
    let end = index[pos..]
        .iter()
        .position(|e| e.hash != hash)
        .map_or(index.len(), |p| pos + p);
    start..end
}

fn check_entries<R: ReadAt + ?Sized>(
    parser: &ZipParser<R>,
    index: &[IndexEntry],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let entries = match parser.list_entries() {
        Ok(entries) => entries,
        Err(e) => {
            diagnostics.push(Diagnostic::CentralDirectoryUnreadable {
                reason: e.to_string(),
            });
            return;
        }
    };

    let mut physical = 0;
    for entry in entries.iter().filter(|e| e.file_name != INDEX_ENTRY_NAME) {
        physical += 1;

        if entry.compression_method != CompressionMethod::Stored {
            diagnostics.push(Diagnostic::NotStored {
                name: entry.file_name.clone(),
                method: entry.compression_method.as_u16(),
            });
        }

        let Some(pos) = find_entry(index, &KeyHash::of(&entry.file_name)) else {
            diagnostics.push(Diagnostic::MissingFromIndex {
                name: entry.file_name.clone(),
                offset: entry.lfh_offset,
            });
            continue;
        };
        let run = same_hash_run(index, pos);
        if !index[run].iter().any(|e| e.offset == entry.lfh_offset) {
            diagnostics.push(Diagnostic::OffsetMismatch {
                name: entry.file_name.clone(),
                zip_offset: entry.lfh_offset,
                index_offset: index[pos].offset,
            });
        }
    }

    if physical != index.len() {
        diagnostics.push(Diagnostic::EntryCountMismatch {
            zip_entries: physical,
            index_entries: index.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(low: u64, offset: u64) -> IndexEntry {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&low.to_le_bytes());
        IndexEntry {
            hash: KeyHash(bytes),
            offset,
        }
    }

    #[test]
    fn sorted_index_has_no_findings() {
        let index = [entry(1, 0), entry(2, 10), entry(3, 20)];
        assert!(check_order(&index).is_empty());
    }

    #[test]
    fn swapped_records_are_an_order_violation() {
        let index = [entry(1, 0), entry(3, 20), entry(2, 10)];
        assert_eq!(
            check_order(&index),
            vec![Diagnostic::OrderViolation { position: 2 }]
        );
    }

    #[test]
    fn collision_groups_are_reported_once() {
        let index = [
            entry(1, 0),
            entry(2, 10),
            entry(2, 20),
            entry(2, 30),
            entry(4, 40),
            entry(4, 50),
        ];
        let diagnostics = check_order(&index);
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::HashCollision {
                    hash: index[1].hash,
                    positions: vec![1, 2, 3],
                },
                Diagnostic::HashCollision {
                    hash: index[4].hash,
                    positions: vec![4, 5],
                },
            ]
        );
        assert!(diagnostics.iter().all(|d| d.severity() == Severity::Warning));
    }

    #[test]
    fn run_of_equal_hashes() {
        let index = [entry(1, 0), entry(2, 10), entry(2, 20), entry(3, 30)];
        assert_eq!(same_hash_run(&index, 2), 1..3);
        assert_eq!(same_hash_run(&index, 1), 1..3);
        assert_eq!(same_hash_run(&index, 0), 0..1);
        assert_eq!(same_hash_run(&index, 3), 3..4);
    }

    #[test]
    fn warnings_alone_keep_report_valid() {
        let report = ValidationReport::from_diagnostics(vec![Diagnostic::HashCollision {
            hash: KeyHash([0; 16]),
            positions: vec![0, 1],
        }]);
        assert!(report.valid);
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.errors().count(), 0);

        let report = ValidationReport::from_diagnostics(vec![Diagnostic::MissingRoot]);
        assert!(!report.valid);
    }
}
