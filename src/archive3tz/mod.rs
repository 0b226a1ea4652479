//! 3TZ archives: ZIP containers with a sorted hash index.
//!
//! ## Layout
//!
//! A 3TZ file is an ordinary ZIP file whose entries are all stored
//! uncompressed. Its last entry, [`INDEX_ENTRY_NAME`], holds one 24-byte
//! record per other entry:
//!
//! | Bytes | Content |
//! |-------|---------|
//! | 0..16 | MD5 of the entry key |
//! | 16..24 | little-endian offset of the entry's local file header |
//!
//! Records are sorted by [`KeyHash`]'s ordering. A reader only needs the
//! last central directory record to find the index; after that, any entry
//! is one binary search and two positioned reads away.
//!
//! ## Limitations
//!
//! Keys whose hashes collide cannot all be reached: the binary search lands
//! on one of the colliding records. [`validate_index`] reports collisions as
//! warnings.

mod index;
mod reader;
mod validate;
mod writer;

pub use index::{
    INDEX_ENTRY_NAME, INDEX_RECORD_SIZE, IndexBuilder, IndexEntry, KeyHash, find_entry,
    parse_index,
};
pub use reader::{Archive3tzReader, Keys};
pub use validate::{Diagnostic, ROOT_KEY, Severity, ValidationReport, validate_index};
pub use writer::Archive3tzWriter;
