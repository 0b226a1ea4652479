//! Minimal ZIP container support for 3TZ archives.
//!
//! This module reads and writes just the subset of ZIP a 3TZ archive
//! needs: stored (uncompressed) entries on a single disk, with ZIP64
//! extensions for archives past 4GB.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Positioned parsing of ZIP structures from any [`ReadAt`](crate::io::ReadAt) source
//! - [`writer`]: Streaming writer for stored entries and the central directory
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and stored data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Limitations
//!
//! - No compression, only STORED entries
//! - No encryption support
//! - No multi-disk archive support
//! - No data descriptors when writing; local headers always carry the sizes

mod parser;
mod structures;
mod writer;

pub use parser::{CD_TAIL_WINDOW, ZipParser, parse_central_directory_entry};
pub use structures::*;
pub use writer::ZipWriter;
