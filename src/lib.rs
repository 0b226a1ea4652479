//! # tiles3tz
//!
//! Storage for large 3D Tiles tilesets in 3TZ archives.
//!
//! A tileset is thousands of small tile files plus a `tileset.json`
//! manifest. A 3TZ archive packs them into a single ZIP file with every
//! entry stored uncompressed, and appends a sorted table of key hashes so
//! any entry can be found without listing the archive. That makes random
//! access cheap both for local files and for remote ones fetched with HTTP
//! Range requests.
//!
//! ## Features
//!
//! - Create 3TZ archives from `(key, bytes)` pairs
//! - Look up entries by key with a binary search over the index
//! - Read local files or HTTP/HTTPS URLs using Range requests
//! - Support for ZIP64 offsets (archives larger than 4GB)
//! - Validate index order, hash collisions, the root manifest and, fully,
//!   the index against the central directory
//! - Convert between 3TZ archives and plain directories
//!
//! ## Example
//!
//! ```no_run
//! use tiles3tz::{Archive3tzReader, Archive3tzWriter};
//!
//! let mut writer = Archive3tzWriter::new();
//! writer.begin("tiles.3tz", true)?;
//! writer.add_entry("tileset.json", b"{}")?;
//! writer.end()?;
//!
//! let mut reader = Archive3tzReader::new();
//! reader.open("tiles.3tz")?;
//! for key in reader.keys()? {
//!     println!("{}", key?);
//! }
//! assert_eq!(reader.entry("./tileset.json")?.as_deref(), Some(&b"{}"[..]));
//! # Ok::<(), tiles3tz::Error>(())
//! ```

pub mod archive;
pub mod archive3tz;
pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use archive::{TilesetSource, TilesetTarget, create_target, normalize_key, open_source};
pub use archive3tz::{Archive3tzReader, Archive3tzWriter, ValidationReport};
pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{HttpOptions, HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
