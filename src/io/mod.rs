mod http;
mod local;
mod memory;

pub use http::{HttpOptions, HttpRangeReader};
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use crate::error::{Error, Result};

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill the whole buffer from `offset`, failing if the source ends first.
    ///
    /// A short read means the archive is truncated, so it is reported as
    /// [`Error::Corrupt`] at the offset where data ran out.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let pos = offset + filled as u64;
            let n = self.read_at(pos, &mut buf[filled..])?;
            if n == 0 {
                return Err(Error::corrupt(
                    pos,
                    format!(
                        "unexpected end of archive: needed {} more bytes",
                        buf.len() - filled
                    ),
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// Whether `path` names a remote archive rather than a local file
pub fn is_http_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}
