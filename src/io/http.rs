use reqwest::blocking::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use crate::error::{Error, Result};

/// Connection settings for [`HttpRangeReader`]
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts allowed for timeouts and connection failures
    pub max_retry: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retry: 10,
        }
    }
}

/// HTTP Range reader for remote archives
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to verify Range support and get file size
    pub fn new(url: String, options: &HttpOptions) -> Result<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;

        // Send HEAD request to check capabilities
        let resp = client.head(&url).send()?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "HEAD {} failed with status: {}",
                url,
                resp.status()
            )));
        }

        // Check if server supports Range requests
        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            return Err(Error::Http(format!(
                "{url} does not support Range requests"
            )));
        }

        // Get file size from Content-Length
        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Http(format!("{url} did not return Content-Length")))?;

        debug!(url = %url, size, "opened remote archive");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: options.max_retry,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

impl ReadAt for HttpRangeReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self.client.get(&self.url).header("Range", &range).send();

            match result {
                Ok(resp) => {
                    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
                        return Err(Error::Http(format!(
                            "range {} failed with status: {}",
                            range,
                            resp.status()
                        )));
                    }

                    let bytes = resp.bytes()?;
                    if bytes.is_empty() {
                        break;
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(Error::Http(format!("max retries exceeded: {e}")));
                    }
                    warn!(retry = retry_count, max = self.max_retry, error = %e, "connection error");
                    std::thread::sleep(Duration::from_millis(500 * retry_count as u64));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
