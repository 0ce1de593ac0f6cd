//! Download progress sampling

use std::fmt;
use std::time::{Duration, Instant};

/// Bytes transferred so far against the size the server reported
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes written to disk so far
    pub bytes_downloaded: u64,

    /// Total bytes expected, when the server reported a length
    pub total_bytes: Option<u64>,

    started: Instant,
}

impl DownloadProgress {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded: 0,
            total_bytes,
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn advance(&mut self, bytes: usize) {
        self.bytes_downloaded += bytes as u64;
    }

    /// Completed fraction (0.0 to 1.0); 0.0 while the total is unknown
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (self.bytes_downloaded as f64 / total as f64).min(1.0),
            _ => 0.0,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_bytes {
            Some(total) => write!(
                f,
                "downloaded {} / {} bytes ({:.2}%)",
                self.bytes_downloaded,
                total,
                100.0 * self.fraction()
            ),
            None => write!(f, "downloaded {} bytes", self.bytes_downloaded),
        }
    }
}
