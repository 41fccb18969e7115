//! Transfer progress and cooperative cancellation.

pub use tokio_util::sync::CancellationToken;

/// Reported after every DATA frame of a pull or push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Bytes moved so far in this transfer
    pub bytes_transferred: u64,
    /// Total size when known up front
    pub total_bytes: Option<u64>,
}

impl SyncProgress {
    pub fn new(bytes_transferred: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
        }
    }

    /// Completion in 0.0..=100.0, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_transferred as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}
