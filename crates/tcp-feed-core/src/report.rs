use serde::Serialize;
use std::path::PathBuf;
use tcp_feed_abstract::ProgressMode;

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub peer: String,
    pub source: PathBuf,
    pub size_source: PathBuf,
    /// Total the progress indicator was sized to.
    pub display_total: u64,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub last_chunk_len: usize,
    /// Where the progress indicator ended up.
    pub display_position: u64,
    pub progress_mode: ProgressMode,
    pub pacing: String,
    pub elapsed_ms: u64,
}

impl TransferReport {
    /// Whether the indicator ended somewhere other than the streamed byte count.
    pub fn display_mismatch(&self) -> bool {
        self.display_total != self.bytes_sent || self.display_position != self.bytes_sent
    }

    pub fn throughput_bytes_per_sec(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.bytes_sent as f64 * 1000.0 / self.elapsed_ms as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub peer: String,
    pub output: Option<PathBuf>,
    pub record_len: usize,
    pub records: u64,
    /// Bytes of an incomplete final record.
    pub trailing_bytes: usize,
    pub bytes_received: u64,
    pub elapsed_ms: u64,
}
