//! Single-connection capture host.
//!
//! Accepts one peer, reads its stream in fixed-length records and optionally
//! writes the raw bytes to disk. The stream carries no framing, so the peer
//! closing the connection is the only end-of-transfer signal. A final record
//! shorter than `record_len` is kept and reported as trailing bytes.

use crate::chunker::ChunkReader;
use crate::error::{FeedError, Result};
use crate::progress::ProgressSink;
use crate::report::CaptureReport;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tcp_feed_abstract::ReceiverConfig;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct Receiver {
    listener: TcpListener,
    config: ReceiverConfig,
    shutdown: Arc<Notify>,
}

impl Receiver {
    pub async fn bind(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| FeedError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Listening on {}", addr);
        Ok(Self {
            listener,
            config,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn with_shutdown(mut self, shutdown: Arc<Notify>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|source| FeedError::Bind {
                addr: self.config.bind_addr(),
                source,
            })
    }

    /// Accept exactly one connection and capture it until the peer closes.
    pub async fn accept_and_capture(self, progress: &mut dyn ProgressSink) -> Result<CaptureReport> {
        let (stream, peer) = tokio::select! {
            res = self.listener.accept() => res.map_err(FeedError::Accept)?,
            _ = self.shutdown.notified() => return Err(FeedError::Cancelled { bytes: 0 }),
        };
        info!("Connection from {}", peer);
        // One client only; stop listening before reading.
        drop(self.listener);

        capture(stream, peer.to_string(), &self.config, progress, &self.shutdown).await
    }
}

async fn open_output(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path).await.map_err(|source| FeedError::Output {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `reader` to EOF in `record_len` records.
pub async fn capture<R: AsyncRead + Unpin>(
    reader: R,
    peer: String,
    config: &ReceiverConfig,
    progress: &mut dyn ProgressSink,
    shutdown: &Notify,
) -> Result<CaptureReport> {
    let mut output = match &config.output {
        Some(path) => Some(BufWriter::new(open_output(path, config.append).await?)),
        None => None,
    };
    let output_err = |source: std::io::Error| FeedError::Output {
        path: config.output.clone().unwrap_or_default(),
        source,
    };

    progress.start(0);
    let mut records_in = ChunkReader::new(reader, config.record_len);
    let started = Instant::now();
    let mut records = 0u64;
    let mut trailing_bytes = 0usize;

    loop {
        let offset = records_in.offset();
        let next = tokio::select! {
            res = records_in.next_chunk() => res,
            _ = shutdown.notified() => return Err(FeedError::Cancelled { bytes: offset }),
        };
        let record = match next {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(source) => return Err(FeedError::Read { offset, source }),
        };

        if let Some(out) = output.as_mut() {
            out.write_all(record).await.map_err(output_err)?;
        }
        progress.advance(record.len() as u64);

        if record.len() < config.record_len {
            trailing_bytes = record.len();
        } else {
            records += 1;
            debug!("Record {} received", records);
        }
    }

    if let Some(mut out) = output {
        out.flush().await.map_err(output_err)?;
    }
    progress.finish();

    if trailing_bytes > 0 {
        warn!(
            "Stream ended mid-record: {} of {} bytes in the last record",
            trailing_bytes, config.record_len
        );
    }
    let report = CaptureReport {
        peer,
        output: config.output.clone(),
        record_len: config.record_len,
        records,
        trailing_bytes,
        bytes_received: records_in.offset(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Captured {} bytes ({} records) from {}",
        report.bytes_received, report.records, report.peer
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;

    #[tokio::test]
    async fn counts_full_records_and_trailing_bytes() {
        let config = ReceiverConfig {
            output: None,
            record_len: 1036,
            ..Default::default()
        };
        let data = vec![7u8; 1036 * 3 + 10];
        let report = capture(
            data.as_slice(),
            "test".into(),
            &config,
            &mut NullProgress,
            &Notify::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.records, 3);
        assert_eq!(report.trailing_bytes, 10);
        assert_eq!(report.bytes_received, 1036 * 3 + 10);
    }

    #[tokio::test]
    async fn writes_raw_stream_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let config = ReceiverConfig {
            output: Some(path.clone()),
            record_len: 4,
            ..Default::default()
        };
        let data: Vec<u8> = (0..10u8).collect();
        capture(
            data.as_slice(),
            "test".into(),
            &config,
            &mut NullProgress,
            &Notify::new(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);

        // Appending keeps the earlier capture in front.
        let config = ReceiverConfig {
            append: true,
            ..config
        };
        capture(
            &b"xy"[..],
            "test".into(),
            &config,
            &mut NullProgress,
            &Notify::new(),
        )
        .await
        .unwrap();
        let mut expected = data.clone();
        expected.extend_from_slice(b"xy");
        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }
}
