//! Paced raw-stream sender.
//!
//! One connection, one source, no framing. Each chunk read from the source is
//! handed to a single `write_all`, the progress sink is advanced, and the
//! configured [`Pacer`] decides how long to wait before the next read.
//!
//! Any I/O fault ends the run; nothing is retried.

use crate::chunker::ChunkReader;
use crate::error::{FeedError, Result};
use crate::pacer::{Pacer, pacer_from_config};
use crate::progress::{ProgressSink, ProgressStep};
use crate::report::TransferReport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcp_feed_abstract::SenderConfig;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bytes to stream, plus the total the progress indicator is sized to.
pub struct Source<R> {
    reader: R,
    path: PathBuf,
    size_path: PathBuf,
    display_total: u64,
}

impl Source<File> {
    /// Open `path` for streaming and stat `size_path` for the display total.
    pub async fn open(path: &Path, size_path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|source| FeedError::OpenSource {
                path: path.to_path_buf(),
                source,
            })?;

        let metadata = if size_path == path {
            file.metadata().await
        } else {
            tokio::fs::metadata(size_path).await
        };
        let display_total = metadata
            .map_err(|source| FeedError::Stat {
                path: size_path.to_path_buf(),
                source,
            })?
            .len();

        Ok(Self {
            reader: file,
            path: path.to_path_buf(),
            size_path: size_path.to_path_buf(),
            display_total,
        })
    }
}

impl<R: AsyncRead + Unpin> Source<R> {
    pub fn from_reader(reader: R, label: impl Into<PathBuf>, display_total: u64) -> Self {
        let path = label.into();
        Self {
            reader,
            size_path: path.clone(),
            path,
            display_total,
        }
    }

    pub fn display_total(&self) -> u64 {
        self.display_total
    }
}

pub struct Sender<W> {
    stream: W,
    peer: String,
    config: SenderConfig,
    pacer: Box<dyn Pacer>,
    shutdown: Arc<Notify>,
}

impl Sender<TcpStream> {
    /// Validate `config` and open the connection. No retry on failure.
    pub async fn connect(config: SenderConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.destination();
        info!("Connecting to {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| FeedError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or(addr);
        info!("Connected to {}", peer);

        Self::with_stream(config, stream, peer)
    }
}

impl<W: AsyncWrite + Unpin> Sender<W> {
    /// Wrap an already open connection. Fails on an invalid config.
    pub fn with_stream(config: SenderConfig, stream: W, peer: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let pacer = pacer_from_config(&config.pacing)?;
        Ok(Self {
            stream,
            peer: peer.into(),
            config,
            pacer,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Notifying this handle aborts a pending write or pause.
    pub fn with_shutdown(mut self, shutdown: Arc<Notify>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Open the configured source file.
    pub async fn open_file(&self) -> Result<Source<File>> {
        let source = self.config.source.clone();
        let size_path = self.config.size_path().to_path_buf();
        Source::open(&source, &size_path).await
    }

    /// Stream `source` to the peer until EOF, then close the write side.
    pub async fn run<R: AsyncRead + Unpin>(
        &mut self,
        source: Source<R>,
        progress: &mut dyn ProgressSink,
    ) -> Result<TransferReport> {
        let Source {
            reader,
            path,
            size_path,
            display_total,
        } = source;
        let step = ProgressStep::from_config(&self.config);

        if let ProgressStep::Fixed(n) = step {
            warn!(
                "Legacy progress display: indicator advances {} per chunk regardless of chunk length",
                n
            );
        }
        if size_path != path {
            warn!(
                "Progress total taken from {} while streaming {}",
                size_path.display(),
                path.display()
            );
        }
        info!(
            "Streaming {} to {} in {}-byte chunks ({})",
            path.display(),
            self.peer,
            self.config.chunk_size,
            self.pacer.describe()
        );

        progress.start(display_total);
        let mut chunks = ChunkReader::new(reader, self.config.chunk_size);
        let started = Instant::now();
        let mut bytes_sent = 0u64;
        let mut chunks_sent = 0u64;
        let mut last_chunk_len = 0usize;
        let mut display_position = 0u64;

        loop {
            let offset = chunks.offset();
            let chunk = match chunks.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(source) => return Err(FeedError::Read { offset, source }),
            };
            let len = chunk.len();

            tokio::select! {
                res = self.stream.write_all(chunk) => {
                    res.map_err(|source| FeedError::Write { chunk: chunks_sent, source })?;
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested during write of chunk {}", chunks_sent);
                    return Err(FeedError::Cancelled { bytes: bytes_sent });
                }
            }

            bytes_sent += len as u64;
            chunks_sent += 1;
            last_chunk_len = len;
            let delta = step.delta(len);
            display_position += delta;
            progress.advance(delta);
            debug!("Sent chunk {} ({} bytes, {} total)", chunks_sent, len, bytes_sent);

            let pause = self.pacer.pause_after(len, Instant::now());
            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.shutdown.notified() => {
                        info!("Shutdown requested after {} chunks", chunks_sent);
                        return Err(FeedError::Cancelled { bytes: bytes_sent });
                    }
                }
            }
        }
        // Source handle is released here, before the connection is closed.
        drop(chunks);

        self.stream
            .flush()
            .await
            .map_err(|source| FeedError::Write {
                chunk: chunks_sent,
                source,
            })?;
        if let Err(e) = self.stream.shutdown().await {
            warn!("Closing connection to {} failed: {}", self.peer, e);
        }

        let report = TransferReport {
            peer: self.peer.clone(),
            source: path,
            size_source: size_path,
            display_total,
            bytes_sent,
            chunks_sent,
            last_chunk_len,
            display_position,
            progress_mode: self.config.progress,
            pacing: self.pacer.describe(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        progress.finish();

        if report.display_mismatch() {
            warn!(
                "Progress display ended at {}/{} but {} bytes were sent",
                report.display_position, report.display_total, report.bytes_sent
            );
        }
        info!(
            "Sent {} bytes in {} chunks to {} ({} ms, {:.0} B/s)",
            bytes_sent,
            chunks_sent,
            self.peer,
            report.elapsed_ms,
            report.throughput_bytes_per_sec()
        );
        Ok(report)
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

/// Connect, open the source, stream it. The connection is made before the
/// source is touched, so an unreachable peer fails without reading anything.
pub async fn send_file(
    config: SenderConfig,
    progress: &mut dyn ProgressSink,
    shutdown: Arc<Notify>,
) -> Result<TransferReport> {
    let mut sender = Sender::connect(config).await?.with_shutdown(shutdown);
    let source = sender.open_file().await?;
    sender.run(source, progress).await
}
