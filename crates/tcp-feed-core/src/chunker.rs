//! Fixed-size chunking over any async byte source.
//!
//! A single `read` may return fewer bytes than asked for (sockets almost always
//! do). [`ChunkReader`] keeps reading until the chunk is full or the source is
//! exhausted, so a source of `S` bytes always yields `ceil(S / chunk_size)`
//! chunks and only the last one may be short.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct ChunkReader<R> {
    inner: R,
    buf: BytesMut,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::zeroed(chunk_size),
            offset: 0,
        }
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next chunk, or `None` once the source returns EOF with nothing buffered.
    pub async fn next_chunk(&mut self) -> io::Result<Option<&[u8]>> {
        let mut filled = 0;
        while filled < self.buf.len() {
            let n = self.inner.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        self.offset += filled as u64;
        Ok(Some(&self.buf[..filled]))
    }
}
