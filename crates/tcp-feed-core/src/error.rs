use std::io;
use std::path::PathBuf;
use tcp_feed_abstract::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to open {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at byte offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("write of chunk {chunk} failed: {source}")]
    Write {
        chunk: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to write capture output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cancelled after {bytes} bytes")]
    Cancelled { bytes: u64 },
}

pub type Result<T> = std::result::Result<T, FeedError>;
