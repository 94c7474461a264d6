//! Paced raw TCP file streaming.
//!
//! - [`sender`]  : connect, open source, stream chunks, close
//! - [`chunker`] : fixed-size chunking over any async reader
//! - [`pacer`]   : pause policy between chunks
//! - [`progress`]: progress sinks and per-chunk step
//! - [`receiver`]: single-connection capture host
//! - [`report`]  : serializable run summaries

pub mod chunker;
pub mod error;
pub mod pacer;
pub mod progress;
pub mod receiver;
pub mod report;
pub mod sender;

pub use error::{FeedError, Result};
pub use pacer::{FixedDelay, Pacer, TokenBucket, Unpaced, pacer_from_config};
pub use progress::{NullProgress, ProgressSink, ProgressState, ProgressStep, WatchProgress};
pub use receiver::Receiver;
pub use report::{CaptureReport, TransferReport};
pub use sender::{Sender, Source, send_file};
pub use tcp_feed_abstract::{ConfigError, PacingConfig, ProgressMode, ReceiverConfig, SenderConfig};
