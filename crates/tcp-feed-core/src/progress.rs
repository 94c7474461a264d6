use tcp_feed_abstract::{ProgressMode, SenderConfig};
use tokio::sync::watch;

/// Receives progress updates from a running transfer.
pub trait ProgressSink: Send {
    fn start(&mut self, _total: u64) {}

    fn advance(&mut self, delta: u64);

    fn finish(&mut self) {}
}

/// Increment applied to the indicator for each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    Bytes,
    Fixed(u64),
}

impl ProgressStep {
    pub fn from_config(config: &SenderConfig) -> Self {
        match config.progress {
            ProgressMode::Bytes => ProgressStep::Bytes,
            ProgressMode::Legacy => ProgressStep::Fixed(config.legacy_progress_step),
        }
    }

    pub fn delta(&self, chunk_len: usize) -> u64 {
        match self {
            ProgressStep::Bytes => chunk_len as u64,
            ProgressStep::Fixed(step) => *step,
        }
    }
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn advance(&mut self, _delta: u64) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub total: u64,
    pub position: u64,
    pub updates: u64,
    pub finished: bool,
}

impl ProgressState {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            if self.finished { 1.0 } else { 0.0 }
        } else {
            (self.position as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Publishes every update as a [`ProgressState`] snapshot on a watch channel.
pub struct WatchProgress {
    tx: watch::Sender<ProgressState>,
}

impl WatchProgress {
    pub fn channel() -> (Self, watch::Receiver<ProgressState>) {
        let (tx, rx) = watch::channel(ProgressState::default());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgress {
    fn start(&mut self, total: u64) {
        self.tx.send_modify(|s| {
            *s = ProgressState {
                total,
                ..Default::default()
            }
        });
    }

    fn advance(&mut self, delta: u64) {
        self.tx.send_modify(|s| {
            s.position += delta;
            s.updates += 1;
        });
    }

    fn finish(&mut self) {
        self.tx.send_modify(|s| s.finished = true);
    }
}
