//! Inter-chunk pacing.
//!
//! A [`Pacer`] only decides how long to hold off after a chunk went out. The
//! caller owns the actual wait, so a pause can be raced against shutdown or
//! any other event instead of parking the thread.

use std::time::Duration;
use tcp_feed_abstract::{ConfigError, PacingConfig};
use tokio::time::Instant;

pub trait Pacer: Send + Sync {
    /// Pause required after `sent` bytes were written at `now`.
    fn pause_after(&mut self, sent: usize, now: Instant) -> Duration;

    /// Human-readable summary for logs and reports.
    fn describe(&self) -> String;
}

/// Constant pause after every chunk.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Pacer for FixedDelay {
    fn pause_after(&mut self, _sent: usize, _now: Instant) -> Duration {
        self.delay
    }

    fn describe(&self) -> String {
        format!("fixed delay {} ms", self.delay.as_millis())
    }
}

/// Token bucket holding up to `burst` bytes, refilled at `rate` bytes/s.
///
/// Tokens may go negative: a chunk larger than the balance is sent anyway and
/// the debt is paid back by the returned pause.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Option<Instant>,
}

impl TokenBucket {
    pub fn new(bytes_per_sec: u64, burst_bytes: u64) -> Result<Self, ConfigError> {
        if bytes_per_sec == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if burst_bytes == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        Ok(Self {
            rate: bytes_per_sec as f64,
            burst: burst_bytes as f64,
            tokens: burst_bytes as f64,
            last: None,
        })
    }

    fn refill(&mut self, now: Instant) {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        }
        self.last = Some(now);
    }
}

impl Pacer for TokenBucket {
    fn pause_after(&mut self, sent: usize, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= sent as f64;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }

    fn describe(&self) -> String {
        format!(
            "token bucket {} B/s (burst {} B)",
            self.rate as u64, self.burst as u64
        )
    }
}

pub struct Unpaced;

impl Pacer for Unpaced {
    fn pause_after(&mut self, _sent: usize, _now: Instant) -> Duration {
        Duration::ZERO
    }

    fn describe(&self) -> String {
        "unpaced".to_string()
    }
}

pub fn pacer_from_config(config: &PacingConfig) -> Result<Box<dyn Pacer>, ConfigError> {
    let pacer: Box<dyn Pacer> = match *config {
        PacingConfig::FixedDelay { delay_ms } => {
            Box::new(FixedDelay::new(Duration::from_millis(delay_ms)))
        }
        PacingConfig::TokenBucket {
            bytes_per_sec,
            burst_bytes,
        } => Box::new(TokenBucket::new(bytes_per_sec, burst_bytes)?),
        PacingConfig::Unpaced => Box::new(Unpaced),
    };
    Ok(pacer)
}
