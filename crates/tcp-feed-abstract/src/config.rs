use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "10.10.1.10";
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_SOURCE: &str = "noHeader.bin";
/// File the legacy progress bar took its total from.
pub const LEGACY_SIZE_SOURCE: &str = "data.bin";
pub const DEFAULT_CHUNK_SIZE: usize = 1035;
pub const DEFAULT_DELAY_MS: u64 = 5;
/// Per-chunk increment the legacy progress bar used, independent of chunk length.
pub const LEGACY_PROGRESS_STEP: u64 = 1036;
/// Record length the capture host reads the stream in.
pub const DEFAULT_RECORD_LEN: usize = 1036;
pub const DEFAULT_OUTPUT: &str = "data.bin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be non-zero")]
    ZeroPort,
    #[error("chunk size must be at least one byte")]
    ZeroChunkSize,
    #[error("record length must be at least one byte")]
    ZeroRecordLen,
    #[error("token bucket rate must be positive")]
    ZeroRate,
    #[error("token bucket burst must be positive")]
    ZeroBurst,
    #[error("legacy progress step must be positive")]
    ZeroProgressStep,
}

/// How the progress indicator advances per chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Advance by the number of bytes actually written.
    #[default]
    Bytes,
    /// Advance by a constant step per chunk, whatever its length.
    Legacy,
}

/// Pause policy applied between chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacingConfig {
    FixedDelay { delay_ms: u64 },
    TokenBucket { bytes_per_sec: u64, burst_bytes: u64 },
    Unpaced,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig::FixedDelay {
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PacingConfig::TokenBucket {
            bytes_per_sec,
            burst_bytes,
        } = self
        {
            if *bytes_per_sec == 0 {
                return Err(ConfigError::ZeroRate);
            }
            if *burst_bytes == 0 {
                return Err(ConfigError::ZeroBurst);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SenderConfig {
    pub host: String,
    pub port: u16,
    /// File whose bytes are streamed.
    pub source: PathBuf,
    /// File stat'ed for the progress total. Falls back to `source`.
    pub size_source: Option<PathBuf>,
    pub chunk_size: usize,
    pub pacing: PacingConfig,
    pub progress: ProgressMode,
    pub legacy_progress_step: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            source: PathBuf::from(DEFAULT_SOURCE),
            size_source: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: PacingConfig::default(),
            progress: ProgressMode::Bytes,
            legacy_progress_step: LEGACY_PROGRESS_STEP,
        }
    }
}

impl SenderConfig {
    /// Legacy display without an explicit size source takes its total from
    /// `data.bin`. Applied once after all config layers are merged.
    pub fn with_legacy_defaults(mut self) -> Self {
        if self.progress == ProgressMode::Legacy && self.size_source.is_none() {
            self.size_source = Some(PathBuf::from(LEGACY_SIZE_SOURCE));
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.progress == ProgressMode::Legacy && self.legacy_progress_step == 0 {
            return Err(ConfigError::ZeroProgressStep);
        }
        self.pacing.validate()
    }

    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn size_path(&self) -> &Path {
        self.size_source.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    /// Raw stream is written here when set.
    pub output: Option<PathBuf>,
    /// Append to `output` instead of truncating it.
    pub append: bool,
    pub record_len: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            output: Some(PathBuf::from(DEFAULT_OUTPUT)),
            append: false,
            record_len: DEFAULT_RECORD_LEN,
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.record_len == 0 {
            return Err(ConfigError::ZeroRecordLen);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
