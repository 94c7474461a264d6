use crate::config::{PacingConfig, ProgressMode, ReceiverConfig, SenderConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// A TOML profile. Every field is optional; present ones replace the defaults.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct FeedProfile {
    pub name: Option<String>,
    #[serde(default)]
    pub sender: SenderConfigOverride,
    #[serde(default)]
    pub receiver: ReceiverConfigOverride,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SenderConfigOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source: Option<PathBuf>,
    pub size_source: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub pacing: Option<PacingConfig>,
    pub progress: Option<ProgressMode>,
    pub legacy_progress_step: Option<u64>,
}

impl SenderConfigOverride {
    pub fn apply_to(&self, config: &mut SenderConfig) {
        if let Some(v) = &self.host {
            config.host = v.clone();
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = &self.source {
            config.source = v.clone();
        }
        if let Some(v) = &self.size_source {
            config.size_source = Some(v.clone());
        }
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.pacing {
            config.pacing = v;
        }
        if let Some(v) = self.progress {
            config.progress = v;
        }
        if let Some(v) = self.legacy_progress_step {
            config.legacy_progress_step = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ReceiverConfigOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output: Option<PathBuf>,
    pub append: Option<bool>,
    pub record_len: Option<usize>,
}

impl ReceiverConfigOverride {
    pub fn apply_to(&self, config: &mut ReceiverConfig) {
        if let Some(v) = &self.host {
            config.host = v.clone();
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = &self.output {
            config.output = Some(v.clone());
        }
        if let Some(v) = self.append {
            config.append = v;
        }
        if let Some(v) = self.record_len {
            config.record_len = v;
        }
    }
}
