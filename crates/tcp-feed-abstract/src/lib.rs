pub mod config;
pub mod profile;

pub use config::{ConfigError, PacingConfig, ProgressMode, ReceiverConfig, SenderConfig};
pub use profile::{FeedProfile, ReceiverConfigOverride, SenderConfigOverride};
