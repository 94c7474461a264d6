pub mod console;
#[cfg(feature = "tui")]
pub mod tui;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcp_feed_abstract::{FeedProfile, PacingConfig, ProgressMode, ReceiverConfig, SenderConfig};
#[cfg(feature = "tui")]
use std::sync::atomic::Ordering;
#[cfg(feature = "tui")]
use tcp_feed_core::WatchProgress;
use tcp_feed_core::{Receiver, send_file};
use tokio::sync::Notify;
use tracing::info;

use crate::console::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "tcp-feed", author, version, about = "Stream a file over raw TCP at a paced rate")]
pub struct Args {
    /// TOML profile with [sender] / [receiver] tables.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show the terminal dashboard instead of a progress bar.
    #[arg(long, default_value_t = false, global = true)]
    pub tui: bool,

    /// Write a JSON summary of the run.
    #[arg(long, global = true)]
    pub report_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a peer and stream a file to it.
    Send(SendArgs),
    /// Accept one connection and capture its stream.
    Receive(ReceiveArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressArg {
    Bytes,
    Legacy,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Bytes => ProgressMode::Bytes,
            ProgressArg::Legacy => ProgressMode::Legacy,
        }
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct SendArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// File to stream.
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// File to size the progress bar from, if not the streamed one.
    #[arg(long)]
    pub size_source: Option<PathBuf>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Fixed pause after each chunk.
    #[arg(long, conflicts_with_all = ["rate", "unpaced"])]
    pub delay_ms: Option<u64>,

    /// Token-bucket rate in bytes per second.
    #[arg(long, conflicts_with = "unpaced")]
    pub rate: Option<u64>,

    /// Token-bucket burst in bytes (defaults to one chunk).
    #[arg(long, requires = "rate")]
    pub burst: Option<u64>,

    /// Send as fast as the connection accepts.
    #[arg(long, default_value_t = false)]
    pub unpaced: bool,

    #[arg(long, value_enum)]
    pub progress: Option<ProgressArg>,
}

impl SendArgs {
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
        if let Some(delay_ms) = self.delay_ms {
            config.pacing = PacingConfig::FixedDelay { delay_ms };
        }
        if let Some(bytes_per_sec) = self.rate {
            config.pacing = PacingConfig::TokenBucket {
                bytes_per_sec,
                burst_bytes: self.burst.unwrap_or(config.chunk_size as u64),
            };
        }
        if self.unpaced {
            config.pacing = PacingConfig::Unpaced;
        }
        if let Some(v) = self.progress {
            config.progress = v.into();
        }
    }

    /// Defaults, then the profile, then flags. Legacy defaults are filled in
    /// after merging so every layer selects legacy mode the same way.
    pub fn resolve(&self, profile: &FeedProfile) -> Result<SenderConfig> {
        let mut config = SenderConfig::default();
        profile.sender.apply_to(&mut config);
        self.apply_to(&mut config);
        let config = config.with_legacy_defaults();
        config.validate().context("Invalid sender configuration")?;
        Ok(config)
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct ReceiveArgs {
    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Where to write the captured stream.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Count the stream but do not write it anywhere.
    #[arg(long, default_value_t = false, conflicts_with = "output")]
    pub discard: bool,

    /// Append to the output file instead of truncating it.
    #[arg(long, default_value_t = false)]
    pub append: bool,

    #[arg(long)]
    pub record_len: Option<usize>,
}

impl ReceiveArgs {
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
        if self.discard {
            config.output = None;
        }
        if self.append {
            config.append = true;
        }
        if let Some(v) = self.record_len {
            config.record_len = v;
        }
    }

    pub fn resolve(&self, profile: &FeedProfile) -> Result<ReceiverConfig> {
        let mut config = ReceiverConfig::default();
        profile.receiver.apply_to(&mut config);
        self.apply_to(&mut config);
        config.validate().context("Invalid receiver configuration")?;
        Ok(config)
    }
}

pub fn load_profile(path: &Path) -> Result<FeedProfile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let profile: FeedProfile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(profile)
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    Ok(())
}

/// Where progress and log lines go for this run.
enum Display {
    Console(ConsoleProgress),
    #[cfg(feature = "tui")]
    Dashboard(tui::MemoryLogBuffer),
}

/// Picks the display for `command` and installs the tracing subscriber
/// writing to it.
fn init_display(use_tui: bool, command: &Command) -> Result<Display> {
    if use_tui {
        #[cfg(feature = "tui")]
        {
            let buffer = tui::MemoryLogBuffer::new();
            let writer = buffer.clone();
            tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .init();
            return Ok(Display::Dashboard(buffer));
        }
        #[cfg(not(feature = "tui"))]
        anyhow::bail!("`tui` feature disabled at compile time");
    }

    let console = match command {
        Command::Send(_) => ConsoleProgress::transfer(),
        Command::Receive(_) => ConsoleProgress::capture(),
    };
    let writer = console.log_writer();
    tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .init();
    Ok(Display::Console(console))
}

/// Ctrl+C notifies `shutdown`; the transfer ends with a cancellation error.
fn spawn_ctrl_c(shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Caught Ctrl+C, stopping");
            shutdown.notify_one();
        }
    });
}

pub async fn run(args: Args) -> Result<()> {
    let display = init_display(args.tui, &args.command)?;
    info!("tcp-feed starting...");

    let profile = match &args.config {
        Some(path) => load_profile(path)?,
        None => FeedProfile::default(),
    };
    if let Some(name) = &profile.name {
        info!("Using profile '{}'", name);
    }

    let shutdown = Arc::new(Notify::new());
    spawn_ctrl_c(shutdown.clone());

    match &args.command {
        Command::Send(send) => {
            let config = send.resolve(&profile)?;
            let report = match display {
                Display::Console(mut progress) => send_file(config, &mut progress, shutdown)
                    .await
                    .context("Failed to send file")?,
                #[cfg(feature = "tui")]
                Display::Dashboard(logs) => {
                    let (mut progress, rx) = WatchProgress::channel();
                    let detail = format!("{} -> {}", config.source.display(), config.destination());
                    let transfer = {
                        let shutdown = shutdown.clone();
                        async move { send_file(config, &mut progress, shutdown).await }
                    };
                    let dashboard = tui::Dashboard::new("send", detail, rx, logs, shutdown);
                    with_dashboard(dashboard, transfer)
                        .await?
                        .context("Failed to send file")?
                }
            };
            println!("data sent");
            if let Some(path) = &args.report_out {
                write_report(path, &report)?;
            }
        }
        Command::Receive(receive) => {
            let config = receive.resolve(&profile)?;
            #[cfg(feature = "tui")]
            let detail = format!("listening on {}", config.bind_addr());
            let receiver = Receiver::bind(config).await?.with_shutdown(shutdown.clone());
            let report = match display {
                Display::Console(mut progress) => receiver
                    .accept_and_capture(&mut progress)
                    .await
                    .context("Failed to capture stream")?,
                #[cfg(feature = "tui")]
                Display::Dashboard(logs) => {
                    let (mut progress, rx) = WatchProgress::channel();
                    let capture = async move { receiver.accept_and_capture(&mut progress).await };
                    let dashboard = tui::Dashboard::new("receive", detail, rx, logs, shutdown);
                    with_dashboard(dashboard, capture)
                        .await?
                        .context("Failed to capture stream")?
                }
            };
            println!(
                "received {} bytes ({} records of {}, {} trailing)",
                report.bytes_received, report.records, report.record_len, report.trailing_bytes
            );
            if let Some(path) = &args.report_out {
                write_report(path, &report)?;
            }
        }
    }

    Ok(())
}

/// Runs `work` on a worker task while `dashboard` draws on a blocking thread.
/// The dashboard closes by itself once `work` returns, so failures surface
/// without waiting for a keypress. Without a usable terminal the work still
/// runs to completion.
#[cfg(feature = "tui")]
async fn with_dashboard<T, F>(mut dashboard: tui::Dashboard, work: F) -> Result<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let done = dashboard.task_done_flag();
    let task = tokio::spawn(async move {
        let output = work.await;
        done.store(true, Ordering::Release);
        output
    });

    let shown = tokio::task::spawn_blocking(move || dashboard.run())
        .await
        .context("Dashboard task panicked")?;
    if let Err(e) = shown {
        eprintln!("dashboard unavailable ({e:#}), continuing without it");
    }

    task.await.context("Worker task panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tcp_feed_core::CaptureReport;

    #[test]
    fn flags_override_profile_which_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[sender]\nhost = \"192.168.0.2\"\nport = 9000\nchunk_size = 512\n"
        )
        .unwrap();
        let profile = load_profile(file.path()).unwrap();

        let args = SendArgs {
            port: Some(9100),
            delay_ms: Some(20),
            ..Default::default()
        };
        let config = args.resolve(&profile).unwrap();
        assert_eq!(config.host, "192.168.0.2");
        assert_eq!(config.port, 9100);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.pacing, PacingConfig::FixedDelay { delay_ms: 20 });
        assert_eq!(config.source, PathBuf::from("noHeader.bin"));
    }

    #[test]
    fn rate_flag_builds_token_bucket_with_chunk_burst() {
        let args = SendArgs {
            rate: Some(100_000),
            ..Default::default()
        };
        let config = args.resolve(&FeedProfile::default()).unwrap();
        assert_eq!(
            config.pacing,
            PacingConfig::TokenBucket {
                bytes_per_sec: 100_000,
                burst_bytes: 1035
            }
        );
    }

    #[test]
    fn invalid_flags_are_reported() {
        let args = SendArgs {
            chunk_size: Some(0),
            ..Default::default()
        };
        assert!(args.resolve(&FeedProfile::default()).is_err());
    }

    #[test]
    fn discard_drops_capture_output() {
        let args = ReceiveArgs {
            discard: true,
            record_len: Some(1035),
            ..Default::default()
        };
        let config = args.resolve(&FeedProfile::default()).unwrap();
        assert_eq!(config.output, None);
        assert_eq!(config.record_len, 1035);
    }

    #[test]
    fn cli_parses_send_subcommand() {
        let args = Args::try_parse_from([
            "tcp-feed",
            "send",
            "--host",
            "127.0.0.1",
            "--port",
            "4000",
            "--progress",
            "legacy",
            "--unpaced",
        ])
        .unwrap();
        let Command::Send(send) = args.command else {
            panic!("expected send");
        };
        let config = send.resolve(&FeedProfile::default()).unwrap();
        assert_eq!(config.destination(), "127.0.0.1:4000");
        assert_eq!(config.progress, ProgressMode::Legacy);
        assert_eq!(config.size_path(), Path::new("data.bin"));
        assert_eq!(config.pacing, PacingConfig::Unpaced);
    }

    #[test]
    fn legacy_from_profile_sizes_bar_like_legacy_flag() {
        let profile: FeedProfile = toml::from_str("[sender]\nprogress = \"legacy\"\n").unwrap();
        let config = SendArgs::default().resolve(&profile).unwrap();
        assert_eq!(config.progress, ProgressMode::Legacy);
        assert_eq!(config.size_path(), Path::new("data.bin"));

        let args = SendArgs {
            size_source: Some("sizes.bin".into()),
            ..Default::default()
        };
        let config = args.resolve(&profile).unwrap();
        assert_eq!(config.size_path(), Path::new("sizes.bin"));
    }

    #[cfg(feature = "tui")]
    #[tokio::test]
    async fn dashboard_closes_when_work_fails() {
        use tcp_feed_core::FeedError;

        let (_progress, rx) = WatchProgress::channel();
        let dashboard = tui::Dashboard::new(
            "send",
            "127.0.0.1:1",
            rx,
            tui::MemoryLogBuffer::new(),
            Arc::new(Notify::new()),
        );
        let work = async { Err::<(), _>(FeedError::Cancelled { bytes: 0 }) };

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            with_dashboard(dashboard, work),
        )
        .await
        .expect("dashboard kept running after the work returned")
        .unwrap();
        assert!(matches!(result, Err(FeedError::Cancelled { bytes: 0 })));
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = CaptureReport {
            peer: "127.0.0.1:5000".into(),
            output: None,
            record_len: 1036,
            records: 2,
            trailing_bytes: 0,
            bytes_received: 2072,
            elapsed_ms: 3,
        };
        write_report(&path, &report).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["records"], 2);
        assert_eq!(value["bytes_received"], 2072);
    }
}
