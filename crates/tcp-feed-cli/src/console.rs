use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;
use tcp_feed_core::ProgressSink;

/// Terminal progress bar for the sender, spinner for the capture host.
pub struct ConsoleProgress {
    bar: ProgressBar,
    done_message: &'static str,
}

impl ConsoleProgress {
    pub fn transfer() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        Self {
            bar,
            done_message: "complete",
        }
    }

    pub fn capture() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {spinner} {bytes} received {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            done_message: "connection closed",
        }
    }

    /// Log writer that prints above the bar instead of through it.
    pub fn log_writer(&self) -> BarWriter {
        BarWriter {
            bar: self.bar.clone(),
        }
    }
}

/// stderr writer for tracing-subscriber. Each line is written with the bar
/// cleared, then the bar is redrawn below it.
#[derive(Clone)]
pub struct BarWriter {
    bar: ProgressBar,
}

impl Write for BarWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bar.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&mut self, total: u64) {
        if total > 0 {
            self.bar.set_length(total);
        }
    }

    fn advance(&mut self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&mut self) {
        self.bar.finish_with_message(self.done_message);
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
