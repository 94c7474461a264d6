use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, List, ListItem, Paragraph},
};
use tcp_feed_core::ProgressState;
use tokio::sync::{Notify, watch};

const LOG_CAPACITY: usize = 1000;
/// Throughput samples kept for the chart.
const SAMPLE_WINDOW: usize = 120;

/// io::Write target for tracing-subscriber that keeps recent lines for display.
#[derive(Clone)]
pub struct MemoryLogBuffer {
    logs: Arc<Mutex<Vec<String>>>,
}

impl Default for MemoryLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLogBuffer {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, msg: String) {
        let Ok(mut logs) = self.logs.lock() else {
            return;
        };
        logs.push(msg);
        if logs.len() > LOG_CAPACITY {
            logs.remove(0);
        }
    }

    pub fn tail(&self, n: usize) -> Vec<String> {
        match self.logs.lock() {
            Ok(logs) => logs.iter().rev().take(n).rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl io::Write for MemoryLogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.push(s.trim().to_string());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Dashboard {
    title: String,
    detail: String,
    progress: watch::Receiver<ProgressState>,
    logs: MemoryLogBuffer,
    shutdown: Arc<Notify>,
    /// Set by the worker task when the transfer returned, successfully or not.
    task_done: Arc<AtomicBool>,
    started: Instant,
    last_sample: (Instant, u64),
    /// (seconds since start, KiB/s)
    samples: Vec<(f64, f64)>,
}

impl Dashboard {
    pub fn new(
        title: impl Into<String>,
        detail: impl Into<String>,
        progress: watch::Receiver<ProgressState>,
        logs: MemoryLogBuffer,
        shutdown: Arc<Notify>,
    ) -> Self {
        let now = Instant::now();
        Self {
            title: title.into(),
            detail: detail.into(),
            progress,
            logs,
            shutdown,
            task_done: Arc::new(AtomicBool::new(false)),
            started: now,
            last_sample: (now, 0),
            samples: Vec::new(),
        }
    }

    /// Flag the worker sets when the transfer returns. The dashboard closes
    /// as soon as it is set.
    pub fn task_done_flag(&self) -> Arc<AtomicBool> {
        self.task_done.clone()
    }

    fn task_done(&self) -> bool {
        self.task_done.load(Ordering::Acquire)
    }

    /// Blocks until the transfer task returns or the user quits. Quitting
    /// early requests shutdown. The terminal is restored on every exit path.
    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let result = self.run_raw();
        disable_raw_mode()?;
        result
    }

    fn run_raw(&mut self) -> anyhow::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        let result = self.event_loop(&mut terminal);
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(200);
        let mut last_tick = Instant::now();

        loop {
            terminal.draw(|f| self.ui(f))?;
            if self.task_done() {
                return Ok(());
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            // Raw mode swallows SIGINT, so Ctrl+C arrives here as a key.
            if event::poll(timeout)?
                && let Event::Key(key) = event::read()?
                && quit_requested(&key)
            {
                if !self.task_done() {
                    self.shutdown.notify_one();
                }
                return Ok(());
            }

            if last_tick.elapsed() >= tick_rate {
                self.sample();
                last_tick = Instant::now();
            }
        }
    }

    fn sample(&mut self) {
        let now = Instant::now();
        let position = self.progress.borrow().position;
        let (then, last_position) = self.last_sample;
        let dt = now.duration_since(then).as_secs_f64();
        if dt > 0.0 {
            let kib_per_sec = position.saturating_sub(last_position) as f64 / 1024.0 / dt;
            let x = now.duration_since(self.started).as_secs_f64();
            self.samples.push((x, kib_per_sec));
            if self.samples.len() > SAMPLE_WINDOW {
                self.samples.remove(0);
            }
        }
        self.last_sample = (now, position);
    }

    fn ui(&self, f: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(3), // Gauge
                Constraint::Min(8),    // Stats + throughput
                Constraint::Length(10), // Logs
            ])
            .split(f.area());

        let state = self.progress.borrow().clone();
        self.render_header(f, rows[0], &state);
        self.render_gauge(f, rows[1], &state);

        let mid = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(rows[2]);
        self.render_stats(f, mid[0], &state);
        self.render_throughput(f, mid[1]);
        self.render_logs(f, rows[3]);
    }

    fn render_header(&self, f: &mut Frame, area: Rect, state: &ProgressState) {
        let status = if state.finished {
            "DONE"
        } else if self.task_done() {
            "STOPPED"
        } else {
            "RUNNING"
        };
        let text = format!("{} | {} | Status: {} | (q)uit", self.title, self.detail, status);
        let header = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("tcp-feed"));
        f.render_widget(header, area);
    }

    fn render_gauge(&self, f: &mut Frame, area: Rect, state: &ProgressState) {
        let label = if state.total > 0 {
            format!("{}/{} bytes", state.position, state.total)
        } else {
            format!("{} bytes", state.position)
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(state.ratio())
            .label(label);
        f.render_widget(gauge, area);
    }

    fn render_stats(&self, f: &mut Frame, area: Rect, state: &ProgressState) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let avg = if elapsed > 0.0 {
            state.position as f64 / 1024.0 / elapsed
        } else {
            0.0
        };
        let lines = vec![
            Line::from(format!("  Updates:  {}", state.updates)),
            Line::from(format!("  Position: {} bytes", state.position)),
            Line::from(format!("  Total:    {} bytes", state.total)),
            Line::from(format!("  Elapsed:  {:.1} s", elapsed)),
            Line::from(format!("  Average:  {:.1} KiB/s", avg)),
        ];
        let stats = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Transfer"));
        f.render_widget(stats, area);
    }

    fn render_throughput(&self, f: &mut Frame, area: Rect) {
        if self.samples.len() < 2 {
            let block = Paragraph::new("Collecting samples…")
                .block(Block::default().borders(Borders::ALL).title("Throughput"));
            f.render_widget(block, area);
            return;
        }

        let x_min = self.samples.first().map(|s| s.0).unwrap_or(0.0);
        let mut x_max = self.samples.last().map(|s| s.0).unwrap_or(1.0);
        if (x_max - x_min).abs() < f64::EPSILON {
            x_max += 1.0;
        }
        let mut y_max = self.samples.iter().map(|s| s.1).fold(0.0, f64::max);
        if y_max < f64::EPSILON {
            y_max = 1.0;
        }

        let dataset = Dataset::default()
            .name("KiB/s")
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(Color::Cyan))
            .graph_type(GraphType::Line)
            .data(&self.samples);

        let chart = Chart::new(vec![dataset])
            .block(Block::default().borders(Borders::ALL).title("Throughput"))
            .x_axis(
                Axis::default()
                    .title("s")
                    .bounds([x_min, x_max])
                    .labels(vec![
                        Span::raw(format!("{:.0}", x_min)),
                        Span::raw(format!("{:.0}", x_max)),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .title("KiB/s")
                    .bounds([0.0, y_max])
                    .labels(vec![Span::raw("0"), Span::raw(format!("{:.0}", y_max))]),
            );
        f.render_widget(chart, area);
    }

    fn render_logs(&self, f: &mut Frame, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem> = self
            .logs
            .tail(visible)
            .into_iter()
            .map(ListItem::new)
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(list, area);
    }
}

fn quit_requested(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryLogBuffer, quit_requested};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::io::Write;

    #[test]
    fn ctrl_c_quits_like_q_and_esc() {
        let key = |code, modifiers| KeyEvent::new(code, modifiers);
        assert!(quit_requested(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(quit_requested(&key(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(quit_requested(&key(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(!quit_requested(&key(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!quit_requested(&key(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn log_buffer_keeps_most_recent_lines() {
        let mut buffer = MemoryLogBuffer::new();
        for i in 0..1005 {
            buffer.write_all(format!("line {i}\n").as_bytes()).unwrap();
        }
        let tail = buffer.tail(2);
        assert_eq!(tail, vec!["line 1003".to_string(), "line 1004".to_string()]);
    }
}
