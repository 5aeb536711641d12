//! User-facing progress and status output.

use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::time::Instant;
use tracing::{debug, info};

const BAR_WIDTH: usize = 28;

/// Tone of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Milestones such as "Sampling..." and "Done."
    Info,
    /// Secondary notes such as compiler warnings and cache hits.
    Comment,
    Plain,
}

/// Sink for status lines and an aggregate progress bar.
///
/// Each sampling call invokes `start` once, lazily, when its first
/// progress signal arrives. Free text may be interleaved with the bar by
/// calling `clear`, writing lines, then `redisplay`.
pub trait Reporter: Send {
    fn message(&mut self, tone: Tone, text: &str);
    fn start(&mut self, total: u64);
    fn is_started(&self) -> bool;
    fn update(&mut self, current: u64);
    fn clear(&mut self);
    fn redisplay(&mut self);
    fn finish(&mut self);
}

/// Draws a single redrawable progress line on a terminal-like writer.
pub struct TerminalReporter<W: Write + Send> {
    out: W,
    color: bool,
    total: Option<u64>,
    current: u64,
    started_at: Option<Instant>,
    last_len: usize,
}

impl TerminalReporter<std::io::Stderr> {
    /// Report on stderr, with color when stderr is a terminal.
    pub fn stderr() -> Self {
        let color = std::io::stderr().is_terminal();
        Self::new(std::io::stderr(), color)
    }
}

impl<W: Write + Send> TerminalReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            total: None,
            current: 0,
            started_at: None,
            last_len: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&self, total: u64) -> String {
        let current = self.current.min(total);
        let ratio = if total == 0 {
            1.0
        } else {
            current as f64 / total as f64
        };
        let filled = ((BAR_WIDTH as f64) * ratio).floor() as usize;
        let mut bar = "=".repeat(filled);
        if filled < BAR_WIDTH {
            bar.push('>');
            bar.push_str(&"-".repeat(BAR_WIDTH - filled - 1));
        }
        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or_default();
        let width = total.to_string().len();
        format!(
            "{current:>width$}/{total} [{bar}] {pct:>3}% {elapsed:>4}s",
            pct = (ratio * 100.0).floor() as u64,
        )
    }

    fn draw(&mut self) {
        let Some(total) = self.total else {
            return;
        };
        let text = self.render(total);
        let pad = self.last_len.saturating_sub(text.len());
        let _ = write!(self.out, "\r{text}{}", " ".repeat(pad));
        let _ = self.out.flush();
        self.last_len = text.len();
    }

    fn styled(&self, tone: Tone, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Info => text.green().to_string(),
            Tone::Comment => text.yellow().to_string(),
            Tone::Plain => text.to_string(),
        }
    }
}

impl<W: Write + Send> Reporter for TerminalReporter<W> {
    fn message(&mut self, tone: Tone, text: &str) {
        let line = self.styled(tone, text);
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }

    fn start(&mut self, total: u64) {
        self.total = Some(total);
        self.current = 0;
        self.started_at = Some(Instant::now());
        self.draw();
    }

    fn is_started(&self) -> bool {
        self.total.is_some()
    }

    fn update(&mut self, current: u64) {
        self.current = current;
        self.draw();
    }

    fn clear(&mut self) {
        if self.last_len == 0 {
            return;
        }
        let _ = write!(self.out, "\r{}\r", " ".repeat(self.last_len));
        let _ = self.out.flush();
        self.last_len = 0;
    }

    fn redisplay(&mut self) {
        self.draw();
    }

    fn finish(&mut self) {
        let Some(total) = self.total else {
            return;
        };
        self.current = total;
        self.draw();
        let _ = writeln!(self.out);
        let _ = self.out.flush();
        self.total = None;
        self.last_len = 0;
    }
}

/// Draws nothing; status lines go to `tracing` instead.
#[derive(Debug, Default)]
pub struct QuietReporter {
    total: Option<u64>,
}

impl Reporter for QuietReporter {
    fn message(&mut self, _tone: Tone, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            info!("{}", text);
        }
    }

    fn start(&mut self, total: u64) {
        debug!(total, "progress started");
        self.total = Some(total);
    }

    fn is_started(&self) -> bool {
        self.total.is_some()
    }

    fn update(&mut self, current: u64) {
        debug!(current, total = ?self.total, "progress");
    }

    fn clear(&mut self) {}

    fn redisplay(&mut self) {}

    fn finish(&mut self) {
        self.total = None;
    }
}
