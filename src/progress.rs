use std::io::{BufRead, BufReader, Read};
use std::sync::OnceLock;

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::trace;

/// Elapsed-time token in FFmpeg status output, e.g. `time=00:01:23.45`.
fn elapsed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"time=(\d{2,}):(\d{2}):(\d{2})\.(\d+)").expect("valid regex"))
}

/// Progress of one long-running external operation.
///
/// Owned exclusively by the operation currently being monitored; call
/// [`ProgressMonitor::reset`] before reusing it for the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    /// Total duration in seconds. 0.0 means unknown.
    pub total: f64,
    /// Elapsed position in seconds, per the latest parsed token.
    pub elapsed: f64,
    /// Bounded percentage in [0, 100]. Held at 0 while total is unknown.
    pub percentage: f64,
    /// False once the underlying stream has closed.
    pub running: bool,
}

/// Parses elapsed-time tokens from a textual status stream into a bounded
/// percentage.
#[derive(Debug)]
pub struct ProgressMonitor {
    state: ProgressState,
}

impl ProgressMonitor {
    pub fn new(total_secs: f64) -> Self {
        Self {
            state: ProgressState {
                total: total_secs,
                elapsed: 0.0,
                percentage: 0.0,
                running: true,
            },
        }
    }

    /// Reset for the next monitored operation.
    pub fn reset(&mut self, total_secs: f64) {
        self.state = ProgressState {
            total: total_secs,
            elapsed: 0.0,
            percentage: 0.0,
            running: true,
        };
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Feed one raw status line. Returns an updated snapshot when the line
    /// carried an elapsed-time token.
    pub fn observe_line(&mut self, line: &str) -> Option<ProgressState> {
        let elapsed = parse_elapsed_secs(line)?;
        self.state.elapsed = elapsed;
        self.state.percentage = if self.state.total > 0.0 {
            (elapsed / self.state.total * 100.0).min(100.0)
        } else {
            0.0
        };
        trace!(
            "progress: {:.1}s / {:.1}s ({:.0}%)",
            self.state.elapsed,
            self.state.total,
            self.state.percentage
        );
        Some(self.state.clone())
    }

    /// Synchronously drain a status stream until it closes, invoking the
    /// callback once per parsed progress event.
    ///
    /// FFmpeg rewrites its status line in place using carriage returns, so
    /// lines are split on both `\r` and `\n`.
    pub fn drain<R: Read>(
        &mut self,
        reader: R,
        mut on_event: impl FnMut(&ProgressState),
    ) -> std::io::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        loop {
            line.clear();
            if read_status_line(&mut reader, &mut line)? == 0 {
                break;
            }
            if let Ok(text) = std::str::from_utf8(&line) {
                if let Some(state) = self.observe_line(text) {
                    on_event(&state);
                }
            }
        }

        self.state.running = false;
        Ok(())
    }
}

/// Read bytes up to the next `\r`, `\n`, or EOF. Returns bytes consumed.
fn read_status_line<R: BufRead>(reader: &mut R, out: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut total = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(total);
        }
        match available.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(pos) => {
                out.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return Ok(total + pos + 1);
            }
            None => {
                let len = available.len();
                out.extend_from_slice(available);
                reader.consume(len);
                total += len;
            }
        }
    }
}

/// Extract the elapsed seconds from an `HH:MM:SS.fraction` token, if present.
pub fn parse_elapsed_secs(line: &str) -> Option<f64> {
    let caps = elapsed_pattern().captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction: f64 = format!("0.{}", &caps[4]).parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

/// Renders a progress bar, repainting only when the percentage has moved by
/// at least one whole point since the last render.
pub struct ProgressRenderer {
    bar: ProgressBar,
    last_rendered: u64,
}

impl ProgressRenderer {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(message.to_string());
        Self {
            bar,
            last_rendered: 0,
        }
    }

    /// Hidden renderer for non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            last_rendered: 0,
        }
    }

    pub fn update(&mut self, state: &ProgressState) {
        let whole = state.percentage.floor() as u64;
        if whole >= self.last_rendered + 1 {
            self.bar.set_position(whole.min(100));
            self.last_rendered = whole;
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
