use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};
use mfetch_core::{ProgressRenderer, ProgressSnapshot};

const TEMPLATE: &str = "Downloading... {percent:>3}% [{bar:30}] {bytes}/{total_bytes} {msg}";

/// Single overwritten status line; warnings scroll above it. When the bar
/// is hidden (`--json`, or stderr is not a terminal) warnings go to the
/// fallback writer instead.
pub struct IndicatifRenderer {
    bar: ProgressBar,
    fallback: Option<Box<dyn Write + Send>>,
}

impl IndicatifRenderer {
    pub fn new(total: u64, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self {
            bar,
            fallback: Some(Box::new(io::stderr())),
        }
    }

    /// Drops warnings entirely while the bar is hidden.
    pub fn silent(mut self) -> Self {
        self.fallback = None;
        self
    }

    #[cfg(test)]
    fn with_fallback<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.fallback = Some(Box::new(out));
        self
    }
}

impl ProgressRenderer for IndicatifRenderer {
    fn status(&mut self, snapshot: &ProgressSnapshot) {
        // Retried bytes are counted again, so clamp for display.
        self.bar
            .set_position(snapshot.downloaded.min(snapshot.total));
        self.bar.set_message(status_message(snapshot));
    }

    fn warning(&mut self, message: &str) {
        if !self.bar.is_hidden() {
            self.bar.println(message);
        } else if let Some(out) = self.fallback.as_mut() {
            let _ = writeln!(out, "{}", message);
        }
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        self.status(snapshot);
        self.bar.finish();
    }
}

pub fn status_message(snapshot: &ProgressSnapshot) -> String {
    let per_source = snapshot
        .per_source
        .iter()
        .enumerate()
        .map(|(id, bytes)| format!("#{} {}", id, format_bytes(*bytes)))
        .collect::<Vec<String>>()
        .join(" ");
    format!(
        "{}/s | {}",
        format_bytes(snapshot.throughput as u64),
        per_source
    )
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2}GB", b / GB)
    } else if b >= MB {
        format!("{:.2}MB", b / MB)
    } else if b >= KB {
        format!("{:.2}KB", b / KB)
    } else {
        format!("{}B", bytes)
    }
}
