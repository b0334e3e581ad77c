//! Progress Bar System
//!
//! One bar per media kind; position is the monotonically increasing completed count.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod templates {
    pub const BATCH: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} • {msg}";
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
}

pub struct UnifiedProgressBar {
    pub bar: ProgressBar,
    is_finished: AtomicBool,
}

impl UnifiedProgressBar {
    pub fn new(total: u64, prefix: &str) -> Arc<Self> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template(templates::BATCH)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(templates::PROGRESS_CHARS)
            .tick_chars(templates::SPINNER_CHARS);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        Arc::new(Self {
            bar,
            is_finished: AtomicBool::new(false),
        })
    }

    /// Bar that never draws (tests, non-interactive runs).
    pub fn hidden(total: u64) -> Arc<Self> {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
        Arc::new(Self {
            bar,
            is_finished: AtomicBool::new(false),
        })
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.bar.set_message(msg.into());
    }

    pub fn println(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{}", msg));
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.is_finished.store(true, Ordering::Relaxed);
        self.bar.finish_with_message(msg.to_string());
    }
}

impl Drop for UnifiedProgressBar {
    fn drop(&mut self) {
        if !self.is_finished.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_hidden_bar_counts() {
        let pb = UnifiedProgressBar::hidden(3);
        pb.inc();
        pb.inc();
        assert_eq!(pb.bar.position(), 2);
        pb.finish_with_message("done");
    }
}
