//! Progress reporting for long-running batch commands.
//!
//! Workers report through [`ProgressTracker`] from any thread. The CLI uses
//! [`CliProgress`] (an indicatif bar on stderr); tests use
//! [`SilentProgress`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// Thread-safe progress sink.
pub trait ProgressTracker: Send + Sync {
    fn set_message(&self, message: &str);

    /// Advance by `amount` completed items.
    fn increment(&self, amount: u64);

    fn set_length(&self, length: u64);

    fn position(&self) -> u64;

    fn finish_with_message(&self, message: &str);

    /// Print a line without corrupting the bar.
    fn println(&self, line: &str);
}

/// No-op tracker that still counts, so tests can assert on progress.
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn println(&self, _line: &str) {}
}

/// Progress bar on stderr.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(message: &str, length: u64) -> Self {
        let bar = ProgressBar::new(length);
        let style = ProgressStyle::default_bar()
            .template("{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}% {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn println(&self, line: &str) {
        self.bar.println(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_progress_counts() {
        let progress = SilentProgress::new();
        progress.increment(2);
        progress.increment(3);
        assert_eq!(progress.position(), 5);
        assert!(!progress.is_finished());
        progress.finish_with_message("done");
        assert!(progress.is_finished());
    }

    #[test]
    fn hidden_cli_bar_tracks_position() {
        let progress = CliProgress {
            bar: ProgressBar::hidden(),
        };
        progress.increment(4);
        assert_eq!(progress.position(), 4);
    }
}
