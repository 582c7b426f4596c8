//! Countdown display for TTY and non-TTY environments.
//!
//! TTY mode: an indicatif spinner line showing time remaining.
//! Non-TTY mode: hidden (log lines are the only output).

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Central progress context owning the multi-progress display.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Create a spinner status line for a countdown.
    ///
    /// Update with `pb.set_message(fmt_remaining(..))` while polling.
    /// Call `pb.finish_and_clear()` when done.
    pub fn countdown_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(short_name(name).to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// First 20 characters of `name`, keeping the status line aligned.
fn short_name(name: &str) -> &str {
    name.char_indices().nth(20).map_or(name, |(i, _)| &name[..i])
}

/// Format seconds left on a timer: `∞`, `42.0s`, `3m07s`, `2h05m`.
///
/// Negative values (limit already passed) show as zero.
pub fn fmt_remaining(secs: f64) -> String {
    if secs.is_infinite() {
        return "∞".to_string();
    }
    let secs = secs.max(0.0);
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let whole = secs as u64;
    if whole < 3600 {
        format!("{}m{:02}s", whole / 60, whole % 60)
    } else {
        format!("{}h{:02}m", whole / 3600, (whole % 3600) / 60)
    }
}
