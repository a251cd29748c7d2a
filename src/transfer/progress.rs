//! Progress reporting for transfers
//!
//! Exports know their total up front and show a bar with a percentage.
//! Imports stream an input of unknown length and show a spinner with the
//! running success and failure counts instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress tracker for one transfer run.
pub struct ProgressTracker {
    /// Number of documents processed so far
    processed: AtomicU64,
    /// Start time of the operation
    start_time: Instant,
    /// Expected number of documents, when known
    total: Option<u64>,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Total number of documents if known (None for unknown)
    /// * `enable_bar` - Whether to draw anything on stderr
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| match total {
            Some(n) => {
                let bar = ProgressBar::with_draw_target(Some(n), ProgressDrawTarget::stderr());
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-");
                bar.set_style(style);
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                let style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} {pos} documents {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                bar.set_style(style);
                bar
            }
        });

        Self {
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            total,
            bar,
        }
    }

    /// A tracker that never draws.
    pub fn hidden() -> Self {
        Self::new(None, false)
    }

    /// Update progress with a new running total.
    pub fn update(&self, count: u64) {
        let message = match self.percent(count) {
            Some(percent) => format!("({percent:.2}%, {:.0} docs/sec)", self.rate(count)),
            None => format!("({:.0} docs/sec)", self.rate(count)),
        };
        self.update_with_message(count, message);
    }

    /// Update progress and replace the trailing message.
    pub fn update_with_message(&self, count: u64, message: String) {
        self.processed.store(count, Ordering::Relaxed);

        if let Some(ref bar) = self.bar {
            bar.set_position(count);
            bar.set_message(message);
        }
    }

    /// Documents processed so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Completion percentage for `count`, when the total is known.
    ///
    /// An empty result set counts as complete.
    pub fn percent(&self, count: u64) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                count as f64 * 100.0 / total as f64
            }
        })
    }

    /// Documents per second since the tracker was created.
    pub fn rate(&self, count: u64) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_with_total() {
        let tracker = ProgressTracker::new(Some(1000), false);
        tracker.update(500);
        assert_eq!(tracker.processed(), 500);
        assert_eq!(tracker.percent(500), Some(50.0));
    }

    #[test]
    fn test_progress_tracker_without_total() {
        let tracker = ProgressTracker::new(None, false);
        tracker.update_with_message(7, "(7 succeeded, 0 failed)".to_string());
        assert_eq!(tracker.processed(), 7);
        assert_eq!(tracker.percent(7), None);
    }

    #[test]
    fn test_empty_total_is_complete() {
        let tracker = ProgressTracker::new(Some(0), false);
        assert_eq!(tracker.percent(0), Some(100.0));
    }

    #[test]
    fn test_hidden_tracker() {
        let tracker = ProgressTracker::hidden();
        tracker.update(3);
        tracker.finish();
        assert!(tracker.rate(0) >= 0.0);
    }
}
