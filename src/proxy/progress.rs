//! Progress reporting for long crawl phases

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Counts completed items and advances a percentage bar one step per whole
/// percent crossed.
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    percent: u64,
    bar: ProgressBar,
}

impl ProgressTracker {
    /// Tracker drawing to stderr when it is a terminal
    pub fn new(total: usize, label: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Self::with_bar(total, bar)
    }

    /// Tracker that never draws
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden());
        Self::with_bar(total, bar)
    }

    fn with_bar(total: usize, bar: ProgressBar) -> Self {
        Self {
            total,
            completed: 0,
            percent: 0,
            bar,
        }
    }

    /// Record `n` completed items. Returns the new percentage when a whole
    /// percent boundary was crossed.
    pub fn advance(&mut self, n: usize) -> Option<u64> {
        self.completed = (self.completed + n).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            (self.completed as u64 * 100) / self.total as u64
        };

        if percent > self.percent {
            self.percent = percent;
            self.bar.set_position(percent);
            Some(percent)
        } else {
            None
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn percent(&self) -> u64 {
        self.percent
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advances_once_per_percent() {
        let mut tracker = ProgressTracker::hidden(250);
        let steps = (0..250).filter_map(|_| tracker.advance(1)).count();
        assert_eq!(steps, 100);
        assert_eq!(tracker.percent(), 100);
        assert_eq!(tracker.completed(), 250);
    }

    #[test]
    fn test_small_totals_jump_several_percent() {
        let mut tracker = ProgressTracker::hidden(3);
        assert_eq!(tracker.advance(1), Some(33));
        assert_eq!(tracker.advance(1), Some(66));
        assert_eq!(tracker.advance(1), Some(100));
        assert_eq!(tracker.advance(1), None);
    }

    #[test]
    fn test_percent_is_monotonic() {
        let mut tracker = ProgressTracker::hidden(1000);
        let mut last = 0;
        for _ in 0..1000 {
            if let Some(p) = tracker.advance(1) {
                assert!(p > last);
                last = p;
            }
        }
        assert_eq!(last, 100);
    }
}
