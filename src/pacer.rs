//! Frame cadence and duration budget for a capture loop.

use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

/// Keeps a loop at a target frame rate and tracks an optional time budget.
///
/// The budget is measured from the pacer's own creation, so each worker
/// enforces its duration independently of the others.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
    started: Instant,
    budget: Option<Duration>,
}

impl Pacer {
    /// Pacer for `fps` frames per second, starting now. `fps` of 0 is treated as 1.
    #[must_use]
    pub fn new(fps: u32, budget: Option<Duration>) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            started: Instant::now(),
            budget,
        }
    }

    /// Target time between frames.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Time since the pacer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the duration budget is used up. Never true without a budget.
    #[must_use]
    pub fn budget_elapsed(&self) -> bool {
        self.budget.is_some_and(|budget| self.elapsed() >= budget)
    }

    /// What is left of the current interval for an iteration begun at `loop_start`.
    #[must_use]
    pub fn remaining(&self, loop_start: Instant) -> Duration {
        self.interval.saturating_sub(loop_start.elapsed())
    }

    /// Sleep out the rest of the interval.
    pub fn wait(&self, loop_start: Instant) {
        let remaining = self.remaining(loop_start);
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }

    /// Like [`Pacer::wait`], but returns early with `true` once `cancel` fires.
    pub fn wait_or_cancel(&self, loop_start: Instant, cancel: &CancelToken) -> bool {
        let remaining = self.remaining(loop_start);
        if remaining.is_zero() {
            return cancel.is_cancelled();
        }
        cancel.wait_timeout(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_fps() {
        assert_eq!(Pacer::new(10, None).interval(), Duration::from_millis(100));
        assert_eq!(Pacer::new(0, None).interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_unbounded_never_elapses() {
        let pacer = Pacer::new(30, None);
        assert!(!pacer.budget_elapsed());
    }

    #[test]
    fn test_budget_elapses() {
        let pacer = Pacer::new(30, Some(Duration::from_millis(20)));
        assert!(!pacer.budget_elapsed());
        thread::sleep(Duration::from_millis(30));
        assert!(pacer.budget_elapsed());
    }

    #[test]
    fn test_zero_budget_is_elapsed_immediately() {
        assert!(Pacer::new(30, Some(Duration::ZERO)).budget_elapsed());
    }

    #[test]
    fn test_late_iteration_does_not_sleep() {
        let pacer = Pacer::new(100, None);
        let loop_start = Instant::now()
            .checked_sub(Duration::from_millis(50))
            .unwrap_or_else(Instant::now);
        assert_eq!(pacer.remaining(loop_start), Duration::ZERO);

        let before = Instant::now();
        pacer.wait(loop_start);
        assert!(before.elapsed() < Duration::from_millis(40));
    }

    #[test]
    fn test_wait_fills_interval() {
        let pacer = Pacer::new(20, None);
        let loop_start = Instant::now();
        pacer.wait(loop_start);
        assert!(loop_start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_or_cancel_returns_on_cancel() {
        let pacer = Pacer::new(1, None);
        let cancel = CancelToken::new();
        cancel.cancel();
        let loop_start = Instant::now();
        assert!(pacer.wait_or_cancel(loop_start, &cancel));
        assert!(loop_start.elapsed() < Duration::from_millis(500));
    }
}
