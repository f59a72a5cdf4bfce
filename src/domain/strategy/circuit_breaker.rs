//! Failure-accumulation policy that halts automated action

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{error, warn};

/// Sliding window of error timestamps plus a sticky critical flag.
///
/// A critical error halts on the spot; non-critical errors halt once the
/// count inside the window reaches the threshold.
pub struct CircuitBreaker {
    window: Duration,
    threshold: usize,
    errors: VecDeque<Instant>,
    critical_occurred: bool,
}

impl CircuitBreaker {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            errors: VecDeque::new(),
            critical_occurred: false,
        }
    }

    /// Record an error and decide whether the strategy must halt.
    pub fn record_error(&mut self, message: &str, critical: bool) -> bool {
        self.record_at(Instant::now(), message, critical)
    }

    fn record_at(&mut self, at: Instant, message: &str, critical: bool) -> bool {
        if critical {
            self.critical_occurred = true;
            error!("critical error, halting immediately: {}", message);
            return true;
        }

        self.errors.push_back(at);
        while let Some(front) = self.errors.front() {
            if at.duration_since(*front) > self.window {
                self.errors.pop_front();
            } else {
                break;
            }
        }

        let count = self.errors.len();
        if count >= self.threshold {
            error!(
                "error threshold reached: {} errors within {:?}: {}",
                count, self.window, message
            );
            true
        } else {
            warn!(
                "error {}/{} within window: {}",
                count, self.threshold, message
            );
            false
        }
    }

    /// Sticky: true once any critical error was recorded.
    pub fn critical_occurred(&self) -> bool {
        self.critical_occurred
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_halts_on_first_call() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(600), 5);
        assert!(breaker.record_error("execution reverted", true));
        assert!(breaker.critical_occurred());
    }

    #[test]
    fn test_threshold_within_window() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(600), 3);
        let base = Instant::now();
        assert!(!breaker.record_at(base, "rpc timeout", false));
        assert!(!breaker.record_at(base + Duration::from_secs(1), "rpc timeout", false));
        assert!(breaker.record_at(base + Duration::from_secs(2), "rpc timeout", false));
        assert!(!breaker.critical_occurred());
    }

    #[test]
    fn test_errors_outside_window_excluded() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(60), 3);
        let base = Instant::now();
        assert!(!breaker.record_at(base, "e1", false));
        assert!(!breaker.record_at(base + Duration::from_secs(1), "e2", false));
        // the first two have aged out by now
        assert!(!breaker.record_at(base + Duration::from_secs(120), "e3", false));
        assert_eq!(breaker.error_count(), 1);
        assert!(!breaker.record_at(base + Duration::from_secs(121), "e4", false));
        assert!(breaker.record_at(base + Duration::from_secs(122), "e5", false));
    }
}
