//! Price stability detection between rebalance and re-entry

use tracing::debug;

/// Tracks the last observed price and counts consecutive intervals whose
/// relative change stayed within the threshold. Reset whenever rebalancing
/// restarts.
pub struct StabilityWindow {
    threshold: f64,
    required_intervals: u32,
    last_price: Option<f64>,
    stable_count: u32,
}

impl StabilityWindow {
    pub fn new(threshold: f64, required_intervals: u32) -> Self {
        Self {
            threshold,
            required_intervals,
            last_price: None,
            stable_count: 0,
        }
    }

    /// Feed one observed price; true once the required number of
    /// consecutive stable intervals has been seen.
    pub fn check_stability(&mut self, price: f64) -> bool {
        match self.last_price {
            None => {
                // first observation only establishes the baseline
                self.stable_count = 0;
            }
            Some(previous) if previous > 0.0 => {
                let change = ((price - previous) / previous).abs();
                if change <= self.threshold {
                    self.stable_count += 1;
                } else {
                    debug!(
                        change,
                        threshold = self.threshold,
                        "price moved beyond tolerance, stability counter reset"
                    );
                    self.stable_count = 0;
                }
            }
            Some(_) => {
                self.stable_count = 0;
            }
        }
        self.last_price = Some(price);
        self.stable_count >= self.required_intervals
    }

    pub fn reset(&mut self) {
        self.last_price = None;
        self.stable_count = 0;
    }

    /// (observed stable intervals, required intervals)
    pub fn progress(&self) -> (u32, u32) {
        (self.stable_count, self.required_intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_after_exactly_required_intervals() {
        let mut window = StabilityWindow::new(0.02, 3);
        assert!(!window.check_stability(100.0)); // baseline
        assert!(!window.check_stability(100.5)); // 1
        assert!(!window.check_stability(101.0)); // 2
        assert!(window.check_stability(100.8)); // 3 -> stable
    }

    #[test]
    fn test_excursion_resets_counter() {
        let mut window = StabilityWindow::new(0.02, 3);
        window.check_stability(100.0);
        window.check_stability(100.5);
        window.check_stability(100.9);
        // 5% jump crosses the tolerance
        assert!(!window.check_stability(106.0));
        assert_eq!(window.progress().0, 0);
        // re-entering tolerance has to rebuild the full streak
        assert!(!window.check_stability(106.5));
        assert!(!window.check_stability(106.9));
        assert!(window.check_stability(107.0));
    }

    #[test]
    fn test_reset_clears_baseline() {
        let mut window = StabilityWindow::new(0.02, 3);
        window.check_stability(100.0);
        window.check_stability(100.1);
        window.reset();
        assert_eq!(window.progress(), (0, 3));
        // after reset the first call is a baseline again
        assert!(!window.check_stability(100.2));
        assert_eq!(window.progress().0, 0);
    }
}
