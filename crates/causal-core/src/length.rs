//! Adaptive experiment length
//!
//! Keeps the number of progress-point hits per experiment inside a useful
//! band: too few hits and the next experiment runs twice as long, too many
//! and it runs half as long, always within `[min, max]`.

use std::time::Duration;

/// Growth/shrink factor applied per adjustment
pub const EXP_TIME_FACTOR: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLength {
    current: Duration,
    min: Duration,
    max: Duration,
    /// Hits at or below this lengthen the next experiment
    hits_to_increase: u64,
    /// Hits at or above this shorten the next experiment
    hits_to_decrease: u64,
    /// Never adapt
    fixed: bool,
}

impl ExperimentLength {
    /// Starts at `min`. `max` below `min` is raised to `min`.
    pub fn new(min: Duration, max: Duration, hits_to_increase: u64, hits_to_decrease: u64) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
            hits_to_increase,
            hits_to_decrease,
            fixed: false,
        }
    }

    /// Disable adaptation; every experiment lasts `min`.
    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    #[inline]
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Adjust for the hit count of the experiment that just finished and
    /// return the length of the next one.
    pub fn update(&mut self, points_hit: u64) -> Duration {
        if self.fixed {
            return self.current;
        }

        if points_hit <= self.hits_to_increase {
            self.current = self
                .current
                .checked_mul(EXP_TIME_FACTOR)
                .map_or(self.max, |longer| longer.min(self.max));
        } else if points_hit >= self.hits_to_decrease && self.current > self.min {
            self.current = (self.current / EXP_TIME_FACTOR).max(self.min);
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length() -> ExperimentLength {
        ExperimentLength::new(Duration::from_millis(5), Duration::from_millis(80), 5, 20)
    }

    #[test]
    fn test_few_hits_grow_to_max() {
        let mut len = length();
        let mut previous = len.current();
        while previous < len.max() {
            let next = len.update(0);
            assert!(next > previous);
            assert!(next <= len.max());
            previous = next;
        }
        assert_eq!(len.current(), Duration::from_millis(80));
        for hits in [0, 5] {
            assert_eq!(len.update(hits), Duration::from_millis(80));
        }
    }

    #[test]
    fn test_growth_caps_at_max_without_overshoot() {
        let mut len = ExperimentLength::new(Duration::from_millis(30), Duration::from_millis(100), 5, 20);
        assert_eq!(len.update(1), Duration::from_millis(60));
        assert_eq!(len.update(1), Duration::from_millis(100));
        assert_eq!(len.update(1), Duration::from_millis(100));
    }

    #[test]
    fn test_many_hits_shrink_to_min() {
        let mut len = length();
        for _ in 0..4 {
            len.update(0);
        }
        let mut previous = len.current();
        while previous > len.min() {
            let next = len.update(500);
            assert!(next < previous);
            assert!(next >= len.min());
            previous = next;
        }
        assert_eq!(len.update(20), Duration::from_millis(5));
    }

    #[test]
    fn test_shrink_clamps_at_min() {
        let mut len = ExperimentLength::new(Duration::from_millis(30), Duration::from_millis(100), 5, 20);
        len.update(0);
        len.update(0);
        assert_eq!(len.current(), Duration::from_millis(100));
        assert_eq!(len.update(50), Duration::from_millis(50));
        assert_eq!(len.update(50), Duration::from_millis(30));
    }

    #[test]
    fn test_middle_band_is_stable() {
        let mut len = length();
        len.update(0);
        let before = len.current();
        for hits in 6..20 {
            assert_eq!(len.update(hits), before);
        }
    }

    #[test]
    fn test_fixed_never_changes() {
        let mut len = length().fixed(true);
        for hits in [0, 1, 5, 19, 20, 1_000_000] {
            assert_eq!(len.update(hits), Duration::from_millis(5));
        }
        assert!(len.is_fixed());
    }
}
