//! Level curve over accumulated reward points.

/// Geometric level curve. Reaching level 2 costs `base_points`; each later
/// level costs `growth` times the previous step, rounded down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    base_points: u64,
    growth: f64,
}

impl LevelCurve {
    pub const MAX_LEVEL: u32 = 500;

    /// Out-of-range parameters are pulled back to the nearest usable value.
    pub fn new(base_points: u64, growth: f64) -> Self {
        let growth = if growth.is_finite() { growth.max(1.0) } else { 1.2 };
        Self {
            base_points: base_points.max(1),
            growth,
        }
    }

    pub fn base_points(&self) -> u64 {
        self.base_points
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    fn next_step(&self, step: u64) -> u64 {
        ((step as f64 * self.growth).floor() as u64).max(1)
    }

    /// Level reached with `points` total points.
    pub fn level_for(&self, points: u64) -> u32 {
        let mut level = 1;
        let mut threshold = 0u64;
        let mut step = self.base_points;
        while level < Self::MAX_LEVEL {
            let next = threshold.saturating_add(step);
            if points < next {
                break;
            }
            threshold = next;
            level += 1;
            step = self.next_step(step);
        }
        level
    }

    /// Total points needed to reach `level`. Level 1 needs none.
    pub fn points_for_level(&self, level: u32) -> u64 {
        let mut total = 0u64;
        let mut step = self.base_points;
        for _ in 1..level.min(Self::MAX_LEVEL) {
            total = total.saturating_add(step);
            step = self.next_step(step);
        }
        total
    }

    /// Fraction of the way from the current level to the next, in [0, 1].
    pub fn progress_within_level(&self, points: u64) -> f64 {
        let level = self.level_for(points);
        if level >= Self::MAX_LEVEL {
            return 1.0;
        }
        let floor = self.points_for_level(level);
        let ceiling = self.points_for_level(level + 1);
        let span = ceiling.saturating_sub(floor).max(1);
        (points.saturating_sub(floor) as f64 / span as f64).clamp(0.0, 1.0)
    }

    /// Points still missing for the next level.
    pub fn points_to_next_level(&self, points: u64) -> u64 {
        let level = self.level_for(points);
        if level >= Self::MAX_LEVEL {
            return 0;
        }
        self.points_for_level(level + 1).saturating_sub(points)
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::new(100, 1.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_thresholds() {
        let curve = LevelCurve::default();
        assert_eq!(curve.level_for(0), 1);
        assert_eq!(curve.level_for(99), 1);
        assert_eq!(curve.level_for(100), 2);
        assert_eq!(curve.level_for(219), 2);
        assert_eq!(curve.level_for(220), 3);
        assert_eq!(curve.points_for_level(4), 100 + 120 + 144);
    }

    #[test]
    fn test_progress_within_level() {
        let curve = LevelCurve::default();
        assert_eq!(curve.progress_within_level(0), 0.0);
        assert!((curve.progress_within_level(50) - 0.5).abs() < 1e-9);
        assert_eq!(curve.points_to_next_level(50), 50);
        assert_eq!(curve.points_to_next_level(100), 120);
    }

    #[test]
    fn test_degenerate_parameters() {
        let curve = LevelCurve::new(0, f64::NAN);
        assert_eq!(curve.base_points(), 1);
        assert_eq!(curve.growth(), 1.2);
        assert_eq!(LevelCurve::new(10, 1.0).level_for(u64::MAX), LevelCurve::MAX_LEVEL);
    }

    proptest! {
        #[test]
        fn prop_level_is_monotone(a in 0u64..2_000_000, b in 0u64..2_000_000) {
            let curve = LevelCurve::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(curve.level_for(lo) <= curve.level_for(hi));
            let level = curve.level_for(hi);
            prop_assert!(curve.points_for_level(level) <= hi);
            let progress = curve.progress_within_level(hi);
            prop_assert!((0.0..=1.0).contains(&progress));
        }
    }
}
