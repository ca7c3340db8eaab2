use thiserror::Error;

use crate::volume::ScalarRange;

#[derive(Debug, Error, PartialEq)]
pub enum WindowLevelError {
    #[error("Image has no samples to compute a window/level from")]
    EmptyRange,
}

/// Display range for mapping samples to brightness: `window` is the width
/// of the range and `level` its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub window: f64,
    pub level: f64,
}

impl WindowLevel {
    /// Window spanning the whole scalar range.
    ///
    /// The level is the midpoint rounded to the nearest integer, with ties
    /// rounded away from zero (`f64::round`).
    pub fn from_range(range: ScalarRange) -> Self {
        Self {
            window: range.max - range.min,
            level: ((range.min + range.max) / 2.0).round(),
        }
    }

    pub fn lower(&self) -> f64 {
        self.level - self.window / 2.0
    }

    pub fn upper(&self) -> f64 {
        self.level + self.window / 2.0
    }

    /// Map a sample to `0.0..=1.0`, clamping outside the window.
    ///
    /// A zero-width window acts as a hard threshold at the level.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.window <= 0.0 {
            return if value < self.level { 0.0 } else { 1.0 };
        }
        ((value - self.lower()) / self.window).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64) -> ScalarRange {
        ScalarRange { min, max }
    }

    #[test]
    fn positive_range() {
        let wl = WindowLevel::from_range(range(0.0, 1000.0));
        assert_eq!(wl, WindowLevel { window: 1000.0, level: 500.0 });
    }

    #[test]
    fn symmetric_range() {
        let wl = WindowLevel::from_range(range(-200.0, 200.0));
        assert_eq!(wl, WindowLevel { window: 400.0, level: 0.0 });
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(WindowLevel::from_range(range(0.0, 1.0)).level, 1.0);
        assert_eq!(WindowLevel::from_range(range(-1.0, 0.0)).level, -1.0);
        assert_eq!(WindowLevel::from_range(range(0.0, 3.0)).level, 2.0);
    }

    #[test]
    fn normalize_clamps() {
        let wl = WindowLevel::from_range(range(0.0, 1000.0));
        assert_eq!(wl.normalize(-50.0), 0.0);
        assert_eq!(wl.normalize(250.0), 0.25);
        assert_eq!(wl.normalize(5000.0), 1.0);

        let flat = WindowLevel::from_range(range(7.0, 7.0));
        assert_eq!(flat.normalize(6.0), 0.0);
        assert_eq!(flat.normalize(7.0), 1.0);
    }
}
