//! Plausibility gate and median smoothing for percentage readings.
//!
//! The experience percentage only grows, and only slowly. A reading well
//! below the last accepted value, or far above it, is a misread, except for
//! the wrap from a high value to a low one on level-up. Accepted readings go
//! into a short window whose median is published.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Tunable thresholds of the glitch filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitchPolicy {
    /// Largest accepted drop below the last accepted value
    pub max_drop: f64,
    /// Largest accepted rise above the last accepted value
    pub max_jump: f64,
    /// Number of accepted readings the median is taken over
    pub window: usize,
    /// Smallest drop, from a value at least this large, that can be a level-up
    pub levelup_drop_min: f64,
    /// Highest value a level-up drop may land on
    pub levelup_reset_max: f64,
}

impl Default for GlitchPolicy {
    fn default() -> Self {
        Self {
            max_drop: 0.15,
            max_jump: 10.0,
            window: 5,
            levelup_drop_min: 10.0,
            levelup_reset_max: 10.0,
        }
    }
}

/// Slack for comparing against the thresholds in floating point.
const EPSILON: f64 = 1e-9;

/// Outcome of pushing one reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SmoothingOutcome {
    /// Accepted; carries the new published median.
    Accepted(f64),
    /// Accepted as a level-up wrap; the window restarted with this value.
    Restarted(f64),
    /// Rejected as implausible; the published value is unchanged.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ExpSmoother {
    policy: GlitchPolicy,
    last_accepted: Option<f64>,
    history: VecDeque<f64>,
}

impl ExpSmoother {
    pub fn new(policy: GlitchPolicy) -> Self {
        let capacity = policy.window.max(1);
        Self {
            policy,
            last_accepted: None,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// True if `value` is a plausible successor of the last accepted value.
    pub fn is_plausible(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.last_accepted {
            None => true,
            Some(last) => {
                value >= last - self.policy.max_drop - EPSILON
                    && value <= last + self.policy.max_jump + EPSILON
            }
        }
    }

    /// True if `value` looks like the percentage wrapping on level-up.
    pub fn is_levelup_drop(&self, value: f64) -> bool {
        let Some(last) = self.last_accepted else {
            return false;
        };
        let min = self.policy.levelup_drop_min;
        value.is_finite()
            && value >= 0.0
            && last >= min
            && last - value >= min
            && value <= self.policy.levelup_reset_max
    }

    pub fn push(&mut self, value: f64) -> SmoothingOutcome {
        if self.is_levelup_drop(value) {
            self.reset();
            self.last_accepted = Some(value);
            self.history.push_back(value);
            return SmoothingOutcome::Restarted(value);
        }
        if !self.is_plausible(value) {
            return SmoothingOutcome::Rejected;
        }
        self.last_accepted = Some(value);
        if self.history.len() == self.policy.window.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(value);
        match self.median() {
            Some(m) => SmoothingOutcome::Accepted(m),
            None => SmoothingOutcome::Rejected,
        }
    }

    /// Median of the window; the mean of the middle pair for even sizes.
    pub fn median(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        })
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Forgets the baseline, e.g. after a level change restarts the scale.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed(value: f64) -> ExpSmoother {
        let mut s = ExpSmoother::new(GlitchPolicy::default());
        assert_eq!(s.push(value), SmoothingOutcome::Accepted(value));
        s
    }

    #[test]
    fn test_glitch_thresholds() {
        let s = primed(50.0);
        assert!(s.is_plausible(49.9));
        assert!(s.is_plausible(49.85));
        assert!(!s.is_plausible(49.8));
        assert!(s.is_plausible(59.9));
        assert!(!s.is_plausible(61.0));
    }

    #[test]
    fn test_rejected_sample_keeps_baseline() {
        let mut s = primed(50.0);
        assert_eq!(s.push(61.0), SmoothingOutcome::Rejected);
        assert_eq!(s.last_accepted(), Some(50.0));
        assert_eq!(s.history().count(), 1);
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let mut s = ExpSmoother::new(GlitchPolicy {
            max_drop: f64::INFINITY,
            max_jump: f64::INFINITY,
            window: 5,
            ..GlitchPolicy::default()
        });
        let mut last = SmoothingOutcome::Rejected;
        for v in [10.0, 90.0, 11.0, 12.0, 13.0] {
            last = s.push(v);
        }
        assert_eq!(last, SmoothingOutcome::Accepted(12.0));
    }

    #[test]
    fn test_window_rolls() {
        let mut s = primed(1.0);
        for v in [2.0, 3.0, 4.0, 5.0, 6.0, 7.0] {
            s.push(v);
        }
        assert_eq!(s.history().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(s.median(), Some(5.0));
    }

    #[test]
    fn test_reset_accepts_anything() {
        let mut s = primed(80.0);
        s.reset();
        assert_eq!(s.median(), None);
        assert_eq!(s.push(0.5), SmoothingOutcome::Accepted(0.5));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut s = ExpSmoother::new(GlitchPolicy::default());
        assert_eq!(s.push(f64::NAN), SmoothingOutcome::Rejected);
    }

    #[test]
    fn test_levelup_wrap_restarts_window() {
        let mut s = primed(99.8);
        assert_eq!(s.push(0.1), SmoothingOutcome::Restarted(0.1));
        assert_eq!(s.history().collect::<Vec<_>>(), vec![0.1]);
        for v in [0.2, 0.3, 0.5, 1.0] {
            assert!(matches!(s.push(v), SmoothingOutcome::Accepted(_)));
        }
        assert_eq!(s.median(), Some(0.3));
    }

    #[test]
    fn test_drop_that_is_not_a_levelup_is_rejected() {
        // Lands above the reset ceiling.
        let mut s = primed(99.8);
        assert_eq!(s.push(45.0), SmoothingOutcome::Rejected);
        // Starts too low to have wrapped.
        let mut s = primed(9.0);
        assert_eq!(s.push(0.5), SmoothingOutcome::Rejected);
        assert_eq!(s.last_accepted(), Some(9.0));
    }
}
