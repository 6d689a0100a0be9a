//! Piecewise-linear load-transfer probability model.
//!
//! Maps a rank's observed-vs-target load ratio to the probability of
//! initiating a transfer this decision epoch. The curve is linear below the
//! target with `low_slope`, linear above it with `high_slope`, continuous at
//! ratio 1 with value `target_prob`, and clamped to the configured ratio
//! window.

use crate::random::ProbabilityDraw;

/// Five-parameter probability curve over actual/target load ratio.
#[derive(Debug, Clone, Copy)]
pub struct ScatterModel {
    min_ratio: f64,
    max_ratio: f64,
    target_prob: f64,
    low_slope: f64,
    high_slope: f64,
}

impl ScatterModel {
    /// Derive the curve from its endpoint probabilities.
    ///
    /// Requires `min_ratio <= 1 <= max_ratio` (enforced by config
    /// validation). A degenerate window side (`min_ratio == 1` or
    /// `max_ratio == 1`) yields a flat slope on that side.
    pub fn configure(
        min_ratio: f64,
        max_ratio: f64,
        min_prob: f64,
        target_prob: f64,
        max_prob: f64,
    ) -> Self {
        let low_slope = if min_ratio < 1.0 {
            (target_prob - min_prob) / (1.0 - min_ratio)
        } else {
            0.0
        };
        let high_slope = if max_ratio > 1.0 {
            (max_prob - target_prob) / (max_ratio - 1.0)
        } else {
            0.0
        };
        Self {
            min_ratio,
            max_ratio,
            target_prob,
            low_slope,
            high_slope,
        }
    }

    /// Transfer probability for an observed load against a target load.
    ///
    /// `target == 0` carries no meaningful ratio and returns `target_prob`.
    pub fn probability(&self, actual: f64, target: f64) -> f64 {
        if target == 0.0 {
            return self.target_prob;
        }
        let ratio = actual / target;
        if ratio < 1.0 {
            self.target_prob - (1.0 - ratio.max(self.min_ratio)) * self.low_slope
        } else {
            self.target_prob + (ratio.min(self.max_ratio) - 1.0) * self.high_slope
        }
    }

    /// One Bernoulli trial against the curve, drawn from the shared serial
    /// random source.
    pub fn should_transfer(
        &self,
        actual: f64,
        target: f64,
        draw: &mut dyn ProbabilityDraw,
    ) -> bool {
        draw.draw() < self.probability(actual, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedDraw;

    fn model() -> ScatterModel {
        ScatterModel::configure(0.5, 2.0, 0.1, 0.5, 0.9)
    }

    #[test]
    fn reference_scenario() {
        let m = model();
        assert_eq!(m.probability(1.0, 1.0), 0.5);
        assert_eq!(m.probability(0.5, 1.0), 0.1);
        assert_eq!(m.probability(2.0, 1.0), 0.9);
        // Degenerate target: no meaningful ratio.
        assert_eq!(m.probability(0.0, 0.0), 0.5);
    }

    #[test]
    fn continuous_at_target_ratio() {
        let m = model();
        let below = m.probability(1.0 - 1e-12, 1.0);
        let above = m.probability(1.0 + 1e-12, 1.0);
        assert!((below - 0.5).abs() < 1e-9);
        assert!((above - 0.5).abs() < 1e-9);
    }

    #[test]
    fn monotone_nondecreasing_in_ratio() {
        let m = model();
        let mut last = f64::NEG_INFINITY;
        for i in 0..=100 {
            let ratio = 0.25 + (i as f64) * 0.025; // 0.25 ..= 2.75, beyond both clips
            let p = m.probability(ratio, 1.0);
            assert!(p >= last, "probability dipped at ratio {ratio}");
            last = p;
        }
    }

    #[test]
    fn clamped_to_probability_envelope() {
        let m = model();
        for i in 0..=100 {
            let ratio = (i as f64) * 0.05;
            let p = m.probability(ratio, 1.0);
            assert!((0.1..=0.9).contains(&p), "p = {p} out of envelope at ratio {ratio}");
        }
    }

    #[test]
    fn degenerate_window_sides_are_flat() {
        let m = ScatterModel::configure(1.0, 1.0, 0.2, 0.5, 0.8);
        assert_eq!(m.probability(0.1, 1.0), 0.5);
        assert_eq!(m.probability(10.0, 1.0), 0.5);
    }

    #[test]
    fn bernoulli_trial_uses_draw() {
        let m = model();
        let mut low = ScriptedDraw::new(vec![0.49]);
        let mut high = ScriptedDraw::new(vec![0.51]);
        assert!(m.should_transfer(1.0, 1.0, &mut low));
        assert!(!m.should_transfer(1.0, 1.0, &mut high));
    }
}
