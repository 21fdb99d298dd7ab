use rand::Rng;
use serde::{Deserialize, Serialize};

use super::roll;
use crate::{config::StepParams, target::Action, target::TargetBounds};

/// Thresholds driving the priority-ordered decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTuning {
    /// Defense at or above which weakening wins. Bounded below by the defense floor.
    pub weaken_threshold: f64,
    /// Yield at or below which growing wins. Bounded to `[0, max_yield]`.
    pub grow_threshold: f64,
    /// Yield at or above which extraction wins. Bounded to `[0, max_yield]`.
    pub hack_threshold: f64,
}

impl ThresholdTuning {
    /// Creates a tuning from explicit thresholds.
    #[must_use]
    pub const fn new(weaken_threshold: f64, grow_threshold: f64, hack_threshold: f64) -> Self {
        Self {
            weaken_threshold,
            grow_threshold,
            hack_threshold,
        }
    }

    /// Reacts to the magnitude returned by the executed action.
    ///
    /// A weaken or grow that changed nothing means the threshold overshot the
    /// target's limit. A successful extraction raises the hack threshold only
    /// when a coin weighted by `extraction_chance` also lands, so that lucky
    /// extractions are not mistaken for headroom.
    pub fn apply_outcome<R: Rng + ?Sized>(
        &mut self,
        action: Action,
        magnitude: f64,
        extraction_chance: f64,
        steps: &StepParams,
        rng: &mut R,
    ) {
        let no_effect = magnitude <= 0.0;
        match action {
            Action::Weaken if no_effect => self.weaken_threshold += steps.defense_step,
            Action::Grow if no_effect => self.grow_threshold -= steps.yield_step,
            Action::Extract if !no_effect && roll(extraction_chance, rng) => {
                self.hack_threshold += steps.yield_step;
            }
            _ => {}
        }
    }

    /// Nudges every threshold toward more aggressive values.
    pub fn apply_drift(&mut self, steps: &StepParams) {
        self.weaken_threshold -= steps.defense_step;
        self.grow_threshold += steps.yield_step;
        self.hack_threshold -= steps.yield_step;
    }

    /// Forces every threshold into its valid range.
    pub fn clamp(&mut self, bounds: &TargetBounds) {
        self.weaken_threshold = self.weaken_threshold.max(bounds.min_defense);
        self.grow_threshold = self.grow_threshold.clamp(0.0, bounds.max_yield);
        self.hack_threshold = self.hack_threshold.clamp(0.0, bounds.max_yield);
    }

    /// Whether every threshold lies inside its valid range.
    #[must_use]
    pub fn is_within(&self, bounds: &TargetBounds) -> bool {
        let yield_range = 0.0..=bounds.max_yield;
        self.weaken_threshold >= bounds.min_defense
            && yield_range.contains(&self.grow_threshold)
            && yield_range.contains(&self.hack_threshold)
    }
}

/// Rolls the population-scaled drift event: probability `1 / (threads * K)`.
pub fn drift_fires<R: Rng + ?Sized>(total_threads: u32, drift_factor: u32, rng: &mut R) -> bool {
    let population = f64::from(total_threads.max(1)) * f64::from(drift_factor.max(1));
    roll(population.recip(), rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    const BOUNDS: TargetBounds = TargetBounds {
        max_yield: 100_000.0,
        min_defense: 10.0,
    };

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn zero_effect_weaken_relaxes_upward() {
        let steps = StepParams::default();
        let mut tuning = ThresholdTuning::new(10.0, 50_000.0, 60_000.0);
        tuning.apply_outcome(Action::Weaken, 0.0, 1.0, &steps, &mut rng());
        tuning.clamp(&BOUNDS);
        assert!((tuning.weaken_threshold - 10.05).abs() < 1e-9);

        for _ in 0..1000 {
            tuning.apply_outcome(Action::Weaken, 0.0, 1.0, &steps, &mut rng());
            tuning.clamp(&BOUNDS);
            assert!(tuning.weaken_threshold >= BOUNDS.min_defense);
        }
        assert!(tuning.weaken_threshold > 50.0);
    }

    #[test]
    fn effective_weaken_leaves_threshold_alone() {
        let steps = StepParams::default();
        let mut tuning = ThresholdTuning::new(12.0, 50_000.0, 60_000.0);
        tuning.apply_outcome(Action::Weaken, 0.2, 1.0, &steps, &mut rng());
        assert_eq!(tuning, ThresholdTuning::new(12.0, 50_000.0, 60_000.0));
    }

    #[test]
    fn zero_effect_grow_tightens_and_stops_at_zero() {
        let steps = StepParams::default();
        let mut tuning = ThresholdTuning::new(12.0, 1_500.0, 60_000.0);
        tuning.apply_outcome(Action::Grow, 0.0, 1.0, &steps, &mut rng());
        tuning.clamp(&BOUNDS);
        assert_eq!(tuning.grow_threshold, 500.0);
        tuning.apply_outcome(Action::Grow, 0.0, 1.0, &steps, &mut rng());
        tuning.clamp(&BOUNDS);
        assert_eq!(tuning.grow_threshold, 0.0);
    }

    #[test]
    fn extraction_adjustment_is_chance_gated() {
        let steps = StepParams::default();
        let mut tuning = ThresholdTuning::new(12.0, 1_500.0, 60_000.0);

        tuning.apply_outcome(Action::Extract, 2_000.0, 0.0, &steps, &mut rng());
        assert_eq!(tuning.hack_threshold, 60_000.0);

        tuning.apply_outcome(Action::Extract, 0.0, 1.0, &steps, &mut rng());
        assert_eq!(tuning.hack_threshold, 60_000.0);

        tuning.apply_outcome(Action::Extract, 2_000.0, 1.0, &steps, &mut rng());
        assert_eq!(tuning.hack_threshold, 61_000.0);
    }

    #[test]
    fn drift_then_clamp_respects_bounds() {
        let steps = StepParams::default();
        let mut tuning = ThresholdTuning::new(10.0, 99_500.0, 400.0);
        tuning.apply_drift(&steps);
        tuning.clamp(&BOUNDS);
        assert_eq!(tuning, ThresholdTuning::new(10.0, 100_000.0, 0.0));
        assert!(tuning.is_within(&BOUNDS));
    }

    #[test]
    fn clamp_holds_for_arbitrary_sequences() {
        let steps = StepParams::default();
        let mut rng = rng();
        let mut tuning = ThresholdTuning::new(30.0, 20_000.0, 80_000.0);
        for i in 0..5_000u32 {
            let action = Action::ALL[(i % 3) as usize];
            let magnitude = if rng.gen_bool(0.5) { 0.0 } else { 1.0 };
            tuning.apply_outcome(action, magnitude, 0.5, &steps, &mut rng);
            if rng.gen_bool(0.1) {
                tuning.apply_drift(&steps);
            }
            tuning.clamp(&BOUNDS);
            assert!(tuning.is_within(&BOUNDS), "iteration {i}: {tuning:?}");
        }
    }

    #[test]
    fn drift_frequency_scales_with_population() {
        let iterations = 200_000u32;
        let mut rng = SmallRng::seed_from_u64(42);
        let fired = |threads: u32, rng: &mut SmallRng| {
            (0..iterations)
                .filter(|_| drift_fires(threads, 10, rng))
                .count()
        };

        let four = fired(4, &mut rng);
        let eight = fired(8, &mut rng);
        // Expected 5000 and 2500 events.
        assert!((4_500..=5_500).contains(&four), "four threads fired {four}");
        assert!((2_250..=2_750).contains(&eight), "eight threads fired {eight}");
    }
}
