//! Action selection. Both functions are pure apart from the injected RNG.

use rand::Rng;

use crate::{
    target::{Action, TargetBounds, TargetSnapshot},
    tuning::{ThresholdTuning, WeightTuning},
};

/// Priority-ordered choice: defense control first, then yield management,
/// then extraction. Ties between equal thresholds resolve in that same order.
/// `None` is an idle tick.
#[must_use]
pub fn decide_by_threshold(snapshot: &TargetSnapshot, tuning: &ThresholdTuning) -> Option<Action> {
    if snapshot.defense >= tuning.weaken_threshold {
        Some(Action::Weaken)
    } else if snapshot.current_yield <= tuning.grow_threshold {
        Some(Action::Grow)
    } else if snapshot.current_yield >= tuning.hack_threshold {
        Some(Action::Extract)
    } else {
        None
    }
}

/// Weighted draw over `[0, total)`, consumed as weaken, grow, then extract.
///
/// Each band is guarded by feasibility: no weakening at the defense floor, no
/// growing at full yield, no extracting from an empty target. A draw whose
/// band is infeasible keeps falling through to the next band, so `None` is
/// returned only when no later band is feasible either.
pub fn decide_by_weight<R: Rng + ?Sized>(
    snapshot: &TargetSnapshot,
    tuning: &WeightTuning,
    bounds: &TargetBounds,
    rng: &mut R,
) -> Option<Action> {
    let total = tuning.total();
    if total <= 0 {
        return None;
    }
    let mut remainder = rng.gen_range(0.0..as_weight(total));

    remainder -= as_weight(tuning.weaken_chance);
    if remainder <= 0.0 && snapshot.defense > bounds.min_defense {
        return Some(Action::Weaken);
    }
    remainder -= as_weight(tuning.grow_chance);
    if remainder <= 0.0 && snapshot.current_yield < bounds.max_yield {
        return Some(Action::Grow);
    }
    remainder -= as_weight(tuning.hack_chance);
    if remainder <= 0.0 && snapshot.current_yield > 0.0 {
        return Some(Action::Extract);
    }
    None
}

#[allow(clippy::cast_precision_loss)]
fn as_weight(weight: i64) -> f64 {
    weight as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{
        rngs::{mock::StepRng, SmallRng},
        SeedableRng,
    };

    const BOUNDS: TargetBounds = TargetBounds {
        max_yield: 1_000_000.0,
        min_defense: 5.0,
    };

    fn lowest_draw() -> StepRng {
        StepRng::new(0, 0)
    }

    fn highest_draw() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn weaken_outranks_grow() {
        let tuning = ThresholdTuning::new(10.0, 500_000.0, 900_000.0);
        let snapshot = TargetSnapshot::new(12.0, 100.0);
        assert_eq!(decide_by_threshold(&snapshot, &tuning), Some(Action::Weaken));
    }

    #[test]
    fn threshold_chain_falls_through_in_order() {
        let tuning = ThresholdTuning::new(10.0, 500_000.0, 900_000.0);
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(8.0, 500_000.0), &tuning),
            Some(Action::Grow)
        );
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(8.0, 900_000.0), &tuning),
            Some(Action::Extract)
        );
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(8.0, 700_000.0), &tuning),
            None
        );
    }

    #[test]
    fn equal_thresholds_resolve_by_priority() {
        let tuning = ThresholdTuning::new(10.0, 10.0, 10.0);
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(10.0, 10.0), &tuning),
            Some(Action::Weaken)
        );
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(9.0, 10.0), &tuning),
            Some(Action::Grow)
        );
        assert_eq!(
            decide_by_threshold(&TargetSnapshot::new(9.0, 11.0), &tuning),
            Some(Action::Extract)
        );
    }

    #[test]
    fn low_draw_weakens_when_feasible() {
        let tuning = WeightTuning::new(10, 10, 10);
        let snapshot = TargetSnapshot::new(20.0, 10_000.0);
        assert_eq!(
            decide_by_weight(&snapshot, &tuning, &BOUNDS, &mut lowest_draw()),
            Some(Action::Weaken)
        );
    }

    #[test]
    fn infeasible_band_falls_through() {
        let tuning = WeightTuning::new(10, 10, 10);
        let at_floor = TargetSnapshot::new(5.0, 10_000.0);
        assert_eq!(
            decide_by_weight(&at_floor, &tuning, &BOUNDS, &mut lowest_draw()),
            Some(Action::Grow)
        );

        let at_floor_and_full = TargetSnapshot::new(5.0, 1_000_000.0);
        assert_eq!(
            decide_by_weight(&at_floor_and_full, &tuning, &BOUNDS, &mut lowest_draw()),
            Some(Action::Extract)
        );
    }

    #[test]
    fn high_draw_extracts_only_from_non_empty_target() {
        let tuning = WeightTuning::new(10, 10, 10);
        assert_eq!(
            decide_by_weight(
                &TargetSnapshot::new(20.0, 10_000.0),
                &tuning,
                &BOUNDS,
                &mut highest_draw()
            ),
            Some(Action::Extract)
        );
        assert_eq!(
            decide_by_weight(
                &TargetSnapshot::new(20.0, 0.0),
                &tuning,
                &BOUNDS,
                &mut highest_draw()
            ),
            None
        );
    }

    #[test]
    fn draws_follow_weights() {
        let tuning = WeightTuning::new(10, 30, 60);
        let snapshot = TargetSnapshot::new(20.0, 10_000.0);
        let mut rng = SmallRng::seed_from_u64(3);
        let draws = 100_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            match decide_by_weight(&snapshot, &tuning, &BOUNDS, &mut rng) {
                Some(Action::Weaken) => counts[0] += 1,
                Some(Action::Grow) => counts[1] += 1,
                Some(Action::Extract) => counts[2] += 1,
                None => panic!("every band is feasible"),
            }
        }
        let share = |count: usize| count as f64 / f64::from(draws);
        assert!((share(counts[0]) - 0.3).abs() < 0.02, "{counts:?}");
        assert!((share(counts[1]) - 0.1).abs() < 0.02, "{counts:?}");
        assert!((share(counts[2]) - 0.6).abs() < 0.02, "{counts:?}");
    }
}
