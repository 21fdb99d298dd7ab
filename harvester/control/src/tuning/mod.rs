//! Tuning state owned by one controller.
//!
//! Both strategies expose their three parameters as named `f64` fields so that
//! the controller can diff successive states and report only real changes.

/// Threshold strategy parameters.
pub mod threshold;
/// Weight strategy parameters.
pub mod weight;

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use threshold::{drift_fires, ThresholdTuning};
pub use weight::WeightTuning;

/// Current tuning of a controller, one variant per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum TuningState {
    /// Threshold strategy.
    Threshold(ThresholdTuning),
    /// Weight strategy.
    Weighted(WeightTuning),
}

impl TuningState {
    /// Named parameter values in a stable order.
    #[must_use]
    pub fn fields(&self) -> [(&'static str, f64); 3] {
        match self {
            Self::Threshold(tuning) => [
                ("weaken_threshold", tuning.weaken_threshold),
                ("grow_threshold", tuning.grow_threshold),
                ("hack_threshold", tuning.hack_threshold),
            ],
            Self::Weighted(tuning) => [
                ("weaken_chance", weight_value(tuning.weaken_chance)),
                ("grow_chance", weight_value(tuning.grow_chance)),
                ("hack_chance", weight_value(tuning.hack_chance)),
            ],
        }
    }

    /// Parameters whose value differs from `previous`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn transitions_from(&self, previous: &Self) -> Vec<Transition> {
        previous
            .fields()
            .into_iter()
            .zip(self.fields())
            .filter(|((_, from), (_, to))| from != to)
            .map(|((field, from), (_, to))| Transition { field, from, to })
            .collect()
    }
}

/// A single parameter change within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    /// Parameter name.
    pub field: &'static str,
    /// Value before the iteration.
    pub from: f64,
    /// Value after the iteration.
    pub to: f64,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.from, self.to)
    }
}

#[allow(clippy::cast_precision_loss)]
fn weight_value(weight: i64) -> f64 {
    weight as f64
}

/// Returns `true` with probability `probability`; values outside `[0, 1]`
/// saturate instead of panicking.
pub(crate) fn roll<R: Rng + ?Sized>(probability: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < probability
}
