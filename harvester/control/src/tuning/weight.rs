use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::target::{TargetBounds, TargetSnapshot};

/// Lowest weight allowed after an adjustment.
pub const MIN_WEIGHT: i64 = 1;
/// Highest weight allowed after an adjustment.
pub const MAX_WEIGHT: i64 = 10_000;
/// Starting weight for every action when nothing is persisted.
pub const DEFAULT_WEIGHT: i64 = 50;

const RESCALE_FLOOR: i64 = 10;
const RESCALE_CEILING: i64 = 100;
const LOW_YIELD_RATIO: f64 = 0.2;
const HIGH_YIELD_RATIO: f64 = 0.8;
const DEFENSE_SLACK_RATIO: f64 = 1.2;
const DEFENSE_PRESSURE_MULTIPLES: [f64; 5] = [2.0, 3.0, 4.0, 5.0, 6.0];
const TEMPERATURE_BAND: f64 = 0.05;

/// Relative action weights; normalized only at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTuning {
    /// Weight of the grow action.
    pub grow_chance: i64,
    /// Weight of the weaken action.
    pub weaken_chance: i64,
    /// Weight of the extract action.
    pub hack_chance: i64,
}

impl Default for WeightTuning {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHT, DEFAULT_WEIGHT, DEFAULT_WEIGHT)
    }
}

impl WeightTuning {
    /// Creates a tuning from explicit weights.
    #[must_use]
    pub const fn new(grow_chance: i64, weaken_chance: i64, hack_chance: i64) -> Self {
        Self {
            grow_chance,
            weaken_chance,
            hack_chance,
        }
    }

    /// Sum of the three weights.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.grow_chance + self.weaken_chance + self.hack_chance
    }

    /// Whether every weight lies in `[MIN_WEIGHT, MAX_WEIGHT]`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weights()
            .iter()
            .all(|weight| (MIN_WEIGHT..=MAX_WEIGHT).contains(weight))
    }

    const fn weights(&self) -> [i64; 3] {
        [self.grow_chance, self.weaken_chance, self.hack_chance]
    }

    fn shift_all(&mut self, delta: i64) {
        self.grow_chance += delta;
        self.weaken_chance += delta;
        self.hack_chance += delta;
    }

    /// Full per-iteration adjustment: state pressure, temperature, rebalance,
    /// rescale, then clamp.
    pub fn adjust<R: Rng + ?Sized>(
        &mut self,
        snapshot: &TargetSnapshot,
        bounds: &TargetBounds,
        rng: &mut R,
    ) {
        self.apply_state_pressure(snapshot, bounds);
        self.apply_temperature(rng);
        self.rebalance();
        self.rescale();
        self.clamp();
    }

    /// Shifts weights from the absolute target state. Rules stack.
    pub fn apply_state_pressure(&mut self, snapshot: &TargetSnapshot, bounds: &TargetBounds) {
        let current = snapshot.current_yield;
        if current < 0.0 {
            self.hack_chance -= 1;
            self.grow_chance += 1;
        }
        if current < bounds.max_yield * LOW_YIELD_RATIO {
            self.hack_chance -= 1;
            self.grow_chance += 1;
        }
        if current >= bounds.max_yield {
            self.hack_chance += 1;
            self.grow_chance -= 1;
        }
        if current >= bounds.max_yield * HIGH_YIELD_RATIO {
            self.hack_chance += 1;
            self.grow_chance -= 1;
        }

        let defense = snapshot.defense;
        let floor = bounds.min_defense;
        if defense <= floor {
            self.weaken_chance -= 1;
        }
        if defense <= floor * DEFENSE_SLACK_RATIO {
            self.weaken_chance -= 1;
        }
        for multiple in DEFENSE_PRESSURE_MULTIPLES {
            if defense >= floor * multiple {
                self.weaken_chance += 1;
            }
        }
    }

    /// Global cooling or heating, each with 5% probability from disjoint bands.
    /// Returns the applied shift.
    pub fn apply_temperature<R: Rng + ?Sized>(&mut self, rng: &mut R) -> i64 {
        let draw: f64 = rng.gen();
        let delta = if draw < TEMPERATURE_BAND {
            -1
        } else if draw < TEMPERATURE_BAND * 2.0 {
            1
        } else {
            0
        };
        self.shift_all(delta);
        delta
    }

    /// Raises all three weights together until none is at or below zero.
    /// Returns the number of passes applied.
    pub fn rebalance(&mut self) -> i64 {
        let lowest = self.weights().into_iter().min().unwrap_or(MIN_WEIGHT);
        let passes = (MIN_WEIGHT - lowest).max(0);
        self.shift_all(passes);
        passes
    }

    /// One rescaling pass: double when every weight is at most 10, halve when
    /// every weight exceeds 100. Returns whether anything changed.
    pub fn rescale_once(&mut self) -> bool {
        let weights = self.weights();
        if weights
            .iter()
            .all(|weight| (MIN_WEIGHT..=RESCALE_FLOOR).contains(weight))
        {
            self.grow_chance *= 2;
            self.weaken_chance *= 2;
            self.hack_chance *= 2;
            true
        } else if weights.iter().all(|weight| *weight > RESCALE_CEILING) {
            self.grow_chance /= 2;
            self.weaken_chance /= 2;
            self.hack_chance /= 2;
            true
        } else {
            false
        }
    }

    /// Repeats [`Self::rescale_once`] until the weights leave both bands.
    pub fn rescale(&mut self) {
        while self.rescale_once() {}
    }

    /// Bounds every weight to `[MIN_WEIGHT, MAX_WEIGHT]`.
    pub fn clamp(&mut self) {
        self.grow_chance = self.grow_chance.clamp(MIN_WEIGHT, MAX_WEIGHT);
        self.weaken_chance = self.weaken_chance.clamp(MIN_WEIGHT, MAX_WEIGHT);
        self.hack_chance = self.hack_chance.clamp(MIN_WEIGHT, MAX_WEIGHT);
    }

    /// Parses a persisted record. Text that is not a JSON object yields `None`;
    /// an absent or malformed field falls back to its default.
    #[must_use]
    pub fn from_record(text: &str) -> Option<Self> {
        let Value::Object(fields) = serde_json::from_str::<Value>(text).ok()? else {
            return None;
        };
        let read = |key: &str| {
            fields
                .get(key)
                .and_then(record_number)
                .map_or(DEFAULT_WEIGHT, floor_weight)
        };
        Some(Self::new(
            read("grow_chance"),
            read("weaken_chance"),
            read("hack_chance"),
        ))
    }

    /// Serializes the complete triple.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn record_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn floor_weight(value: f64) -> i64 {
    // Finite by construction; saturating cast then clamp.
    (value.floor() as i64).clamp(MIN_WEIGHT, MAX_WEIGHT)
}
