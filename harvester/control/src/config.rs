use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, target::TargetBounds};

/// Default threshold nudge in defense units.
pub const DEFAULT_DEFENSE_STEP: f64 = 0.05;
/// Default threshold nudge in yield units.
pub const DEFAULT_YIELD_STEP: f64 = 1000.0;
/// Default drift divisor `K`; drift fires with probability `1 / (threads * K)`.
pub const DEFAULT_DRIFT_FACTOR: u32 = 10;
/// Default pause after a drift correction, in milliseconds.
pub const DEFAULT_DRIFT_COOLDOWN_MS: u64 = 100;

/// Step sizes and drift settings shared by every worker of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepParams {
    /// Amount added to or removed from the weaken threshold per adjustment.
    #[serde(default = "default_defense_step")]
    pub defense_step: f64,
    /// Amount added to or removed from the grow/hack thresholds per adjustment.
    #[serde(default = "default_yield_step")]
    pub yield_step: f64,
    /// Population divisor `K` applied to the drift probability.
    #[serde(default = "default_drift_factor")]
    pub drift_factor: u32,
    /// Pause after a drift correction, in milliseconds.
    #[serde(default = "default_drift_cooldown_ms")]
    pub drift_cooldown_ms: u64,
}

impl Default for StepParams {
    fn default() -> Self {
        Self {
            defense_step: DEFAULT_DEFENSE_STEP,
            yield_step: DEFAULT_YIELD_STEP,
            drift_factor: DEFAULT_DRIFT_FACTOR,
            drift_cooldown_ms: DEFAULT_DRIFT_COOLDOWN_MS,
        }
    }
}

impl StepParams {
    /// Pause applied after a drift correction.
    #[must_use]
    pub const fn drift_cooldown(&self) -> Duration {
        Duration::from_millis(self.drift_cooldown_ms)
    }

    /// Parses a TOML profile; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let params: Self =
            toml::from_str(raw).map_err(|err| ConfigError::InvalidProfile(err.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Loads a TOML profile from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            ConfigError::InvalidProfile(format!("reading {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Rejects non-positive steps and a zero drift factor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_positive(self.defense_step) {
            return Err(ConfigError::NotPositive {
                field: "defense_step",
            });
        }
        if !is_positive(self.yield_step) {
            return Err(ConfigError::NotPositive {
                field: "yield_step",
            });
        }
        if self.drift_factor == 0 {
            return Err(ConfigError::NotPositive {
                field: "drift_factor",
            });
        }
        Ok(())
    }
}

const fn default_defense_step() -> f64 {
    DEFAULT_DEFENSE_STEP
}

const fn default_yield_step() -> f64 {
    DEFAULT_YIELD_STEP
}

const fn default_drift_factor() -> u32 {
    DEFAULT_DRIFT_FACTOR
}

const fn default_drift_cooldown_ms() -> u64 {
    DEFAULT_DRIFT_COOLDOWN_MS
}

/// Which adaptation strategy a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Priority-ordered thresholds adjusted from action outcomes, with drift.
    Threshold {
        /// Defense level at or above which weakening is chosen.
        weaken_threshold: f64,
        /// Yield level at or below which growing is chosen.
        grow_threshold: f64,
        /// Yield level at or above which extraction is chosen.
        hack_threshold: f64,
        /// Fixed extraction success chance; `None` reads it live from the target.
        extraction_chance: Option<f64>,
    },
    /// Relative weights re-derived from target state and persisted per target.
    Weighted,
}

impl StrategyConfig {
    /// Short strategy name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::Weighted => "weighted",
        }
    }
}

/// Immutable per-worker configuration, validated once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Identifier of the remote target.
    pub target: String,
    /// Number of cooperating worker instances system-wide.
    pub total_threads: u32,
    /// Theoretical maximum yield of the target.
    pub max_yield: f64,
    /// Theoretical minimum defense of the target.
    pub min_defense: f64,
    /// Skip loading persisted weights at startup.
    pub clean_start: bool,
    /// Adaptation strategy.
    pub strategy: StrategyConfig,
    /// Step sizes and drift settings.
    pub steps: StepParams,
}

impl ControllerConfig {
    /// Returns a builder for the given target.
    #[must_use]
    pub fn builder(target: impl Into<String>) -> ControllerConfigBuilder {
        ControllerConfigBuilder::new(target)
    }

    /// Capacity bounds used for clamping and feasibility guards.
    #[must_use]
    pub const fn bounds(&self) -> TargetBounds {
        TargetBounds {
            max_yield: self.max_yield,
            min_defense: self.min_defense,
        }
    }

    /// Checks every startup constraint, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if let StrategyConfig::Threshold {
            weaken_threshold,
            grow_threshold,
            hack_threshold,
            extraction_chance,
        } = self.strategy
        {
            for (field, value) in [
                ("grow_threshold", grow_threshold),
                ("weaken_threshold", weaken_threshold),
                ("hack_threshold", hack_threshold),
            ] {
                if !is_positive(value) {
                    return Err(ConfigError::NotPositive { field });
                }
            }
            self.validate_capacity()?;
            if let Some(chance) = extraction_chance {
                if !(0.0..=1.0).contains(&chance) {
                    return Err(ConfigError::ExtractionChanceOutOfRange(chance));
                }
            }
        } else {
            self.validate_capacity()?;
        }
        self.steps.validate()
    }

    fn validate_capacity(&self) -> Result<(), ConfigError> {
        if self.total_threads == 0 {
            return Err(ConfigError::NotPositive {
                field: "total_threads",
            });
        }
        if !is_positive(self.max_yield) {
            return Err(ConfigError::NotPositive { field: "max_yield" });
        }
        if !is_positive(self.min_defense) {
            return Err(ConfigError::NotPositive {
                field: "min_defense",
            });
        }
        Ok(())
    }
}

/// Builder for [`ControllerConfig`]. Numeric fields start at zero so that an
/// omitted value fails validation instead of silently running.
#[derive(Debug, Clone)]
pub struct ControllerConfigBuilder {
    target: String,
    total_threads: u32,
    max_yield: f64,
    min_defense: f64,
    clean_start: bool,
    strategy: StrategyConfig,
    steps: StepParams,
}

impl ControllerConfigBuilder {
    /// Creates a builder for the weighted strategy.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            total_threads: 0,
            max_yield: 0.0,
            min_defense: 0.0,
            clean_start: false,
            strategy: StrategyConfig::Weighted,
            steps: StepParams::default(),
        }
    }

    /// Sets the system-wide worker count.
    #[must_use]
    pub fn total_threads(mut self, total_threads: u32) -> Self {
        self.total_threads = total_threads;
        self
    }

    /// Sets the target's maximum yield.
    #[must_use]
    pub fn max_yield(mut self, max_yield: f64) -> Self {
        self.max_yield = max_yield;
        self
    }

    /// Sets the target's minimum defense.
    #[must_use]
    pub fn min_defense(mut self, min_defense: f64) -> Self {
        self.min_defense = min_defense;
        self
    }

    /// Skips loading persisted weights.
    #[must_use]
    pub fn clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    /// Selects the threshold strategy with the given starting thresholds.
    #[must_use]
    pub fn threshold(mut self, weaken: f64, grow: f64, hack: f64) -> Self {
        self.strategy = StrategyConfig::Threshold {
            weaken_threshold: weaken,
            grow_threshold: grow,
            hack_threshold: hack,
            extraction_chance: None,
        };
        self
    }

    /// Fixes the extraction success chance (threshold strategy only).
    #[must_use]
    pub fn extraction_chance(mut self, chance: f64) -> Self {
        if let StrategyConfig::Threshold {
            ref mut extraction_chance,
            ..
        } = self.strategy
        {
            *extraction_chance = Some(chance);
        }
        self
    }

    /// Selects the weighted strategy.
    #[must_use]
    pub fn weighted(mut self) -> Self {
        self.strategy = StrategyConfig::Weighted;
        self
    }

    /// Overrides the step parameters.
    #[must_use]
    pub fn steps(mut self, steps: StepParams) -> Self {
        self.steps = steps;
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<ControllerConfig, ConfigError> {
        let config = ControllerConfig {
            target: self.target,
            total_threads: self.total_threads,
            max_yield: self.max_yield,
            min_defense: self.min_defense,
            clean_start: self.clean_start,
            strategy: self.strategy,
            steps: self.steps,
        };
        config.validate()?;
        Ok(config)
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
