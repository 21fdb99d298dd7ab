//! In-process target model.
//!
//! Mirrors the qualitative behavior of a real target: weakening lowers defense
//! toward a floor, growing multiplies yield toward a cap and hardens the
//! target, extraction succeeds with a defense-dependent chance and hardens it
//! further.

use std::time::Duration;

use anyhow::{bail, ensure, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::target::{Action, ActionExecutor, TargetBounds, TargetSnapshot, TargetStateProvider};

/// Parameters of a simulated target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    /// Yield cap.
    pub max_yield: f64,
    /// Defense floor.
    pub min_defense: f64,
    /// Defense at which extraction never succeeds.
    pub defense_ceiling: f64,
    /// Starting defense.
    pub initial_defense: f64,
    /// Starting yield.
    pub initial_yield: f64,
    /// Defense removed per weaken.
    pub weaken_amount: f64,
    /// Relative yield growth per grow.
    pub grow_rate: f64,
    /// Defense added per grow.
    pub grow_defense: f64,
    /// Share of the current yield taken per successful extraction.
    pub extract_fraction: f64,
    /// Defense added per successful extraction.
    pub extract_defense: f64,
    /// Simulated duration of every action, in milliseconds.
    pub latency_ms: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            max_yield: 1_000_000.0,
            min_defense: 5.0,
            defense_ceiling: 100.0,
            initial_defense: 15.0,
            initial_yield: 250_000.0,
            weaken_amount: 0.5,
            grow_rate: 0.05,
            grow_defense: 0.04,
            extract_fraction: 0.1,
            extract_defense: 0.02,
            latency_ms: 0,
        }
    }
}

impl SimulationProfile {
    /// Simulated action latency.
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Rejects profiles that would make the model meaningless.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("max_yield", self.max_yield),
            ("min_defense", self.min_defense),
            ("defense_ceiling", self.defense_ceiling),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                "{field} must be greater than 0"
            );
        }
        ensure!(
            self.extract_fraction > 0.0 && self.extract_fraction <= 1.0,
            "extract_fraction must be in (0, 1], got {}",
            self.extract_fraction
        );
        for (field, value) in [
            ("initial_defense", self.initial_defense),
            ("initial_yield", self.initial_yield),
            ("weaken_amount", self.weaken_amount),
            ("grow_rate", self.grow_rate),
            ("grow_defense", self.grow_defense),
            ("extract_defense", self.extract_defense),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                "{field} must be a non-negative number"
            );
        }
        Ok(())
    }

    /// Capacity bounds of a target built from this profile.
    #[must_use]
    pub const fn bounds(&self) -> TargetBounds {
        TargetBounds {
            max_yield: self.max_yield,
            min_defense: self.min_defense,
        }
    }
}

#[derive(Debug)]
struct SimState {
    defense: f64,
    current_yield: f64,
    rng: SmallRng,
}

/// Shared simulated target; every worker of a run points at the same instance.
#[derive(Debug)]
pub struct SimulatedTarget {
    name: String,
    profile: SimulationProfile,
    state: Mutex<SimState>,
}

impl SimulatedTarget {
    /// Creates a target with a deterministic random source.
    #[must_use]
    pub fn new(name: impl Into<String>, profile: SimulationProfile, seed: u64) -> Self {
        let state = SimState {
            defense: profile.initial_defense.max(profile.min_defense),
            current_yield: profile.initial_yield.clamp(0.0, profile.max_yield),
            rng: SmallRng::seed_from_u64(seed),
        };
        Self {
            name: name.into(),
            profile,
            state: Mutex::new(state),
        }
    }

    /// Target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profile the target was built from.
    #[must_use]
    pub const fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Current defense and yield.
    #[must_use]
    pub fn snapshot(&self) -> TargetSnapshot {
        let state = self.state.lock();
        TargetSnapshot::new(state.defense, state.current_yield)
    }

    fn check(&self, target: &str) -> Result<()> {
        if target != self.name {
            bail!("unknown target `{target}`");
        }
        Ok(())
    }

    fn chance_at(&self, defense: f64) -> f64 {
        let chance = 1.0 - defense / self.profile.defense_ceiling;
        if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 1.0)
        }
    }

    fn apply(&self, action: Action) -> f64 {
        let profile = &self.profile;
        let mut state = self.state.lock();
        match action {
            Action::Weaken => {
                let lowered = (state.defense - profile.weaken_amount).max(profile.min_defense);
                let effect = state.defense - lowered;
                state.defense = lowered;
                effect
            }
            Action::Grow => {
                let grown = ((state.current_yield + 1.0) * (1.0 + profile.grow_rate))
                    .min(profile.max_yield);
                let effect = (grown - state.current_yield).max(0.0);
                state.current_yield = grown.max(state.current_yield);
                if effect > 0.0 {
                    state.defense =
                        (state.defense + profile.grow_defense).min(profile.defense_ceiling);
                }
                effect
            }
            Action::Extract => {
                let chance = self.chance_at(state.defense);
                if state.current_yield <= 0.0 || !state.rng.gen_bool(chance) {
                    return 0.0;
                }
                let taken = state.current_yield * profile.extract_fraction;
                state.current_yield -= taken;
                state.defense =
                    (state.defense + profile.extract_defense).min(profile.defense_ceiling);
                taken
            }
        }
    }
}

#[async_trait]
impl TargetStateProvider for SimulatedTarget {
    async fn defense_level(&self, target: &str) -> Result<f64> {
        self.check(target)?;
        Ok(self.state.lock().defense)
    }

    async fn current_yield(&self, target: &str) -> Result<f64> {
        self.check(target)?;
        Ok(self.state.lock().current_yield)
    }

    async fn max_yield(&self, target: &str) -> Result<f64> {
        self.check(target)?;
        Ok(self.profile.max_yield)
    }

    async fn min_defense(&self, target: &str) -> Result<f64> {
        self.check(target)?;
        Ok(self.profile.min_defense)
    }

    async fn extraction_chance(&self, target: &str) -> Result<f64> {
        self.check(target)?;
        let defense = self.state.lock().defense;
        Ok(self.chance_at(defense))
    }
}

#[async_trait]
impl ActionExecutor for SimulatedTarget {
    async fn execute(&self, target: &str, action: Action) -> Result<f64> {
        self.check(target)?;
        let latency = self.profile.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.apply(action))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::ControllerConfig,
        controller::AdaptiveController,
        store::{load_weights, FileTuningStore},
        target::read_bounds,
        tuning::TuningState,
    };
    use tempfile::tempdir;

    fn target(profile: SimulationProfile) -> Arc<SimulatedTarget> {
        Arc::new(SimulatedTarget::new("n00dles", profile, 11))
    }

    #[tokio::test]
    async fn weaken_stops_at_floor() {
        let sim = target(SimulationProfile {
            initial_defense: 5.8,
            ..SimulationProfile::default()
        });
        let first = sim.execute("n00dles", Action::Weaken).await.unwrap();
        assert!((first - 0.5).abs() < 1e-9);
        let second = sim.execute("n00dles", Action::Weaken).await.unwrap();
        assert!((second - 0.3).abs() < 1e-9);
        assert_eq!(sim.execute("n00dles", Action::Weaken).await.unwrap(), 0.0);
        assert_eq!(sim.defense_level("n00dles").await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn grow_saturates_at_max_yield() {
        let sim = target(SimulationProfile {
            initial_yield: 990_000.0,
            ..SimulationProfile::default()
        });
        assert!(sim.execute("n00dles", Action::Grow).await.unwrap() > 0.0);
        assert_eq!(sim.current_yield("n00dles").await.unwrap(), 1_000_000.0);
        assert_eq!(sim.execute("n00dles", Action::Grow).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn extraction_takes_a_share_and_hardens() {
        let sim = target(SimulationProfile {
            defense_ceiling: f64::MAX,
            ..SimulationProfile::default()
        });
        let before = sim.snapshot();
        let taken = sim.execute("n00dles", Action::Extract).await.unwrap();
        assert!((taken - 25_000.0).abs() < 1e-6);
        let after = sim.snapshot();
        assert!(after.defense > before.defense);
        assert!((after.current_yield - 225_000.0).abs() < 1e-6);
    }

    #[test]
    fn profile_validation_rejects_degenerate_models() {
        assert!(SimulationProfile::default().validate().is_ok());

        let flat = SimulationProfile {
            defense_ceiling: 0.0,
            ..SimulationProfile::default()
        };
        assert_eq!(
            flat.validate().unwrap_err().to_string(),
            "defense_ceiling must be greater than 0"
        );

        for extract_fraction in [0.0, 1.5, f64::NAN] {
            let profile = SimulationProfile {
                extract_fraction,
                ..SimulationProfile::default()
            };
            assert!(profile.validate().is_err(), "{extract_fraction}");
        }

        let shrinking = SimulationProfile {
            grow_rate: -0.1,
            ..SimulationProfile::default()
        };
        assert!(shrinking.validate().is_err());
    }

    #[tokio::test]
    async fn zero_ceiling_never_extracts() {
        let sim = target(SimulationProfile {
            defense_ceiling: 0.0,
            min_defense: 0.0,
            initial_defense: 0.0,
            ..SimulationProfile::default()
        });
        assert_eq!(sim.extraction_chance("n00dles").await.unwrap(), 0.0);
        assert_eq!(sim.execute("n00dles", Action::Extract).await.unwrap(), 0.0);
        assert_eq!(sim.snapshot().current_yield, 250_000.0);
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let sim = target(SimulationProfile::default());
        assert!(sim.defense_level("foodnstuff").await.is_err());
        assert!(sim.execute("foodnstuff", Action::Grow).await.is_err());
        let bounds = read_bounds(sim.as_ref(), "n00dles").await.unwrap();
        assert_eq!(bounds, SimulationProfile::default().bounds());
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_controller_keeps_thresholds_in_range() {
        let profile = SimulationProfile::default();
        let bounds = profile.bounds();
        let config = ControllerConfig::builder("n00dles")
            .threshold(10.0, 400_000.0, 600_000.0)
            .total_threads(2)
            .max_yield(bounds.max_yield)
            .min_defense(bounds.min_defense)
            .build()
            .unwrap();
        let mut controller = AdaptiveController::builder(config)
            .target(target(profile))
            .rng(SmallRng::seed_from_u64(5))
            .build()
            .unwrap();

        for _ in 0..500 {
            controller.step().await.unwrap();
            let TuningState::Threshold(tuning) = controller.tuning() else {
                panic!("expected threshold tuning");
            };
            assert!(tuning.is_within(&bounds), "{tuning:?}");
        }
        let metrics = controller.metrics();
        assert_eq!(metrics.iterations, 500);
        assert!(metrics.weaken + metrics.grow + metrics.extract > 0);
    }

    #[tokio::test]
    async fn weighted_workers_share_a_file_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileTuningStore::new(dir.path()).unwrap());
        let sim = target(SimulationProfile::default());
        let bounds = sim.profile().bounds();
        let config = ControllerConfig::builder("n00dles")
            .weighted()
            .total_threads(2)
            .max_yield(bounds.max_yield)
            .min_defense(bounds.min_defense)
            .build()
            .unwrap();

        let mut first = AdaptiveController::builder(config.clone())
            .target(sim.clone())
            .store(store.clone())
            .rng(SmallRng::seed_from_u64(1))
            .build()
            .unwrap();
        let mut second = AdaptiveController::builder(config)
            .target(sim)
            .store(store.clone())
            .rng(SmallRng::seed_from_u64(2))
            .build()
            .unwrap();

        for _ in 0..200 {
            first.step().await.unwrap();
            second.step().await.unwrap();
            for tuning in [first.tuning(), second.tuning()] {
                let TuningState::Weighted(weights) = tuning else {
                    panic!("expected weighted tuning");
                };
                assert!(weights.is_valid(), "{weights:?}");
            }
        }
        assert!(first.metrics().persisted_writes + second.metrics().persisted_writes > 0);
        assert!(load_weights(store.as_ref(), "n00dles").await.is_valid());
    }
}
