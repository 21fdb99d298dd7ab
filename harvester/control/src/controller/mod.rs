//! Adaptive control loop driving one worker against one target.

/// Builder utilities for the controller.
pub mod builder;

use std::{convert::Infallible, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{rngs::SmallRng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use tracing::{debug, info};

pub use builder::AdaptiveControllerBuilder;

use crate::{
    config::{ControllerConfig, StrategyConfig},
    decision::{decide_by_threshold, decide_by_weight},
    error::ControlError,
    store::{load_weights, save_weights, TuningStore},
    target::{read_snapshot, Action, ActionExecutor, TargetBounds, TargetStateProvider},
    telemetry::ControlTelemetry,
    tuning::{drift_fires, ThresholdTuning, Transition, TuningState, WeightTuning},
};

/// Counters describing the loop so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerMetrics {
    /// Completed iterations.
    pub iterations: u64,
    /// Weaken actions executed.
    pub weaken: u64,
    /// Grow actions executed.
    pub grow: u64,
    /// Extract actions executed.
    pub extract: u64,
    /// Iterations that executed nothing.
    pub idle: u64,
    /// Sum of extraction magnitudes.
    pub extracted_total: f64,
    /// Drift corrections applied.
    pub drift_events: u64,
    /// Tuning records written to the store.
    pub persisted_writes: u64,
    /// Tuning parameter changes observed.
    pub transitions: u64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self {
            iterations: 0,
            weaken: 0,
            grow: 0,
            extract: 0,
            idle: 0,
            extracted_total: 0.0,
            drift_events: 0,
            persisted_writes: 0,
            transitions: 0,
            updated_at: Utc::now(),
        }
    }
}

impl ControllerMetrics {
    fn record(&mut self, report: &StepReport) {
        self.iterations += 1;
        match report.action {
            Some(Action::Weaken) => self.weaken += 1,
            Some(Action::Grow) => self.grow += 1,
            Some(Action::Extract) => {
                self.extract += 1;
                self.extracted_total += report.magnitude;
            }
            None => self.idle += 1,
        }
        self.drift_events += u64::from(report.drifted);
        self.persisted_writes += u64::from(report.persisted);
        self.transitions += report.transitions.len() as u64;
        self.updated_at = Utc::now();
    }
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// One-based iteration number.
    pub iteration: u64,
    /// Executed action; `None` for an idle tick.
    pub action: Option<Action>,
    /// Magnitude returned by the executor, `0` when idle.
    pub magnitude: f64,
    /// Whether a drift correction fired.
    pub drifted: bool,
    /// Tuning parameters that changed this iteration.
    pub transitions: Vec<Transition>,
    /// Whether the tuning was written to the store.
    pub persisted: bool,
}

/// Read, decide, act, adapt loop for one worker.
pub struct AdaptiveController<R = SmallRng> {
    config: ControllerConfig,
    bounds: TargetBounds,
    tuning: TuningState,
    target_state: Arc<dyn TargetStateProvider>,
    executor: Arc<dyn ActionExecutor>,
    store: Arc<dyn TuningStore>,
    telemetry: Option<ControlTelemetry>,
    rng: R,
    metrics: ControllerMetrics,
    initialized: bool,
}

impl<R> std::fmt::Debug for AdaptiveController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("target", &self.config.target)
            .field("strategy", &self.config.strategy.name())
            .field("tuning", &self.tuning)
            .field("iterations", &self.metrics.iterations)
            .finish_non_exhaustive()
    }
}

impl AdaptiveController {
    /// Returns a builder for the controller.
    #[must_use]
    pub fn builder(config: ControllerConfig) -> AdaptiveControllerBuilder {
        AdaptiveControllerBuilder::new(config)
    }
}

impl<R: Rng + Send> AdaptiveController<R> {
    fn new(
        config: ControllerConfig,
        target_state: Arc<dyn TargetStateProvider>,
        executor: Arc<dyn ActionExecutor>,
        store: Arc<dyn TuningStore>,
        telemetry: Option<ControlTelemetry>,
        rng: R,
    ) -> Self {
        let tuning = match config.strategy {
            StrategyConfig::Threshold {
                weaken_threshold,
                grow_threshold,
                hack_threshold,
                ..
            } => TuningState::Threshold(ThresholdTuning::new(
                weaken_threshold,
                grow_threshold,
                hack_threshold,
            )),
            StrategyConfig::Weighted => TuningState::Weighted(WeightTuning::default()),
        };
        Self {
            bounds: config.bounds(),
            config,
            tuning,
            target_state,
            executor,
            store,
            telemetry,
            rng,
            metrics: ControllerMetrics::default(),
            initialized: false,
        }
    }

    /// Configuration the controller was built with.
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current tuning snapshot.
    #[must_use]
    pub const fn tuning(&self) -> TuningState {
        self.tuning
    }

    /// Latest metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> ControllerMetrics {
        self.metrics.clone()
    }

    /// Loads persisted weights (weighted strategy, unless `clean_start`).
    /// Runs at most once; [`Self::step`] calls it on first use.
    pub async fn initialize(&mut self) -> Result<(), ControlError> {
        if self.initialized {
            return Ok(());
        }
        if matches!(self.config.strategy, StrategyConfig::Weighted) && !self.config.clean_start {
            let loaded = load_weights(self.store.as_ref(), &self.config.target).await;
            self.tuning = TuningState::Weighted(loaded);
        }
        self.initialized = true;

        info!(
            host = %self.config.target,
            strategy = self.config.strategy.name(),
            tuning = ?self.tuning,
            "controller initialized"
        );
        if let Some(tel) = &self.telemetry {
            let payload = json!({
                "strategy": self.config.strategy.name(),
                "total_threads": self.config.total_threads,
                "tuning": self.tuning,
            });
            let _ = tel.log(LogLevel::Info, "control.start", payload.clone());
            let _ = tel.event("control.started", payload).await;
        }
        Ok(())
    }

    /// Performs one iteration of the loop.
    pub async fn step(&mut self) -> Result<StepReport, ControlError> {
        self.initialize().await?;
        let previous = self.tuning;
        let iteration = self.metrics.iterations + 1;

        let mut report = match self.tuning {
            TuningState::Threshold(tuning) => self.threshold_step(iteration, tuning).await?,
            TuningState::Weighted(tuning) => self.weighted_step(iteration, tuning).await?,
        };
        report.transitions = self.tuning.transitions_from(&previous);
        self.publish_transitions(&report.transitions);
        self.metrics.record(&report);

        debug!(
            host = %self.config.target,
            iteration,
            action = ?report.action,
            magnitude = report.magnitude,
            drifted = report.drifted,
            "control step"
        );
        Ok(report)
    }

    /// Runs until a collaborator fails. Never returns otherwise.
    pub async fn run(&mut self) -> Result<Infallible, ControlError> {
        loop {
            self.step().await?;
            tokio::task::yield_now().await;
        }
    }

    /// Runs exactly `iterations` iterations and returns the final metrics.
    pub async fn run_for(&mut self, iterations: u64) -> Result<ControllerMetrics, ControlError> {
        for _ in 0..iterations {
            self.step().await?;
            tokio::task::yield_now().await;
        }
        Ok(self.metrics())
    }

    async fn threshold_step(
        &mut self,
        iteration: u64,
        mut tuning: ThresholdTuning,
    ) -> Result<StepReport, ControlError> {
        let host = self.config.target.as_str();
        let snapshot = read_snapshot(self.target_state.as_ref(), host).await?;
        let action = decide_by_threshold(&snapshot, &tuning);
        let magnitude = self.execute(action).await?;

        if let Some(action) = action {
            let chance = if action == Action::Extract && magnitude > 0.0 {
                self.extraction_chance().await?
            } else {
                0.0
            };
            tuning.apply_outcome(action, magnitude, chance, &self.config.steps, &mut self.rng);
        }

        let steps = self.config.steps;
        let drifted = drift_fires(self.config.total_threads, steps.drift_factor, &mut self.rng);
        if drifted {
            tuning.apply_drift(&steps);
        }
        tuning.clamp(&self.bounds);
        self.tuning = TuningState::Threshold(tuning);

        if drifted {
            debug!(host = %host, iteration, "drift roll fired");
            if let Some(tel) = &self.telemetry {
                let _ = tel
                    .event(
                        "control.drift",
                        json!({ "iteration": iteration, "tuning": self.tuning }),
                    )
                    .await;
            }
            tokio::time::sleep(steps.drift_cooldown()).await;
        }

        Ok(StepReport {
            iteration,
            action,
            magnitude,
            drifted,
            transitions: Vec::new(),
            persisted: false,
        })
    }

    async fn weighted_step(
        &mut self,
        iteration: u64,
        mut tuning: WeightTuning,
    ) -> Result<StepReport, ControlError> {
        let host = self.config.target.as_str();
        let snapshot = read_snapshot(self.target_state.as_ref(), host).await?;
        let action = decide_by_weight(&snapshot, &tuning, &self.bounds, &mut self.rng);
        let magnitude = self.execute(action).await?;

        let mut report = StepReport {
            iteration,
            action,
            magnitude,
            drifted: false,
            transitions: Vec::new(),
            persisted: false,
        };
        // Weaken and grow restart the loop without adapting.
        if matches!(action, Some(Action::Weaken | Action::Grow)) {
            return Ok(report);
        }

        let current = if action.is_some() {
            read_snapshot(self.target_state.as_ref(), host).await?
        } else {
            snapshot
        };
        tuning.adjust(&current, &self.bounds, &mut self.rng);
        self.tuning = TuningState::Weighted(tuning);
        save_weights(self.store.as_ref(), host, &tuning).await?;
        report.persisted = true;
        Ok(report)
    }

    async fn execute(&self, action: Option<Action>) -> Result<f64, ControlError> {
        match action {
            Some(action) => Ok(self
                .executor
                .execute(&self.config.target, action)
                .await?),
            None => Ok(0.0),
        }
    }

    async fn extraction_chance(&self) -> Result<f64, ControlError> {
        if let StrategyConfig::Threshold {
            extraction_chance: Some(chance),
            ..
        } = self.config.strategy
        {
            return Ok(chance);
        }
        let live = self
            .target_state
            .extraction_chance(&self.config.target)
            .await?;
        Ok(live.clamp(0.0, 1.0))
    }

    fn publish_transitions(&self, transitions: &[Transition]) {
        for transition in transitions {
            info!(host = %self.config.target, "{transition}");
            if let Some(tel) = &self.telemetry {
                let _ = tel.transition(transition);
            }
        }
    }
}
