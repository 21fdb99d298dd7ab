#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Adaptive weaken/grow/extract controller for harvester workers.
//!
//! Each worker runs one [`AdaptiveController`] against one target. The
//! controller repeatedly reads the target state, picks an [`Action`], executes
//! it, adjusts its tuning from the outcome, clamps the tuning into range and
//! (for the weighted strategy) writes the tuning back to a shared
//! [`TuningStore`]. Workers never talk to each other; the only shared state is
//! the target itself and the per-target tuning record.

/// Controller configuration, step parameters, and validation.
pub mod config;
/// Adaptive control loop and its builder.
pub mod controller;
/// Pure action selection.
pub mod decision;
/// Error taxonomy.
pub mod error;
/// In-process target used by demos and tests.
pub mod simulation;
/// Persisted tuning records.
pub mod store;
/// Target collaborator interfaces and snapshots.
pub mod target;
/// Structured logging and events for controllers.
pub mod telemetry;
/// Threshold and weight tuning state.
pub mod tuning;

pub use config::{ControllerConfig, ControllerConfigBuilder, StepParams, StrategyConfig};
pub use controller::{AdaptiveController, AdaptiveControllerBuilder, ControllerMetrics, StepReport};
pub use decision::{decide_by_threshold, decide_by_weight};
pub use error::{ConfigError, ControlError};
pub use simulation::{SimulatedTarget, SimulationProfile};
pub use store::{FileTuningStore, MemoryTuningStore, TuningStore};
pub use target::{Action, ActionExecutor, TargetBounds, TargetSnapshot, TargetStateProvider};
pub use telemetry::{ControlTelemetry, ControlTelemetryBuilder};
pub use tuning::{ThresholdTuning, Transition, TuningState, WeightTuning};
