use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    config::ControllerConfig,
    error::ControlError,
    store::{MemoryTuningStore, TuningStore},
    target::{ActionExecutor, TargetStateProvider},
    telemetry::ControlTelemetry,
};

use super::AdaptiveController;

/// Builder used to configure an [`AdaptiveController`].
pub struct AdaptiveControllerBuilder<R = SmallRng> {
    config: ControllerConfig,
    target_state: Option<Arc<dyn TargetStateProvider>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    store: Option<Arc<dyn TuningStore>>,
    telemetry: Option<ControlTelemetry>,
    rng: R,
}

impl AdaptiveControllerBuilder {
    /// Creates a new builder seeded from entropy.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            target_state: None,
            executor: None,
            store: None,
            telemetry: None,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl<R: Rng + Send> AdaptiveControllerBuilder<R> {
    /// Uses one object as both the state provider and the executor.
    #[must_use]
    pub fn target<T>(self, target: Arc<T>) -> Self
    where
        T: TargetStateProvider + ActionExecutor + 'static,
    {
        let state: Arc<dyn TargetStateProvider> = target.clone();
        let executor: Arc<dyn ActionExecutor> = target;
        self.target_state(state).executor(executor)
    }

    /// Sets the provider the loop reads target state from.
    #[must_use]
    pub fn target_state(mut self, provider: Arc<dyn TargetStateProvider>) -> Self {
        self.target_state = Some(provider);
        self
    }

    /// Sets the executor that performs actions.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the tuning store (weighted strategy). Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn TuningStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches telemetry used by the controller.
    #[must_use]
    pub fn telemetry(mut self, telemetry: ControlTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the random source, e.g. with a seeded or scripted one.
    #[must_use]
    pub fn rng<R2: Rng + Send>(self, rng: R2) -> AdaptiveControllerBuilder<R2> {
        AdaptiveControllerBuilder {
            config: self.config,
            target_state: self.target_state,
            executor: self.executor,
            store: self.store,
            telemetry: self.telemetry,
            rng,
        }
    }

    /// Validates the configuration and finalizes the controller.
    pub fn build(self) -> Result<AdaptiveController<R>, ControlError> {
        self.config.validate()?;
        let target_state = self
            .target_state
            .ok_or(ControlError::MissingCollaborator("target state provider"))?;
        let executor = self
            .executor
            .ok_or(ControlError::MissingCollaborator("action executor"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTuningStore::new()));
        Ok(AdaptiveController::new(
            self.config,
            target_state,
            executor,
            store,
            self.telemetry,
            self.rng,
        ))
    }
}
