use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One of the three mutually exclusive actions a worker may take per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Lower the target's defense.
    Weaken,
    /// Raise the target's available yield.
    Grow,
    /// Take yield from the target.
    Extract,
}

impl Action {
    /// Every action, in decision priority order.
    pub const ALL: [Self; 3] = [Self::Weaken, Self::Grow, Self::Extract];

    /// Lowercase action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weaken => "weaken",
            Self::Grow => "grow",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state read from the target at the start of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Current defense level.
    pub defense: f64,
    /// Currently available yield.
    pub current_yield: f64,
}

impl TargetSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub const fn new(defense: f64, current_yield: f64) -> Self {
        Self {
            defense,
            current_yield,
        }
    }
}

/// Capacity bounds supplied by the caller and held constant for a worker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBounds {
    /// Theoretical maximum yield.
    pub max_yield: f64,
    /// Theoretical minimum defense.
    pub min_defense: f64,
}

/// Read-only view of a target. Values may change between any two calls.
#[async_trait]
pub trait TargetStateProvider: Send + Sync {
    /// Current defense level.
    async fn defense_level(&self, target: &str) -> Result<f64>;
    /// Currently available yield.
    async fn current_yield(&self, target: &str) -> Result<f64>;
    /// Maximum yield the target can hold.
    async fn max_yield(&self, target: &str) -> Result<f64>;
    /// Defense floor of the target.
    async fn min_defense(&self, target: &str) -> Result<f64>;
    /// Probability that an extraction attempt succeeds right now.
    async fn extraction_chance(&self, target: &str) -> Result<f64>;
}

/// Performs actions against a target.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Runs `action` to completion and returns its effect magnitude; `0` means
    /// the action had no effect.
    async fn execute(&self, target: &str, action: Action) -> Result<f64>;
}

/// Reads defense and yield for one iteration.
pub async fn read_snapshot(
    provider: &dyn TargetStateProvider,
    target: &str,
) -> Result<TargetSnapshot> {
    let defense = provider.defense_level(target).await?;
    let current_yield = provider.current_yield(target).await?;
    Ok(TargetSnapshot::new(defense, current_yield))
}

/// Reads the live capacity bounds of a target.
pub async fn read_bounds(provider: &dyn TargetStateProvider, target: &str) -> Result<TargetBounds> {
    Ok(TargetBounds {
        max_yield: provider.max_yield(target).await?,
        min_defense: provider.min_defense(target).await?,
    })
}
