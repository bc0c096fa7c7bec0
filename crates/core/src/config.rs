//! Simulation-wide configuration knobs.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Global configuration of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Decimal places kept on second values; one tick is `10^-resolution`
    /// seconds.
    pub resolution: u32,
    /// Verbose logging of per-event activity.
    pub debug: bool,
    /// Seed for the deterministic random source.
    pub seed: u64,
}

impl SimConfig {
    /// Validate the knobs, rejecting resolutions the time base cannot carry.
    pub fn validate(&self) -> CoreResult<()> {
        if self.resolution < 1 {
            return Err(CoreError::configuration(format!(
                "resolution must be at least 1, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            resolution: 4,
            debug: false,
            seed: 42,
        }
    }
}
