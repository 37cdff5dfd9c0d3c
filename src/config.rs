//! Engine configuration. A `ContactConfig` can be built in code with [`ContactConfigBuilder`] or
//! loaded from a JSON document; fields missing from the document take their default values:
//!
//! ```json
//! {
//!     "seed": 42,
//!     "keep_states": 7,
//!     "history_days": 7,
//!     "poisson_base_checkpoint": 8,
//!     "poisson_initial_ceiling": 1024,
//!     "permanent_rate": 1
//! }
//! ```

use std::fs;
use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ContactError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Builder)]
#[builder(default)]
#[serde(default)]
pub struct ContactConfig {
    /// Base seed of the orchestrator's random number generator.
    pub seed: u64,
    /// How many contact-process states are retained behind the newest one.
    pub keep_states: usize,
    /// How many days of sparse, permanent and context channel results are retained.
    pub history_days: usize,
    /// The smallest precomputed Poisson intensity. Smaller intensities use series inversion.
    pub poisson_base_checkpoint: u32,
    /// The largest Poisson intensity precomputed up front. Larger checkpoints are added on demand.
    pub poisson_initial_ceiling: u32,
    /// Edges produced per day by every pair of a permanent channel.
    pub permanent_rate: u32,
}

impl Default for ContactConfig {
    fn default() -> Self {
        ContactConfig {
            seed: 0,
            keep_states: 7,
            history_days: 7,
            poisson_base_checkpoint: 8,
            poisson_initial_ceiling: 1024,
            permanent_rate: 1,
        }
    }
}

impl ContactConfig {
    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ContactError> {
        let config: ContactConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self, ContactError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ContactError> {
        if self.keep_states == 0 {
            return Err(ContactError::InvalidParameter(
                "keep_states must be at least 1".to_string(),
            ));
        }
        if self.history_days == 0 {
            return Err(ContactError::InvalidParameter(
                "history_days must be at least 1".to_string(),
            ));
        }
        if self.poisson_base_checkpoint == 0 {
            return Err(ContactError::InvalidParameter(
                "poisson_base_checkpoint must be positive".to_string(),
            ));
        }
        if self.poisson_initial_ceiling < self.poisson_base_checkpoint {
            return Err(ContactError::InvalidParameter(format!(
                "poisson_initial_ceiling ({}) is below poisson_base_checkpoint ({})",
                self.poisson_initial_ceiling, self.poisson_base_checkpoint
            )));
        }
        Ok(())
    }
}
