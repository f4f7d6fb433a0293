//! # Runtime Configuration
//!
//! Loaded once when a runtime is created. Every field has a default, so a
//! configuration file only lists what it changes:
//!
//! ```toml
//! default_lane = "normal"
//! store_retry_budget = 3
//!
//! [scheduler]
//! time_slice_ms = 5
//! max_units_per_slice = 64
//! starvation_limit = 5
//! sync_lanes = ["immediate"]
//! ```

use std::path::Path;
use std::time::Duration;

use canopy_core::{Lane, Lanes};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default time slice before a concurrent pass yields.
pub const DEFAULT_TIME_SLICE: Duration = Duration::from_millis(5);

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Wall time a concurrent pass may run before yielding, in milliseconds.
    pub time_slice_ms: u64,
    /// Optional cap on units of work per slice.
    pub max_units_per_slice: Option<u32>,
    /// Preemptions of a lane before it expires and renders synchronously.
    pub starvation_limit: u32,
    /// Lanes that always render to completion without yielding.
    pub sync_lanes: Vec<Lane>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_slice_ms: 5,
            max_units_per_slice: None,
            starvation_limit: 5,
            sync_lanes: vec![Lane::Immediate],
        }
    }
}

impl SchedulerConfig {
    /// Slice duration.
    #[must_use]
    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }

    /// Sync lanes as a set.
    #[must_use]
    pub fn sync_lane_set(&self) -> Lanes {
        self.sync_lanes
            .iter()
            .fold(Lanes::EMPTY, |lanes, lane| lanes | Lanes::single(*lane))
    }
}

/// Runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Lane of updates posted without an explicit lane outside a batch.
    pub default_lane: Lane,
    /// Consecutive tearing restarts before a pass fails.
    pub store_retry_budget: u32,
    /// Commits allowed in one `flush_sync` / `run_until_idle` call.
    pub nested_update_limit: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            default_lane: Lane::Normal,
            store_retry_budget: 3,
            nested_update_limit: 50,
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Malformed TOML, unknown fields, or out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// I/O failures and everything [`RuntimeConfig::from_toml_str`] rejects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// The first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.time_slice_ms == 0 {
            return Err(ConfigError::Invalid("scheduler.time_slice_ms must be positive".into()));
        }
        if scheduler.max_units_per_slice == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.max_units_per_slice must be positive when set".into(),
            ));
        }
        if scheduler.starvation_limit == 0 {
            return Err(ConfigError::Invalid("scheduler.starvation_limit must be positive".into()));
        }
        if self.store_retry_budget == 0 {
            return Err(ConfigError::Invalid("store_retry_budget must be positive".into()));
        }
        if self.nested_update_limit == 0 {
            return Err(ConfigError::Invalid("nested_update_limit must be positive".into()));
        }
        Ok(())
    }
}
