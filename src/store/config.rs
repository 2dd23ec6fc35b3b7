//! Store configuration

use super::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// When reclamation sweeps run on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Sweep every time the oldest pinned snapshot is released
    #[default]
    Eager,
    /// Sweep after this many releases of the oldest pinned snapshot
    Batched { releases: usize },
    /// Only explicit `reclaim` calls sweep
    Manual,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Sweep trigger
    pub reclaim_policy: ReclaimPolicy,
    /// Evict values without statements after each sweep
    pub compact_values: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reclaim_policy: ReclaimPolicy::Eager,
            compact_values: true,
        }
    }
}

impl StoreConfig {
    /// Configuration that never sweeps on its own
    pub fn manual() -> Self {
        Self {
            reclaim_policy: ReclaimPolicy::Manual,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }
}
