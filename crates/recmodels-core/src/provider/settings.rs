//! Pool limits and statistics.

use crate::config::PoolConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `acquire_model` does when every slot for a key is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExhaustedAction {
    /// Give up immediately.
    Fail,
    /// Wait up to the given time for a release.
    Block(Duration),
}

/// Limits for a [`PoolingModelProvider`](super::PoolingModelProvider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Instances across all keys, idle and borrowed.
    pub max_total: usize,
    /// Instances of one key, idle and borrowed.
    pub max_total_per_key: usize,
    /// Idle instances kept per key. Surplus releases are dropped.
    pub max_idle_per_key: usize,
    /// Behaviour once a key has `max_total_per_key` instances out.
    pub when_exhausted: ExhaustedAction,
    /// How often the background evictor runs.
    pub eviction_interval: Duration,
    /// Idle instances older than this are destroyed by the evictor.
    pub min_idle_time: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_total: PoolConfig::MAX_TOTAL,
            max_total_per_key: PoolConfig::MAX_TOTAL_PER_KEY,
            max_idle_per_key: PoolConfig::MAX_IDLE_PER_KEY,
            when_exhausted: ExhaustedAction::Fail,
            eviction_interval: PoolConfig::EVICTION_INTERVAL,
            min_idle_time: PoolConfig::MIN_IDLE_TIME,
        }
    }
}

impl PoolSettings {
    /// Defaults from [`PoolConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// At least one.
    pub fn with_max_total(mut self, max: usize) -> Self {
        self.max_total = max.max(1);
        self
    }

    /// At least one.
    pub fn with_max_total_per_key(mut self, max: usize) -> Self {
        self.max_total_per_key = max.max(1);
        self
    }

    pub fn with_max_idle_per_key(mut self, max: usize) -> Self {
        self.max_idle_per_key = max;
        self
    }

    pub fn with_when_exhausted(mut self, action: ExhaustedAction) -> Self {
        self.when_exhausted = action;
        self
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    pub fn with_min_idle_time(mut self, idle: Duration) -> Self {
        self.min_idle_time = idle;
        self
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Borrowed instances.
    pub active: usize,
    pub idle: usize,
    /// Archive handles currently open, including retired ones still in use.
    pub open_archives: usize,
    /// Archive opens since the pool was created.
    pub archive_opens: u64,
}
