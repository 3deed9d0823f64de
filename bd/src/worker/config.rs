//! Worker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Most requests a worker asks for in one pull
    #[serde(rename = "max-batch-count")]
    pub max_batch_count: usize,

    /// Sleep after a pull that returned no work
    #[serde(rename = "idle-backoff-ms")]
    pub idle_backoff_ms: u64,

    /// Minimum spacing between consecutive batch calls from one worker
    #[serde(rename = "min-batch-interval-ms")]
    pub min_batch_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_batch_count: 50,
            idle_backoff_ms: 500,
            min_batch_interval_ms: 0,
        }
    }
}

impl WorkerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn min_batch_interval(&self) -> Duration {
        Duration::from_millis(self.min_batch_interval_ms)
    }
}
