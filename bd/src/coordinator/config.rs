//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::messages::DispatchError;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Number of workers kept alive at all times
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Largest total byte size of one batch; larger creates are rejected
    #[serde(rename = "max-batch-bytes", default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_worker_count() -> usize {
    debug!("default_worker_count: called");
    4
}

fn default_max_batch_bytes() -> u64 {
    debug!("default_max_batch_bytes: called");
    10 * 1024 * 1024 // 10MB
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            worker_count: 4,
            max_batch_bytes: 10 * 1024 * 1024,
            channel_buffer: 1000,
        }
    }
}

impl CoordinatorConfig {
    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<(), DispatchError> {
        debug!(?self, "CoordinatorConfig::validate: called");
        if self.worker_count == 0 {
            return Err(DispatchError::InvalidConfig("worker-count must be at least 1".to_string()));
        }
        if self.max_batch_bytes == 0 {
            return Err(DispatchError::InvalidConfig("max-batch-bytes must be at least 1".to_string()));
        }
        if self.channel_buffer == 0 {
            return Err(DispatchError::InvalidConfig("channel-buffer must be at least 1".to_string()));
        }
        Ok(())
    }
}
