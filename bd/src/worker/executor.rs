//! BatchExecutor - seam to the remote batch API

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Batch, RequestId, WorkerId};

/// Per-request result of a batch call
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed { request_id: RequestId, result: Value },
    Failed { request_id: RequestId, reason: String },
}

impl RequestOutcome {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Completed { request_id, .. } | Self::Failed { request_id, .. } => request_id,
        }
    }
}

/// Errors from executing a whole batch
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The call failed; every request in the batch is reported failed and the
    /// worker keeps pulling
    #[error("Batch call failed: {0}")]
    Batch(String),

    /// The worker cannot continue; it exits and its batch is requeued
    #[error("Worker fatal error: {0}")]
    Fatal(String),
}

/// Client that performs one batched call against the remote API
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, worker_id: &WorkerId, batch: &Batch) -> Result<Vec<RequestOutcome>, ExecutorError>;
}
