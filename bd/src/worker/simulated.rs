//! Simulated batch executor for demos and load testing

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::domain::{Batch, RequestKind, WorkerId};

use super::executor::{BatchExecutor, ExecutorError, RequestOutcome};

/// Simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed latency of one batch call
    #[serde(rename = "latency-ms")]
    pub latency_ms: u64,

    /// Probability that an individual request fails
    #[serde(rename = "failure-rate")]
    pub failure_rate: f64,

    /// Probability that a batch call kills the worker
    #[serde(rename = "crash-rate")]
    pub crash_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            failure_rate: 0.05,
            crash_rate: 0.02,
        }
    }
}

/// Executor that sleeps instead of calling a remote API
pub struct SimulatedExecutor {
    latency: Duration,
    failure_rate: f64,
    crash_rate: f64,
}

impl SimulationConfig {
    /// Reject rates that are not finite numbers
    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [("failure-rate", self.failure_rate), ("crash-rate", self.crash_rate)] {
            if !rate.is_finite() {
                return Err(format!("simulation.{} must be a finite number, got {}", name, rate));
            }
        }
        Ok(())
    }
}

/// Clamp into `[0, 1]`; NaN counts as never
fn probability(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

impl SimulatedExecutor {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            failure_rate: probability(config.failure_rate),
            crash_rate: probability(config.crash_rate),
        }
    }
}

#[async_trait]
impl BatchExecutor for SimulatedExecutor {
    async fn execute(&self, worker_id: &WorkerId, batch: &Batch) -> Result<Vec<RequestOutcome>, ExecutorError> {
        debug!(%worker_id, requests = batch.len(), "SimulatedExecutor::execute: called");
        tokio::time::sleep(self.latency).await;

        let mut rng = rand::rng();
        if rng.random_bool(self.crash_rate) {
            return Err(ExecutorError::Fatal("simulated worker crash".to_string()));
        }

        Ok(batch
            .requests()
            .iter()
            .map(|request| {
                if rng.random_bool(self.failure_rate) {
                    return RequestOutcome::Failed {
                        request_id: request.id().clone(),
                        reason: "simulated remote failure".to_string(),
                    };
                }
                let result = match request.kind() {
                    RequestKind::Poll { job_id } => json!({"job-id": job_id, "state": "running"}),
                    RequestKind::Create { .. } => {
                        json!({"job-id": format!("job-{}", request.id()), "state": "queued"})
                    }
                };
                RequestOutcome::Completed {
                    request_id: request.id().clone(),
                    result,
                }
            })
            .collect())
    }
}
