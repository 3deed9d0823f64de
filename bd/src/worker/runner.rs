//! Worker pull loop and the factory that launches it

use std::collections::HashMap;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::coordinator::{PullReply, WorkerContext, WorkerFactory};
use crate::domain::{Batch, Request, RequestId, RequesterEvent, WorkerId};

use super::config::WorkerConfig;
use super::executor::{BatchExecutor, ExecutorError, RequestOutcome};

/// One worker: pull, execute, report, repeat
pub struct WorkerLoop {
    ctx: WorkerContext,
    executor: Arc<dyn BatchExecutor>,
    config: WorkerConfig,
}

impl WorkerLoop {
    pub fn new(ctx: WorkerContext, executor: Arc<dyn BatchExecutor>, config: WorkerConfig) -> Self {
        Self { ctx, executor, config }
    }

    /// Run until the coordinator goes away or the executor reports a fatal
    /// error
    pub async fn run(self) -> Result<()> {
        let worker_id = self.ctx.worker_id.clone();
        info!(%worker_id, "Worker started");

        loop {
            let reply = self
                .ctx
                .handle
                .pull_work(&worker_id, self.config.max_batch_count)
                .await
                .wrap_err_with(|| format!("Worker {} failed to pull work", worker_id))?;

            let batch = match reply {
                PullReply::NoWork => {
                    sleep(self.config.idle_backoff()).await;
                    continue;
                }
                PullReply::Batch(batch) => batch,
            };

            let started = Instant::now();
            debug!(%worker_id, requests = batch.len(), total_bytes = batch.total_bytes(), "Executing batch");

            match self.executor.execute(&worker_id, &batch).await {
                Ok(outcomes) => report(&worker_id, &batch, outcomes),
                Err(ExecutorError::Batch(reason)) => {
                    warn!(%worker_id, %reason, requests = batch.len(), "Batch call failed");
                    fail_all(&worker_id, &batch, &reason);
                }
                Err(e @ ExecutorError::Fatal(_)) => {
                    // Batch stays unacknowledged and is requeued once this task ends
                    return Err(e).wrap_err_with(|| format!("Worker {} stopping", worker_id));
                }
            }

            let elapsed = started.elapsed();
            let interval = self.config.min_batch_interval();
            if elapsed < interval {
                sleep(interval - elapsed).await;
            }
        }
    }
}

/// Deliver each outcome to its request's requester
///
/// Requests the executor returned nothing for are reported failed so no
/// requester waits forever.
fn report(worker_id: &WorkerId, batch: &Batch, outcomes: Vec<RequestOutcome>) {
    let mut pending: HashMap<&RequestId, &Request> = batch.requests().iter().map(|r| (r.id(), r)).collect();

    for outcome in outcomes {
        let Some(request) = pending.remove(outcome.request_id()) else {
            warn!(%worker_id, request_id = %outcome.request_id(), "Outcome for request not in batch");
            continue;
        };
        let event = match outcome {
            RequestOutcome::Completed { request_id, result } => RequesterEvent::Completed {
                request_id,
                worker_id: worker_id.clone(),
                result,
            },
            RequestOutcome::Failed { request_id, reason } => RequesterEvent::Failed {
                request_id,
                worker_id: worker_id.clone(),
                reason,
            },
        };
        request.requester().notify(event);
    }

    for request in pending.into_values() {
        warn!(%worker_id, request_id = %request.id(), "No outcome returned for request");
        request.requester().notify(RequesterEvent::Failed {
            request_id: request.id().clone(),
            worker_id: worker_id.clone(),
            reason: "No outcome returned".to_string(),
        });
    }
}

fn fail_all(worker_id: &WorkerId, batch: &Batch, reason: &str) {
    for request in batch.requests() {
        request.requester().notify(RequesterEvent::Failed {
            request_id: request.id().clone(),
            worker_id: worker_id.clone(),
            reason: reason.to_string(),
        });
    }
}

/// Production worker factory: each worker runs a [`WorkerLoop`] over a shared
/// executor
pub struct ExecutorWorkerFactory {
    executor: Arc<dyn BatchExecutor>,
    config: WorkerConfig,
}

impl ExecutorWorkerFactory {
    pub fn new(executor: Arc<dyn BatchExecutor>, config: WorkerConfig) -> Self {
        Self { executor, config }
    }
}

impl WorkerFactory for ExecutorWorkerFactory {
    fn spawn(&self, ctx: WorkerContext) -> JoinHandle<Result<()>> {
        let worker = WorkerLoop::new(ctx, self.executor.clone(), self.config.clone());
        tokio::spawn(worker.run())
    }
}
