//! Main Coordinator task implementation

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{Batch, OwnerId, Request, RequesterEvent, WorkerId};

use super::admission;
use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CancelScope, CoordinatorMetrics, DispatchError, DispatchRequest, PullReply};
use super::pool::{WorkerFactory, WorkerPool};
use super::queue::WorkQueue;

/// State owned by the running Coordinator task
///
/// Nothing outside the task can reach it, so each signal is applied to
/// completion with no locking.
struct DispatchState {
    max_batch_bytes: u64,
    queue: WorkQueue,
    pool: WorkerPool,
    metrics: CoordinatorMetrics,
}

impl DispatchState {
    fn submit(&mut self, request: Request) {
        match admission::check(&request, self.max_batch_bytes) {
            Ok(()) => {}
            Err(DispatchError::SizeExceeded {
                request_id,
                byte_size,
                max_batch_bytes,
            }) => {
                warn!(
                    %request_id,
                    owner_id = %request.owner_id(),
                    byte_size,
                    max_batch_bytes,
                    "Rejected oversized create"
                );
                self.metrics.rejected_oversized += 1;
                request.requester().notify(RequesterEvent::SizeExceeded {
                    request_id,
                    byte_size,
                    max_batch_bytes,
                });
                return;
            }
            Err(e) => {
                warn!(request_id = %request.id(), error = %e, "Admission failed");
                return;
            }
        }

        if request.is_create() {
            self.metrics.submitted_creates += 1;
        } else {
            self.metrics.submitted_polls += 1;
        }
        debug!(
            request_id = %request.id(),
            owner_id = %request.owner_id(),
            kind = request.kind_name(),
            queue_depth = self.queue.len() + 1,
            "Admitted request"
        );
        self.queue.append(request);
    }

    fn pull_work(&mut self, worker_id: &WorkerId, max_count: usize) -> PullReply {
        let Some(slot) = self.pool.slot_mut(worker_id) else {
            warn!(%worker_id, "Pull from worker not in pool");
            self.metrics.unknown_worker_signals += 1;
            return PullReply::NoWork;
        };

        if let Some(done) = slot.assign(None) {
            debug!(%worker_id, requests = done.len(), "Batch acknowledged");
        }

        if self.queue.is_empty() || max_count == 0 {
            self.metrics.empty_pulls += 1;
            return PullReply::NoWork;
        }

        let mut requests = self.queue.extract_capped_prefix(max_count, self.max_batch_bytes);
        if requests.is_empty() {
            // Head alone is over the cap (only polls get this far); send it
            // by itself rather than starve everything behind it
            if let Some(lone) = self.queue.pop_front() {
                warn!(
                    %worker_id,
                    request_id = %lone.id(),
                    byte_size = lone.byte_size(),
                    max_batch_bytes = self.max_batch_bytes,
                    "Dispatching oversized request alone"
                );
                self.metrics.oversized_dispatches += 1;
                requests.push(lone);
            }
        }

        let batch = Batch::new(requests);
        let oldest_wait_ms = batch
            .requests()
            .first()
            .map(|r| (Utc::now() - r.submitted_at()).num_milliseconds())
            .unwrap_or(0);
        debug!(
            %worker_id,
            requests = batch.len(),
            total_bytes = batch.total_bytes(),
            oldest_wait_ms,
            queue_depth = self.queue.len(),
            "Dispatching batch"
        );
        self.metrics.batches_dispatched += 1;
        self.metrics.requests_dispatched += batch.len() as u64;
        slot.assign(Some(batch.clone()));
        PullReply::Batch(batch)
    }

    /// Put back a batch whose reply never reached the worker
    fn undeliverable(&mut self, worker_id: &WorkerId, batch: Batch) {
        warn!(%worker_id, requests = batch.len(), "Pull reply dropped, requeueing batch");
        if let Some(slot) = self.pool.slot_mut(worker_id) {
            slot.assign(None);
        }
        self.metrics.requeued_requests += batch.len() as u64;
        self.queue.push_front(batch.into_requests());
    }

    fn cancel_owner(&mut self, owner_id: &OwnerId, scope: CancelScope) {
        let removed = self.queue.remove_matching(|request| scope.matches(owner_id, request));
        self.metrics.cancelled_requests += removed as u64;
        info!(%owner_id, ?scope, removed, queue_depth = self.queue.len(), "Cancelled queued requests");
    }

    fn worker_terminated(&mut self, worker_id: &WorkerId) {
        let Some(replacement) = self.pool.replace(worker_id) else {
            debug!(%worker_id, "Termination for worker not in pool, ignoring");
            self.metrics.unknown_worker_signals += 1;
            return;
        };

        self.metrics.worker_restarts += 1;
        if let Some(orphaned) = replacement.orphaned {
            warn!(
                %worker_id,
                new_worker_id = %replacement.new_worker_id,
                requests = orphaned.len(),
                "Requeueing batch from dead worker"
            );
            self.metrics.requeued_requests += orphaned.len() as u64;
            self.queue.push_front(orphaned.into_requests());
        }
    }

    fn snapshot(&mut self) -> CoordinatorMetrics {
        self.metrics.queue_depth = self.queue.len();
        self.metrics.queued_bytes = self.queue.total_bytes();
        self.metrics.live_workers = self.pool.live_workers();
        self.metrics.outstanding_requests = self.pool.outstanding_requests();
        self.metrics.clone()
    }
}

/// The Coordinator owns the work queue and the worker pool
pub struct Coordinator {
    config: CoordinatorConfig,
    factory: Arc<dyn WorkerFactory>,
    tx: mpsc::Sender<DispatchRequest>,
    rx: mpsc::Receiver<DispatchRequest>,
}

impl Coordinator {
    /// Create a new Coordinator that launches workers through `factory`
    pub fn new(config: CoordinatorConfig, factory: Arc<dyn WorkerFactory>) -> Result<Self, DispatchError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Ok(Self {
            config,
            factory,
            tx,
            rx,
        })
    }

    /// Get a raw sender to the Coordinator task
    pub fn sender(&self) -> mpsc::Sender<DispatchRequest> {
        self.tx.clone()
    }

    /// Get a handle for requesters and workers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.sender())
    }

    /// Run the Coordinator task
    ///
    /// Starts the worker pool, then handles one signal at a time until
    /// shutdown is requested.
    pub async fn run(mut self) {
        let pool = WorkerPool::start(self.config.worker_count, self.factory.clone(), self.tx.clone());
        let mut state = DispatchState {
            max_batch_bytes: self.config.max_batch_bytes,
            queue: WorkQueue::new(),
            pool,
            metrics: CoordinatorMetrics::default(),
        };

        info!(
            worker_count = self.config.worker_count,
            max_batch_bytes = self.config.max_batch_bytes,
            worker_ids = ?state.pool.worker_ids(),
            "Coordinator started"
        );

        while let Some(req) = self.rx.recv().await {
            state.metrics.messages_received += 1;

            match req {
                DispatchRequest::Submit { request } => state.submit(request),

                DispatchRequest::PullWork {
                    worker_id,
                    max_count,
                    reply_tx,
                } => {
                    let reply = state.pull_work(&worker_id, max_count);
                    if let Err(PullReply::Batch(batch)) = reply_tx.send(reply) {
                        state.undeliverable(&worker_id, batch);
                    }
                }

                DispatchRequest::CancelOwner { owner_id, scope } => state.cancel_owner(&owner_id, scope),

                DispatchRequest::WorkerTerminated { worker_id } => state.worker_terminated(&worker_id),

                DispatchRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(state.snapshot());
                }

                DispatchRequest::GetPoolStatus { reply_tx } => {
                    let _ = reply_tx.send(state.pool.status());
                }

                DispatchRequest::Shutdown => {
                    info!(queue_depth = state.queue.len(), "Coordinator shutting down");
                    state.pool.shutdown();
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::pool::WorkerContext;
    use crate::domain::Requester;
    use eyre::Result;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::{AbortHandle, JoinHandle};

    /// Workers that never pull on their own; the test pulls on their behalf
    /// and kills them through the recorded abort handles
    #[derive(Clone, Default)]
    struct ParkedWorkers {
        aborts: Arc<Mutex<HashMap<WorkerId, AbortHandle>>>,
    }

    impl ParkedWorkers {
        fn factory(&self) -> Arc<dyn WorkerFactory> {
            let aborts = self.aborts.clone();
            Arc::new(move |ctx: WorkerContext| -> JoinHandle<Result<()>> {
                let join = tokio::spawn(async {
                    std::future::pending::<()>().await;
                    Ok(())
                });
                aborts.lock().unwrap().insert(ctx.worker_id, join.abort_handle());
                join
            })
        }

        fn kill(&self, worker_id: &WorkerId) {
            self.aborts.lock().unwrap()[worker_id].abort();
        }
    }

    fn config(worker_count: usize, max_batch_bytes: u64) -> CoordinatorConfig {
        CoordinatorConfig {
            worker_count,
            max_batch_bytes,
            ..Default::default()
        }
    }

    fn start(worker_count: usize, max_batch_bytes: u64) -> (CoordinatorHandle, ParkedWorkers, JoinHandle<()>) {
        let workers = ParkedWorkers::default();
        let coord = Coordinator::new(config(worker_count, max_batch_bytes), workers.factory()).unwrap();
        let handle = coord.handle();
        let task = tokio::spawn(coord.run());
        (handle, workers, task)
    }

    async fn first_worker(handle: &CoordinatorHandle) -> WorkerId {
        handle.pool_status().await.unwrap()[0].worker_id.clone()
    }

    fn job_ids(batch: &Batch) -> Vec<String> {
        batch
            .requests()
            .iter()
            .map(|r| r.job_id().map(|j| j.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let workers = ParkedWorkers::default();
        let result = Coordinator::new(config(0, 14), workers.factory());
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_pull_batches_in_fifo_order() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        for i in 0..10 {
            handle
                .submit(Request::poll("wf", Requester::detached("poller"), format!("job-{}", i), 1))
                .await
                .unwrap();
        }

        let first = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&first), vec!["job-0", "job-1", "job-2", "job-3", "job-4"]);
        let second = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&second), vec!["job-5", "job-6", "job-7", "job-8", "job-9"]);
        assert!(handle.pull_work(&worker, 5).await.unwrap().is_no_work());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_create_is_rejected() {
        let (handle, _workers, task) = start(1, 14);
        let (requester, mut events) = Requester::channel("submitter");

        let request_id = handle
            .submit(Request::create("wf", requester, json!({}), 15))
            .await
            .unwrap();

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 0);
        assert_eq!(metrics.rejected_oversized, 1);

        match events.recv().await.unwrap() {
            RequesterEvent::SizeExceeded {
                request_id: rejected,
                byte_size,
                max_batch_bytes,
            } => {
                assert_eq!(rejected, request_id);
                assert_eq!(byte_size, 15);
                assert_eq!(max_batch_bytes, 14);
            }
            other => panic!("Expected SizeExceeded, got {:?}", other),
        }

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_stops_at_byte_cap() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        for _ in 0..3 {
            handle
                .submit(Request::create("wf", Requester::detached("s"), json!({}), 5))
                .await
                .unwrap();
        }

        let batch = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total_bytes(), 10);
        assert_eq!(handle.metrics().await.unwrap().queue_depth, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_pull_acknowledges_previous_batch() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-1", 1))
            .await
            .unwrap();
        handle.pull_work(&worker, 5).await.unwrap();
        assert_eq!(handle.metrics().await.unwrap().outstanding_requests, 1);

        assert!(handle.pull_work(&worker, 5).await.unwrap().is_no_work());
        assert_eq!(handle.metrics().await.unwrap().outstanding_requests, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_worker_batch_is_requeued() {
        let (handle, workers, task) = start(2, 14);
        let victim = first_worker(&handle).await;

        for i in 0..5 {
            handle
                .submit(Request::poll("wf", Requester::detached("p"), format!("job-{}", i), 1))
                .await
                .unwrap();
        }
        let batch = handle.pull_work(&victim, 10).await.unwrap().into_batch().unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(handle.metrics().await.unwrap().queue_depth, 0);

        workers.kill(&victim);

        let mut metrics = handle.metrics().await.unwrap();
        for _ in 0..100 {
            if metrics.worker_restarts == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            metrics = handle.metrics().await.unwrap();
        }
        assert_eq!(metrics.queue_depth, 5);
        assert_eq!(metrics.live_workers, 2);
        assert_eq!(metrics.requeued_requests, 5);

        let status = handle.pool_status().await.unwrap();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|slot| slot.worker_id != victim));

        // Requeued work keeps its original order at the front
        let survivor = status[0].worker_id.clone();
        let again = handle.pull_work(&survivor, 10).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&again), vec!["job-0", "job-1", "job-2", "job-3", "job-4"]);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_owner_removes_only_its_creates() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::create("A", Requester::detached("s"), json!({}), 1))
            .await
            .unwrap();
        handle
            .submit(Request::poll("A", Requester::detached("p"), "job-a", 1))
            .await
            .unwrap();
        handle
            .submit(Request::create("B", Requester::detached("s"), json!({}), 1))
            .await
            .unwrap();
        handle
            .submit(Request::create("A", Requester::detached("s"), json!({}), 1))
            .await
            .unwrap();

        handle.cancel_owner(&OwnerId::from("A")).await.unwrap();
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 2);
        assert_eq!(metrics.cancelled_requests, 2);

        let rest = handle.pull_work(&worker, 10).await.unwrap().into_batch().unwrap();
        assert!(rest.requests()[0].is_poll());
        assert_eq!(rest.requests()[0].owner_id().as_str(), "A");
        assert_eq!(rest.requests()[1].owner_id().as_str(), "B");

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_scope_all_removes_polls() {
        let (handle, _workers, task) = start(1, 14);

        handle
            .submit(Request::poll("A", Requester::detached("p"), "job-a", 1))
            .await
            .unwrap();
        handle
            .submit(Request::create("A", Requester::detached("s"), json!({}), 1))
            .await
            .unwrap();
        handle
            .cancel_owner_with_scope(&OwnerId::from("A"), CancelScope::All)
            .await
            .unwrap();

        assert_eq!(handle.metrics().await.unwrap().queue_depth, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_does_not_recall_dispatched_work() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::create("A", Requester::detached("s"), json!({}), 1))
            .await
            .unwrap();
        handle.pull_work(&worker, 10).await.unwrap();
        handle.cancel_owner(&OwnerId::from("A")).await.unwrap();

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.cancelled_requests, 0);
        assert_eq!(metrics.outstanding_requests, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_poll_dispatched_alone() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-big", 20))
            .await
            .unwrap();
        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-small", 1))
            .await
            .unwrap();

        let lone = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&lone), vec!["job-big"]);
        let next = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&next), vec!["job-small"]);
        assert_eq!(handle.metrics().await.unwrap().oversized_dispatches, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_worker_signals_are_ignored() {
        let (handle, _workers, task) = start(2, 14);
        let before: Vec<_> = handle.pool_status().await.unwrap().into_iter().map(|s| s.worker_id).collect();

        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-1", 1))
            .await
            .unwrap();
        let ghost = WorkerId::from("worker-ghost");
        assert!(handle.pull_work(&ghost, 5).await.unwrap().is_no_work());

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 1);
        assert_eq!(metrics.unknown_worker_signals, 1);

        let after: Vec<_> = handle.pool_status().await.unwrap().into_iter().map(|s| s.worker_id).collect();
        assert_eq!(after, before);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_max_count_is_no_work() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-1", 1))
            .await
            .unwrap();
        assert!(handle.pull_work(&worker, 0).await.unwrap().is_no_work());
        assert_eq!(handle.metrics().await.unwrap().queue_depth, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_huge_poll_sizes_keep_loop_alive() {
        let (handle, _workers, task) = start(1, 14);
        let worker = first_worker(&handle).await;

        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-big", u64::MAX))
            .await
            .unwrap();
        handle
            .submit(Request::poll("wf", Requester::detached("p"), "job-1", 1))
            .await
            .unwrap();

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 2);
        assert_eq!(metrics.queued_bytes, u64::MAX);

        let lone = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&lone), vec!["job-big"]);
        let rest = handle.pull_work(&worker, 5).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&rest), vec!["job-1"]);
        assert_eq!(handle.metrics().await.unwrap().queued_bytes, 0);

        handle.shutdown().await.unwrap();
        assert!(task.await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_pull_reply_requeues_batch() {
        let workers = ParkedWorkers::default();
        let coord = Coordinator::new(config(1, 14), workers.factory()).unwrap();
        let sender = coord.sender();
        let handle = coord.handle();
        let task = tokio::spawn(coord.run());
        let worker = first_worker(&handle).await;

        for i in 0..4 {
            handle
                .submit(Request::poll("wf", Requester::detached("p"), format!("job-{}", i), 1))
                .await
                .unwrap();
        }

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        drop(reply_rx);
        sender
            .send(DispatchRequest::PullWork {
                worker_id: worker.clone(),
                max_count: 3,
                reply_tx,
            })
            .await
            .unwrap();

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 4);
        assert_eq!(metrics.queued_bytes, 4);
        assert_eq!(metrics.requeued_requests, 3);
        assert_eq!(metrics.outstanding_requests, 0);
        assert_eq!(handle.pool_status().await.unwrap()[0].outstanding, 0);

        let batch = handle.pull_work(&worker, 10).await.unwrap().into_batch().unwrap();
        assert_eq!(job_ids(&batch), vec!["job-0", "job-1", "job-2", "job-3"]);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
