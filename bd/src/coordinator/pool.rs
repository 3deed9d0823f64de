//! WorkerPool - fixed set of supervised worker slots
//!
//! Each slot holds exactly one live worker identity. A watch task per worker
//! awaits its `JoinHandle` and reports termination back to the Coordinator,
//! which calls [`WorkerPool::replace`] to refill the slot under a fresh
//! identity. The pool is owned by the Coordinator task, so a replacement is
//! atomic with respect to every other signal.

use std::sync::Arc;

use eyre::Result;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::domain::{Batch, WorkerId};

use super::handle::CoordinatorHandle;
use super::messages::{DispatchRequest, WorkerSlotStatus};

/// Everything a freshly spawned worker needs
#[derive(Clone)]
pub struct WorkerContext {
    /// Identity the worker must pull under
    pub worker_id: WorkerId,

    /// Handle back to the Coordinator
    pub handle: CoordinatorHandle,
}

/// Launches worker tasks
///
/// Injected into the pool so deployments and tests can swap worker
/// implementations without touching supervision. The returned task ending, for
/// any reason, is treated as the worker's death.
pub trait WorkerFactory: Send + Sync + 'static {
    fn spawn(&self, ctx: WorkerContext) -> JoinHandle<Result<()>>;
}

impl<F> WorkerFactory for F
where
    F: Fn(WorkerContext) -> JoinHandle<Result<()>> + Send + Sync + 'static,
{
    fn spawn(&self, ctx: WorkerContext) -> JoinHandle<Result<()>> {
        self(ctx)
    }
}

/// One pool position
#[derive(Debug)]
pub struct WorkerSlot {
    index: usize,
    worker_id: WorkerId,
    abort: AbortHandle,
    /// Last batch handed to this worker and not yet superseded by its next pull
    outstanding: Option<Batch>,
}

impl WorkerSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn outstanding(&self) -> Option<&Batch> {
        self.outstanding.as_ref()
    }

    /// Record a new assignment, returning the one it supersedes
    pub fn assign(&mut self, batch: Option<Batch>) -> Option<Batch> {
        std::mem::replace(&mut self.outstanding, batch)
    }
}

/// Result of refilling a slot after its worker died
#[derive(Debug)]
pub struct Replacement {
    pub slot: usize,
    pub old_worker_id: WorkerId,
    pub new_worker_id: WorkerId,
    /// The dead worker's unacknowledged batch, to be requeued
    pub orphaned: Option<Batch>,
}

/// Fixed-size set of supervised workers
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    factory: Arc<dyn WorkerFactory>,
    coord_tx: mpsc::Sender<DispatchRequest>,
}

impl WorkerPool {
    /// Spawn `count` workers and start watching each
    pub fn start(count: usize, factory: Arc<dyn WorkerFactory>, coord_tx: mpsc::Sender<DispatchRequest>) -> Self {
        debug!(count, "WorkerPool::start: called");
        let mut pool = Self {
            slots: Vec::with_capacity(count),
            factory,
            coord_tx,
        };
        for index in 0..count {
            let slot = pool.launch(index);
            pool.slots.push(slot);
        }
        info!(count, "Worker pool started");
        pool
    }

    fn launch(&self, index: usize) -> WorkerSlot {
        let worker_id = WorkerId::generate();
        debug!(slot = index, %worker_id, "WorkerPool::launch: spawning worker");

        let ctx = WorkerContext {
            worker_id: worker_id.clone(),
            handle: CoordinatorHandle::new(self.coord_tx.clone()),
        };
        let join = self.factory.spawn(ctx);
        let abort = join.abort_handle();
        watch(worker_id.clone(), join, self.coord_tx.clone());

        WorkerSlot {
            index,
            worker_id,
            abort,
            outstanding: None,
        }
    }

    /// Find the slot currently occupied by `worker_id`
    pub fn slot_mut(&mut self, worker_id: &WorkerId) -> Option<&mut WorkerSlot> {
        self.slots.iter_mut().find(|slot| &slot.worker_id == worker_id)
    }

    /// Refill the slot held by a dead worker
    ///
    /// Returns `None` when `worker_id` no longer occupies any slot (a stale or
    /// duplicate termination), leaving the pool untouched.
    pub fn replace(&mut self, worker_id: &WorkerId) -> Option<Replacement> {
        debug!(%worker_id, "WorkerPool::replace: called");
        let position = self.slots.iter().position(|slot| &slot.worker_id == worker_id)?;

        let index = self.slots[position].index;
        let fresh = self.launch(index);
        let new_worker_id = fresh.worker_id.clone();
        let old = std::mem::replace(&mut self.slots[position], fresh);
        old.abort.abort();

        info!(slot = index, old_worker_id = %old.worker_id, %new_worker_id, "Replaced worker");
        Some(Replacement {
            slot: index,
            old_worker_id: old.worker_id,
            new_worker_id,
            orphaned: old.outstanding,
        })
    }

    /// Number of occupied slots; constant after start
    pub fn live_workers(&self) -> usize {
        self.slots.len()
    }

    /// Requests handed out and not yet acknowledged, across all slots
    pub fn outstanding_requests(&self) -> usize {
        self.slots.iter().filter_map(|slot| slot.outstanding.as_ref()).map(Batch::len).sum()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.slots.iter().map(|slot| slot.worker_id.clone()).collect()
    }

    pub fn status(&self) -> Vec<WorkerSlotStatus> {
        self.slots
            .iter()
            .map(|slot| WorkerSlotStatus {
                slot: slot.index,
                worker_id: slot.worker_id.clone(),
                outstanding: slot.outstanding.as_ref().map(Batch::len).unwrap_or(0),
            })
            .collect()
    }

    /// Abort every live worker
    pub fn shutdown(&mut self) {
        debug!(count = self.slots.len(), "WorkerPool::shutdown: called");
        for slot in &self.slots {
            slot.abort.abort();
        }
    }
}

/// Report the worker's termination to the Coordinator once its task ends
fn watch(worker_id: WorkerId, join: JoinHandle<Result<()>>, coord_tx: mpsc::Sender<DispatchRequest>) {
    tokio::spawn(async move {
        match join.await {
            Ok(Ok(())) => info!(%worker_id, "Worker exited"),
            Ok(Err(e)) => warn!(%worker_id, error = %e, "Worker failed"),
            Err(e) if e.is_cancelled() => debug!(%worker_id, "Worker aborted"),
            Err(e) => error!(%worker_id, error = %e, "Worker panicked"),
        }

        if coord_tx
            .send(DispatchRequest::WorkerTerminated {
                worker_id: worker_id.clone(),
            })
            .await
            .is_err()
        {
            debug!(%worker_id, "watch: coordinator gone, termination not delivered");
        }
    });
}
