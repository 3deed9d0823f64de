//! CoordinatorHandle - Client interface for requesters and workers

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::{OwnerId, Request, RequestId, WorkerId};

use super::messages::{CancelScope, CoordinatorMetrics, DispatchError, DispatchRequest, PullReply, WorkerSlotStatus};

/// Handle for talking to the Coordinator
///
/// This handle is cloneable and can be shared by any number of requesters
/// and workers. Sends wait only for channel capacity, never for the
/// Coordinator to finish other work.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<DispatchRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }

    async fn send(&self, req: DispatchRequest) -> Result<()> {
        self.tx.send(req).await.map_err(|_| DispatchError::ChannelClosed)?;
        Ok(())
    }

    /// Submit a create or poll request
    ///
    /// Returns once the request is handed to the Coordinator. A create over
    /// the batch limit is rejected through the request's requester, not here.
    pub async fn submit(&self, request: Request) -> Result<RequestId> {
        debug!(
            request_id = %request.id(),
            owner_id = %request.owner_id(),
            kind = request.kind_name(),
            byte_size = request.byte_size(),
            "CoordinatorHandle::submit: called"
        );
        let request_id = request.id().clone();
        self.send(DispatchRequest::Submit { request }).await?;
        Ok(request_id)
    }

    /// Ask for the next batch on behalf of `worker_id`
    ///
    /// Pulling acknowledges the batch this worker received last.
    pub async fn pull_work(&self, worker_id: &WorkerId, max_count: usize) -> Result<PullReply> {
        debug!(%worker_id, max_count, "CoordinatorHandle::pull_work: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(DispatchRequest::PullWork {
            worker_id: worker_id.clone(),
            max_count,
            reply_tx,
        })
        .await?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Drop every queued create request for an owner
    pub async fn cancel_owner(&self, owner_id: &OwnerId) -> Result<()> {
        self.cancel_owner_with_scope(owner_id, CancelScope::CreatesOnly).await
    }

    /// Drop queued requests for an owner within the given scope
    pub async fn cancel_owner_with_scope(&self, owner_id: &OwnerId, scope: CancelScope) -> Result<()> {
        debug!(%owner_id, ?scope, "CoordinatorHandle::cancel_owner_with_scope: called");
        self.send(DispatchRequest::CancelOwner {
            owner_id: owner_id.clone(),
            scope,
        })
        .await
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!("CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(DispatchRequest::GetMetrics { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Get the occupant of every pool slot
    pub async fn pool_status(&self) -> Result<Vec<WorkerSlotStatus>> {
        debug!("CoordinatorHandle::pool_status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(DispatchRequest::GetPoolStatus { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Request shutdown of the Coordinator
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.send(DispatchRequest::Shutdown).await
    }
}
