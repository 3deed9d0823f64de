//! Message types for the Coordinator

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Batch, OwnerId, Request, RequestId, WorkerId};

/// Errors from dispatch operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Request {request_id} is {byte_size} bytes, over the {max_batch_bytes} byte batch limit")]
    SizeExceeded {
        request_id: RequestId,
        byte_size: u64,
        max_batch_bytes: u64,
    },

    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Which queued requests a cancellation removes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelScope {
    /// Only create requests for the owner; polls keep running
    #[default]
    CreatesOnly,

    /// Every request for the owner, polls included
    All,
}

impl CancelScope {
    /// Whether `request` falls inside this scope for `owner_id`
    pub fn matches(&self, owner_id: &OwnerId, request: &Request) -> bool {
        if request.owner_id() != owner_id {
            return false;
        }
        match self {
            Self::CreatesOnly => request.is_create(),
            Self::All => true,
        }
    }
}

/// Reply to a worker's pull
#[derive(Debug, Clone)]
pub enum PullReply {
    /// Nothing queued; pull again later
    NoWork,

    /// Work to execute; the batch stays assigned until the next pull
    Batch(Batch),
}

impl PullReply {
    pub fn is_no_work(&self) -> bool {
        matches!(self, Self::NoWork)
    }

    /// Take the batch, if any
    pub fn into_batch(self) -> Option<Batch> {
        match self {
            Self::NoWork => None,
            Self::Batch(batch) => Some(batch),
        }
    }
}

/// Signals handled by the Coordinator task
#[derive(Debug)]
pub enum DispatchRequest {
    /// Admit a create or poll request
    Submit { request: Request },

    /// A worker asks for its next batch, acknowledging the previous one
    PullWork {
        worker_id: WorkerId,
        max_count: usize,
        reply_tx: oneshot::Sender<PullReply>,
    },

    /// Drop queued work belonging to an owner
    CancelOwner { owner_id: OwnerId, scope: CancelScope },

    /// A worker task ended (internal, sent by the liveness watch)
    WorkerTerminated { worker_id: WorkerId },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Get the current occupant of every pool slot
    GetPoolStatus {
        reply_tx: oneshot::Sender<Vec<WorkerSlotStatus>>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// Snapshot of one pool slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSlotStatus {
    pub slot: usize,
    #[serde(rename = "worker-id")]
    pub worker_id: WorkerId,
    /// Requests handed to this worker and not yet acknowledged
    pub outstanding: usize,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorMetrics {
    pub queue_depth: usize,
    pub queued_bytes: u64,
    pub live_workers: usize,
    pub outstanding_requests: usize,
    pub submitted_creates: u64,
    pub submitted_polls: u64,
    pub rejected_oversized: u64,
    pub batches_dispatched: u64,
    pub requests_dispatched: u64,
    pub oversized_dispatches: u64,
    pub empty_pulls: u64,
    pub cancelled_requests: u64,
    pub requeued_requests: u64,
    pub worker_restarts: u64,
    pub unknown_worker_signals: u64,
    pub messages_received: u64,
}
