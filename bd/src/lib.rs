//! batchdispatch - size-capped batch dispatcher for rate-limited APIs
//!
//! Many requesters (job submitters, status pollers) produce small requests
//! against a remote API that only accepts bounded batches. A single
//! coordinator task owns a FIFO work queue and a fixed pool of workers;
//! workers pull batches capped by count and total bytes, and a crashed
//! worker's outstanding batch goes back to the front of the queue.
//!
//! # Core Concepts
//!
//! - **Pull-based dispatch**: Workers ask for work; the coordinator never pushes
//! - **FIFO fairness**: Batches are always the oldest requests, in order
//! - **Admission control**: A create larger than one batch is rejected up front
//! - **Crash recovery**: Unacknowledged batches are requeued, the slot respawned
//!
//! # Modules
//!
//! - [`domain`] - Requests, batches, requesters and identifiers
//! - [`coordinator`] - Work queue, worker pool and the coordinator task
//! - [`worker`] - Worker pull loop and the batch executor seam
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{
    CancelScope, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, DispatchError, PullReply,
    WorkerContext, WorkerFactory,
};
pub use domain::{Batch, JobId, OwnerId, Request, RequestId, RequestKind, Requester, RequesterEvent, WorkerId};
pub use worker::{BatchExecutor, ExecutorError, ExecutorWorkerFactory, RequestOutcome, WorkerConfig, WorkerLoop};
