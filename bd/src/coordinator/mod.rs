//! Coordinator for batched request dispatch
//!
//! A single task owns the work queue and the worker pool and handles one
//! signal at a time:
//! - **Submit:** admit a create (size-checked) or poll request
//! - **PullWork:** hand a worker the next size-capped FIFO batch
//! - **CancelOwner:** drop an owner's queued create requests
//! - **WorkerTerminated:** requeue the dead worker's batch and respawn it

pub mod admission;
mod config;
mod core;
mod handle;
mod messages;
mod pool;
mod queue;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CancelScope, CoordinatorMetrics, DispatchError, DispatchRequest, PullReply, WorkerSlotStatus};
pub use pool::{Replacement, WorkerContext, WorkerFactory, WorkerPool, WorkerSlot};
pub use queue::WorkQueue;
