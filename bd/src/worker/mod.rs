//! Worker runtime
//!
//! Workers pull batches from the Coordinator, hand them to a
//! [`BatchExecutor`] (the remote batch-API client) and report each request's
//! outcome to its requester. A worker that hits a fatal executor error exits;
//! the Coordinator requeues its batch and starts a replacement.

mod config;
mod executor;
mod runner;
mod simulated;

pub use config::WorkerConfig;
pub use executor::{BatchExecutor, ExecutorError, RequestOutcome};
pub use runner::{ExecutorWorkerFactory, WorkerLoop};
pub use simulated::{SimulatedExecutor, SimulationConfig};
