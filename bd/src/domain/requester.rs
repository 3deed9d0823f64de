//! Requester - the opaque return address carried by every request

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::id::{RequestId, WorkerId};

/// Notifications delivered to a requester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RequesterEvent {
    /// A create request was larger than a batch may ever be; it was never queued
    SizeExceeded {
        #[serde(rename = "request-id")]
        request_id: RequestId,
        #[serde(rename = "byte-size")]
        byte_size: u64,
        #[serde(rename = "max-batch-bytes")]
        max_batch_bytes: u64,
    },

    /// The remote call for this request succeeded
    Completed {
        #[serde(rename = "request-id")]
        request_id: RequestId,
        #[serde(rename = "worker-id")]
        worker_id: WorkerId,
        result: serde_json::Value,
    },

    /// The remote call for this request failed
    Failed {
        #[serde(rename = "request-id")]
        request_id: RequestId,
        #[serde(rename = "worker-id")]
        worker_id: WorkerId,
        reason: String,
    },
}

impl RequesterEvent {
    /// The request this event refers to
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::SizeExceeded { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Failed { request_id, .. } => request_id,
        }
    }
}

/// Return address for a request
///
/// Holds no reference into the dispatcher's internals, only the right to be
/// notified. Notification never blocks the sender.
#[derive(Debug, Clone)]
pub struct Requester {
    name: String,
    tx: Option<mpsc::UnboundedSender<RequesterEvent>>,
}

impl Requester {
    /// Create a requester and the receiver its notifications arrive on
    pub fn channel(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RequesterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// Create a requester that does not listen for notifications
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tx: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver an event; a requester that stopped listening is not an error
    pub fn notify(&self, event: RequesterEvent) {
        let Some(tx) = &self.tx else {
            debug!(requester = %self.name, request_id = %event.request_id(), "Requester::notify: detached, dropping");
            return;
        };
        if tx.send(event).is_err() {
            debug!(requester = %self.name, "Requester::notify: receiver dropped");
        }
    }
}
