//! Request and Batch value types

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::id::{JobId, OwnerId, RequestId};
use super::requester::Requester;

/// What a request asks the remote API to do
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// Check the status of an existing remote job
    Poll { job_id: JobId },

    /// Submit a new remote job
    Create { payload: Value },
}

/// One unit of work
///
/// Immutable once built; the dispatcher only moves it between the queue and
/// worker assignments.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    owner_id: OwnerId,
    requester: Requester,
    byte_size: u64,
    submitted_at: DateTime<Utc>,
    kind: RequestKind,
}

impl Request {
    /// Build a poll request for a remote job
    pub fn poll(owner_id: impl Into<OwnerId>, requester: Requester, job_id: impl Into<JobId>, byte_size: u64) -> Self {
        Self::build(
            owner_id.into(),
            requester,
            byte_size,
            RequestKind::Poll { job_id: job_id.into() },
        )
    }

    /// Build a create request with an explicitly declared size
    pub fn create(owner_id: impl Into<OwnerId>, requester: Requester, payload: Value, byte_size: u64) -> Self {
        Self::build(owner_id.into(), requester, byte_size, RequestKind::Create { payload })
    }

    /// Build a create request sized by its serialized payload
    pub fn create_from_payload(owner_id: impl Into<OwnerId>, requester: Requester, payload: Value) -> Self {
        let byte_size = payload.to_string().len() as u64;
        Self::create(owner_id, requester, payload, byte_size)
    }

    fn build(owner_id: OwnerId, requester: Requester, byte_size: u64, kind: RequestKind) -> Self {
        Self {
            id: RequestId::generate(),
            owner_id,
            requester,
            byte_size,
            submitted_at: Utc::now(),
            kind,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn is_create(&self) -> bool {
        matches!(self.kind, RequestKind::Create { .. })
    }

    pub fn is_poll(&self) -> bool {
        matches!(self.kind, RequestKind::Poll { .. })
    }

    /// The remote job this request polls, if it is a poll
    pub fn job_id(&self) -> Option<&JobId> {
        match &self.kind {
            RequestKind::Poll { job_id } => Some(job_id),
            RequestKind::Create { .. } => None,
        }
    }

    /// Short label for logs
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RequestKind::Poll { .. } => "poll",
            RequestKind::Create { .. } => "create",
        }
    }
}

/// Requests dispatched together to one worker
#[derive(Debug, Clone, Default)]
pub struct Batch {
    requests: Vec<Request>,
    total_bytes: u64,
}

impl Batch {
    pub fn new(requests: Vec<Request>) -> Self {
        let total_bytes = requests.iter().fold(0u64, |sum, r| sum.saturating_add(r.byte_size()));
        Self { requests, total_bytes }
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<Request> {
        self.requests
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
