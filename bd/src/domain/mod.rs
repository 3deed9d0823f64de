//! Domain types for batchdispatch
//!
//! Requests are value objects: a poll or a create, tagged with the owner used
//! for cancellation and the byte size used for batch admission. Requesters are
//! the return addresses notified on rejection, completion or failure.

mod id;
mod request;
mod requester;

pub use id::{JobId, OwnerId, RequestId, WorkerId, generate_id};
pub use request::{Batch, Request, RequestKind};
pub use requester::{Requester, RequesterEvent};
