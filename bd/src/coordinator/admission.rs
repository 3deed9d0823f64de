//! Admission control for submitted requests

use tracing::debug;

use crate::domain::Request;

use super::messages::DispatchError;

/// Decide whether a request may enter the queue
///
/// Only create requests are size-checked; polls are always admitted and only
/// count toward batch accounting once queued. Count limits apply at
/// extraction, never here.
pub fn check(request: &Request, max_batch_bytes: u64) -> Result<(), DispatchError> {
    if request.is_create() && request.byte_size() > max_batch_bytes {
        debug!(
            request_id = %request.id(),
            byte_size = request.byte_size(),
            max_batch_bytes,
            "admission::check: create over batch limit"
        );
        return Err(DispatchError::SizeExceeded {
            request_id: request.id().clone(),
            byte_size: request.byte_size(),
            max_batch_bytes,
        });
    }
    Ok(())
}
