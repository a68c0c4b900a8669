use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("Outbound channel closed")]
    Closed,
    #[error("Outbound channel full")]
    Full,
}

/// The destination channel. Messages are published under their entity ID so downstream
/// partitioning is preserved.
///
/// Implementations must not block: the delivery driver calls this while draining the queue.
/// Retries and delivery guarantees are the transport's concern.
pub trait Outbound: Send + Sync + 'static {
    fn send(&self, key: &str, payload: Bytes) -> Result<(), OutboundError>;
}

impl<T: Outbound + ?Sized> Outbound for Arc<T> {
    fn send(&self, key: &str, payload: Bytes) -> Result<(), OutboundError> {
        (**self).send(key, payload)
    }
}
