use crate::error::TransportError;
use crate::record::LogBatch;
use async_trait::async_trait;

/// Asynchronous destination for [`LogBatch`]es flushed by the transport.
///
/// Implementations are responsible for getting a batch to the ingestion
/// endpoint (HTTP in practice, in-memory in tests). The transport calls
/// `send` from a spawned task and never awaits it on the producer side.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the endpoint accepted the batch.
    /// - `Err(..)` on network failure or a non-success status. The transport
    ///   drops the batch; there is no retry.
    async fn send(&self, batch: &LogBatch) -> Result<(), TransportError>;
}
