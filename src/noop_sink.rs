use crate::error::TransportError;
use crate::record::LogBatch;
use crate::sink::BatchSink;
use async_trait::async_trait;

/// A sink that drops every batch.
///
/// Backs inert bridges and is handy for measuring capture overhead
/// without network I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl BatchSink for NoopSink {
    async fn send(&self, _batch: &LogBatch) -> Result<(), TransportError> {
        Ok(())
    }
}
