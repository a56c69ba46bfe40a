use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::messaging::PublishError;
use crate::storage::postgres::OutboxRecord;

pub mod publisher;

pub use publisher::{OutboxPublisher, PublisherConfig, PublisherError};

// ============================================================================
// Outbox - Reliable Event Relay Seams
// ============================================================================
//
// The publisher drains pending outbox rows into a message sink. Both sides
// are traits so the relay loop can be exercised without Postgres or Kafka.
//
// ============================================================================

/// Pending-record source for the publisher loop.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest pending records first, at most `limit` of them.
    async fn fetch_pending(&self, limit: i64) -> anyhow::Result<Vec<OutboxRecord>>;

    /// Mark a record as delivered so it is never fetched again.
    async fn mark_processed(&self, id: i64) -> anyhow::Result<()>;
}

/// Destination for outbox events, keyed by event id.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
    ) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
    ) -> Result<(), PublishError> {
        (**self).publish(cancel, key, value).await
    }
}
