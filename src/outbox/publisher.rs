use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::messaging::PublishError;
use crate::metrics::Metrics;

use super::{EventSink, OutboxStore};

// ============================================================================
// Outbox Publisher - Polling Relay from Postgres to Kafka
// ============================================================================
//
// Every tick fetches a batch of pending records, publishes each one keyed by
// its event id and marks it processed. Delivery is at-least-once: a mark
// failure leaves the record pending and it is republished on a later tick.
// A single publisher instance owns the relay; the fetch query would need
// row locking before a second instance could run against the same table.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), PublisherError> {
        if self.poll_interval.is_zero() {
            return Err(PublisherError::ZeroInterval);
        }
        if self.batch_size <= 0 {
            return Err(PublisherError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("publisher cancelled")]
    Cancelled,

    #[error("poll interval must be positive")]
    ZeroInterval,

    #[error("batch size must be positive, got {0}")]
    InvalidBatchSize(i64),
}

pub struct OutboxPublisher<S, P> {
    store: S,
    sink: P,
    config: PublisherConfig,
    metrics: Arc<Metrics>,
}

impl<S: OutboxStore, P: EventSink> OutboxPublisher<S, P> {
    pub fn new(
        store: S,
        sink: P,
        config: PublisherConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PublisherError> {
        config.validate()?;
        Ok(Self {
            store,
            sink,
            config,
            metrics,
        })
    }

    /// Run the relay loop until cancelled. Tick failures are logged and the
    /// loop keeps going; the returned error is always the stop cause.
    pub async fn run(&self, cancel: CancellationToken) -> PublisherError {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox publisher started"
        );

        // First drain happens one full interval after startup, not
        // immediately.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("outbox publisher stopping");
                    return PublisherError::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.publish_pending(&cancel).await {
                        tracing::error!(error = %err, "outbox tick failed");
                    }
                }
            }
        }
    }

    /// One tick: drain up to a batch of pending records. A record whose
    /// publish fails is skipped and retried next tick; cancellation or a
    /// closed sink ends the tick early.
    async fn publish_pending(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let records = self.store.fetch_pending(self.config.batch_size).await?;
        if records.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        tracing::debug!(count = records.len(), "processing outbox batch");

        for record in records {
            let key = record.event_id.to_string();
            let payload = serde_json::to_vec(&record.payload)?;

            match self.sink.publish(cancel, &key, &payload).await {
                Ok(()) => {
                    self.metrics.outbox_published.inc();
                }
                Err(PublishError::Cancelled) | Err(PublishError::Closed) => {
                    tracing::warn!(
                        record_id = record.id,
                        event_id = %record.event_id,
                        "publish interrupted, stopping batch early"
                    );
                    break;
                }
                Err(err) => {
                    self.metrics.outbox_failed.inc();
                    tracing::error!(
                        error = %err,
                        record_id = record.id,
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        "failed to publish outbox record, skipping"
                    );
                    continue;
                }
            }

            if let Err(err) = self.store.mark_processed(record.id).await {
                // The record stays pending and will be republished; consumers
                // dedupe on the event id.
                tracing::warn!(
                    error = %err,
                    record_id = record.id,
                    event_id = %record.event_id,
                    "failed to mark outbox record processed"
                );
            } else {
                self.metrics.outbox_marked.inc();
            }
        }

        self.metrics.record_batch(start.elapsed());
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::storage::postgres::OutboxRecord;

    use super::*;

    fn record(id: i64) -> OutboxRecord {
        OutboxRecord {
            id,
            event_id: Uuid::new_v4(),
            event_type: "MediaStatusChanged".to_string(),
            aggregate_id: Uuid::new_v4(),
            payload: serde_json::json!({ "n": id }),
            occurred_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct FakeStore {
        pending: Mutex<Vec<OutboxRecord>>,
        fail_fetch_once: AtomicBool,
        fail_marks: AtomicBool,
        marked: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl OutboxStore for &FakeStore {
        async fn fetch_pending(&self, limit: i64) -> anyhow::Result<Vec<OutboxRecord>> {
            if self.fail_fetch_once.swap(false, Ordering::SeqCst) {
                anyhow::bail!("database unavailable");
            }
            let pending = self.pending.lock().unwrap();
            Ok(pending.iter().take(limit as usize).cloned().collect())
        }

        async fn mark_processed(&self, id: i64) -> anyhow::Result<()> {
            if self.fail_marks.load(Ordering::SeqCst) {
                anyhow::bail!("database unavailable");
            }
            self.pending.lock().unwrap().retain(|r| r.id != id);
            self.marked.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        published_keys: Mutex<Vec<String>>,
        fail_keys: Mutex<HashSet<String>>,
        cancel_on_publish: bool,
    }

    #[async_trait]
    impl EventSink for &FakeSink {
        async fn publish(
            &self,
            _cancel: &CancellationToken,
            key: &str,
            _value: &[u8],
        ) -> Result<(), PublishError> {
            if self.cancel_on_publish {
                return Err(PublishError::Cancelled);
            }
            if self.fail_keys.lock().unwrap().contains(key) {
                return Err(PublishError::Exhausted {
                    attempts: 4,
                    source: rdkafka::error::KafkaError::Canceled,
                });
            }
            self.published_keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new().unwrap())
    }

    fn publisher<'a>(
        store: &'a FakeStore,
        sink: &'a FakeSink,
    ) -> OutboxPublisher<&'a FakeStore, &'a FakeSink> {
        OutboxPublisher::new(store, sink, PublisherConfig::default(), metrics()).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PublisherConfig::default().validate().is_ok());

        let zero_interval = PublisherConfig {
            poll_interval: Duration::ZERO,
            ..PublisherConfig::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(PublisherError::ZeroInterval)
        ));

        let bad_batch = PublisherConfig {
            batch_size: 0,
            ..PublisherConfig::default()
        };
        assert!(matches!(
            bad_batch.validate(),
            Err(PublisherError::InvalidBatchSize(0))
        ));
    }

    #[tokio::test]
    async fn test_publishes_and_marks_in_order() {
        let store = FakeStore::default();
        let records = vec![record(1), record(2), record(3)];
        let keys: Vec<String> = records.iter().map(|r| r.event_id.to_string()).collect();
        *store.pending.lock().unwrap() = records;
        let sink = FakeSink::default();

        let publisher = publisher(&store, &sink);
        publisher
            .publish_pending(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*sink.published_keys.lock().unwrap(), keys);
        assert_eq!(*store.marked.lock().unwrap(), vec![1, 2, 3]);
        assert!(store.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_is_skipped_and_stays_pending() {
        let store = FakeStore::default();
        let records = vec![record(1), record(2), record(3)];
        let bad_key = records[1].event_id.to_string();
        *store.pending.lock().unwrap() = records;
        let sink = FakeSink::default();
        sink.fail_keys.lock().unwrap().insert(bad_key);

        let publisher = publisher(&store, &sink);
        publisher
            .publish_pending(&CancellationToken::new())
            .await
            .unwrap();

        // Records 1 and 3 went through, record 2 remains pending.
        assert_eq!(*store.marked.lock().unwrap(), vec![1, 3]);
        let pending = store.pending.lock().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 2);
    }

    #[tokio::test]
    async fn test_mark_failure_leaves_record_for_republish() {
        let store = FakeStore::default();
        *store.pending.lock().unwrap() = vec![record(1)];
        store.fail_marks.store(true, Ordering::SeqCst);
        let sink = FakeSink::default();

        let publisher = publisher(&store, &sink);
        publisher
            .publish_pending(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.published_keys.lock().unwrap().len(), 1);
        assert!(store.marked.lock().unwrap().is_empty());

        // Next tick delivers the same record again.
        store.fail_marks.store(false, Ordering::SeqCst);
        publisher
            .publish_pending(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.published_keys.lock().unwrap().len(), 2);
        assert_eq!(*store.marked.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_sink_ends_tick_early() {
        let store = FakeStore::default();
        *store.pending.lock().unwrap() = vec![record(1), record(2)];
        let sink = FakeSink {
            cancel_on_publish: true,
            ..FakeSink::default()
        };

        let publisher = publisher(&store, &sink);
        publisher
            .publish_pending(&CancellationToken::new())
            .await
            .unwrap();

        assert!(store.marked.lock().unwrap().is_empty());
        assert_eq!(store.pending.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let store = FakeStore::default();
        let sink = FakeSink::default();
        let publisher = publisher(&store, &sink);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let cause = publisher.run(cancel).await;
        assert!(matches!(cause, PublisherError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_drain_waits_for_first_interval() {
        let store = FakeStore::default();
        *store.pending.lock().unwrap() = vec![record(1)];
        let sink = FakeSink::default();

        let config = PublisherConfig {
            poll_interval: Duration::from_millis(200),
            batch_size: 100,
        };
        let publisher = OutboxPublisher::new(&store, &sink, config, metrics()).unwrap();

        let cancel = CancellationToken::new();
        let run = publisher.run(cancel.clone());
        tokio::pin!(run);

        // Half an interval in, nothing has been drained yet.
        tokio::select! {
            _ = &mut run => panic!("publisher stopped on its own"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        assert!(sink.published_keys.lock().unwrap().is_empty());

        // Past the first interval the record goes out.
        tokio::select! {
            _ = &mut run => panic!("publisher stopped on its own"),
            _ = tokio::time::sleep(Duration::from_millis(150)) => {}
        }
        assert_eq!(sink.published_keys.lock().unwrap().len(), 1);

        cancel.cancel();
        let cause = run.await;
        assert!(matches!(cause, PublisherError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_survives_tick_errors() {
        let store = FakeStore::default();
        *store.pending.lock().unwrap() = vec![record(1)];
        store.fail_fetch_once.store(true, Ordering::SeqCst);
        let sink = FakeSink::default();

        let config = PublisherConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 100,
        };
        let publisher = OutboxPublisher::new(&store, &sink, config, metrics()).unwrap();

        let cancel = CancellationToken::new();
        let run = publisher.run(cancel.clone());
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("publisher stopped on its own"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        cancel.cancel();
        let cause = run.await;

        assert!(matches!(cause, PublisherError::Cancelled));
        // The first tick failed to fetch, a later tick delivered the record.
        assert_eq!(*store.marked.lock().unwrap(), vec![1]);
    }
}
