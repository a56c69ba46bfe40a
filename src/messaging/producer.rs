use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio_util::sync::CancellationToken;

use crate::outbox::EventSink;

use super::errors::{classify, ConfigError, ErrorClass, PublishError};

// ============================================================================
// Kafka Producer - Reliable Publishing with Retry, Metrics and Health
// ============================================================================
//
// Wraps rdkafka's FutureProducer with:
// - bounded retries and capped exponential backoff, cancellable while waiting
// - structured retriable/non-retriable error classification
// - lock-free metrics counters owned by the producer instance
// - a coarse lifetime write/error ratio health check
// - close-once semantics with a bounded flush
//
// ============================================================================

const BACKOFF_CAP: Duration = Duration::from_secs(5);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay; doubles per attempt, capped at 5s.
    pub retry_backoff: Duration,
    pub write_timeout: Duration,
    pub batch_size: usize,
    /// When true, publish returns once the message is enqueued locally
    /// instead of waiting for broker acknowledgement.
    pub async_send: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: String::new(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            write_timeout: Duration::from_secs(10),
            batch_size: 100,
            async_send: false,
        }
    }
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.is_empty() || self.brokers.iter().all(|b| b.is_empty()) {
            return Err(ConfigError::EmptyBrokers);
        }
        if self.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

/// A key/value pair for batch publishing.
#[derive(Debug, Clone)]
pub struct Message {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Default)]
struct ProducerMetrics {
    messages_published: AtomicI64,
    messages_failed: AtomicI64,
    retries_total: AtomicI64,
    publish_duration_nanos: AtomicI64,
}

/// Point-in-time view of the producer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_published: i64,
    pub messages_failed: i64,
    pub retries_total: i64,
    pub avg_publish_time: Duration,
}

impl ProducerMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        let published = self.messages_published.load(Ordering::Relaxed);
        let total_nanos = self.publish_duration_nanos.load(Ordering::Relaxed);
        let avg_publish_time = if published > 0 {
            Duration::from_nanos((total_nanos / published).max(0) as u64)
        } else {
            Duration::ZERO
        };

        MetricsSnapshot {
            messages_published: published,
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            avg_publish_time,
        }
    }
}

/// Lifetime broker-call counters kept at the client wrapper boundary; the
/// health check ratio runs over these.
#[derive(Default)]
struct WriterStats {
    writes: AtomicU64,
    errors: AtomicU64,
}

pub struct KafkaProducer {
    producer: FutureProducer,
    config: ProducerConfig,
    metrics: ProducerMetrics,
    stats: Arc<WriterStats>,
    closed: AtomicBool,
}

impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KafkaProducer {
    pub fn new(config: ProducerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set(
                "message.timeout.ms",
                config.write_timeout.as_millis().to_string(),
            )
            .set("batch.num.messages", config.batch_size.to_string())
            .set("compression.codec", "snappy")
            .create()?;

        tracing::info!(
            brokers = ?config.brokers,
            topic = %config.topic,
            max_retries = config.max_retries,
            retry_backoff_ms = config.retry_backoff.as_millis() as u64,
            write_timeout_ms = config.write_timeout.as_millis() as u64,
            async_send = config.async_send,
            "kafka producer created"
        );

        Ok(Self {
            producer,
            config,
            metrics: ProducerMetrics::default(),
            stats: Arc::new(WriterStats::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Publish one message with bounded retries.
    ///
    /// Attempt 0 fires immediately; before attempt n the producer waits
    /// `min(backoff * 2^(n-1), 5s)`, racing the wait against `cancel`.
    /// Non-retriable errors abort immediately; exhausting every attempt
    /// returns the last error together with the attempt count.
    pub async fn publish(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
    ) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        let start = Instant::now();
        tracing::debug!(key = %key, value_size = value.len(), "publishing message");

        let mut last_err: Option<KafkaError> = None;
        let mut attempts = 0u32;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                if !self.wait_for_retry(cancel, attempt, last_err.as_ref()).await {
                    self.metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(PublishError::Cancelled);
                }
            }

            attempts = attempt + 1;
            match self.send_one(key, value).await {
                Ok(()) => {
                    let duration = start.elapsed();
                    self.metrics.messages_published.fetch_add(1, Ordering::Relaxed);
                    self.metrics
                        .publish_duration_nanos
                        .fetch_add(duration.as_nanos() as i64, Ordering::Relaxed);
                    tracing::debug!(
                        key = %key,
                        duration_ms = duration.as_millis() as u64,
                        attempts,
                        "message published"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let class = classify(&err);
                    if class == ErrorClass::NonRetriable {
                        tracing::error!(
                            error = %err,
                            key = %key,
                            attempt = attempts,
                            "non-retriable error, giving up"
                        );
                        last_err = Some(err);
                        break;
                    }
                    tracing::warn!(
                        error = %err,
                        key = %key,
                        attempt = attempts,
                        "retriable error occurred"
                    );
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(source) => {
                self.metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %source,
                    key = %key,
                    total_attempts = attempts,
                    total_duration_ms = start.elapsed().as_millis() as u64,
                    "failed to publish message after all retries"
                );
                Err(PublishError::Exhausted { attempts, source })
            }
            // The loop runs at least once and returns on success.
            None => Ok(()),
        }
    }

    /// Publish a batch atomically from the caller's point of view: the whole
    /// batch is retried when any message in it fails.
    pub async fn publish_batch(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }
        if messages.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let count = messages.len() as i64;
        tracing::debug!(batch_size = messages.len(), "publishing batch");

        let mut last_err: Option<KafkaError> = None;
        let mut attempts = 0u32;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                if !self.wait_for_retry(cancel, attempt, last_err.as_ref()).await {
                    self.metrics
                        .messages_failed
                        .fetch_add(count, Ordering::Relaxed);
                    return Err(PublishError::Cancelled);
                }
            }

            attempts = attempt + 1;
            match self.send_batch(messages).await {
                Ok(()) => {
                    let duration = start.elapsed();
                    self.metrics
                        .messages_published
                        .fetch_add(count, Ordering::Relaxed);
                    self.metrics
                        .publish_duration_nanos
                        .fetch_add(duration.as_nanos() as i64, Ordering::Relaxed);
                    tracing::info!(
                        batch_size = messages.len(),
                        duration_ms = duration.as_millis() as u64,
                        attempts,
                        "batch published"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let class = classify(&err);
                    if class == ErrorClass::NonRetriable {
                        tracing::error!(
                            error = %err,
                            attempt = attempts,
                            "non-retriable error in batch, giving up"
                        );
                        last_err = Some(err);
                        break;
                    }
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(source) => {
                self.metrics
                    .messages_failed
                    .fetch_add(count, Ordering::Relaxed);
                tracing::error!(
                    error = %source,
                    total_attempts = attempts,
                    total_duration_ms = start.elapsed().as_millis() as u64,
                    "failed to publish batch after all retries"
                );
                Err(PublishError::Exhausted { attempts, source })
            }
            None => Ok(()),
        }
    }

    /// Returns false when the wait was interrupted by cancellation.
    async fn wait_for_retry(
        &self,
        cancel: &CancellationToken,
        attempt: u32,
        last_err: Option<&KafkaError>,
    ) -> bool {
        let backoff = backoff_for_attempt(self.config.retry_backoff, attempt);
        tracing::warn!(
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = last_err.map(|e| e.to_string()).unwrap_or_default(),
            "retrying publish"
        );
        self.metrics.retries_total.fetch_add(1, Ordering::Relaxed);

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(backoff) => true,
        }
    }

    async fn send_one(&self, key: &str, value: &[u8]) -> Result<(), KafkaError> {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let record = FutureRecord::to(&self.config.topic).key(key).payload(value);

        if self.config.async_send {
            match self.producer.send_result(record) {
                Ok(delivery) => {
                    let stats = Arc::clone(&self.stats);
                    // Fire and forget: only fold the outcome into the stats.
                    tokio::spawn(async move {
                        match delivery.await {
                            Ok(Ok(_)) => {}
                            Ok(Err((err, _msg))) => {
                                stats.errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(error = %err, "async delivery failed");
                            }
                            Err(_) => {
                                stats.errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!("async delivery dropped before completion");
                            }
                        }
                    });
                    Ok(())
                }
                Err((err, _record)) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    Err(err)
                }
            }
        } else {
            match self
                .producer
                .send(record, Timeout::After(self.config.write_timeout))
                .await
            {
                Ok(_) => Ok(()),
                Err((err, _msg)) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    Err(err)
                }
            }
        }
    }

    /// One broker call for the whole batch: enqueue everything, then wait for
    /// every acknowledgement. The first failure fails the batch.
    async fn send_batch(&self, messages: &[Message]) -> Result<(), KafkaError> {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let mut deliveries = Vec::with_capacity(messages.len());
        for message in messages {
            let record = FutureRecord::to(&self.config.topic)
                .key(&message.key)
                .payload(&message.value);
            match self.producer.send_result(record) {
                Ok(delivery) => deliveries.push(delivery),
                Err((err, _record)) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }

        for delivery in deliveries {
            match delivery.await {
                Ok(Ok(_)) => {}
                Ok(Err((err, _msg))) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
                Err(_) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(KafkaError::Canceled);
                }
            }
        }

        Ok(())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Coarse health signal over lifetime broker-call counters: unhealthy
    /// once writes have happened and errors exceed half of them. Known
    /// limitation: this is a lifetime ratio, not a sliding window, so a
    /// long-running producer recovers slowly after an outage.
    pub fn health_check(&self) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        let writes = self.stats.writes.load(Ordering::Relaxed);
        let errors = self.stats.errors.load(Ordering::Relaxed);
        tracing::debug!(writes, errors, "producer health check");

        if writes > 0 && errors > writes / 2 {
            return Err(PublishError::Unhealthy { errors, writes });
        }
        Ok(())
    }

    /// Close exactly once: flush pending messages (bounded to 30s), then log
    /// final metrics. Every publish call afterwards fails with Closed.
    pub fn close(&self) -> Result<(), PublishError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PublishError::AlreadyClosed);
        }

        tracing::info!("closing kafka producer");

        let flush_result = self.producer.flush(Timeout::After(CLOSE_TIMEOUT));

        // Final metrics are reported even when the flush fails.
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            messages_published = snapshot.messages_published,
            messages_failed = snapshot.messages_failed,
            retries_total = snapshot.retries_total,
            avg_publish_time_ms = snapshot.avg_publish_time.as_millis() as u64,
            "kafka producer closed"
        );

        if let Err(err) = flush_result {
            tracing::error!(error = %err, "error flushing kafka producer");
            return Err(PublishError::Flush(err));
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for KafkaProducer {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
    ) -> Result<(), PublishError> {
        KafkaProducer::publish(self, cancel, key, value).await
    }
}

/// Backoff before retry attempt `n` (n >= 1): base * 2^(n-1), capped at 5s.
pub(crate) fn backoff_for_attempt(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << shift).min(BACKOFF_CAP)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProducerConfig {
        ProducerConfig {
            brokers: vec!["localhost:9092".to_string()],
            topic: "test-topic".to_string(),
            ..ProducerConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = ProducerConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(100));
        assert_eq!(cfg.write_timeout, Duration::from_secs(10));
        assert_eq!(cfg.batch_size, 100);
        assert!(!cfg.async_send);
    }

    #[test]
    fn test_config_validation() {
        let empty_brokers = ProducerConfig {
            topic: "t".to_string(),
            ..ProducerConfig::default()
        };
        assert!(matches!(
            empty_brokers.validate(),
            Err(ConfigError::EmptyBrokers)
        ));

        let empty_topic = ProducerConfig {
            brokers: vec!["localhost:9092".to_string()],
            ..ProducerConfig::default()
        };
        assert!(matches!(
            empty_topic.validate(),
            Err(ConfigError::EmptyTopic)
        ));

        let zero_batch = ProducerConfig {
            batch_size: 0,
            ..test_config()
        };
        assert!(matches!(
            zero_batch.validate(),
            Err(ConfigError::ZeroBatchSize)
        ));

        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = ProducerConfig {
            topic: "t".to_string(),
            ..ProducerConfig::default()
        };
        let err = KafkaProducer::new(cfg).unwrap_err();
        assert!(err.to_string().contains("brokers list is empty"));
    }

    #[test]
    fn test_backoff_schedule() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_for_attempt(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_for_attempt(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_for_attempt(base, 3), Duration::from_millis(400));
        assert_eq!(backoff_for_attempt(base, 4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_for_attempt(base, 10), Duration::from_secs(5));
        // Large attempt numbers must not overflow the shift.
        assert_eq!(backoff_for_attempt(base, 200), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_publish_after_close_fails_immediately() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer.close().unwrap();

        let cancel = CancellationToken::new();
        let err = producer
            .publish(&cancel, "key", b"value")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Closed));
        // No broker call was issued.
        assert_eq!(producer.stats.writes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_publish_batch_after_close_fails_immediately() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer.close().unwrap();

        let cancel = CancellationToken::new();
        let messages = vec![Message {
            key: "k".to_string(),
            value: b"v".to_vec(),
        }];
        let err = producer
            .publish_batch(&cancel, &messages)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Closed));
    }

    #[tokio::test]
    async fn test_publish_exhausts_retries_when_broker_unreachable() {
        // Nothing listens on port 1, so every delivery fails locally with a
        // timeout after write_timeout. The whole test needs no broker.
        let producer = KafkaProducer::new(ProducerConfig {
            brokers: vec!["127.0.0.1:1".to_string()],
            topic: "test-topic".to_string(),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            write_timeout: Duration::from_millis(100),
            ..ProducerConfig::default()
        })
        .unwrap();

        let cancel = CancellationToken::new();
        let err = producer
            .publish(&cancel, "key", b"value")
            .await
            .unwrap_err();
        match err {
            PublishError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(classify(&source), ErrorClass::Retriable);
            }
            other => panic!("expected exhausted error, got {other}"),
        }

        let snapshot = producer.metrics();
        assert_eq!(snapshot.retries_total, 2);
        assert_eq!(snapshot.messages_failed, 1);
        assert_eq!(snapshot.messages_published, 0);
    }

    #[tokio::test]
    async fn test_non_retriable_error_aborts_without_retry() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        let cancel = CancellationToken::new();

        // Larger than librdkafka's default message.max.bytes; rejected at
        // enqueue before any broker contact.
        let oversized = vec![0u8; 2 * 1024 * 1024];
        let err = producer
            .publish(&cancel, "key", &oversized)
            .await
            .unwrap_err();
        match err {
            PublishError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert_eq!(classify(&source), ErrorClass::NonRetriable);
            }
            other => panic!("expected exhausted error, got {other}"),
        }

        let snapshot = producer.metrics();
        assert_eq!(snapshot.retries_total, 0);
        assert_eq!(snapshot.messages_failed, 1);
    }

    #[tokio::test]
    async fn test_publish_batch_empty_is_ok() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        let cancel = CancellationToken::new();
        producer.publish_batch(&cancel, &[]).await.unwrap();
        assert_eq!(producer.metrics().messages_published, 0);
    }

    #[test]
    fn test_close_does_not_reset_metrics() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer
            .metrics
            .messages_published
            .store(7, Ordering::Relaxed);
        producer.metrics.retries_total.store(3, Ordering::Relaxed);

        producer.close().unwrap();

        // The snapshot reported on close is the live counters; they survive.
        let snapshot = producer.metrics();
        assert_eq!(snapshot.messages_published, 7);
        assert_eq!(snapshot.retries_total, 3);
    }

    #[test]
    fn test_double_close_fails() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer.close().unwrap();

        let err = producer.close().unwrap_err();
        assert!(matches!(err, PublishError::AlreadyClosed));
    }

    #[test]
    fn test_metrics_snapshot() {
        let producer = KafkaProducer::new(test_config()).unwrap();

        let initial = producer.metrics();
        assert_eq!(initial.messages_published, 0);
        assert_eq!(initial.messages_failed, 0);
        assert_eq!(initial.retries_total, 0);
        assert_eq!(initial.avg_publish_time, Duration::ZERO);

        producer
            .metrics
            .messages_published
            .store(10, Ordering::Relaxed);
        producer.metrics.messages_failed.store(2, Ordering::Relaxed);
        producer.metrics.retries_total.store(5, Ordering::Relaxed);
        producer.metrics.publish_duration_nanos.store(
            Duration::from_millis(100).as_nanos() as i64,
            Ordering::Relaxed,
        );

        let snapshot = producer.metrics();
        assert_eq!(snapshot.messages_published, 10);
        assert_eq!(snapshot.messages_failed, 2);
        assert_eq!(snapshot.retries_total, 5);
        assert_eq!(snapshot.avg_publish_time, Duration::from_millis(10));
    }

    #[test]
    fn test_avg_publish_time_zero_when_nothing_published() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer.metrics.publish_duration_nanos.store(
            Duration::from_millis(100).as_nanos() as i64,
            Ordering::Relaxed,
        );
        assert_eq!(producer.metrics().avg_publish_time, Duration::ZERO);
    }

    #[test]
    fn test_health_check() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        // Fresh producer has no writes and is healthy.
        producer.health_check().unwrap();

        producer.stats.writes.store(10, Ordering::Relaxed);
        producer.stats.errors.store(4, Ordering::Relaxed);
        producer.health_check().unwrap();

        producer.stats.errors.store(6, Ordering::Relaxed);
        let err = producer.health_check().unwrap_err();
        assert!(matches!(
            err,
            PublishError::Unhealthy {
                errors: 6,
                writes: 10
            }
        ));
    }

    #[test]
    fn test_health_check_on_closed_producer() {
        let producer = KafkaProducer::new(test_config()).unwrap();
        producer.close().unwrap();
        let err = producer.health_check().unwrap_err();
        assert!(matches!(err, PublishError::Closed));
    }
}
