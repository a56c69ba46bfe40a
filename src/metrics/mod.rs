// Private module declaration
mod server;

use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for the outbox relay:
// - records published to the broker / failed publishes
// - records marked processed in the store
// - batch drain duration
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    pub outbox_published: IntCounter,
    pub outbox_failed: IntCounter,
    pub outbox_marked: IntCounter,
    pub outbox_batch_duration: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let outbox_published = IntCounter::new(
            "outbox_records_published_total",
            "Total outbox records published to the broker",
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_failed = IntCounter::new(
            "outbox_records_failed_total",
            "Total outbox records that failed to publish",
        )?;
        registry.register(Box::new(outbox_failed.clone()))?;

        let outbox_marked = IntCounter::new(
            "outbox_records_marked_total",
            "Total outbox records marked as processed",
        )?;
        registry.register(Box::new(outbox_marked.clone()))?;

        let outbox_batch_duration = Histogram::with_opts(
            HistogramOpts::new("outbox_batch_duration_seconds", "Outbox batch drain duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(outbox_batch_duration.clone()))?;

        Ok(Self {
            registry,
            outbox_published,
            outbox_failed,
            outbox_marked,
            outbox_batch_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record one batch drain
    pub fn record_batch(&self, duration: Duration) {
        self.outbox_batch_duration.observe(duration.as_secs_f64());
    }
}
