use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod domain;
mod httpapi;
mod messaging;
mod metrics;
mod outbox;
mod service;
mod storage;

use config::AppConfig;
use messaging::{KafkaProducer, ProducerConfig};
use outbox::{OutboxPublisher, PublisherConfig};
use service::MediaService;
use storage::postgres::OutboxRepo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,media_outbox=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("starting media outbox service");

    // === 1. Postgres pool ===
    tracing::info!("connecting to postgres");
    let pool = storage::postgres::connect(&config.database_url).await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 3. Kafka producer ===
    let producer = Arc::new(KafkaProducer::new(ProducerConfig {
        brokers: config.kafka_brokers.clone(),
        topic: config.kafka_topic.clone(),
        ..ProducerConfig::default()
    })?);

    // === 4. Metrics HTTP server in a background thread ===
    let metrics_registry = metrics.registry().clone();
    let metrics_producer = producer.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            if let Err(e) =
                metrics::start_metrics_server(metrics_registry, metrics_producer, metrics_port)
                    .await
            {
                tracing::error!("metrics server error: {}", e);
            }
        });
    });

    // === 5. Media API server in a background thread ===
    let service = Arc::new(MediaService::new(pool.clone()));
    let http_addr = config.http_addr.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            if let Err(e) = httpapi::serve(service, &http_addr).await {
                tracing::error!("http server error: {}", e);
            }
        });
    });

    // === 6. Outbox publisher on the main runtime ===
    let publisher = OutboxPublisher::new(
        OutboxRepo::new(pool.clone()),
        producer.clone(),
        PublisherConfig {
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
        },
        metrics.clone(),
    )?;

    let cancel = CancellationToken::new();
    let publisher_cancel = cancel.clone();
    let publisher_handle =
        tokio::spawn(async move { publisher.run(publisher_cancel).await });

    // === 7. Run until interrupted, then drain ===
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    cancel.cancel();
    let cause = publisher_handle.await?;
    tracing::info!(cause = %cause, "outbox publisher stopped");

    if let Err(err) = producer.close() {
        tracing::error!(error = %err, "error closing kafka producer");
    }

    tracing::info!("shutdown complete");
    Ok(())
}
