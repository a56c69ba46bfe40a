use std::time::Duration;

use anyhow::Context;

// ============================================================================
// Application Configuration - Environment Variables
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub kafka_brokers: Vec<String>,
    pub kafka_topic: String,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub http_addr: String,
    pub metrics_port: u16,
}

impl AppConfig {
    /// Load from the environment, reading a .env file first if present.
    /// Only DATABASE_URL is required; everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let kafka_brokers =
            parse_brokers(&env_or("KAFKA_BROKERS", "localhost:9092"));
        let kafka_topic = env_or("KAFKA_TOPIC", "events.media");

        let poll_interval_secs: u64 = env_or("OUTBOX_POLL_INTERVAL_SECS", "5")
            .parse()
            .context("OUTBOX_POLL_INTERVAL_SECS must be an integer")?;
        let batch_size: i64 = env_or("OUTBOX_BATCH_SIZE", "100")
            .parse()
            .context("OUTBOX_BATCH_SIZE must be an integer")?;

        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8081");
        let metrics_port: u16 = env_or("METRICS_PORT", "9090")
            .parse()
            .context("METRICS_PORT must be a port number")?;

        Ok(Self {
            database_url,
            kafka_brokers,
            kafka_topic,
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
            http_addr,
            metrics_port,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Comma-separated broker list; whitespace and empty entries are dropped.
fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}
