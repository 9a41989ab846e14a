//! HR record ingestion service.
//!
//! Consumes HR records from a Redpanda queue, classifies and normalizes
//! them, and upserts them idempotently into PostgreSQL. Records that cannot
//! be ingested are dead-lettered to ClickHouse with their reason and can be
//! replayed onto the queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use clickhouse_client::dead_letter::{count_by_kind, fetch_by_ids, list_recent};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseDeadLetterSink};
use ingest_core::{FailureKind, OffsetStore};
use postgres_store::{PgClient, PgEntityStore, PgOffsetStore, PostgresConfig};
use redpanda::{declare_queue, Consumer, MessageQueue, Producer, RedpandaConfig, TopicConfig};
use telemetry::{health, init_tracing_from_env, metrics};
use worker::{replay, Dispatcher, Persister, Pipeline, PipelineConfig, Recorder, WorkerScheduler};

#[derive(Debug, Parser)]
#[command(name = "hr-ingest", version, about = "HR record ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume the queue until interrupted (default)
    Run,
    /// Show unacknowledged messages without consuming them
    Peek {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List recent dead letters and counts per failure kind
    DeadLetters {
        #[arg(long, value_parser = parse_failure_kind)]
        kind: Option<FailureKind>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Republish dead-lettered messages onto the queue
    Replay {
        #[arg(long, value_parser = parse_failure_kind)]
        kind: Option<FailureKind>,
        /// Dead-letter ids; takes precedence over --kind
        #[arg(long = "id", num_args = 1..)]
        ids: Vec<Uuid>,
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
}

fn parse_failure_kind(s: &str) -> std::result::Result<FailureKind, String> {
    FailureKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = FailureKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown failure kind '{}' (expected one of {})", s, known.join(", "))
    })
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    pipeline: PipelineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 needs an explicit crypto provider before any TLS handshake
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing_from_env();

    let cli = Cli::parse();
    let config = load_config()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Peek { limit } => peek(config, limit).await,
        Command::DeadLetters { kind, limit } => dead_letters(config, kind, limit).await,
        Command::Replay { kind, ids, limit } => replay_dead_letters(config, kind, ids, limit).await,
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting HR ingestion v{}", env!("CARGO_PKG_VERSION"));
    info!(
        brokers = ?config.redpanda.brokers,
        topic = %config.redpanda.consumer.topic(),
        group_id = %config.redpanda.consumer.group_id,
        workers = config.pipeline.workers(),
        "Loaded configuration"
    );

    let pg = PgClient::connect(config.postgres.clone())
        .await
        .context("Failed to connect to PostgreSQL")?;
    let offsets = PgOffsetStore::new(pg.clone());
    offsets
        .ensure_table()
        .await
        .context("Failed to create consumer offsets table")?;

    let clickhouse = Arc::new(ClickHouseClient::new(config.clickhouse.clone()));
    if let Err(e) = clickhouse_client::init_schema(&clickhouse).await {
        // dead letters still reach the error log without the table
        error!("Failed to initialize ClickHouse schema: {}", e);
    }

    let client = redpanda::connection::connect(&config.redpanda)
        .await
        .context("Failed to connect to Redpanda")?;
    declare_queue(&client, &TopicConfig::for_consumer(&config.redpanda.consumer))
        .await
        .context("Failed to declare queue")?;

    check_health(&config, &pg, &clickhouse).await;

    let consumer: Arc<dyn MessageQueue> =
        Arc::new(Consumer::new(config.redpanda.clone(), Arc::new(offsets)));
    let store = Arc::new(PgEntityStore::new(pg));
    let sink = Arc::new(ClickHouseDeadLetterSink::new(clickhouse.as_ref().clone()));

    let pipeline = Arc::new(Pipeline::new(
        Persister::new(store, &config.pipeline),
        Recorder::new(sink, config.pipeline.dead_letter_timeout()),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        consumer,
        pipeline,
        config.pipeline.workers(),
        std::time::Duration::from_millis(config.redpanda.consumer.reconnect_backoff_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(
        WorkerScheduler::new(dispatcher, config.pipeline.metrics_flush_interval())
            .with_clickhouse(clickhouse),
    );
    let handles = scheduler.start(shutdown_rx);

    shutdown_signal().await;
    info!("Shutting down, finishing in-flight batch...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    let snapshot = metrics().snapshot();
    info!(
        received = snapshot.messages_received,
        acknowledged = snapshot.messages_acknowledged,
        created = snapshot.records_created,
        updated = snapshot.records_updated,
        "Shutdown complete"
    );
    Ok(())
}

async fn peek(config: Config, limit: usize) -> Result<()> {
    let pg = PgClient::connect(config.postgres.clone())
        .await
        .context("Failed to connect to PostgreSQL")?;
    let offsets: Arc<dyn OffsetStore> = Arc::new(PgOffsetStore::new(pg));
    let consumer = Consumer::new(config.redpanda.clone(), offsets);

    let messages = consumer
        .peek(limit)
        .await
        .context("Failed to peek queue")?;
    for message in &messages {
        let line = serde_json::json!({
            "partition": message.partition,
            "offset": message.offset,
            "key": message.key,
            "body": message.payload_lossy(),
        });
        println!("{}", line);
    }
    info!(count = messages.len(), topic = consumer.topic(), "Peeked queue");
    Ok(())
}

async fn dead_letters(config: Config, kind: Option<FailureKind>, limit: u64) -> Result<()> {
    let clickhouse = ClickHouseClient::new(config.clickhouse.clone());

    for count in count_by_kind(&clickhouse)
        .await
        .context("Failed to count dead letters")?
    {
        println!("{:<18} {}", count.failure_kind, count.count);
    }

    let letters = list_recent(&clickhouse, kind, limit)
        .await
        .context("Failed to list dead letters")?;
    for letter in &letters {
        println!(
            "{}",
            serde_json::to_string(letter).context("Failed to encode dead letter")?
        );
    }
    Ok(())
}

async fn replay_dead_letters(
    config: Config,
    kind: Option<FailureKind>,
    ids: Vec<Uuid>,
    limit: u64,
) -> Result<()> {
    let clickhouse = ClickHouseClient::new(config.clickhouse.clone());
    let letters = if ids.is_empty() {
        list_recent(&clickhouse, kind, limit).await
    } else {
        fetch_by_ids(&clickhouse, &ids).await
    }
    .context("Failed to load dead letters")?;

    if letters.is_empty() {
        info!("No dead letters to replay");
        return Ok(());
    }

    let producer = Producer::new(config.redpanda.clone());
    let report = replay(&producer, &letters).await;
    info!(
        resubmitted = report.resubmitted.len(),
        failed = report.failed.len(),
        topic = producer.topic(),
        "Replay finished"
    );

    if !report.is_clean() {
        anyhow::bail!("{} dead letters could not be replayed", report.failed.len());
    }
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("HRMS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested fields with underscores do not map reliably through the
    // separator-based source, so connection settings get explicit names.
    if let Ok(brokers) = std::env::var("HRMS_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("HRMS_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("HRMS_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(exchange) = std::env::var("HRMS_REDPANDA_EXCHANGE") {
        config.redpanda.consumer.exchange = exchange;
    }
    if let Ok(queue) = std::env::var("HRMS_REDPANDA_QUEUE") {
        config.redpanda.consumer.queue = queue;
    }
    if let Ok(group_id) = std::env::var("HRMS_REDPANDA_GROUP_ID") {
        config.redpanda.consumer.group_id = group_id;
    }

    if let Ok(url) = std::env::var("HRMS_POSTGRES_URL").or_else(|_| std::env::var("DATABASE_URL"))
    {
        config.postgres.url = url;
    }

    if let Ok(url) = std::env::var("HRMS_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("HRMS_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("HRMS_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("HRMS_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(config: &Config, pg: &PgClient, clickhouse: &ClickHouseClient) {
    redpanda::health::check_connection(&config.redpanda).await;
    postgres_store::health::check_connection(pg).await;
    clickhouse_client::health::check_connection(clickhouse).await;

    let report = health().report();
    for component in &report.components {
        info!(
            component = %component.name,
            healthy = component.healthy,
            latency_ms = ?component.last_check_ms,
            "Connection check"
        );
    }
    info!(status = ?report.status, "Startup health");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
