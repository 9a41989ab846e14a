//! Long-running tasks for the ingestion service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use clickhouse_client::metrics::insert_metrics;
use clickhouse_client::ClickHouseClient;
use telemetry::metrics;

use crate::dispatcher::Dispatcher;

/// Starts the dispatcher and the periodic metrics flush, and stops both
/// when the shutdown signal fires.
pub struct WorkerScheduler {
    dispatcher: Arc<Dispatcher>,
    clickhouse: Option<Arc<ClickHouseClient>>,
    metrics_flush_interval: Duration,
}

impl WorkerScheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, metrics_flush_interval: Duration) -> Self {
        Self {
            dispatcher,
            clickhouse: None,
            metrics_flush_interval,
        }
    }

    /// Also flushes metric snapshots to ClickHouse.
    pub fn with_clickhouse(mut self, clickhouse: Arc<ClickHouseClient>) -> Self {
        self.clickhouse = Some(clickhouse);
        self
    }

    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let dispatcher = self.dispatcher.clone();
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.run(rx).await;
        }));
        info!("Dispatcher started");

        if self.clickhouse.is_some() {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_metrics_flush(shutdown).await;
            }));
            info!(
                interval_secs = self.metrics_flush_interval.as_secs(),
                "Metrics flush started"
            );
        }

        handles
    }

    async fn run_metrics_flush(&self, mut shutdown: watch::Receiver<bool>) {
        let Some(clickhouse) = &self.clickhouse else {
            return;
        };
        let mut ticker = interval(self.metrics_flush_interval);
        // first tick is immediate
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = insert_metrics(clickhouse, metrics().snapshot()).await {
                error!("Failed to flush metrics: {}", e);
            }
        }

        // final snapshot so the last interval is not lost
        if let Err(e) = insert_metrics(clickhouse, metrics().snapshot()).await {
            error!("Failed to flush metrics: {}", e);
        }
    }
}
