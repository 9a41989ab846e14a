//! Dead-letter store reachability.

use std::time::Instant;

use telemetry::health;
use tracing::{debug, warn};

use crate::client::ClickHouseClient;

/// Pings ClickHouse and records the result on the `clickhouse` component.
///
/// The dead-letter store is optional, so a failure is logged as a warning.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    let start = Instant::now();
    let result = client
        .inner()
        .query("SELECT 1")
        .fetch_one::<u8>()
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    let latency = start.elapsed();

    match &result {
        Ok(()) => debug!(latency_ms = %latency.as_millis(), "ClickHouse reachable"),
        Err(e) => warn!(
            error = %e,
            latency_ms = %latency.as_millis(),
            "ClickHouse unreachable, dead letters fall back to error logs"
        ),
    }

    let healthy = result.is_ok();
    health().clickhouse.record_check(result, latency);
    healthy
}
