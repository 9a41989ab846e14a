//! Entity store reachability.

use std::time::Instant;

use telemetry::health;
use tracing::{debug, error};

use crate::client::PgClient;

/// Runs `SELECT 1` and records the result on the `postgres` component.
pub async fn check_connection(client: &PgClient) -> bool {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1")
        .execute(client.pool())
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    let latency = start.elapsed();

    match &result {
        Ok(()) => debug!(latency_ms = %latency.as_millis(), "PostgreSQL reachable"),
        Err(e) => error!(error = %e, "PostgreSQL health check failed"),
    }

    let healthy = result.is_ok();
    health().postgres.record_check(result, latency);
    healthy
}
