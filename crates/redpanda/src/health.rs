//! Broker reachability.

use std::time::Instant;

use telemetry::health;
use tracing::{debug, error};

use crate::config::RedpandaConfig;
use crate::connection::connect;

/// Lists topics on the cluster and records the result on the `redpanda`
/// component. The consumer's topic must exist.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let start = Instant::now();
    let topic = config.consumer.topic();

    let result = match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) if topics.iter().any(|t| t.name == topic) => {
                debug!(topics = topics.len(), "Redpanda reachable");
                Ok(())
            }
            Ok(_) => Err(format!("topic {} does not exist", topic)),
            Err(e) => Err(format!("failed to list topics: {}", e)),
        },
        Err(e) => Err(e.to_string()),
    };
    let latency = start.elapsed();

    if let Err(e) = &result {
        error!(error = %e, "Redpanda health check failed");
    }

    let healthy = result.is_ok();
    health().queue.record_check(result, latency);
    healthy
}
