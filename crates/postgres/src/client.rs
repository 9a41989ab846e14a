//! PostgreSQL pool wrapper.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use ingest_core::Result;

use crate::config::PostgresConfig;
use crate::errors::map_sqlx;

/// Shared connection pool.
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
    config: PostgresConfig,
}

impl PgClient {
    /// Opens the pool and verifies one connection.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

        if let Some(idle_timeout) = config.idle_timeout_secs {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        let pool = options.connect(&config.url).await.map_err(map_sqlx)?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Created PostgreSQL pool"
        );

        Ok(Self { pool, config })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool, config: PostgresConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}
