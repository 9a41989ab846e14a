//! ClickHouse configuration.

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database holding dead letters and pipeline metrics
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Days dead letters are kept before TTL removal
    #[serde(default = "default_dead_letter_ttl_days")]
    pub dead_letter_ttl_days: u32,
}

fn default_database() -> String {
    "hrms".to_string()
}

fn default_dead_letter_ttl_days() -> u32 {
    90
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            dead_letter_ttl_days: default_dead_letter_ttl_days(),
        }
    }
}
