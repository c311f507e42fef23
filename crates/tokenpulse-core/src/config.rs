//! Application configuration
//!
//! Every field has a documented default so the binary runs with no config
//! file at all. Loaded from TOML; the path comes from the
//! `TOKENPULSE_CONFIG` environment variable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub aggregator: AggregatorConfig,
    pub upstreams: UpstreamsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// External key-value cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection URL; "memory://" selects the in-process store
    pub url: String,
    /// TTL applied to every snapshot key
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Aggregation pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Seconds between scheduler ticks
    pub update_interval_secs: u64,
    /// Per-upstream cap on fetched records
    pub batch_size: usize,
    /// Snapshot truncation limit
    pub max_tokens: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 10,
            batch_size: 50,
            max_tokens: 1000,
        }
    }
}

impl AggregatorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// Token-bucket parameters: `points` permits refilled linearly over
/// `duration_secs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub points: u32,
    pub duration_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            points: 300,
            duration_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// One upstream provider's endpoint and admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub rate_limit: RateLimitConfig,
    /// Retry attempts for one fetch, including the first
    pub max_attempts: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            rate_limit: RateLimitConfig::default(),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    pub dexscreener: UpstreamConfig,
    pub coingecko: UpstreamConfig,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            dexscreener: UpstreamConfig {
                base_url: "https://api.dexscreener.com/latest/dex".to_string(),
                rate_limit: RateLimitConfig {
                    points: 300,
                    duration_secs: 60,
                },
                max_attempts: 3,
            },
            coingecko: UpstreamConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                rate_limit: RateLimitConfig {
                    points: 50,
                    duration_secs: 60,
                },
                max_attempts: 3,
            },
        }
    }
}

/// Listen address for the thin HTTP/WebSocket layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "pretty", "json", or "compact"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}
