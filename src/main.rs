//! Tokenpulse - Real-Time Token Market Aggregator
//!
//! Pulls listings from a DEX-pair indexer and a market-data provider,
//! merges them into one canonical snapshot, caches it with a short TTL,
//! and serves it over HTTP plus a WebSocket event stream.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokenpulse_api::{ApiServer, Broadcaster, ReadApi};
use tokenpulse_core::{AppConfig, EventSink, SnapshotStore, SourceId, UpstreamSource};
use tokenpulse_data::{
    ChangeDetector, CoingeckoClient, DexscreenerClient, MemorySnapshotStore, RateLimiter,
    RedisSnapshotStore, RetryPolicy, ScheduledSource, Scheduler,
};
use tokenpulse_observability::{init_logging, LogFormat};
use tracing::{error, info, Level};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main application state
struct App {
    config: AppConfig,
    store: Arc<dyn SnapshotStore>,
    broadcaster: Arc<Broadcaster>,
    scheduler: Scheduler,
}

impl App {
    async fn new() -> Result<Self> {
        let config = Self::load_config()?;

        init_logging(LogFormat::from_name(&config.logging.format), Level::INFO);

        let store = Self::connect_store(&config).await?;
        let broadcaster = Arc::new(Broadcaster::new());

        let limiter = Arc::new(RateLimiter::new());
        limiter.register(
            SourceId::Dexscreener,
            &config.upstreams.dexscreener.rate_limit,
        );
        limiter.register(SourceId::Coingecko, &config.upstreams.coingecko.rate_limit);

        let dexscreener = DexscreenerClient::new(
            config.upstreams.dexscreener.base_url.clone(),
            limiter.clone(),
            config.aggregator.batch_size,
        )
        .context("failed to build DEX indexer client")?;
        let coingecko = CoingeckoClient::new(
            config.upstreams.coingecko.base_url.clone(),
            limiter.clone(),
            config.aggregator.batch_size,
        )
        .context("failed to build market-data client")?;

        let sources = vec![
            ScheduledSource {
                source: Arc::new(dexscreener) as Arc<dyn UpstreamSource>,
                retry: RetryPolicy::new(config.upstreams.dexscreener.max_attempts),
            },
            ScheduledSource {
                source: Arc::new(coingecko) as Arc<dyn UpstreamSource>,
                retry: RetryPolicy::new(config.upstreams.coingecko.max_attempts),
            },
        ];

        let scheduler = Scheduler::new(
            sources,
            store.clone(),
            ChangeDetector::default(),
            broadcaster.clone() as Arc<dyn EventSink>,
            config.aggregator.clone(),
        );

        Ok(Self {
            config,
            store,
            broadcaster,
            scheduler,
        })
    }

    fn load_config() -> Result<AppConfig> {
        let config_path =
            std::env::var("TOKENPULSE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path))
        } else {
            Ok(AppConfig::default())
        }
    }

    async fn connect_store(config: &AppConfig) -> Result<Arc<dyn SnapshotStore>> {
        if config.cache.url.starts_with("memory") {
            info!("using in-process snapshot store");
            return Ok(Arc::new(MemorySnapshotStore::new(config.cache.ttl())));
        }

        let store = RedisSnapshotStore::connect(&config.cache.url, config.cache.ttl())
            .await
            .context("failed to connect to snapshot cache")?;
        Ok(Arc::new(store))
    }

    async fn run(self) -> Result<()> {
        info!("starting tokenpulse...");

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        // Handle Ctrl+C for graceful shutdown
        let shutdown_on_signal = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            let _ = shutdown_on_signal.send(());
        });

        let server = ApiServer::new(
            self.config.server.clone(),
            Arc::new(ReadApi::new(self.store.clone())),
            self.broadcaster.clone(),
        );
        let server_shutdown = shutdown_tx.subscribe();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                error!(error = %e, "api server error");
            }
        });

        // Scheduler drives the pipeline until shutdown; the current tick
        // always completes before the loop exits.
        self.scheduler.run(shutdown_tx.subscribe()).await;

        // subscribers close before the cache connection drops
        server_handle.await.ok();
        drop(self.broadcaster);
        drop(self.store);

        info!("tokenpulse stopped");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::new().await?;
    app.run().await
}
