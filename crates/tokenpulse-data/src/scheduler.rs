//! Periodic aggregation scheduler
//!
//! One tick: fan out to every upstream concurrently with all-settled
//! semantics, merge the survivors, replace the snapshot, diff against the
//! previous one, and hand the event batch to the sink. Per-tick errors
//! are logged and swallowed; the loop only exits on shutdown. Ticks never
//! overlap: a tick that arrives while the previous one is still running
//! is skipped.

use crate::change_detector::ChangeDetector;
use crate::merger;
use crate::retry::{with_retry, RetryPolicy};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokenpulse_core::{
    AggregatorConfig, EventSink, MarketEvent, SnapshotStore, Token, UpstreamSource,
};
use tracing::{error, info, warn};

/// First tick fires shortly after process start
const STARTUP_DELAY: Duration = Duration::from_secs(1);

/// One registered upstream with its retry policy
pub struct ScheduledSource {
    pub source: Arc<dyn UpstreamSource>,
    pub retry: RetryPolicy,
}

/// Drives the aggregation pipeline on a fixed interval
pub struct Scheduler {
    sources: Vec<ScheduledSource>,
    store: Arc<dyn SnapshotStore>,
    detector: ChangeDetector,
    sink: Arc<dyn EventSink>,
    config: AggregatorConfig,
}

impl Scheduler {
    pub fn new(
        sources: Vec<ScheduledSource>,
        store: Arc<dyn SnapshotStore>,
        detector: ChangeDetector,
        sink: Arc<dyn EventSink>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            sources,
            store,
            detector,
            sink,
            config,
        }
    }

    /// Run until the shutdown channel fires
    ///
    /// Shutdown cancels the next tick, never the current one: the select
    /// only races the timer, and an in-flight tick runs to completion
    /// before the loop re-checks the channel.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval_at(
            Instant::now() + STARTUP_DELAY,
            self.config.update_interval(),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.update_interval_secs,
            upstreams = self.sources.len(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.tick().await;
        }
    }

    /// Execute one aggregation tick
    pub async fn tick(&self) {
        let fetches = self.sources.iter().map(|scheduled| {
            let source = scheduled.source.clone();
            let policy = scheduled.retry.clone();
            async move {
                let id = source.id();
                let result = with_retry(&policy, || {
                    let source = source.clone();
                    async move { source.fetch().await }
                })
                .await;
                (id, result)
            }
        });

        // all-settled: every upstream runs to success or exhaustion
        let results = join_all(fetches).await;

        let mut lists: Vec<Vec<Token>> = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(tokens) => {
                    info!(source = %id, count = tokens.len(), "upstream fetch succeeded");
                    lists.push(tokens);
                }
                Err(e) => {
                    warn!(source = %id, error = %e, "upstream failed for this tick");
                }
            }
        }

        if lists.is_empty() {
            error!("all upstreams failed, keeping previous snapshot");
            return;
        }

        let snapshot = merger::merge(lists, self.config.max_tokens);
        let previous = self.store.get().await;

        if let Err(e) = self.store.put(&snapshot).await {
            error!(error = %e, "snapshot write failed, aborting tick");
            return;
        }

        let mut events = vec![MarketEvent::batch_update(&snapshot)];
        events.extend(self.detector.detect(previous.as_ref(), &snapshot));

        info!(
            tokens = snapshot.len(),
            alerts = events.len() - 1,
            "tick complete"
        );
        self.sink.deliver(events).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::MemorySnapshotStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;
    use tokenpulse_core::{AggregatorError, SourceId};

    struct FixedSource {
        id: SourceId,
        tokens: Vec<Token>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl UpstreamSource for FixedSource {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn fetch(&self) -> Result<Vec<Token>, AggregatorError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(AggregatorError::Http("boom".to_string()))
            } else {
                Ok(self.tokens.clone())
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<MarketEvent>>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn deliver(&self, events: Vec<MarketEvent>) {
            self.batches.lock().await.push(events);
        }
    }

    fn token(address: &str, volume: Decimal) -> Token {
        let mut t = Token::from_source(address.to_string(), SourceId::Dexscreener, Utc::now());
        t.price = dec!(1.0);
        t.volume_24h = volume;
        t
    }

    fn scheduler_with(
        sources: Vec<ScheduledSource>,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<CollectingSink>,
    ) -> Scheduler {
        Scheduler::new(
            sources,
            store,
            ChangeDetector::default(),
            sink,
            AggregatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_snapshot_and_batch_update() {
        let store: Arc<dyn SnapshotStore> =
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        let sink = Arc::new(CollectingSink::default());
        let source = ScheduledSource {
            source: Arc::new(FixedSource {
                id: SourceId::Dexscreener,
                tokens: vec![token("0xa", dec!(100)), token("0xb", dec!(200))],
                fail: AtomicBool::new(false),
            }),
            retry: RetryPolicy::default(),
        };

        let scheduler = scheduler_with(vec![source], store.clone(), sink.clone());
        scheduler.tick().await;

        let snapshot = store.get().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.tokens[0].address, "0xb");

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].event_type(), "batch_update");
    }

    #[tokio::test]
    async fn test_all_failed_tick_keeps_previous_snapshot() {
        let store: Arc<dyn SnapshotStore> =
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        let sink = Arc::new(CollectingSink::default());

        let good = FixedSource {
            id: SourceId::Dexscreener,
            tokens: vec![token("0xa", dec!(100))],
            fail: AtomicBool::new(false),
        };
        let good = Arc::new(good);
        let scheduler = scheduler_with(
            vec![ScheduledSource {
                source: good.clone(),
                retry: RetryPolicy::new(1),
            }],
            store.clone(),
            sink.clone(),
        );

        scheduler.tick().await;
        assert!(store.get().await.is_some());

        // now the only upstream fails: tick aborts, snapshot survives
        good.fail.store(true, Ordering::SeqCst);
        scheduler.tick().await;

        assert!(store.get().await.is_some());
        assert_eq!(sink.batches.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_publishes() {
        let store: Arc<dyn SnapshotStore> =
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        let sink = Arc::new(CollectingSink::default());

        let sources = vec![
            ScheduledSource {
                source: Arc::new(FixedSource {
                    id: SourceId::Dexscreener,
                    tokens: vec![token("0xa", dec!(100))],
                    fail: AtomicBool::new(false),
                }),
                retry: RetryPolicy::new(1),
            },
            ScheduledSource {
                source: Arc::new(FixedSource {
                    id: SourceId::Coingecko,
                    tokens: Vec::new(),
                    fail: AtomicBool::new(true),
                }),
                retry: RetryPolicy::new(1),
            },
        ];

        let scheduler = scheduler_with(sources, store.clone(), sink.clone());
        scheduler.tick().await;

        let snapshot = store.get().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.tokens[0]
            .sources
            .contains(&SourceId::Dexscreener));
    }

    #[tokio::test]
    async fn test_alerts_emitted_on_second_tick() {
        let store: Arc<dyn SnapshotStore> =
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        let sink = Arc::new(CollectingSink::default());

        let mut before = token("0xa", dec!(100));
        before.price = dec!(1.00);
        let source = Arc::new(FixedSource {
            id: SourceId::Dexscreener,
            tokens: vec![before],
            fail: AtomicBool::new(false),
        });

        let scheduler = scheduler_with(
            vec![ScheduledSource {
                source: source.clone(),
                retry: RetryPolicy::default(),
            }],
            store.clone(),
            sink.clone(),
        );
        scheduler.tick().await;

        // second tick with an 8% price move
        let mut after = token("0xa", dec!(100));
        after.price = dec!(1.08);
        let moved = Arc::new(FixedSource {
            id: SourceId::Dexscreener,
            tokens: vec![after],
            fail: AtomicBool::new(false),
        });
        let scheduler = scheduler_with(
            vec![ScheduledSource {
                source: moved,
                retry: RetryPolicy::default(),
            }],
            store.clone(),
            sink.clone(),
        );
        scheduler.tick().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
        let kinds: Vec<_> = batches[1].iter().map(|e| e.event_type()).collect();
        assert!(kinds.contains(&"batch_update"));
        assert!(kinds.contains(&"price_alert"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_first_tick_after_startup_delay() {
        let store: Arc<dyn SnapshotStore> =
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        let sink = Arc::new(CollectingSink::default());
        let source = ScheduledSource {
            source: Arc::new(FixedSource {
                id: SourceId::Dexscreener,
                tokens: vec![token("0xa", dec!(100))],
                fail: AtomicBool::new(false),
            }),
            retry: RetryPolicy::default(),
        };

        let scheduler = Arc::new(scheduler_with(vec![source], store.clone(), sink.clone()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(store.get().await.is_some());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
