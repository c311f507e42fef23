use crate::error::{AggregatorError, StoreError};
use crate::events::MarketEvent;
use crate::types::{Snapshot, SourceId, Token};
use async_trait::async_trait;

/// An external HTTP data provider the pipeline pulls listings from
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Source tag, used for provenance and rate-limiter bucket lookup
    fn id(&self) -> SourceId;

    /// Fetch one batch of canonical tokens
    ///
    /// Implementations acquire a rate-limiter permit before the network
    /// call, drop inadmissible rows silently, and cap the result at the
    /// configured batch size.
    async fn fetch(&self) -> Result<Vec<Token>, AggregatorError>;
}

/// Holder of the current snapshot, backed by a TTL key-value cache
///
/// `put` failures are tick-fatal and propagate; read failures are treated
/// as misses by callers.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Current snapshot if present and not expired
    async fn get(&self) -> Option<Snapshot>;

    /// Single-token lookup by address (lowercased by the implementation)
    async fn get_token(&self, address: &str) -> Option<Token>;
}

/// Consumer of per-tick event batches
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one tick's events; delivery is best-effort and must not fail
    async fn deliver(&self, events: Vec<MarketEvent>);
}
