//! TTL-backed snapshot store
//!
//! The single shared mutable datum of the system. The scheduler is the
//! only writer; readers get value-typed snapshots. Backed by Redis in
//! production; an in-memory implementation with the same TTL semantics
//! serves tests and cache-less deployments.
//!
//! Key layout: `tokens:all` holds the full snapshot, `token:<address>`
//! holds single records for the first `PER_TOKEN_KEY_LIMIT` entries.
//! One SETEX per key; there is no cross-key transaction, so readers may
//! observe the old or the new snapshot during a put, never a partial one.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokenpulse_core::{Snapshot, SnapshotStore, StoreError, Token};
use tracing::{debug, info, warn};

const SNAPSHOT_KEY: &str = "tokens:all";
const PER_TOKEN_KEY_LIMIT: usize = 100;

fn token_key(address: &str) -> String {
    format!("token:{address}")
}

/// Redis-backed snapshot store
pub struct RedisSnapshotStore {
    conn: redis::aio::MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisSnapshotStore {
    /// Connect to Redis; fatal at startup when the cache is unreachable
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!(url = %url, ttl_secs = ttl.as_secs(), "connected to snapshot cache");
        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();

        let payload = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.set_ex::<_, _, ()>(SNAPSHOT_KEY, payload, self.ttl_secs)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        for token in snapshot.tokens.iter().take(PER_TOKEN_KEY_LIMIT) {
            let payload = serde_json::to_string(token)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            conn.set_ex::<_, _, ()>(token_key(&token.address), payload, self.ttl_secs)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        debug!(tokens = snapshot.len(), "snapshot written");
        Ok(())
    }

    async fn get(&self) -> Option<Snapshot> {
        let mut conn = self.conn.clone();

        let payload: Option<String> = match conn.get(SNAPSHOT_KEY).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "snapshot read failed, treating as miss");
                return None;
            }
        };

        payload.and_then(|p| match serde_json::from_str(&p) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "snapshot payload corrupt, treating as miss");
                None
            }
        })
    }

    async fn get_token(&self, address: &str) -> Option<Token> {
        let mut conn = self.conn.clone();
        let key = token_key(&address.to_lowercase());

        let payload: Option<String> = match conn.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "token read failed, treating as miss");
                return None;
            }
        };

        payload.and_then(|p| serde_json::from_str(&p).ok())
    }
}

/// In-memory snapshot store with the same TTL semantics
pub struct MemorySnapshotStore {
    ttl: Duration,
    inner: RwLock<Option<MemoryEntry>>,
}

struct MemoryEntry {
    snapshot: Snapshot,
    by_address: HashMap<String, Token>,
    expires_at: Instant,
}

impl MemorySnapshotStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let by_address = snapshot
            .tokens
            .iter()
            .take(PER_TOKEN_KEY_LIMIT)
            .map(|t| (t.address.clone(), t.clone()))
            .collect();

        let mut guard = self.inner.write().await;
        *guard = Some(MemoryEntry {
            snapshot: snapshot.clone(),
            by_address,
            expires_at: Instant::now() + self.ttl,
        });
        Ok(())
    }

    async fn get(&self) -> Option<Snapshot> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.snapshot.clone())
    }

    async fn get_token(&self, address: &str) -> Option<Token> {
        let address = address.to_lowercase();
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .and_then(|entry| entry.by_address.get(&address).cloned())
    }
}
