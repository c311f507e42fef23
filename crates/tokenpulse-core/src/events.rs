//! Change events emitted by the aggregation pipeline
//!
//! Events are transient: they are produced by diffing successive snapshots
//! and fanned out to subscribers, never persisted.

use crate::types::{Snapshot, Token};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A change event with one typed payload per kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Full current snapshot, emitted on every successful tick
    BatchUpdate(BatchUpdatePayload),
    /// Price moved more than the alert threshold
    PriceAlert(PriceAlertPayload),
    /// 24h volume more than doubled
    VolumeAlert(VolumeAlertPayload),
    /// Market cap moved more than the alert threshold
    MarketCapAlert(MarketCapAlertPayload),
    /// Liquidity moved more than the alert threshold
    LiquidityAlert(LiquidityAlertPayload),
}

impl MarketEvent {
    /// Event kind as its wire tag
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::BatchUpdate(_) => "batch_update",
            MarketEvent::PriceAlert(_) => "price_alert",
            MarketEvent::VolumeAlert(_) => "volume_alert",
            MarketEvent::MarketCapAlert(_) => "market_cap_alert",
            MarketEvent::LiquidityAlert(_) => "liquidity_alert",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::BatchUpdate(e) => e.timestamp,
            MarketEvent::PriceAlert(e) => e.timestamp,
            MarketEvent::VolumeAlert(e) => e.timestamp,
            MarketEvent::MarketCapAlert(e) => e.timestamp,
            MarketEvent::LiquidityAlert(e) => e.timestamp,
        }
    }

    /// Token address for per-token routing; batch updates have none
    pub fn address(&self) -> Option<&str> {
        match self {
            MarketEvent::BatchUpdate(_) => None,
            MarketEvent::PriceAlert(e) => Some(&e.address),
            MarketEvent::VolumeAlert(e) => Some(&e.address),
            MarketEvent::MarketCapAlert(e) => Some(&e.address),
            MarketEvent::LiquidityAlert(e) => Some(&e.address),
        }
    }

    /// Build a batch update carrying the full current snapshot
    pub fn batch_update(snapshot: &Snapshot) -> Self {
        MarketEvent::BatchUpdate(BatchUpdatePayload {
            count: snapshot.tokens.len(),
            tokens: snapshot.tokens.clone(),
            timestamp: Utc::now(),
        })
    }
}

/// Direction of a price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdatePayload {
    pub count: usize,
    pub tokens: Vec<Token>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlertPayload {
    pub address: String,
    pub ticker: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub change_pct: Decimal,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAlertPayload {
    pub address: String,
    pub ticker: String,
    pub previous_volume_24h: Decimal,
    pub volume_24h: Decimal,
    pub price: Decimal,
    pub market_cap: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCapAlertPayload {
    pub address: String,
    pub ticker: String,
    pub old_market_cap: Decimal,
    pub new_market_cap: Decimal,
    pub change_pct: Decimal,
    pub rank: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAlertPayload {
    pub address: String,
    pub ticker: String,
    pub old_liquidity: Decimal,
    pub new_liquidity: Decimal,
    pub change_pct: Decimal,
    pub dex: String,
    pub timestamp: DateTime<Utc>,
}
