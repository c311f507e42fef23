//! Snapshot diffing and alert classification
//!
//! Compares successive snapshots token by token and emits a typed event
//! for every material change. Thresholds are relative; every guard
//! requires the previous value to be positive, so newly appearing tokens
//! and zero-baseline records never alert.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokenpulse_core::{
    Direction, LiquidityAlertPayload, MarketCapAlertPayload, MarketEvent, PriceAlertPayload,
    Snapshot, Token, VolumeAlertPayload,
};
use tracing::debug;

/// Minimum relative change per event kind
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// `|Δprice| / prev > price_change` fires a price alert
    pub price_change: Decimal,
    /// `volume > volume_multiplier * prev` fires a volume alert
    pub volume_multiplier: Decimal,
    pub market_cap_change: Decimal,
    pub liquidity_change: Decimal,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            price_change: Decimal::new(5, 2),        // 5%
            volume_multiplier: Decimal::from(2),     // 2x
            market_cap_change: Decimal::new(10, 2),  // 10%
            liquidity_change: Decimal::new(20, 2),   // 20%
        }
    }
}

/// Diffs successive snapshots into typed change events
pub struct ChangeDetector {
    thresholds: AlertThresholds,
}

impl ChangeDetector {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// Alert events for `current` relative to `previous`
    ///
    /// With no previous snapshot there is nothing to diff; the scheduler
    /// emits the batch update for the first tick itself.
    pub fn detect(&self, previous: Option<&Snapshot>, current: &Snapshot) -> Vec<MarketEvent> {
        let Some(previous) = previous else {
            return Vec::new();
        };

        let by_address: HashMap<&str, &Token> = previous
            .tokens
            .iter()
            .map(|t| (t.address.as_str(), t))
            .collect();

        let mut events = Vec::new();

        for token in &current.tokens {
            let Some(prev) = by_address.get(token.address.as_str()) else {
                continue;
            };

            self.check_price(prev, token, &mut events);
            self.check_volume(prev, token, &mut events);
            self.check_market_cap(prev, token, &mut events);
            self.check_liquidity(prev, token, &mut events);
        }

        debug!(alerts = events.len(), "snapshot diff complete");
        events
    }

    fn check_price(&self, prev: &Token, current: &Token, events: &mut Vec<MarketEvent>) {
        if prev.price <= Decimal::ZERO || current.price <= Decimal::ZERO {
            return;
        }

        let delta = current.price - prev.price;
        if (delta.abs() / prev.price) > self.thresholds.price_change {
            events.push(MarketEvent::PriceAlert(PriceAlertPayload {
                address: current.address.clone(),
                ticker: current.ticker.clone(),
                old_price: prev.price,
                new_price: current.price,
                change_pct: (delta / prev.price) * Decimal::ONE_HUNDRED,
                direction: if delta > Decimal::ZERO {
                    Direction::Up
                } else {
                    Direction::Down
                },
                timestamp: Utc::now(),
            }));
        }
    }

    fn check_volume(&self, prev: &Token, current: &Token, events: &mut Vec<MarketEvent>) {
        if prev.volume_24h <= Decimal::ZERO || current.volume_24h <= Decimal::ZERO {
            return;
        }

        if current.volume_24h > self.thresholds.volume_multiplier * prev.volume_24h {
            events.push(MarketEvent::VolumeAlert(VolumeAlertPayload {
                address: current.address.clone(),
                ticker: current.ticker.clone(),
                previous_volume_24h: prev.volume_24h,
                volume_24h: current.volume_24h,
                price: current.price,
                market_cap: current.market_cap,
                timestamp: Utc::now(),
            }));
        }
    }

    fn check_market_cap(&self, prev: &Token, current: &Token, events: &mut Vec<MarketEvent>) {
        if prev.market_cap <= Decimal::ZERO || current.market_cap <= Decimal::ZERO {
            return;
        }

        let delta = current.market_cap - prev.market_cap;
        if (delta.abs() / prev.market_cap) > self.thresholds.market_cap_change {
            events.push(MarketEvent::MarketCapAlert(MarketCapAlertPayload {
                address: current.address.clone(),
                ticker: current.ticker.clone(),
                old_market_cap: prev.market_cap,
                new_market_cap: current.market_cap,
                change_pct: (delta / prev.market_cap) * Decimal::ONE_HUNDRED,
                rank: current.rank,
                timestamp: Utc::now(),
            }));
        }
    }

    fn check_liquidity(&self, prev: &Token, current: &Token, events: &mut Vec<MarketEvent>) {
        if prev.liquidity <= Decimal::ZERO || current.liquidity <= Decimal::ZERO {
            return;
        }

        let delta = current.liquidity - prev.liquidity;
        if (delta.abs() / prev.liquidity) > self.thresholds.liquidity_change {
            events.push(MarketEvent::LiquidityAlert(LiquidityAlertPayload {
                address: current.address.clone(),
                ticker: current.ticker.clone(),
                old_liquidity: prev.liquidity,
                new_liquidity: current.liquidity,
                change_pct: (delta / prev.liquidity) * Decimal::ONE_HUNDRED,
                dex: current.dex.clone(),
                timestamp: Utc::now(),
            }));
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(AlertThresholds::default())
    }
}
