//! Canonical token and snapshot types
//!
//! A `Token` is the merged, normalized representation of one listing,
//! unifying per-source records by lowercase address. A `Snapshot` is the
//! authoritative list produced by one aggregation tick.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of an upstream data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// DEX-pair indexer (real-time venue data)
    Dexscreener,
    /// Market-data provider (canonical market stats)
    Coingecko,
}

impl SourceId {
    /// Stable string tag, used for rate-limiter bucket keys and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Dexscreener => "dexscreener",
            SourceId::Coingecko => "coingecko",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return-on-investment block reported by the market-data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRoi {
    pub times: Decimal,
    pub currency: String,
    pub percentage: Decimal,
}

/// Canonical token record, keyed by lowercase address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// On-chain address, canonicalized to lowercase, never empty
    pub address: String,
    pub name: String,
    pub ticker: String,

    /// Spot price in USD, positive for publishable records
    pub price: Decimal,
    pub change_1h: Decimal,
    pub change_6h: Decimal,
    pub change_24h: Decimal,
    pub change_pct_24h: Decimal,

    pub market_cap: Decimal,
    pub market_cap_change_24h: Decimal,
    pub market_cap_change_pct_24h: Decimal,
    pub volume_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,

    pub circulating_supply: Decimal,
    pub total_supply: Decimal,

    pub liquidity: Decimal,
    pub transaction_count_24h: u64,
    /// Venue tag, e.g. "raydium"
    pub dex: String,
    pub dex_url: String,

    pub ath: Decimal,
    pub ath_change_pct: Decimal,
    pub ath_date: Option<DateTime<Utc>>,
    pub atl: Decimal,
    pub atl_change_pct: Decimal,
    pub atl_date: Option<DateTime<Utc>>,
    pub roi: Option<TokenRoi>,

    /// Upstreams that contributed to this record, never empty
    pub sources: BTreeSet<SourceId>,
    pub rank: Option<u32>,
    pub image: String,
    pub last_updated: DateTime<Utc>,
    /// True when this record was fused from two or more sources
    pub is_merged: bool,
}

impl Token {
    /// A record is admissible for the pipeline when it has an address
    pub fn is_admissible(&self) -> bool {
        !self.address.is_empty()
    }

    /// A record is publishable when it also carries a positive price
    pub fn is_valid(&self) -> bool {
        self.is_admissible() && self.price > Decimal::ZERO
    }

    /// Blank record for one source, used by adapters as a mapping base
    pub fn from_source(address: String, source: SourceId, now: DateTime<Utc>) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            address,
            name: String::new(),
            ticker: String::new(),
            price: Decimal::ZERO,
            change_1h: Decimal::ZERO,
            change_6h: Decimal::ZERO,
            change_24h: Decimal::ZERO,
            change_pct_24h: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            market_cap_change_24h: Decimal::ZERO,
            market_cap_change_pct_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            high_24h: Decimal::ZERO,
            low_24h: Decimal::ZERO,
            circulating_supply: Decimal::ZERO,
            total_supply: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            transaction_count_24h: 0,
            dex: String::new(),
            dex_url: String::new(),
            ath: Decimal::ZERO,
            ath_change_pct: Decimal::ZERO,
            ath_date: None,
            atl: Decimal::ZERO,
            atl_change_pct: Decimal::ZERO,
            atl_date: None,
            roi: None,
            sources,
            rank: None,
            image: String::new(),
            last_updated: now,
            is_merged: false,
        }
    }
}

/// The authoritative token list produced by one aggregation tick
///
/// Sorted by `volume_24h` descending, truncated to the configured maximum,
/// replaced wholesale on every successful tick and never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tokens: Vec<Token>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(tokens: Vec<Token>, created_at: DateTime<Utc>) -> Self {
        Self { tokens, created_at }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Find a token by its lowercase address
    pub fn find(&self, address: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_source_id_roundtrip() {
        let json = serde_json::to_string(&SourceId::Dexscreener).unwrap();
        assert_eq!(json, "\"dexscreener\"");
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceId::Dexscreener);
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let mut token = Token::from_source("0xabc".to_string(), SourceId::Dexscreener, now);
        assert!(token.is_admissible());
        assert!(!token.is_valid());

        token.price = dec!(1.25);
        assert!(token.is_valid());

        token.address = String::new();
        assert!(!token.is_admissible());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_snapshot_find() {
        let now = Utc::now();
        let a = Token::from_source("0xaaa".to_string(), SourceId::Dexscreener, now);
        let b = Token::from_source("0xbbb".to_string(), SourceId::Coingecko, now);
        let snapshot = Snapshot::new(vec![a, b], now);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.find("0xbbb").is_some());
        assert!(snapshot.find("0xccc").is_none());
    }
}
