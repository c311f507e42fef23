//! DEX-pair indexer adapter
//!
//! Pulls pair listings from the `/search` endpoint and maps each pair's
//! base token into a canonical record. This source owns the real-time
//! venue fields: price, volume, liquidity, transaction counts, venue tag.

use crate::rate_limiter::RateLimiter;
use crate::upstream::{HTTP_TIMEOUT, USER_AGENT};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tokenpulse_core::{AggregatorError, SourceId, Token, UpstreamSource};
use tracing::{debug, info};

const SEARCH_QUERY: &str = "SOLANA";

#[derive(Debug, Deserialize)]
struct DexSearchResponse {
    #[serde(default)]
    pairs: Vec<DexPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    base_token: Option<DexBaseToken>,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    price_change: Option<DexPriceChange>,
    #[serde(default)]
    fdv: Option<f64>,
    #[serde(default)]
    volume: Option<DexVolume>,
    #[serde(default)]
    liquidity: Option<DexLiquidity>,
    #[serde(default)]
    txns: Option<DexTxns>,
    #[serde(default)]
    dex_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    info: Option<DexInfo>,
}

#[derive(Debug, Deserialize)]
struct DexBaseToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct DexPriceChange {
    #[serde(default)]
    h1: Option<f64>,
    #[serde(default)]
    h6: Option<f64>,
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexVolume {
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexTxns {
    #[serde(default)]
    h24: Option<DexTxnCounts>,
}

#[derive(Debug, Deserialize)]
struct DexTxnCounts {
    #[serde(default)]
    buys: u64,
    #[serde(default)]
    sells: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexInfo {
    #[serde(default)]
    image_url: Option<String>,
}

/// DEX-pair indexer client
pub struct DexscreenerClient {
    base_url: String,
    client: Client,
    limiter: Arc<RateLimiter>,
    batch_size: usize,
}

impl DexscreenerClient {
    pub fn new(
        base_url: String,
        limiter: Arc<RateLimiter>,
        batch_size: usize,
    ) -> Result<Self, AggregatorError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AggregatorError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            limiter,
            batch_size,
        })
    }

    fn convert_pair(pair: DexPair) -> Option<Token> {
        let base = pair.base_token?;
        let address = base.address.trim().to_lowercase();
        if address.is_empty() {
            return None;
        }

        let price = pair
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO);
        if price <= Decimal::ZERO {
            return None;
        }

        let to_decimal = |v: Option<f64>| {
            v.and_then(|v| Decimal::try_from(v).ok())
                .unwrap_or(Decimal::ZERO)
        };

        let mut token = Token::from_source(address, SourceId::Dexscreener, Utc::now());
        token.name = base.name;
        token.ticker = base.symbol.to_uppercase();
        token.price = price;

        if let Some(change) = pair.price_change {
            token.change_1h = to_decimal(change.h1);
            token.change_6h = to_decimal(change.h6);
            token.change_24h = to_decimal(change.h24);
        }

        token.market_cap = to_decimal(pair.fdv);
        token.volume_24h = to_decimal(pair.volume.and_then(|v| v.h24));
        token.liquidity = to_decimal(pair.liquidity.and_then(|l| l.usd));
        token.transaction_count_24h = pair
            .txns
            .and_then(|t| t.h24)
            .map(|c| c.buys + c.sells)
            .unwrap_or(0);
        token.dex = pair.dex_id.unwrap_or_default();
        token.dex_url = pair.url.unwrap_or_default();
        token.image = pair.info.and_then(|i| i.image_url).unwrap_or_default();

        Some(token)
    }
}

#[async_trait]
impl UpstreamSource for DexscreenerClient {
    fn id(&self) -> SourceId {
        SourceId::Dexscreener
    }

    async fn fetch(&self) -> Result<Vec<Token>, AggregatorError> {
        self.limiter.acquire(self.id())?;

        let url = format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(SEARCH_QUERY)
        );
        debug!(url = %url, "fetching DEX pairs");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AggregatorError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AggregatorError::UpstreamStatus {
                upstream: self.id().as_str(),
                status: response.status().as_u16(),
            });
        }

        let body: DexSearchResponse = response
            .json()
            .await
            .map_err(|e| AggregatorError::Parse(e.to_string()))?;

        let total = body.pairs.len();
        let tokens: Vec<Token> = body
            .pairs
            .into_iter()
            .filter_map(Self::convert_pair)
            .take(self.batch_size)
            .collect();

        info!(
            fetched = total,
            kept = tokens.len(),
            "DEX pairs normalized"
        );
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair_json() -> &'static str {
        r#"{
            "baseToken": {"address": "0xAbC123", "name": "Sample", "symbol": "smp"},
            "priceUsd": "1.25",
            "priceChange": {"h1": 0.5, "h6": -1.2, "h24": 4.0},
            "fdv": 1000000.0,
            "volume": {"h24": 250000.0},
            "liquidity": {"usd": 80000.0},
            "txns": {"h24": {"buys": 120, "sells": 80}},
            "dexId": "raydium",
            "url": "https://dexscreener.com/solana/0xabc123",
            "info": {"imageUrl": "https://img.example/smp.png"}
        }"#
    }

    #[test]
    fn test_convert_pair_maps_venue_fields() {
        let pair: DexPair = serde_json::from_str(pair_json()).unwrap();
        let token = DexscreenerClient::convert_pair(pair).unwrap();

        assert_eq!(token.address, "0xabc123");
        assert_eq!(token.ticker, "SMP");
        assert_eq!(token.price, dec!(1.25));
        assert_eq!(token.change_1h, dec!(0.5));
        assert_eq!(token.change_24h, dec!(4.0));
        assert_eq!(token.volume_24h, dec!(250000));
        assert_eq!(token.liquidity, dec!(80000));
        assert_eq!(token.transaction_count_24h, 200);
        assert_eq!(token.dex, "raydium");
        assert!(token.sources.contains(&SourceId::Dexscreener));
        assert!(!token.is_merged);
        // this source does not carry market-stat fields
        assert_eq!(token.change_pct_24h, Decimal::ZERO);
        assert_eq!(token.circulating_supply, Decimal::ZERO);
    }

    #[test]
    fn test_convert_pair_rejects_empty_address() {
        let json = r#"{"baseToken": {"address": "  ", "name": "x", "symbol": "x"}, "priceUsd": "1.0"}"#;
        let pair: DexPair = serde_json::from_str(json).unwrap();
        assert!(DexscreenerClient::convert_pair(pair).is_none());
    }

    #[test]
    fn test_convert_pair_rejects_nonpositive_price() {
        let json = r#"{"baseToken": {"address": "0x1", "name": "x", "symbol": "x"}, "priceUsd": "0"}"#;
        let pair: DexPair = serde_json::from_str(json).unwrap();
        assert!(DexscreenerClient::convert_pair(pair).is_none());

        let json = r#"{"baseToken": {"address": "0x1", "name": "x", "symbol": "x"}}"#;
        let pair: DexPair = serde_json::from_str(json).unwrap();
        assert!(DexscreenerClient::convert_pair(pair).is_none());
    }

    #[test]
    fn test_response_tolerates_missing_pairs() {
        let body: DexSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(body.pairs.is_empty());
    }
}
