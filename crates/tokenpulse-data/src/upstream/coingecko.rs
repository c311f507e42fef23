//! Market-data provider adapter
//!
//! Pulls the `/coins/markets` listing and maps each row into a canonical
//! record. This source owns the market-stat fields: market cap, supply,
//! 24h high/low, all-time high/low, rank, image.

use crate::rate_limiter::RateLimiter;
use crate::upstream::{HTTP_TIMEOUT, USER_AGENT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tokenpulse_core::{AggregatorError, SourceId, Token, TokenRoi, UpstreamSource};
use tracing::{debug, info};

const VS_CURRENCY: &str = "usd";
const PLATFORM: &str = "solana";

#[derive(Debug, Deserialize)]
struct MarketRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    price_change_24h: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    market_cap_change_24h: Option<f64>,
    #[serde(default)]
    market_cap_change_percentage_24h: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    circulating_supply: Option<f64>,
    #[serde(default)]
    total_supply: Option<f64>,
    #[serde(default)]
    high_24h: Option<f64>,
    #[serde(default)]
    low_24h: Option<f64>,
    #[serde(default)]
    ath: Option<f64>,
    #[serde(default)]
    ath_change_percentage: Option<f64>,
    #[serde(default)]
    ath_date: Option<String>,
    #[serde(default)]
    atl: Option<f64>,
    #[serde(default)]
    atl_change_percentage: Option<f64>,
    #[serde(default)]
    atl_date: Option<String>,
    #[serde(default)]
    roi: Option<RoiRow>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoiRow {
    #[serde(default)]
    times: Option<f64>,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    percentage: Option<f64>,
}

/// Market-data provider client
pub struct CoingeckoClient {
    base_url: String,
    client: Client,
    limiter: Arc<RateLimiter>,
    batch_size: usize,
}

impl CoingeckoClient {
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

    fn parse_instant(value: Option<&str>) -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn convert_row(row: MarketRow) -> Option<Token> {
        let address = row.id.trim().to_lowercase();
        if address.is_empty() {
            return None;
        }

        let to_decimal = |v: Option<f64>| {
            v.and_then(|v| Decimal::try_from(v).ok())
                .unwrap_or(Decimal::ZERO)
        };

        let price = to_decimal(row.current_price);
        if price <= Decimal::ZERO {
            return None;
        }

        let last_updated =
            Self::parse_instant(row.last_updated.as_deref()).unwrap_or_else(Utc::now);

        let mut token = Token::from_source(address, SourceId::Coingecko, last_updated);
        token.name = row.name;
        token.ticker = row.symbol.to_uppercase();
        token.price = price;
        token.change_24h = to_decimal(row.price_change_24h);
        token.change_pct_24h = to_decimal(row.price_change_percentage_24h);
        token.market_cap = to_decimal(row.market_cap);
        token.market_cap_change_24h = to_decimal(row.market_cap_change_24h);
        token.market_cap_change_pct_24h = to_decimal(row.market_cap_change_percentage_24h);
        token.volume_24h = to_decimal(row.total_volume);
        token.circulating_supply = to_decimal(row.circulating_supply);
        token.total_supply = to_decimal(row.total_supply);
        token.high_24h = to_decimal(row.high_24h);
        token.low_24h = to_decimal(row.low_24h);
        token.ath = to_decimal(row.ath);
        token.ath_change_pct = to_decimal(row.ath_change_percentage);
        token.ath_date = Self::parse_instant(row.ath_date.as_deref());
        token.atl = to_decimal(row.atl);
        token.atl_change_pct = to_decimal(row.atl_change_percentage);
        token.atl_date = Self::parse_instant(row.atl_date.as_deref());
        token.roi = row.roi.map(|r| TokenRoi {
            times: to_decimal(r.times),
            currency: r.currency,
            percentage: to_decimal(r.percentage),
        });
        token.rank = row.market_cap_rank;
        token.image = row.image.unwrap_or_default();

        Some(token)
    }
}

#[async_trait]
impl UpstreamSource for CoingeckoClient {
    fn id(&self) -> SourceId {
        SourceId::Coingecko
    }

    async fn fetch(&self) -> Result<Vec<Token>, AggregatorError> {
        self.limiter.acquire(self.id())?;

        let url = format!(
            "{}/coins/markets?vs_currency={}&platform={}",
            self.base_url, VS_CURRENCY, PLATFORM
        );
        debug!(url = %url, "fetching market listing");

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

        let rows: Vec<MarketRow> = response
            .json()
            .await
            .map_err(|e| AggregatorError::Parse(e.to_string()))?;

        let total = rows.len();
        let tokens: Vec<Token> = rows
            .into_iter()
            .filter_map(Self::convert_row)
            .take(self.batch_size)
            .collect();

        info!(
            fetched = total,
            kept = tokens.len(),
            "market rows normalized"
        );
        Ok(tokens)
    }
}
