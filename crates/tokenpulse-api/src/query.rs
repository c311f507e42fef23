//! Read path: filter, sort, and paginate over the current snapshot
//!
//! Consumes only the snapshot store. Filtering and pagination are pure
//! functions over a value-typed snapshot so composability holds: applying
//! filters in any order yields the same set.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokenpulse_core::{ApiError, Snapshot, SnapshotStore, Token};
use tracing::debug;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

/// Sort key for token listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Volume,
    PriceChange,
    MarketCap,
    Liquidity,
    TransactionCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Change-field window a listing can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "24h")]
    H24,
    /// Accepted but does not restrict the listing
    #[serde(rename = "7d")]
    D7,
}

/// Listing filters; all optional, all composable
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenFilters {
    pub min_liquidity: Option<Decimal>,
    pub min_volume: Option<Decimal>,
    /// Case-insensitive substring match over the venue tag
    pub protocol: Option<String>,
    pub time_period: Option<TimePeriod>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    /// Opaque numeric offset returned by the previous page
    pub cursor: Option<String>,
}

/// One page of the filtered listing
#[derive(Debug, Clone, Serialize)]
pub struct TokenPage {
    pub tokens: Vec<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Post-filter cardinality
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Read API over the snapshot store
pub struct ReadApi {
    store: Arc<dyn SnapshotStore>,
}

impl ReadApi {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Filtered, sorted, paginated listing
    pub async fn get_all(&self, filters: &TokenFilters) -> Result<TokenPage, ApiError> {
        let snapshot = self.store.get().await.ok_or(ApiError::CacheUnavailable)?;
        paginate(&snapshot, filters)
    }

    /// Case-insensitive single-token lookup
    ///
    /// Tries the per-token cache key first, then falls back to scanning
    /// the full snapshot (per-token keys only cover the head of the list).
    pub async fn get_by_address(&self, address: &str) -> Result<Token, ApiError> {
        let address = address.trim().to_lowercase();
        if address.is_empty() {
            return Err(ApiError::InvalidRequest("address is required".to_string()));
        }

        if let Some(token) = self.store.get_token(&address).await {
            return Ok(token);
        }

        debug!(address = %address, "per-token key miss, scanning snapshot");
        let snapshot = self.store.get().await.ok_or(ApiError::CacheUnavailable)?;
        snapshot
            .find(&address)
            .cloned()
            .ok_or(ApiError::NotFound(address))
    }
}

/// Apply filters and produce one page
pub fn paginate(snapshot: &Snapshot, filters: &TokenFilters) -> Result<TokenPage, ApiError> {
    let offset = match &filters.cursor {
        None => 0,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::InvalidRequest(format!("invalid cursor: {raw}")))?,
    };
    let limit = filters.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut tokens = apply_filters(&snapshot.tokens, filters);
    sort_tokens(&mut tokens, filters.sort_by, filters.sort_order);

    let total_count = tokens.len();
    let page: Vec<Token> = tokens.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + page.len() < total_count;

    Ok(TokenPage {
        next_cursor: has_more.then(|| (offset + limit).to_string()),
        has_more,
        total_count,
        tokens: page,
        timestamp: snapshot.created_at,
    })
}

/// Filter predicate application, order-independent
pub fn apply_filters(tokens: &[Token], filters: &TokenFilters) -> Vec<Token> {
    tokens
        .iter()
        .filter(|t| {
            filters
                .min_liquidity
                .map_or(true, |min| t.liquidity >= min)
        })
        .filter(|t| filters.min_volume.map_or(true, |min| t.volume_24h >= min))
        .filter(|t| {
            filters.protocol.as_ref().map_or(true, |p| {
                t.dex.to_lowercase().contains(&p.to_lowercase())
            })
        })
        .filter(|t| match filters.time_period {
            Some(TimePeriod::H1) => t.change_1h != Decimal::ZERO,
            Some(TimePeriod::H24) => t.change_24h != Decimal::ZERO,
            Some(TimePeriod::D7) | None => true,
        })
        .cloned()
        .collect()
}

fn sort_tokens(tokens: &mut [Token], sort_by: SortBy, order: SortOrder) {
    tokens.sort_by(|a, b| {
        let ordering = match sort_by {
            SortBy::Volume => a.volume_24h.cmp(&b.volume_24h),
            SortBy::PriceChange => a.change_pct_24h.cmp(&b.change_pct_24h),
            SortBy::MarketCap => a.market_cap.cmp(&b.market_cap),
            SortBy::Liquidity => a.liquidity.cmp(&b.liquidity),
            SortBy::TransactionCount => a.transaction_count_24h.cmp(&b.transaction_count_24h),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokenpulse_core::SourceId;

    fn token(address: &str, volume: Decimal, liquidity: Decimal) -> Token {
        let mut t = Token::from_source(address.to_string(), SourceId::Dexscreener, Utc::now());
        t.price = dec!(1.0);
        t.volume_24h = volume;
        t.liquidity = liquidity;
        t.dex = "raydium".to_string();
        t
    }

    fn seeded_snapshot() -> Snapshot {
        // A(vol=1000), B(vol=2000), C(vol=500)
        Snapshot::new(
            vec![
                token("a", dec!(1000), dec!(500000)),
                token("b", dec!(2000), dec!(50000)),
                token("c", dec!(500), dec!(200000)),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_default_listing_sorted_by_volume_desc() {
        let page = paginate(&seeded_snapshot(), &TokenFilters::default()).unwrap();

        let order: Vec<_> = page.tokens.iter().map(|t| t.address.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(page.total_count, 3);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_min_liquidity_filter() {
        let filters = TokenFilters {
            min_liquidity: Some(dec!(100000)),
            ..Default::default()
        };
        let page = paginate(&seeded_snapshot(), &filters).unwrap();

        let order: Vec<_> = page.tokens.iter().map(|t| t.address.as_str()).collect();
        assert_eq!(order, vec!["a", "c"]);
        assert_eq!(page.total_count, 2);
    }

    #[test]
    fn test_filter_composability() {
        let snapshot = seeded_snapshot();
        let volume_first = TokenFilters {
            min_volume: Some(dec!(600)),
            min_liquidity: Some(dec!(100000)),
            ..Default::default()
        };

        let one_pass = apply_filters(&snapshot.tokens, &volume_first);

        // same predicates applied one at a time, in either order
        let only_volume = TokenFilters {
            min_volume: Some(dec!(600)),
            ..Default::default()
        };
        let only_liquidity = TokenFilters {
            min_liquidity: Some(dec!(100000)),
            ..Default::default()
        };
        let staged_a = apply_filters(&apply_filters(&snapshot.tokens, &only_volume), &only_liquidity);
        let staged_b = apply_filters(&apply_filters(&snapshot.tokens, &only_liquidity), &only_volume);

        let addrs = |ts: &[Token]| {
            let mut v: Vec<_> = ts.iter().map(|t| t.address.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(addrs(&one_pass), addrs(&staged_a));
        assert_eq!(addrs(&staged_a), addrs(&staged_b));
    }

    #[test]
    fn test_protocol_substring_filter() {
        let mut snapshot = seeded_snapshot();
        snapshot.tokens[1].dex = "Orca".to_string();

        let filters = TokenFilters {
            protocol: Some("orc".to_string()),
            ..Default::default()
        };
        let page = paginate(&snapshot, &filters).unwrap();
        assert_eq!(page.tokens.len(), 1);
        assert_eq!(page.tokens[0].address, "b");
    }

    #[test]
    fn test_time_period_excludes_missing_change_fields() {
        let mut snapshot = seeded_snapshot();
        snapshot.tokens[0].change_1h = dec!(1.5);

        let filters = TokenFilters {
            time_period: Some(TimePeriod::H1),
            ..Default::default()
        };
        let page = paginate(&snapshot, &filters).unwrap();
        assert_eq!(page.tokens.len(), 1);
        assert_eq!(page.tokens[0].address, "a");

        // 7d is a no-op
        let filters = TokenFilters {
            time_period: Some(TimePeriod::D7),
            ..Default::default()
        };
        assert_eq!(paginate(&snapshot, &filters).unwrap().total_count, 3);
    }

    #[test]
    fn test_pagination_round_trip() {
        let tokens: Vec<Token> = (0..7)
            .map(|i| token(&format!("t{i}"), Decimal::from(100 - i), dec!(1)))
            .collect();
        let snapshot = Snapshot::new(tokens, Utc::now());

        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let filters = TokenFilters {
                limit: Some(3),
                cursor: cursor.clone(),
                ..Default::default()
            };
            let page = paginate(&snapshot, &filters).unwrap();
            collected.extend(page.tokens.iter().map(|t| t.address.clone()));
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
        }

        let full = paginate(
            &snapshot,
            &TokenFilters {
                limit: Some(100),
                ..Default::default()
            },
        )
        .unwrap();
        let expected: Vec<_> = full.tokens.iter().map(|t| t.address.clone()).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_limit_is_capped() {
        let tokens: Vec<Token> = (0..150)
            .map(|i| token(&format!("t{i}"), Decimal::from(i), dec!(1)))
            .collect();
        let snapshot = Snapshot::new(tokens, Utc::now());

        let filters = TokenFilters {
            limit: Some(500),
            ..Default::default()
        };
        let page = paginate(&snapshot, &filters).unwrap();
        assert_eq!(page.tokens.len(), 100);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("100"));
    }

    #[test]
    fn test_invalid_cursor_rejected() {
        let filters = TokenFilters {
            cursor: Some("not-a-number".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            paginate(&seeded_snapshot(), &filters),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_sort_orders() {
        let filters = TokenFilters {
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let page = paginate(&seeded_snapshot(), &filters).unwrap();
        let order: Vec<_> = page.tokens.iter().map(|t| t.address.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);

        let filters = TokenFilters {
            sort_by: SortBy::Liquidity,
            ..Default::default()
        };
        let page = paginate(&seeded_snapshot(), &filters).unwrap();
        assert_eq!(page.tokens[0].address, "a");
    }

    #[tokio::test]
    async fn test_get_by_address_falls_back_to_snapshot() {
        use std::time::Duration;
        use tokenpulse_data::MemorySnapshotStore;

        let store = Arc::new(MemorySnapshotStore::new(Duration::from_secs(30)));
        // 120 tokens: the tail has no per-token key
        let tokens: Vec<Token> = (0..120)
            .map(|i| token(&format!("t{i:03}"), Decimal::from(1000 - i), dec!(1)))
            .collect();
        store
            .put(&Snapshot::new(tokens, Utc::now()))
            .await
            .unwrap();

        let api = ReadApi::new(store);
        assert_eq!(api.get_by_address("T005").await.unwrap().address, "t005");
        assert_eq!(api.get_by_address("t115").await.unwrap().address, "t115");
        assert!(matches!(
            api.get_by_address("missing").await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            api.get_by_address("  ").await,
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
