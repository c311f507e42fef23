//! Normalizer and field-precedence merger
//!
//! Fuses per-source token lists into one canonical list keyed by lowercase
//! address. When two sources report the same token, the DEX adapter wins
//! the real-time venue fields (price, volume, liquidity, transactions,
//! venue tag) and the market-data adapter wins the market-stat fields
//! (market cap, supply, high/low, ath/atl, rank, image). A preferred field
//! that is missing or zero falls back to the other source's value.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokenpulse_core::{Snapshot, SourceId, Token};

/// Merge per-source lists into a snapshot, sorted by 24h volume
/// descending and truncated to `max_tokens`.
pub fn merge(lists: Vec<Vec<Token>>, max_tokens: usize) -> Snapshot {
    merge_at(lists, max_tokens, Utc::now())
}

/// Deterministic variant with an explicit merge instant
pub fn merge_at(lists: Vec<Vec<Token>>, max_tokens: usize, now: DateTime<Utc>) -> Snapshot {
    let mut groups: HashMap<String, Vec<Token>> = HashMap::new();

    for token in lists.into_iter().flatten() {
        let address = token.address.trim().to_lowercase();
        if address.is_empty() {
            continue;
        }
        let mut token = token;
        token.address = address.clone();
        groups.entry(address).or_default().push(token);
    }

    let mut tokens: Vec<Token> = groups
        .into_values()
        .map(|mut group| {
            if group.len() == 1 {
                let mut only = group.pop().expect("non-empty group");
                only.is_merged = false;
                only
            } else {
                let mut iter = group.into_iter();
                let first = iter.next().expect("non-empty group");
                iter.fold(first, |acc, next| fuse(acc, next, now))
            }
        })
        .collect();

    tokens.sort_by(|a, b| b.volume_24h.cmp(&a.volume_24h));
    tokens.truncate(max_tokens);

    Snapshot::new(tokens, now)
}

/// Fuse two records for the same address
///
/// Left-fold associative: the accumulator may already be a merged record,
/// in which case the incoming record only fills the fields its source
/// owns or the accumulator is missing.
fn fuse(a: Token, b: Token, now: DateTime<Utc>) -> Token {
    debug_assert_eq!(a.address, b.address);

    // Orient the pair so precedence is by source, not argument order.
    let (dex, market) = if b.sources.contains(&SourceId::Dexscreener)
        && !a.sources.contains(&SourceId::Dexscreener)
    {
        (b, a)
    } else {
        (a, b)
    };

    let pick = |preferred: Decimal, fallback: Decimal| {
        if preferred != Decimal::ZERO {
            preferred
        } else {
            fallback
        }
    };
    let pick_str = |preferred: &str, fallback: &str| {
        if preferred.is_empty() {
            fallback.to_string()
        } else {
            preferred.to_string()
        }
    };

    let mut sources = dex.sources.clone();
    sources.extend(market.sources.iter().copied());
    // one source can list the same address twice; fusing those rows is
    // deduplication, not a cross-source merge
    let is_merged = sources.len() >= 2;

    Token {
        address: dex.address.clone(),
        // identity: first non-empty, DEX first
        name: pick_str(&dex.name, &market.name),
        ticker: pick_str(&dex.ticker, &market.ticker),

        // real-time venue data: DEX wins
        price: pick(dex.price, market.price),
        volume_24h: pick(dex.volume_24h, market.volume_24h),
        liquidity: pick(dex.liquidity, market.liquidity),
        transaction_count_24h: if dex.transaction_count_24h > 0 {
            dex.transaction_count_24h
        } else {
            market.transaction_count_24h
        },
        dex: pick_str(&dex.dex, &market.dex),
        dex_url: pick_str(&dex.dex_url, &market.dex_url),
        change_1h: pick(dex.change_1h, market.change_1h),
        change_6h: pick(dex.change_6h, market.change_6h),
        change_24h: pick(dex.change_24h, market.change_24h),

        // canonical market data: market-data adapter wins
        change_pct_24h: pick(market.change_pct_24h, dex.change_pct_24h),
        market_cap: pick(market.market_cap, dex.market_cap),
        market_cap_change_24h: pick(market.market_cap_change_24h, dex.market_cap_change_24h),
        market_cap_change_pct_24h: pick(
            market.market_cap_change_pct_24h,
            dex.market_cap_change_pct_24h,
        ),
        circulating_supply: pick(market.circulating_supply, dex.circulating_supply),
        total_supply: pick(market.total_supply, dex.total_supply),
        high_24h: pick(market.high_24h, dex.high_24h),
        low_24h: pick(market.low_24h, dex.low_24h),
        ath: pick(market.ath, dex.ath),
        ath_change_pct: pick(market.ath_change_pct, dex.ath_change_pct),
        ath_date: market.ath_date.or(dex.ath_date),
        atl: pick(market.atl, dex.atl),
        atl_change_pct: pick(market.atl_change_pct, dex.atl_change_pct),
        atl_date: market.atl_date.or(dex.atl_date),
        roi: market.roi.clone().or(dex.roi),
        rank: market.rank.or(dex.rank),
        image: pick_str(&market.image, &dex.image),

        sources,
        last_updated: now,
        is_merged,
    }
}
