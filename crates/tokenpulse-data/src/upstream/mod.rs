//! Upstream HTTP adapters
//!
//! One adapter per provider. Each acquires a rate-limiter permit before
//! the network call, maps provider DTOs into canonical tokens, silently
//! drops inadmissible rows, and caps the batch size.

pub mod coingecko;
pub mod dexscreener;

pub use coingecko::CoingeckoClient;
pub use dexscreener::DexscreenerClient;

use std::time::Duration;

pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const USER_AGENT: &str = concat!("tokenpulse/", env!("CARGO_PKG_VERSION"));
