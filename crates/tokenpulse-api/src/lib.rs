//! Tokenpulse API
//!
//! Read path over the snapshot store, event fan-out to subscribers, and
//! the thin HTTP/WebSocket transport that exposes both.

pub mod broadcaster;
pub mod query;
pub mod server;

pub use broadcaster::{Broadcaster, ConnectionId, WsInbound, WsOutbound};
pub use query::{ReadApi, SortBy, SortOrder, TimePeriod, TokenFilters, TokenPage};
pub use server::ApiServer;
