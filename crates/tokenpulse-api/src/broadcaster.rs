//! Event fan-out to connected subscribers
//!
//! Owns the subscription state: one entry per connection, each with an
//! outbound channel and a set of token addresses the client asked to
//! follow. Every event goes to every connection; alert events are
//! additionally wrapped as per-token updates for connections subscribed
//! to that address. Delivery is at-most-once fire-and-forget: a slow or
//! closed connection drops messages without blocking the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tokenpulse_core::{EventSink, MarketEvent};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-connection outbound buffer; overflow drops the message
pub const OUTBOUND_BUFFER: usize = 256;

pub type ConnectionId = Uuid;

/// Message sent to one subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutbound {
    /// Per-token delivery for subscribed connections
    SubscribedTokenUpdate(SubscribedTokenPayload),
    /// Global delivery: the event serializes with its own kind tag
    #[serde(untagged)]
    Market(MarketEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribedTokenPayload {
    pub address: String,
    pub event: MarketEvent,
    pub timestamp: DateTime<Utc>,
}

/// Control messages a subscriber can send
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInbound {
    SubscribeTokens { tokens: Vec<String> },
    UnsubscribeTokens { tokens: Vec<String> },
}

struct Subscriber {
    sender: mpsc::Sender<WsOutbound>,
    subscriptions: HashSet<String>,
}

/// Routes events to the global channel and per-token subscription sets
pub struct Broadcaster {
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection with an empty subscription set
    pub async fn on_connect(&self, id: ConnectionId, sender: mpsc::Sender<WsOutbound>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(
            id,
            Subscriber {
                sender,
                subscriptions: HashSet::new(),
            },
        );
        info!(connection = %id, total = subscribers.len(), "subscriber connected");
    }

    /// Add lowercased addresses to a connection's subscription set
    pub async fn subscribe(&self, id: ConnectionId, addresses: &[String]) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sub) = subscribers.get_mut(&id) {
            for address in addresses {
                sub.subscriptions.insert(address.trim().to_lowercase());
            }
            debug!(connection = %id, tracked = sub.subscriptions.len(), "subscriptions added");
        }
    }

    pub async fn unsubscribe(&self, id: ConnectionId, addresses: &[String]) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sub) = subscribers.get_mut(&id) {
            for address in addresses {
                sub.subscriptions.remove(&address.trim().to_lowercase());
            }
        }
    }

    pub async fn on_disconnect(&self, id: ConnectionId) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(&id);
        info!(connection = %id, total = subscribers.len(), "subscriber disconnected");
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for Broadcaster {
    async fn deliver(&self, events: Vec<MarketEvent>) {
        let subscribers = self.subscribers.read().await;
        if subscribers.is_empty() {
            return;
        }

        for event in events {
            for (id, sub) in subscribers.iter() {
                if sub.sender.try_send(WsOutbound::Market(event.clone())).is_err() {
                    debug!(connection = %id, kind = event.event_type(), "dropped global delivery");
                }
            }

            let Some(address) = event.address() else {
                continue;
            };

            for (id, sub) in subscribers
                .iter()
                .filter(|(_, s)| s.subscriptions.contains(address))
            {
                let update = WsOutbound::SubscribedTokenUpdate(SubscribedTokenPayload {
                    address: address.to_string(),
                    event: event.clone(),
                    timestamp: Utc::now(),
                });
                if sub.sender.try_send(update).is_err() {
                    debug!(connection = %id, address, "dropped per-token delivery");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokenpulse_core::{Direction, PriceAlertPayload, Snapshot};

    fn price_alert(address: &str) -> MarketEvent {
        MarketEvent::PriceAlert(PriceAlertPayload {
            address: address.to_string(),
            ticker: address.to_uppercase(),
            old_price: dec!(1.00),
            new_price: dec!(1.10),
            change_pct: dec!(10),
            direction: Direction::Up,
            timestamp: Utc::now(),
        })
    }

    async fn connect(broadcaster: &Broadcaster) -> (ConnectionId, mpsc::Receiver<WsOutbound>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        broadcaster.on_connect(id, tx).await;
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<WsOutbound>) -> Vec<WsOutbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_global_delivery_reaches_all_connections() {
        let broadcaster = Broadcaster::new();
        let (_a, mut rx_a) = connect(&broadcaster).await;
        let (_b, mut rx_b) = connect(&broadcaster).await;

        broadcaster.deliver(vec![price_alert("0xabc")]).await;

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_per_token_delivery_only_to_subscribed() {
        let broadcaster = Broadcaster::new();
        let (a, mut rx_a) = connect(&broadcaster).await;
        let (_b, mut rx_b) = connect(&broadcaster).await;

        // addresses are lowercased server-side
        broadcaster.subscribe(a, &["0xABC".to_string()]).await;
        broadcaster.deliver(vec![price_alert("0xabc")]).await;

        let a_msgs = drain(&mut rx_a);
        let b_msgs = drain(&mut rx_b);

        // subscriber gets the global event plus the per-token update
        assert_eq!(a_msgs.len(), 2);
        assert!(a_msgs
            .iter()
            .any(|m| matches!(m, WsOutbound::SubscribedTokenUpdate(p) if p.address == "0xabc")));
        // the other connection only sees the global event
        assert_eq!(b_msgs.len(), 1);
        assert!(matches!(b_msgs[0], WsOutbound::Market(_)));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_disconnect() {
        let broadcaster = Broadcaster::new();
        let (a, mut rx_a) = connect(&broadcaster).await;

        broadcaster.subscribe(a, &["0xabc".to_string()]).await;
        broadcaster.unsubscribe(a, &["0xabc".to_string()]).await;
        broadcaster.deliver(vec![price_alert("0xabc")]).await;
        assert_eq!(drain(&mut rx_a).len(), 1); // global only

        broadcaster.on_disconnect(a).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
        broadcaster.deliver(vec![price_alert("0xabc")]).await;
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_batch_update_has_no_per_token_delivery() {
        let broadcaster = Broadcaster::new();
        let (a, mut rx_a) = connect(&broadcaster).await;
        broadcaster.subscribe(a, &["0xabc".to_string()]).await;

        let batch = MarketEvent::batch_update(&Snapshot::new(Vec::new(), Utc::now()));
        broadcaster.deliver(vec![batch]).await;

        let msgs = drain(&mut rx_a);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], WsOutbound::Market(_)));
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_block_others() {
        let broadcaster = Broadcaster::new();

        // one-slot channel that is never drained
        let stuck = Uuid::new_v4();
        let (tx, _rx_stuck) = mpsc::channel(1);
        broadcaster.on_connect(stuck, tx).await;
        let (_b, mut rx_b) = connect(&broadcaster).await;

        broadcaster
            .deliver(vec![price_alert("0x1"), price_alert("0x2")])
            .await;

        // healthy connection still got both
        assert_eq!(drain(&mut rx_b).len(), 2);
    }

    #[test]
    fn test_inbound_control_message_parsing() {
        let msg: WsInbound =
            serde_json::from_str(r#"{"type":"subscribe_tokens","tokens":["0xAbc","0xdef"]}"#)
                .unwrap();
        match msg {
            WsInbound::SubscribeTokens { tokens } => assert_eq!(tokens.len(), 2),
            other => panic!("expected subscribe, got {other:?}"),
        }
    }

    #[test]
    fn test_outbound_wire_shape() {
        let update = WsOutbound::SubscribedTokenUpdate(SubscribedTokenPayload {
            address: "0xabc".to_string(),
            event: price_alert("0xabc"),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"type\":\"subscribed_token_update\""));

        let global = WsOutbound::Market(price_alert("0xabc"));
        let json = serde_json::to_string(&global).unwrap();
        // the event's own tag is the outer tag
        assert!(json.contains("\"type\":\"price_alert\""));
    }
}
