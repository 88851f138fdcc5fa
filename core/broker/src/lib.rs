// sentinel/core/broker/src/lib.rs

//! Best-effort topic fan-out between pipeline stages.
//!
//! Delivery is at-most-once: a publish with no subscribers is dropped, and a
//! subscriber that falls behind loses the messages it lagged past. Ordering
//! is preserved per publisher only. Downstream consumers re-derive their
//! state every window, so lost messages cost freshness, not correctness.

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Well-known topics on the bus.
pub mod topics {
    /// Aggregator diagnostics, one per active key per tick
    pub const DIAG: &str = "sentinel/diag";
    /// Periodic liveness heartbeats
    pub const HEALTH: &str = "sentinel/health";
    /// Operator-injected alerts, always routed to the malicious track
    pub const ALERT: &str = "sentinel/alert";
    /// Subscription filter matching every sentinel topic
    pub const ALL: &str = "sentinel/#";
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-subscriber buffer; subscribers lagging past it lose messages
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// One published message.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: Arc<str>,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
struct BrokerStats {
    published: u64,
    dropped_no_subscriber: u64,
}

/// Topic-based publish/subscribe bus.
pub struct Broker {
    tx: broadcast::Sender<Message>,
    stats: RwLock<BrokerStats>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            tx,
            stats: RwLock::new(BrokerStats::default()),
        }
    }

    /// Publish raw bytes to a topic. Returns the number of subscribers the
    /// message was handed to; zero means it was dropped.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let message = Message {
            topic: Arc::from(topic),
            payload: payload.into(),
        };

        let mut stats = self.stats.write();
        stats.published += 1;
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                stats.dropped_no_subscriber += 1;
                debug!(topic, "no subscribers, message dropped");
                0
            }
        }
    }

    /// Publish a value serialized as flat JSON.
    pub fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<usize, serde_json::Error> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.publish(topic, payload))
    }

    /// Subscribe to all topics matching `filter`.
    ///
    /// A filter ending in `/#` matches every topic under its prefix
    /// (`sentinel/#` matches `sentinel/diag`); any other filter matches
    /// exactly.
    pub fn subscribe(&self, filter: &str) -> Subscription {
        Subscription {
            filter: filter.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn published(&self) -> u64 {
        self.stats.read().published
    }
}

/// Receiving side of a subscription.
pub struct Subscription {
    filter: String,
    rx: broadcast::Receiver<Message>,
}

impl Subscription {
    /// Receive the next message matching the filter.
    ///
    /// Returns `None` once the broker is dropped. Messages lost to lag are
    /// logged and skipped.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if topic_matches(&self.filter, &message.topic) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(filter = %self.filter, skipped, "subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn topic_matches(filter: &str, topic: &str) -> bool {
    match filter.strip_suffix("/#") {
        Some(base) => topic
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        None => filter == topic,
    }
}
