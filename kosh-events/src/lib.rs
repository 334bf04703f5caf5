//! Real-time event fan-out.
//!
//! Components publish onto an in-process broadcast channel; subscribers
//! receive a filtered stream over SSE. Publication is fire-and-forget: a
//! failed or lagging delivery never fails the publishing transaction.

pub mod api;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Users,
    Wallets,
    Transactions,
    Risk,
    /// Meta-topic: subscribers to `all` receive every event.
    All,
}

impl Topic {
    pub fn parse(s: &str) -> Option<Topic> {
        match s {
            "users" => Some(Topic::Users),
            "wallets" => Some(Topic::Wallets),
            "transactions" => Some(Topic::Transactions),
            "risk" => Some(Topic::Risk),
            "all" => Some(Topic::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    pub topic: Topic,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn matches(&self, subscribed: &[Topic]) -> bool {
        subscribed
            .iter()
            .any(|t| *t == Topic::All || *t == self.topic)
    }
}

#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<EventRecord>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes an event. Never fails: with no subscribers the event is
    /// simply dropped.
    pub fn publish(&self, event_type: &str, topic: Topic, data: serde_json::Value) {
        let record = EventRecord {
            event_type: event_type.to_string(),
            topic,
            data,
            timestamp: Utc::now(),
        };
        match self.tx.send(record) {
            Ok(subscribers) => {
                tracing::debug!(event = event_type, subscribers, "event published")
            }
            Err(_) => tracing::debug!(event = event_type, "event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
