//! Hub message types and the wire frame.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Identifier of one live connection
pub type SubscriberId = u64;

/// Serialized frame shared by every recipient of a broadcast
pub type Payload = Arc<str>;

/// JSON frame exchanged with live clients: `{channel, event, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Subscriber handle registered with the hub
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub sender: mpsc::Sender<Payload>,
}

/// Subscription stream: changes to the channel map and stats queries
#[derive(Debug)]
pub enum SubscriptionMessage {
    Subscribe {
        subscriber: Subscriber,
        channel: String,
    },

    /// Remove the subscriber from every channel
    Unsubscribe { id: SubscriberId },

    Stats { response: oneshot::Sender<HubStats> },
}

/// Broadcast stream: one already-serialized frame for one channel
#[derive(Debug)]
pub struct BroadcastMessage {
    pub channel: String,
    pub payload: Payload,
}

/// Point-in-time hub counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub channels: usize,
    pub subscriptions: usize,
    pub broadcasts: u64,
    pub delivered: u64,
    /// Deliveries skipped because the subscriber's buffer was full
    pub dropped: u64,
}
