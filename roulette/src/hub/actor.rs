//! Hub actor: the single owner of the channel map.

use super::{
    errors::{HubError, HubResult},
    messages::{
        BroadcastMessage, Frame, HubStats, Payload, Subscriber, SubscriberId, SubscriptionMessage,
    },
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

/// Hub sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each of the two inbox streams
    pub inbox_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { inbox_size: 256 }
    }
}

/// Cloneable handle for talking to the hub actor
#[derive(Clone)]
pub struct HubHandle {
    subscriptions: mpsc::Sender<SubscriptionMessage>,
    broadcasts: mpsc::Sender<BroadcastMessage>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Allocate a subscriber handle and the receiving end of its frame buffer
    pub fn register(&self, buffer: usize) -> (Subscriber, mpsc::Receiver<Payload>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (Subscriber { id, sender }, receiver)
    }

    /// Add `subscriber` to `channel`. Repeating a subscription is a no-op.
    pub async fn subscribe(&self, subscriber: &Subscriber, channel: &str) -> HubResult<()> {
        self.subscriptions
            .send(SubscriptionMessage::Subscribe {
                subscriber: subscriber.clone(),
                channel: channel.to_string(),
            })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Remove a subscriber from every channel
    pub async fn unsubscribe(&self, id: SubscriberId) -> HubResult<()> {
        self.subscriptions
            .send(SubscriptionMessage::Unsubscribe { id })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Serialize `{channel, event, data}` once and fan it out
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        event: &str,
        data: &T,
    ) -> HubResult<()> {
        let frame = Frame {
            channel: channel.to_string(),
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        };
        self.publish(&frame).await
    }

    /// Fan out a frame that is already assembled
    pub async fn publish(&self, frame: &Frame) -> HubResult<()> {
        let payload: Payload = serde_json::to_string(frame)?.into();
        self.broadcasts
            .send(BroadcastMessage {
                channel: frame.channel.clone(),
                payload,
            })
            .await
            .map_err(|_| HubError::Closed)
    }

    pub async fn stats(&self) -> HubResult<HubStats> {
        let (response, receiver) = oneshot::channel();
        self.subscriptions
            .send(SubscriptionMessage::Stats { response })
            .await
            .map_err(|_| HubError::Closed)?;
        receiver.await.map_err(|_| HubError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.broadcasts.is_closed()
    }
}

/// Hub actor
pub struct HubActor {
    subscriptions: mpsc::Receiver<SubscriptionMessage>,
    broadcasts: mpsc::Receiver<BroadcastMessage>,

    /// channel -> subscribers
    channels: HashMap<String, HashMap<SubscriberId, mpsc::Sender<Payload>>>,

    stats: HubStats,
}

impl HubActor {
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (subscribe_tx, subscribe_rx) = mpsc::channel(config.inbox_size);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.inbox_size);

        let actor = Self {
            subscriptions: subscribe_rx,
            broadcasts: broadcast_rx,
            channels: HashMap::new(),
            stats: HubStats::default(),
        };

        let handle = HubHandle {
            subscriptions: subscribe_tx,
            broadcasts: broadcast_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };

        (actor, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        log::info!("Notification hub starting");

        loop {
            tokio::select! {
                // Subscriptions first, so a subscribe followed by a broadcast
                // from the same task reaches the new subscriber
                biased;

                Some(message) = self.subscriptions.recv() => {
                    self.handle_subscription(message);
                }

                Some(message) = self.broadcasts.recv() => {
                    self.fan_out(message);
                }

                else => break,
            }
        }

        log::info!("Notification hub stopped");
    }

    fn handle_subscription(&mut self, message: SubscriptionMessage) {
        match message {
            SubscriptionMessage::Subscribe {
                subscriber,
                channel,
            } => {
                log::debug!("Subscriber {} joined channel {}", subscriber.id, channel);
                self.channels
                    .entry(channel)
                    .or_default()
                    .insert(subscriber.id, subscriber.sender);
            }

            SubscriptionMessage::Unsubscribe { id } => {
                self.channels.retain(|_, subscribers| {
                    subscribers.remove(&id);
                    !subscribers.is_empty()
                });
                log::debug!("Subscriber {id} left all channels");
            }

            SubscriptionMessage::Stats { response } => {
                let mut stats = self.stats.clone();
                stats.channels = self.channels.len();
                stats.subscriptions = self.channels.values().map(HashMap::len).sum();
                let _ = response.send(stats);
            }
        }
    }

    /// Best-effort delivery: a full buffer skips that subscriber, a closed
    /// one is removed, and everyone else still gets the frame
    fn fan_out(&mut self, message: BroadcastMessage) {
        self.stats.broadcasts += 1;

        let Some(subscribers) = self.channels.get_mut(&message.channel) else {
            log::debug!("No subscribers on channel {}", message.channel);
            return;
        };

        let mut delivered = 0;
        let mut dropped = 0;
        subscribers.retain(|id, sender| {
            match sender.try_send(Arc::clone(&message.payload)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "Subscriber {} buffer full, dropping frame on {}",
                        id,
                        message.channel
                    );
                    dropped += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Subscriber {id} disconnected, removing");
                    false
                }
            }
        });

        let empty = subscribers.is_empty();
        if empty {
            self.channels.remove(&message.channel);
        }

        self.stats.delivered += delivered;
        self.stats.dropped += dropped;
    }
}
