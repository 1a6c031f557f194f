//! Notification hub: a single-owner publish/subscribe broker.
//!
//! [`HubActor`] owns the channel map and is reached only through a
//! [`HubHandle`], which feeds two streams: subscription changes and
//! broadcasts. Frames are serialized once per broadcast and shared across
//! subscribers. Delivery is at-most-once with no backlog for late joiners.
//!
//! ## Example
//!
//! ```
//! use roulette::hub::{HubActor, HubConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (actor, hub) = HubActor::new(HubConfig::default());
//! tokio::spawn(actor.run());
//!
//! let (subscriber, mut frames) = hub.register(16);
//! hub.subscribe(&subscriber, "roulette").await?;
//! hub.broadcast("roulette", "winner", &serde_json::json!({"color": "green", "number": 0}))
//!     .await?;
//!
//! let frame = frames.recv().await.unwrap();
//! assert!(frame.contains("\"event\":\"winner\""));
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod errors;
pub mod messages;

pub use actor::{HubActor, HubConfig, HubHandle};
pub use errors::{HubError, HubResult};
pub use messages::{Frame, HubStats, Payload, Subscriber, SubscriberId};

/// Channel carrying round lifecycle events
pub const ROULETTE_CHANNEL: &str = "roulette";

/// Channel carrying ledger movements
pub const BALANCE_CHANNEL: &str = "balance-channel";
