//! Notification jobs scheduled after a round transaction commits.

use crate::dispatch::Job;
use crate::hub::{Frame, HubHandle};
use async_trait::async_trait;
use serde::Serialize;

/// Publish one frame through the hub
pub struct SendEventJob {
    hub: HubHandle,
    frame: Frame,
}

impl SendEventJob {
    pub fn new<T: Serialize + ?Sized>(
        hub: HubHandle,
        channel: &str,
        event: &str,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            hub,
            frame: Frame {
                channel: channel.to_string(),
                event: event.to_string(),
                data: serde_json::to_value(data)?,
            },
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

#[async_trait]
impl Job for SendEventJob {
    fn name(&self) -> &'static str {
        "send_event"
    }

    async fn execute(self: Box<Self>) -> anyhow::Result<()> {
        self.hub.publish(&self.frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubActor, HubConfig};

    #[tokio::test]
    async fn test_job_publishes_frame() {
        let (actor, hub) = HubActor::new(HubConfig::default());
        tokio::spawn(actor.run());
        let (subscriber, mut frames) = hub.register(4);
        hub.subscribe(&subscriber, "roulette").await.unwrap();

        let job = SendEventJob::new(hub.clone(), "roulette", "closed", &[1, 2]).unwrap();
        assert_eq!(job.frame().event, "closed");
        Box::new(job).execute().await.unwrap();

        let frame: Frame = serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
        assert_eq!(frame.data, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_job_fails_when_hub_is_gone() {
        let (actor, hub) = HubActor::new(HubConfig::default());
        drop(actor);
        let job = SendEventJob::new(hub, "roulette", "winner", &()).unwrap();
        assert!(Box::new(job).execute().await.is_err());
    }
}
