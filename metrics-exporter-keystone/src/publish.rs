use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;
use tracing::{debug, info};

use crate::{event::Event, Error};

/// Convenience type for the future returned by a [`Publisher`].
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// Delivers serialized messages to the gateway.
pub trait Publisher: Send + Sync {
    /// Publishes a single serialized message.
    fn publish(&self, message: Vec<u8>) -> PublishFuture<'_>;
}

impl<P> Publisher for Arc<P>
where
    P: Publisher + ?Sized,
{
    fn publish(&self, message: Vec<u8>) -> PublishFuture<'_> {
        (**self).publish(message)
    }
}

#[derive(Serialize)]
struct Message<'a> {
    #[serde(rename = "appName")]
    app_name: &'a str,
    hostname: &'a str,
    ack: bool,
    #[serde(rename = "event")]
    events: &'a [Event],
}

/// Groups events into messages that respect the gateway's limits.
#[derive(Clone, Debug)]
pub(crate) struct MessageSplitter {
    pub app_name: String,
    pub hostname: String,
    pub max_message_size: usize,
    pub max_event_count: usize,
}

impl MessageSplitter {
    fn serialize(&self, events: &[Event]) -> Result<Vec<u8>, Error> {
        let message = Message { app_name: &self.app_name, hostname: &self.hostname, ack: false, events };
        Ok(serde_json::to_vec(&message)?)
    }

    /// Publishes `events`, in order, through `publisher`.
    ///
    /// Events are first grouped by the maximum event count. Any group whose serialized message is not smaller than the
    /// maximum message size is split in half, repeatedly, until every message fits.
    ///
    /// Publishing stops at the first failure.
    pub async fn publish<P>(&self, publisher: &P, events: &[Event]) -> Result<(), Error>
    where
        P: Publisher + ?Sized,
    {
        if events.is_empty() {
            return Err(Error::NoEvents);
        }

        for chunk in events.chunks(self.max_event_count.max(1)) {
            // Halves are pushed right then left, so that events are published in order.
            let mut pending = vec![chunk];
            while let Some(events) = pending.pop() {
                let message = self.serialize(events)?;
                if message.len() < self.max_message_size {
                    debug!(events = events.len(), bytes = message.len(), "Publishing message.");
                    publisher.publish(message).await?;
                    continue;
                }

                if events.len() == 1 {
                    return Err(Error::EventTooLarge { size: message.len(), limit: self.max_message_size });
                }

                info!(events = events.len(), bytes = message.len(), "Splitting message.");
                let (left, right) = events.split_at(events.len() / 2);
                pending.push(right);
                pending.push(left);
            }
        }

        Ok(())
    }
}
