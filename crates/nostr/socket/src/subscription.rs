//! Subscription correlation and message fan-out.
//!
//! Subscription ids tie a REQ or COUNT request to the relay's replies.
//! Every subscriber of the incoming stream owns an unbounded queue, so a slow
//! reader never loses messages and never holds up the receive loop.
//! [`SubscriptionReceiver`] narrows that stream down to the replies for one id.

use crate::error::{Result, SocketError};
use crate::incoming::IncomingMessage;
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Platform tag prefixed to every subscription id.
pub const PLATFORM_TAG: &str = std::env::consts::OS;

/// Generate a unique subscription ID: `<platform>-<uuid>`, lower-cased.
pub fn generate_subscription_id() -> String {
    format!("{}-{}", PLATFORM_TAG, Uuid::new_v4()).to_lowercase()
}

/// Registry of subscriber queues. Cloned into each session's publisher.
#[derive(Clone, Default)]
pub(crate) struct Fanout {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<IncomingMessage>>>>,
}

impl Fanout {
    /// Register a new subscriber. It sees every message published from now on.
    pub(crate) fn subscribe(&self) -> IncomingStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        IncomingStream { rx }
    }

    /// Queue `msg` for every subscriber, forgetting the ones that went away.
    pub(crate) fn publish(&self, msg: IncomingMessage) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(msg.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One subscriber's view of the incoming message stream, in wire order.
///
/// Ends once the client and every session publisher are gone.
pub struct IncomingStream {
    rx: mpsc::UnboundedReceiver<IncomingMessage>,
}

impl IncomingStream {
    /// Next message, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<IncomingMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<IncomingMessage> {
        self.rx.try_recv().ok()
    }
}

impl Stream for IncomingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Receives only the incoming messages that belong to one subscription.
///
/// `OK` and `AUTH` messages carry no subscription id and are never yielded.
/// A `NOTICE` is yielded only when the relay tagged it with this id.
pub struct SubscriptionReceiver {
    subscription_id: String,
    stream: IncomingStream,
}

impl SubscriptionReceiver {
    pub(crate) fn new(subscription_id: String, stream: IncomingStream) -> Self {
        Self {
            subscription_id,
            stream,
        }
    }

    /// Subscription id this receiver filters on.
    pub fn id(&self) -> &str {
        &self.subscription_id
    }

    /// Wait for the next message for this subscription.
    ///
    /// Returns [`SocketError::Closed`] once the client is gone.
    pub async fn recv(&mut self) -> Result<IncomingMessage> {
        loop {
            match self.stream.recv().await {
                Some(msg) if msg.subscription_id() == Some(self.subscription_id.as_str()) => {
                    return Ok(msg);
                }
                Some(_) => continue,
                None => return Err(SocketError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn eose(id: &str) -> IncomingMessage {
        IncomingMessage::Eose {
            subscription_id: id.to_string(),
        }
    }

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert!(id1.starts_with(&format!("{}-", PLATFORM_TAG)));
        assert_eq!(id1, id1.to_lowercase());
        // platform tag + '-' + hyphenated uuid
        assert_eq!(id1.len(), PLATFORM_TAG.len() + 1 + 36);
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn test_receiver_filters_by_subscription() {
        let fanout = Fanout::default();
        let mut receiver = SubscriptionReceiver::new("sub-a".to_string(), fanout.subscribe());

        fanout.publish(eose("sub-b"));
        fanout.publish(IncomingMessage::Auth {
            challenge: "c".to_string(),
        });
        fanout.publish(eose("sub-a"));

        let msg = receiver.recv().await.unwrap();
        assert_eq!(msg.subscription_id(), Some("sub-a"));
        assert_eq!(receiver.id(), "sub-a");
    }

    #[tokio::test]
    async fn test_receiver_closed() {
        let fanout = Fanout::default();
        let mut receiver = SubscriptionReceiver::new("sub-a".to_string(), fanout.subscribe());
        drop(fanout);

        assert_eq!(receiver.recv().await.unwrap_err(), SocketError::Closed);
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_nothing() {
        let fanout = Fanout::default();
        let mut receiver = SubscriptionReceiver::new("q".to_string(), fanout.subscribe());

        for _ in 0..10_000 {
            fanout.publish(eose("other"));
        }
        fanout.publish(eose("q"));
        for _ in 0..10_000 {
            fanout.publish(eose("other"));
        }

        assert_eq!(receiver.recv().await.unwrap(), eose("q"));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_message() {
        let fanout = Fanout::default();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();

        fanout.publish(eose("a"));
        fanout.publish(eose("b"));

        for stream in [&mut first, &mut second] {
            assert_eq!(stream.next().await, Some(eose("a")));
            assert_eq!(stream.recv().await, Some(eose("b")));
        }
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let fanout = Fanout::default();
        let kept = fanout.subscribe();
        drop(fanout.subscribe());

        fanout.publish(eose("a"));
        assert_eq!(fanout.subscriber_count(), 1);
        drop(kept);
    }
}
