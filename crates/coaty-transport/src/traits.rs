//! Transport abstraction traits for Coaty.
//!
//! A transport is any pub/sub binding able to publish to a topic and to
//! deliver messages matching a subscription filter. Connection lifecycle
//! (connect, reconnect, TLS) is owned entirely by the binding; the protocol
//! core only publishes and subscribes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;

/// A raw message delivered by a transport subscription.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Concrete topic the message was published on.
    pub topic: String,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl TransportMessage {
    /// Create a new transport message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is shut down.
    #[error("Transport closed")]
    Closed,

    /// The topic is not a valid publication topic.
    #[error("Invalid publication topic: {0:?}")]
    InvalidTopic(String),

    /// The filter is not a valid subscription filter.
    #[error("Invalid subscription filter: {0:?}")]
    InvalidFilter(String),

    /// Failed to hand a message to the transport.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Other binding-specific error.
    #[error("{0}")]
    Other(String),
}

/// Messages delivered for one subscription filter.
///
/// Yields every message whose topic matches the filter the stream was
/// created for. The stream ends when the filter is unsubscribed or the
/// transport shuts down.
#[derive(Debug)]
pub struct SubscriptionStream {
    filter: String,
    receiver: mpsc::UnboundedReceiver<TransportMessage>,
}

impl SubscriptionStream {
    /// Create a stream from a raw receiver, for use by transport bindings.
    #[must_use]
    pub fn new(filter: impl Into<String>, receiver: mpsc::UnboundedReceiver<TransportMessage>) -> Self {
        Self {
            filter: filter.into(),
            receiver,
        }
    }

    /// The subscription filter this stream belongs to.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Receive the next message, or `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.receiver.recv().await
    }
}

impl Stream for SubscriptionStream {
    type Item = TransportMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A pub/sub transport binding.
///
/// Implementations must deliver messages at most once and make no ordering
/// guarantees across topics.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload on a concrete topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to all messages whose topic matches the given filter.
    ///
    /// Subscribing to the same filter more than once yields independent
    /// streams that each receive every matching message.
    async fn subscribe(&self, filter: &str) -> Result<SubscriptionStream, TransportError>;

    /// Drop all subscriptions for the given filter, ending their streams.
    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Get the binding name (e.g., "mqtt", "memory").
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_stream_recv() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = SubscriptionStream::new("a/#", rx);
        assert_eq!(stream.filter(), "a/#");

        tx.send(TransportMessage::new("a/b", b"payload".to_vec()))
            .unwrap();
        let msg = stream.recv().await.unwrap();
        assert_eq!(msg.topic, "a/b");
        assert_eq!(&msg.payload[..], b"payload");

        drop(tx);
        assert!(stream.recv().await.is_none());
    }
}
