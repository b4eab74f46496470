//! In-process loopback broker.
//!
//! Routes published messages to every live subscription whose filter
//! matches, using the same wildcard semantics as an MQTT broker. Used by
//! tests and by agents running single-process setups without a broker.

use crate::traits::{
    SubscriptionStream, Transport, TransportError, TransportMessage,
};
use async_trait::async_trait;
use bytes::Bytes;
use coaty_protocol::matcher;
use coaty_protocol::topic::{is_valid_publication_topic, is_valid_subscription_topic};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// An in-memory pub/sub broker.
///
/// Clone-free by design; share it behind an `Arc`. Subscriptions are keyed
/// by their raw filter string, with one sender per open stream.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    subscriptions: DashMap<String, Vec<mpsc::UnboundedSender<TransportMessage>>>,
}

impl InMemoryBroker {
    /// Create a new broker with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct filters currently subscribed.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if !is_valid_publication_topic(topic) {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        let mut delivered = 0usize;
        for mut entry in self.subscriptions.iter_mut() {
            if !matcher::matches(topic, entry.key()) {
                continue;
            }
            // Senders whose stream was dropped are pruned on the way.
            entry.value_mut().retain(|tx| {
                tx.send(TransportMessage::new(topic, payload.clone())).is_ok()
            });
            delivered += entry.value().len();
        }
        trace!(topic = %topic, recipients = delivered, "Published message");
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<SubscriptionStream, TransportError> {
        if !is_valid_subscription_topic(filter) {
            return Err(TransportError::InvalidFilter(filter.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .entry(filter.to_string())
            .or_default()
            .push(tx);
        debug!(filter = %filter, "Subscribed");
        Ok(SubscriptionStream::new(filter, rx))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        // Dropping the senders ends the associated streams.
        if self.subscriptions.remove(filter).is_some() {
            debug!(filter = %filter, "Unsubscribed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
