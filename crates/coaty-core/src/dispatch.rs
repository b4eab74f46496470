//! Inbound event dispatch.
//!
//! The dispatcher keeps the local subscription registry and fans each
//! inbound event out to every compatible registration. Typed registrations
//! match on event type, exact event filter, and namespace; raw
//! registrations match unparseable traffic against a wildcard topic filter.
//!
//! Delivery order across registrations is unspecified, and one slow or
//! dropped observer never affects the others.

use crate::event::{InboundEvent, RawEvent};
use bytes::Bytes;
use coaty_protocol::{matcher, EventType, Topic};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifier of one registration in the dispatcher.
pub type SubscriptionId = u64;

type Cleanup = Box<dyn FnOnce() + Send + Sync>;

struct TypedRegistration {
    event_type: EventType,
    /// Exact-match filter; `None` matches any filter on the topic.
    event_filter: Option<String>,
    /// Exact-match namespace; `None` matches any namespace.
    namespace: Option<String>,
    sender: mpsc::UnboundedSender<InboundEvent>,
}

impl TypedRegistration {
    fn accepts(&self, topic: &Topic) -> bool {
        if self.event_type != topic.event_type {
            return false;
        }
        if let Some(namespace) = &self.namespace {
            if *namespace != topic.namespace {
                return false;
            }
        }
        if let Some(filter) = &self.event_filter {
            if Some(filter.as_str()) != topic.event_filter.as_deref() {
                return false;
            }
        }
        true
    }
}

struct RawRegistration {
    topic_filter: String,
    sender: mpsc::UnboundedSender<RawEvent>,
}

#[derive(Default)]
struct Registry {
    typed: DashMap<SubscriptionId, TypedRegistration>,
    raw: DashMap<SubscriptionId, RawRegistration>,
    next_id: AtomicU64,
}

/// The local subscription registry and inbound fan-out.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations, typed and raw.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.typed.len() + self.registry.raw.len()
    }

    /// Register interest in a Coaty event type.
    ///
    /// `event_filter` and `namespace` narrow the match; `None` accepts any
    /// value in that position.
    pub fn observe(
        &self,
        event_type: EventType,
        event_filter: Option<&str>,
        namespace: Option<&str>,
    ) -> EventObservation {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.registry.typed.insert(
            id,
            TypedRegistration {
                event_type,
                event_filter: event_filter.map(str::to_string),
                namespace: namespace.map(str::to_string),
                sender,
            },
        );
        debug!(subscription = id, event = %event_type, "Observation registered");
        EventObservation {
            id,
            dispatcher: self.clone(),
            receiver,
            cleanup: None,
            disposed: false,
        }
    }

    /// Register interest in raw (non-Coaty) traffic matching a wildcard
    /// topic filter.
    pub fn observe_raw(&self, topic_filter: &str) -> RawObservation {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.registry.raw.insert(
            id,
            RawRegistration {
                topic_filter: topic_filter.to_string(),
                sender,
            },
        );
        debug!(subscription = id, filter = %topic_filter, "Raw observation registered");
        RawObservation {
            id,
            dispatcher: self.clone(),
            receiver,
            cleanup: None,
            disposed: false,
        }
    }

    /// Dispatch an inbound transport message.
    ///
    /// Parseable Coaty topics go to typed registrations; anything else is
    /// raw traffic and goes to raw registrations only. Returns the number
    /// of registrations that received the message.
    pub fn dispatch(&self, topic: &str, payload: Bytes) -> usize {
        match Topic::parse(topic) {
            Ok(parsed) => self.dispatch_event(&InboundEvent::new(parsed, payload)),
            Err(err) => {
                trace!(topic = %topic, error = %err, "Non-Coaty topic, dispatching raw");
                self.dispatch_raw(topic, &payload)
            }
        }
    }

    /// Fan a decoded Coaty event out to all compatible typed registrations.
    pub fn dispatch_event(&self, event: &InboundEvent) -> usize {
        let mut delivered = 0usize;
        let mut stale = Vec::new();
        for entry in self.registry.typed.iter() {
            if !entry.accepts(&event.topic) {
                continue;
            }
            // A closed receiver only means that observer is gone.
            if entry.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                stale.push(*entry.key());
            }
        }
        for id in stale {
            self.registry.typed.remove(&id);
        }
        trace!(event = %event.topic.event_type, recipients = delivered, "Dispatched event");
        delivered
    }

    /// Fan raw traffic out to all raw registrations whose filter matches.
    pub fn dispatch_raw(&self, topic: &str, payload: &Bytes) -> usize {
        let mut delivered = 0usize;
        let mut stale = Vec::new();
        for entry in self.registry.raw.iter() {
            if !matcher::matches(topic, &entry.topic_filter) {
                continue;
            }
            let event = RawEvent::new(topic, payload.clone());
            if entry.sender.send(event).is_ok() {
                delivered += 1;
            } else {
                stale.push(*entry.key());
            }
        }
        for id in stale {
            self.registry.raw.remove(&id);
        }
        delivered
    }

    fn remove_typed(&self, id: SubscriptionId) {
        if self.registry.typed.remove(&id).is_some() {
            debug!(subscription = id, "Observation disposed");
        }
    }

    fn remove_raw(&self, id: SubscriptionId) {
        if self.registry.raw.remove(&id).is_some() {
            debug!(subscription = id, "Raw observation disposed");
        }
    }
}

/// Handle on one typed registration.
///
/// Receives matching events until disposed. Disposal is idempotent,
/// happens on drop, and synchronously stops further delivery.
pub struct EventObservation {
    id: SubscriptionId,
    dispatcher: EventDispatcher,
    receiver: mpsc::UnboundedReceiver<InboundEvent>,
    cleanup: Option<Cleanup>,
    disposed: bool,
}

impl EventObservation {
    /// Receive the next matching event, or `None` once disposed and
    /// drained.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<InboundEvent> {
        self.receiver.try_recv().ok()
    }

    /// Install a hook that runs once when the observation is disposed.
    pub fn on_dispose(&mut self, cleanup: Cleanup) {
        self.cleanup = Some(cleanup);
    }

    /// Deregister. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.dispatcher.remove_typed(self.id);
            if let Some(cleanup) = self.cleanup.take() {
                cleanup();
            }
        }
    }
}

impl Drop for EventObservation {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Handle on one raw registration. Same lifecycle as [`EventObservation`].
pub struct RawObservation {
    id: SubscriptionId,
    dispatcher: EventDispatcher,
    receiver: mpsc::UnboundedReceiver<RawEvent>,
    cleanup: Option<Cleanup>,
    disposed: bool,
}

impl RawObservation {
    /// Receive the next matching raw message, or `None` once disposed and
    /// drained.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<RawEvent> {
        self.receiver.try_recv().ok()
    }

    /// Install a hook that runs once when the observation is disposed.
    pub fn on_dispose(&mut self, cleanup: Cleanup) {
        self.cleanup = Some(cleanup);
    }

    /// Deregister. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.dispatcher.remove_raw(self.id);
            if let Some(cleanup) = self.cleanup.take() {
                cleanup();
            }
        }
    }
}

impl Drop for RawObservation {
    fn drop(&mut self) {
        self.dispose();
    }
}
