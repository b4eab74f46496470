//! Communication manager.
//!
//! Wires a transport binding, the event dispatcher, and the correlation
//! table into one communication session. Every transport subscription
//! forwards into a single inbound channel consumed by one loop, which
//! routes response events to the correlation table, other Coaty events to
//! the dispatcher, and unparseable traffic to raw observers.

use crate::correlation::{CorrelationError, CorrelationTable, ResponseStream};
use crate::dispatch::{EventDispatcher, EventObservation, RawObservation};
use crate::event::InboundEvent;
use crate::options::{CommunicationOptions, OptionsError};
use bytes::Bytes;
use coaty_protocol::{EventType, Topic, TopicError};
use coaty_transport::{Transport, TransportError, TransportMessage};
use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Communication manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Options failed validation.
    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),

    /// Outbound topic could not be built.
    #[error("{0}")]
    Topic(#[from] TopicError),

    /// Transport operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Correlation entry could not be opened.
    #[error("{0}")]
    Correlation(#[from] CorrelationError),

    /// A response was published against the wrong kind of request.
    #[error("Expected a {expected} request, got {actual}")]
    RequestTypeMismatch {
        /// Request type the response operation serves.
        expected: EventType,
        /// Request type actually found on the event.
        actual: EventType,
    },

    /// A response was published against a request without a correlation id.
    #[error("Request event carries no correlation id")]
    MissingCorrelationId,
}

/// One agent's communication session over a transport.
///
/// Construct with [`CommunicationManager::start`], publish and observe
/// events, and call [`stop`](CommunicationManager::stop) when done.
pub struct CommunicationManager {
    options: CommunicationOptions,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    correlations: CorrelationTable,
    inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    /// Live transport subscriptions per filter string. Observations that
    /// share a filter share one entry; the subscription is released only
    /// when the count drops to zero.
    filter_refs: Arc<DashMap<String, usize>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CommunicationManager {
    /// Start a communication session.
    ///
    /// # Errors
    ///
    /// Returns an error if the options fail validation.
    pub fn start(
        transport: Arc<dyn Transport>,
        options: CommunicationOptions,
    ) -> Result<Arc<Self>, ManagerError> {
        options.validate()?;

        let dispatcher = EventDispatcher::new();
        let correlations = CorrelationTable::new();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<TransportMessage>();

        let consumer = {
            let dispatcher = dispatcher.clone();
            let correlations = correlations.clone();
            tokio::spawn(async move {
                while let Some(msg) = inbound_rx.recv().await {
                    match Topic::parse(&msg.topic) {
                        Ok(topic) if topic.event_type.is_response() => {
                            correlations.deliver(InboundEvent::new(topic, msg.payload));
                        }
                        Ok(topic) => {
                            dispatcher.dispatch_event(&InboundEvent::new(topic, msg.payload));
                        }
                        Err(error) => {
                            trace!(topic = %msg.topic, %error, "Non-Coaty inbound message");
                            dispatcher.dispatch_raw(&msg.topic, &msg.payload);
                        }
                    }
                }
            })
        };

        debug!(
            namespace = %options.namespace,
            source = %options.source_id,
            transport = transport.name(),
            "Communication manager started"
        );

        Ok(Arc::new(Self {
            options,
            transport,
            dispatcher,
            correlations,
            inbound_tx,
            filter_refs: Arc::new(DashMap::new()),
            tasks: Mutex::new(vec![consumer]),
        }))
    }

    /// The options this session was started with.
    #[must_use]
    pub fn options(&self) -> &CommunicationOptions {
        &self.options
    }

    /// Number of outstanding two-way requests.
    #[must_use]
    pub fn open_request_count(&self) -> usize {
        self.correlations.len()
    }

    /// Stop the session, aborting its background tasks. Idempotent.
    /// Outstanding observations and response streams end as their
    /// transport subscriptions go away.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
        debug!(namespace = %self.options.namespace, "Communication manager stopped");
    }

    // ---- one-way publish ----

    /// Advertise a domain object of the given object type.
    pub async fn publish_advertise(
        &self,
        object_type: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.publish_one_way(EventType::Advertise, Some(object_type), payload.into())
            .await
    }

    /// Deadvertise objects; the payload carries the object ids.
    pub async fn publish_deadvertise(
        &self,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.publish_one_way(EventType::Deadvertise, None, payload.into())
            .await
    }

    /// Publish on a channel identified by the given channel id.
    pub async fn publish_channel(
        &self,
        channel_id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.publish_one_way(EventType::Channel, Some(channel_id), payload.into())
            .await
    }

    /// Associate an IO source with an IO actor within an IO context.
    pub async fn publish_associate(
        &self,
        io_context: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.publish_one_way(EventType::Associate, Some(io_context), payload.into())
            .await
    }

    /// Publish an IO value.
    pub async fn publish_io_value(
        &self,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.publish_one_way(EventType::IoValue, None, payload.into())
            .await
    }

    async fn publish_one_way(
        &self,
        event_type: EventType,
        event_filter: Option<&str>,
        payload: Bytes,
    ) -> Result<(), ManagerError> {
        let topic = Topic::publish_topic(
            &self.options.namespace,
            self.options.source_id,
            event_type,
            event_filter,
            None,
        )?;
        self.transport.publish(&topic, payload).await?;
        Ok(())
    }

    // ---- two-way publish ----

    /// Discover objects. Any number of agents may resolve.
    pub async fn publish_discover(
        &self,
        payload: impl Into<Bytes>,
    ) -> Result<ResponseStream, ManagerError> {
        self.publish_two_way(EventType::Discover, None, payload.into())
            .await
    }

    /// Query objects. Any number of agents may retrieve.
    pub async fn publish_query(
        &self,
        payload: impl Into<Bytes>,
    ) -> Result<ResponseStream, ManagerError> {
        self.publish_two_way(EventType::Query, None, payload.into())
            .await
    }

    /// Update an object of the given object type. The first Complete
    /// response closes the exchange.
    pub async fn publish_update(
        &self,
        object_type: &str,
        payload: impl Into<Bytes>,
    ) -> Result<ResponseStream, ManagerError> {
        self.publish_two_way(EventType::Update, Some(object_type), payload.into())
            .await
    }

    /// Call a remote operation. Any number of agents may return.
    pub async fn publish_call(
        &self,
        operation: &str,
        payload: impl Into<Bytes>,
    ) -> Result<ResponseStream, ManagerError> {
        self.publish_two_way(EventType::Call, Some(operation), payload.into())
            .await
    }

    async fn publish_two_way(
        &self,
        event_type: EventType,
        event_filter: Option<&str>,
        payload: Bytes,
    ) -> Result<ResponseStream, ManagerError> {
        let response_type = event_type
            .response_type()
            .ok_or(CorrelationError::NotTwoWay(event_type))?;
        let correlation_id = Uuid::new_v4().to_string();

        // Build the request topic first so an invalid combination fails
        // before anything touches the transport.
        let topic = Topic::publish_topic(
            &self.options.namespace,
            self.options.source_id,
            event_type,
            event_filter,
            Some(&correlation_id),
        )?;

        let response_filter = Topic::subscribe_filter(
            response_type,
            None,
            Some(&self.options.namespace),
            Some(&correlation_id),
        )?;
        let forward = self.forward(&response_filter).await?;
        let cleanup = self.release_filter_on_close(response_filter, forward);

        let stream = self.correlations.open(
            correlation_id,
            event_type,
            self.options.response_timeout,
            Some(cleanup),
        )?;

        // A failed publish drops the stream, which closes the entry and
        // releases the response subscription.
        self.transport.publish(&topic, payload).await?;
        Ok(stream)
    }

    // ---- responses ----

    /// Resolve a Discover request.
    pub async fn publish_resolve(
        &self,
        request: &InboundEvent,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.respond_to(request, EventType::Discover, payload.into())
            .await
    }

    /// Retrieve for a Query request.
    pub async fn publish_retrieve(
        &self,
        request: &InboundEvent,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.respond_to(request, EventType::Query, payload.into())
            .await
    }

    /// Complete an Update request.
    pub async fn publish_complete(
        &self,
        request: &InboundEvent,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.respond_to(request, EventType::Update, payload.into())
            .await
    }

    /// Return the result of a Call request.
    pub async fn publish_return(
        &self,
        request: &InboundEvent,
        payload: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.respond_to(request, EventType::Call, payload.into())
            .await
    }

    async fn respond_to(
        &self,
        request: &InboundEvent,
        expected: EventType,
        payload: Bytes,
    ) -> Result<(), ManagerError> {
        if request.topic.event_type != expected {
            return Err(ManagerError::RequestTypeMismatch {
                expected,
                actual: request.topic.event_type,
            });
        }
        let response_type = expected
            .response_type()
            .ok_or(CorrelationError::NotTwoWay(expected))?;
        let correlation_id = request
            .topic
            .correlation_id
            .as_deref()
            .ok_or(ManagerError::MissingCorrelationId)?;

        // Respond in the requester's namespace; its response subscription
        // is pinned there.
        let topic = Topic::publish_topic(
            &request.topic.namespace,
            self.options.source_id,
            response_type,
            None,
            Some(correlation_id),
        )?;
        self.transport.publish(&topic, payload).await?;
        Ok(())
    }

    // ---- observe ----

    /// Observe Advertise events for the given object type.
    pub async fn observe_advertise(
        &self,
        object_type: &str,
    ) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Advertise, Some(object_type))
            .await
    }

    /// Observe Deadvertise events.
    pub async fn observe_deadvertise(&self) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Deadvertise, None).await
    }

    /// Observe Channel events for the given channel id.
    pub async fn observe_channel(
        &self,
        channel_id: &str,
    ) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Channel, Some(channel_id)).await
    }

    /// Observe Associate events for the given IO context.
    pub async fn observe_associate(
        &self,
        io_context: &str,
    ) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Associate, Some(io_context))
            .await
    }

    /// Observe IoValue events.
    pub async fn observe_io_value(&self) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::IoValue, None).await
    }

    /// Observe incoming Discover requests.
    pub async fn observe_discover(&self) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Discover, None).await
    }

    /// Observe incoming Query requests.
    pub async fn observe_query(&self) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Query, None).await
    }

    /// Observe incoming Update requests for the given object type.
    pub async fn observe_update(
        &self,
        object_type: &str,
    ) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Update, Some(object_type)).await
    }

    /// Observe incoming Call requests for the given operation.
    pub async fn observe_call(
        &self,
        operation: &str,
    ) -> Result<EventObservation, ManagerError> {
        self.observe_one(EventType::Call, Some(operation)).await
    }

    /// Observe raw (non-Coaty) traffic matching a wildcard topic filter.
    pub async fn observe_raw(
        &self,
        topic_filter: &str,
    ) -> Result<RawObservation, ManagerError> {
        let forward = self.forward(topic_filter).await?;
        let mut observation = self.dispatcher.observe_raw(topic_filter);
        observation.on_dispose(self.release_filter_on_close(topic_filter.to_string(), forward));
        Ok(observation)
    }

    async fn observe_one(
        &self,
        event_type: EventType,
        event_filter: Option<&str>,
    ) -> Result<EventObservation, ManagerError> {
        let topic_filter = Topic::subscribe_filter(
            event_type,
            event_filter,
            Some(&self.options.namespace),
            None,
        )?;
        let forward = self.forward(&topic_filter).await?;
        let mut observation =
            self.dispatcher
                .observe(event_type, event_filter, Some(&self.options.namespace));
        observation.on_dispose(self.release_filter_on_close(topic_filter, forward));
        Ok(observation)
    }

    // ---- plumbing ----

    /// Subscribe a transport filter and forward its messages into the
    /// inbound channel.
    async fn forward(&self, filter: &str) -> Result<JoinHandle<()>, ManagerError> {
        let mut stream = self.transport.subscribe(filter).await?;
        *self.filter_refs.entry(filter.to_string()).or_insert(0) += 1;
        let inbound = self.inbound_tx.clone();
        Ok(tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                if inbound.send(msg).is_err() {
                    break;
                }
            }
        }))
    }

    /// Build a cleanup hook that tears down one observation's share of a
    /// transport subscription. The filter itself is unsubscribed only when
    /// its last user closes; observations sharing the same filter string
    /// keep their own streams.
    fn release_filter_on_close(
        &self,
        filter: String,
        forward: JoinHandle<()>,
    ) -> Box<dyn FnOnce() + Send + Sync> {
        let transport = Arc::clone(&self.transport);
        let refs = Arc::clone(&self.filter_refs);
        Box::new(move || {
            forward.abort();
            let last_user = refs
                .remove_if_mut(&filter, |_, count| {
                    *count -= 1;
                    *count == 0
                })
                .is_some();
            if !last_user {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = transport.unsubscribe(&filter).await;
                    });
                }
                Err(_) => warn!(filter = %filter, "No runtime to release subscription"),
            }
        })
    }
}
