//! Event correlation for two-way exchanges.
//!
//! Every two-way request opens a correlation entry keyed by its correlation
//! id. Inbound responses are routed to the entry's stream; request types
//! with multiple responders keep the entry open until the owner disposes it
//! or a timeout elapses. Closing an entry releases its transport resources
//! through a cleanup hook installed at open time.

use crate::event::InboundEvent;
use coaty_protocol::EventType;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// How many responses a request type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// The first matching response closes the exchange.
    Single,
    /// The exchange stays open for any number of responses.
    Multiple,
}

impl ResponseMode {
    /// The response mode of a two-way request type, or `None` for event
    /// types that are not two-way requests.
    ///
    /// Discover, Query, and Call may be answered by any number of agents;
    /// Update completes on the first response.
    #[must_use]
    pub fn for_request(event_type: EventType) -> Option<ResponseMode> {
        match event_type {
            EventType::Discover | EventType::Query | EventType::Call => {
                Some(ResponseMode::Multiple)
            }
            EventType::Update => Some(ResponseMode::Single),
            _ => None,
        }
    }
}

/// Correlation errors.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// The event type is not a two-way request.
    #[error("Event type {0} is not a two-way request")]
    NotTwoWay(EventType),

    /// A correlation entry with this id is already open.
    #[error("Correlation id already open: {0:?}")]
    AlreadyOpen(String),
}

/// A signal delivered on a response stream.
#[derive(Debug)]
pub enum CorrelationSignal {
    /// A correlated response event.
    Response(InboundEvent),
    /// The entry's deadline elapsed. Delivered at most once, after which
    /// the stream ends.
    TimedOut,
}

type Cleanup = Box<dyn FnOnce() + Send + Sync>;

struct CorrelationEntry {
    request_type: EventType,
    mode: ResponseMode,
    sender: mpsc::UnboundedSender<CorrelationSignal>,
    opened_at: Instant,
    cleanup: Option<Cleanup>,
}

impl CorrelationEntry {
    /// Close the entry, optionally signalling a timeout, and release its
    /// resources. Consumes the entry so this runs at most once.
    fn close(mut self, timed_out: bool) {
        if timed_out {
            let _ = self.sender.send(CorrelationSignal::TimedOut);
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        trace!(
            request = %self.request_type,
            open_for = ?self.opened_at.elapsed(),
            timed_out,
            "Correlation entry closed"
        );
    }
}

/// The process-wide table of outstanding two-way requests.
///
/// Cheap to clone; all clones share the same entries.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    entries: Arc<DashMap<String, CorrelationEntry>>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no open entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry is still open.
    #[must_use]
    pub fn is_open(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    /// Open a correlation entry for an outbound two-way request.
    ///
    /// The returned [`ResponseStream`] is the exclusive handle on the
    /// entry; dropping or disposing it closes the entry. If a `timeout` is
    /// given, the entry closes on expiry and the stream yields
    /// [`CorrelationSignal::TimedOut`] exactly once. The `cleanup` hook
    /// runs exactly once when the entry closes, however it closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the event type is not a two-way request or the
    /// id is already open.
    pub fn open(
        &self,
        correlation_id: impl Into<String>,
        request_type: EventType,
        timeout: Option<Duration>,
        cleanup: Option<Cleanup>,
    ) -> Result<ResponseStream, CorrelationError> {
        let correlation_id = correlation_id.into();
        let mode = ResponseMode::for_request(request_type)
            .ok_or(CorrelationError::NotTwoWay(request_type))?;
        if self.entries.contains_key(&correlation_id) {
            return Err(CorrelationError::AlreadyOpen(correlation_id));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.entries.insert(
            correlation_id.clone(),
            CorrelationEntry {
                request_type,
                mode,
                sender,
                opened_at: Instant::now(),
                cleanup,
            },
        );
        debug!(correlation = %correlation_id, request = %request_type, "Correlation entry opened");

        if let Some(timeout) = timeout {
            // The timer holds only a weak handle so a dropped table does
            // not linger for the full timeout.
            let entries = Arc::downgrade(&self.entries);
            let id = correlation_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(entries) = entries.upgrade() {
                    if let Some((_, entry)) = entries.remove(&id) {
                        entry.close(true);
                    }
                }
            });
        }

        Ok(ResponseStream {
            correlation_id,
            table: self.clone(),
            receiver,
            disposed: false,
        })
    }

    /// Route an inbound response event to its waiting entry.
    ///
    /// Returns `true` if the event was delivered. Events without a
    /// correlation id or with an unknown or closed id are dropped; late
    /// responses racing a cancellation are expected, not an error.
    pub fn deliver(&self, event: InboundEvent) -> bool {
        let Some(correlation_id) = event.topic.correlation_id.clone() else {
            trace!("Response event without correlation id dropped");
            return false;
        };

        let mode = match self.entries.get(&correlation_id) {
            Some(entry) => entry.mode,
            None => {
                trace!(correlation = %correlation_id, "Unmatched response dropped");
                return false;
            }
        };

        match mode {
            ResponseMode::Multiple => {
                if let Some(entry) = self.entries.get(&correlation_id) {
                    return entry.sender.send(CorrelationSignal::Response(event)).is_ok();
                }
                false
            }
            ResponseMode::Single => {
                // Single-shot exchanges close on first delivery.
                if let Some((_, entry)) = self.entries.remove(&correlation_id) {
                    let delivered =
                        entry.sender.send(CorrelationSignal::Response(event)).is_ok();
                    entry.close(false);
                    return delivered;
                }
                false
            }
        }
    }

    /// Close an entry without a timeout signal. Idempotent; only the
    /// owning [`ResponseStream`] calls this.
    fn dispose(&self, correlation_id: &str) {
        if let Some((_, entry)) = self.entries.remove(correlation_id) {
            entry.close(false);
        }
    }
}

/// The owner's handle on one outstanding two-way request.
///
/// Yields [`CorrelationSignal`]s until the entry closes. Disposal is
/// idempotent and also happens on drop.
pub struct ResponseStream {
    correlation_id: String,
    table: CorrelationTable,
    receiver: mpsc::UnboundedReceiver<CorrelationSignal>,
    disposed: bool,
}

impl ResponseStream {
    /// The correlation id of this exchange.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Receive the next signal, or `None` once the entry is closed and
    /// all buffered signals are drained.
    pub async fn recv(&mut self) -> Option<CorrelationSignal> {
        self.receiver.recv().await
    }

    /// Close the underlying correlation entry. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.table.dispose(&self.correlation_id);
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.dispose();
    }
}
