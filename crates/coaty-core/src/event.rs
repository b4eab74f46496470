//! Inbound event types.
//!
//! An [`InboundEvent`] is a transport message whose topic parsed as Coaty
//! traffic; a [`RawEvent`] is everything else.

use bytes::Bytes;
use coaty_protocol::Topic;

use crate::objects::{CodecError, PayloadCodec};

/// A decoded Coaty event delivered to observers and correlation entries.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Parsed topic of the event.
    pub topic: Topic,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl InboundEvent {
    /// Create a new inbound event.
    #[must_use]
    pub fn new(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }

    /// Decode the payload through a payload codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or references an
    /// unregistered object type.
    pub fn decode(&self, codec: &dyn PayloadCodec) -> Result<serde_json::Value, CodecError> {
        codec.decode(&self.payload)
    }
}

/// Non-Coaty traffic, delivered only to raw observers.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// The unparsed topic string.
    pub topic: String,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl RawEvent {
    /// Create a new raw event.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
