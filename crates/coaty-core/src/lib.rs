//! # coaty-core
//!
//! Event correlation, dispatch, and agent wiring for the Coaty
//! communication protocol.
//!
//! This crate provides the building blocks above the wire protocol:
//!
//! - **CorrelationTable** - Track outstanding two-way requests and route
//!   responses back to their callers
//! - **EventDispatcher** - Local subscription registry and inbound fan-out
//! - **CommunicationManager** - One agent's session over a transport
//! - **ObjectTypeRegistry / PayloadCodec** - Explicit serialization seam
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌──────────────────┐
//! │  Transport  │────▶│ CommunicationManager │────▶│ EventDispatcher  │
//! └─────────────┘     └──────────────────────┘     └──────────────────┘
//!                                │
//!                                ▼
//!                      ┌──────────────────┐
//!                      │ CorrelationTable │
//!                      └──────────────────┘
//! ```
//!
//! All inbound transport subscriptions feed a single consumer loop owned
//! by the manager; response events go to the correlation table, other
//! Coaty events to the dispatcher, and unparseable topics to raw
//! observers.

pub mod correlation;
pub mod dispatch;
pub mod event;
pub mod manager;
pub mod objects;
pub mod options;

pub use correlation::{
    CorrelationError, CorrelationSignal, CorrelationTable, ResponseMode, ResponseStream,
};
pub use dispatch::{EventDispatcher, EventObservation, RawObservation, SubscriptionId};
pub use event::{InboundEvent, RawEvent};
pub use manager::{CommunicationManager, ManagerError};
pub use objects::{CodecError, JsonPayloadCodec, ObjectTypeRegistry, PayloadCodec};
pub use options::{CommunicationOptions, OptionsError};
