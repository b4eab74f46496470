//! # coaty-protocol
//!
//! Wire topic protocol for the Coaty decentralized communication framework.
//!
//! This crate defines the structured topic format Coaty agents exchange over
//! an MQTT-style pub/sub transport, including the event type registry, the
//! topic codec, and the wildcard topic matcher.
//!
//! ## Topic format
//!
//! ```text
//! <protocol>/<version>/<namespace>/<event>[:<filter>]/<sourceId>[/<correlationId>]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use coaty_protocol::{EventType, Topic};
//! use uuid::Uuid;
//!
//! let source = Uuid::new_v4();
//! let topic = Topic::publish_topic(
//!     "com.example",
//!     source,
//!     EventType::Advertise,
//!     Some("CoatyObject"),
//!     None,
//! )
//! .unwrap();
//!
//! let parsed = Topic::parse(&topic).unwrap();
//! assert_eq!(parsed.event_type, EventType::Advertise);
//! ```

pub mod event;
pub mod matcher;
pub mod topic;

pub use event::EventType;
pub use topic::{Topic, TopicError, PROTOCOL_NAME, PROTOCOL_VERSION};
