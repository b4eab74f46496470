//! # coaty-transport
//!
//! Transport abstraction for Coaty agents.
//!
//! The protocol core talks to any pub/sub binding through the [`Transport`]
//! trait: publish to a topic, subscribe to a wildcard filter, unsubscribe.
//! Connection management belongs to the binding, never to the core.
//!
//! This crate also ships [`InMemoryBroker`], an in-process loopback binding
//! with MQTT wildcard semantics used by tests and single-process setups.

pub mod memory;
pub mod traits;

pub use memory::InMemoryBroker;
pub use traits::{SubscriptionStream, Transport, TransportError, TransportMessage};
