//! Event types of the Coaty communication protocol.
//!
//! Each event kind carries a short three-letter code on the wire and is
//! classified as either one-way (fire and forget) or two-way (request that
//! expects correlated responses).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of Coaty communication event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Advertise a domain object (one-way).
    Advertise,
    /// Deadvertise objects by their ids (one-way).
    Deadvertise,
    /// Publish on a channel identified by a channel id (one-way).
    Channel,
    /// Associate an IO source with an IO actor (one-way).
    Associate,
    /// Publish an IO value (one-way).
    IoValue,
    /// Discover objects (two-way request).
    Discover,
    /// Response to a Discover request.
    Resolve,
    /// Query objects (two-way request).
    Query,
    /// Response to a Query request.
    Retrieve,
    /// Update an object (two-way request).
    Update,
    /// Response to an Update request.
    Complete,
    /// Call a remote operation (two-way request).
    Call,
    /// Response to a Call request.
    Return,
}

impl EventType {
    /// All event types, in wire-code order. Handy for exhaustive checks.
    pub const ALL: [EventType; 13] = [
        EventType::Advertise,
        EventType::Deadvertise,
        EventType::Channel,
        EventType::Associate,
        EventType::IoValue,
        EventType::Discover,
        EventType::Resolve,
        EventType::Query,
        EventType::Retrieve,
        EventType::Update,
        EventType::Complete,
        EventType::Call,
        EventType::Return,
    ];

    /// Get the three-letter wire code for this event type.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            EventType::Advertise => "ADV",
            EventType::Deadvertise => "DAD",
            EventType::Channel => "CHN",
            EventType::Associate => "ASC",
            EventType::IoValue => "IOV",
            EventType::Discover => "DSC",
            EventType::Resolve => "RSV",
            EventType::Query => "QRY",
            EventType::Retrieve => "RTV",
            EventType::Update => "UPD",
            EventType::Complete => "CPL",
            EventType::Call => "CLL",
            EventType::Return => "RTN",
        }
    }

    /// Look up an event type by its wire code.
    ///
    /// Returns `None` for unknown codes; callers treat that as a reason to
    /// reject the surrounding topic, not as a fatal condition.
    #[must_use]
    pub fn from_code(code: &str) -> Option<EventType> {
        match code {
            "ADV" => Some(EventType::Advertise),
            "DAD" => Some(EventType::Deadvertise),
            "CHN" => Some(EventType::Channel),
            "ASC" => Some(EventType::Associate),
            "IOV" => Some(EventType::IoValue),
            "DSC" => Some(EventType::Discover),
            "RSV" => Some(EventType::Resolve),
            "QRY" => Some(EventType::Query),
            "RTV" => Some(EventType::Retrieve),
            "UPD" => Some(EventType::Update),
            "CPL" => Some(EventType::Complete),
            "CLL" => Some(EventType::Call),
            "RTN" => Some(EventType::Return),
            _ => None,
        }
    }

    /// Whether this event type is fire-and-forget.
    ///
    /// One-way topics never carry a correlation id; two-way topics always do.
    #[must_use]
    pub const fn is_one_way(&self) -> bool {
        matches!(
            self,
            EventType::Advertise
                | EventType::Deadvertise
                | EventType::Channel
                | EventType::Associate
                | EventType::IoValue
        )
    }

    /// Whether topics of this event type must carry an event filter suffix.
    ///
    /// The filter names an object type (Advertise, Update), a channel id
    /// (Channel), an IO context (Associate) or an operation name (Call).
    /// For every other event type a filter is forbidden.
    #[must_use]
    pub const fn requires_filter(&self) -> bool {
        matches!(
            self,
            EventType::Advertise
                | EventType::Channel
                | EventType::Associate
                | EventType::Update
                | EventType::Call
        )
    }

    /// The response event type paired with this request type, if any.
    #[must_use]
    pub const fn response_type(&self) -> Option<EventType> {
        match self {
            EventType::Discover => Some(EventType::Resolve),
            EventType::Query => Some(EventType::Retrieve),
            EventType::Update => Some(EventType::Complete),
            EventType::Call => Some(EventType::Return),
            _ => None,
        }
    }

    /// Whether this event type is the response half of a two-way exchange.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(
            self,
            EventType::Resolve | EventType::Retrieve | EventType::Complete | EventType::Return
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Advertise => "Advertise",
            EventType::Deadvertise => "Deadvertise",
            EventType::Channel => "Channel",
            EventType::Associate => "Associate",
            EventType::IoValue => "IoValue",
            EventType::Discover => "Discover",
            EventType::Resolve => "Resolve",
            EventType::Query => "Query",
            EventType::Retrieve => "Retrieve",
            EventType::Update => "Update",
            EventType::Complete => "Complete",
            EventType::Call => "Call",
            EventType::Return => "Return",
        };
        write!(f, "{name}")
    }
}
