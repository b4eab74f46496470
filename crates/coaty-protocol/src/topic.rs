//! Topic codec for the Coaty wire format.
//!
//! A Coaty topic is a `/`-separated string of the form
//!
//! ```text
//! <protocol>/<version>/<namespace>/<event>[:<filter>]/<sourceId>[/<correlationId>]
//! ```
//!
//! The correlation id level is present exactly for two-way event types.
//! Parsing enforces every structural invariant of the protocol and reports
//! each violation as a distinct [`TopicError`] variant.

use crate::event::EventType;
use thiserror::Error;
use uuid::Uuid;

/// Protocol family identifier, the first topic level of every Coaty topic.
pub const PROTOCOL_NAME: &str = "coaty";

/// Protocol version embedded in all outbound topics.
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors raised while parsing or building a topic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// Wrong number of topic levels.
    #[error("Invalid topic structure: {0} levels")]
    SegmentCount(usize),

    /// First level is not the Coaty protocol identifier.
    #[error("Unknown protocol name: {0:?}")]
    ProtocolNameMismatch(String),

    /// A mandatory level is empty.
    #[error("Empty {0} level")]
    EmptySegment(&'static str),

    /// Version level is not a positive integer.
    #[error("Invalid protocol version: {0:?}")]
    InvalidVersion(String),

    /// Namespace contains characters not allowed in a single topic level.
    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// Event level does not decode to a known event code.
    #[error("Unknown event code: {0:?}")]
    UnknownEventType(String),

    /// Event type requires an event filter but none was given.
    #[error("Event type {0} requires an event filter")]
    MissingEventFilter(EventType),

    /// Event type forbids an event filter but one was given.
    #[error("Event type {0} does not take an event filter")]
    UnexpectedEventFilter(EventType),

    /// Event filter contains characters not allowed in a filter.
    #[error("Invalid event filter: {0:?}")]
    InvalidEventFilter(String),

    /// Source level is not a valid UUID.
    #[error("Invalid source id: {0:?}")]
    InvalidSourceId(String),

    /// Two-way event type without a correlation id.
    #[error("Event type {0} requires a correlation id")]
    MissingCorrelationId(EventType),

    /// One-way event type with a correlation id.
    #[error("Event type {0} does not take a correlation id")]
    UnexpectedCorrelationId(EventType),

    /// Correlation id contains characters not allowed in a single topic level.
    #[error("Invalid correlation id: {0:?}")]
    InvalidCorrelationId(String),
}

/// A parsed Coaty topic.
///
/// Immutable once constructed, either by [`Topic::parse`] on an inbound
/// topic string or by the publish/subscribe builders for outbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Protocol version found on the topic. Informational on receipt;
    /// inbound versions are accepted regardless of value because
    /// subscription filters already pin the expected version level.
    pub protocol_version: u32,
    /// Namespace partitioning independent Coaty applications.
    pub namespace: String,
    /// Event kind.
    pub event_type: EventType,
    /// Event filter suffix, present exactly for filter-carrying event types.
    pub event_filter: Option<String>,
    /// Object id of the publishing entity.
    pub source_id: Uuid,
    /// Correlation id, present exactly for two-way event types.
    pub correlation_id: Option<String>,
}

impl Topic {
    /// Parse an inbound topic string.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] describing the first structural invariant
    /// the topic violates. Never panics on malformed input.
    pub fn parse(topic: &str) -> Result<Topic, TopicError> {
        let mut levels: Vec<&str> = topic.split('/').collect();

        // A trailing slash produces an empty seventh level; tolerate it.
        // Any non-empty seventh level is invalid.
        if levels.len() == 7 && levels[6].is_empty() {
            levels.pop();
        }
        if !(5..=6).contains(&levels.len()) {
            return Err(TopicError::SegmentCount(levels.len()));
        }

        if levels[0] != PROTOCOL_NAME {
            return Err(TopicError::ProtocolNameMismatch(levels[0].to_string()));
        }

        if levels[1].is_empty() {
            return Err(TopicError::EmptySegment("version"));
        }
        // The version value itself is deliberately not checked against
        // PROTOCOL_VERSION; only its shape is.
        let protocol_version = levels[1]
            .parse::<u32>()
            .map_err(|_| TopicError::InvalidVersion(levels[1].to_string()))?;

        if levels[2].is_empty() {
            return Err(TopicError::EmptySegment("namespace"));
        }
        let namespace = levels[2].to_string();

        if levels[3].is_empty() {
            return Err(TopicError::EmptySegment("event"));
        }
        let (code, filter) = match levels[3].split_once(':') {
            Some((code, filter)) => (code, Some(filter)),
            None => (levels[3], None),
        };
        let event_type = EventType::from_code(code)
            .ok_or_else(|| TopicError::UnknownEventType(code.to_string()))?;
        let event_filter = validate_filter_policy(event_type, filter)?;

        if levels[4].is_empty() {
            return Err(TopicError::EmptySegment("source id"));
        }
        let source_id = Uuid::parse_str(levels[4])
            .map_err(|_| TopicError::InvalidSourceId(levels[4].to_string()))?;

        let correlation_id = match levels.get(5) {
            Some(&id) if !id.is_empty() => Some(id.to_string()),
            _ => None,
        };
        match (event_type.is_one_way(), &correlation_id) {
            (true, Some(_)) => return Err(TopicError::UnexpectedCorrelationId(event_type)),
            (false, None) => return Err(TopicError::MissingCorrelationId(event_type)),
            _ => {}
        }

        Ok(Topic {
            protocol_version,
            namespace,
            event_type,
            event_filter,
            source_id,
            correlation_id,
        })
    }

    /// Build the canonical publication topic string for an outbound event.
    ///
    /// The rendered version is always [`PROTOCOL_VERSION`]. All invariants
    /// are checked before anything is rendered, so an invalid combination
    /// fails fast and never reaches the transport.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] if the namespace is empty or not a valid
    /// topic level, the filter/correlation policy of the event type is
    /// violated, or filter/correlation values contain forbidden characters.
    pub fn publish_topic(
        namespace: &str,
        source_id: Uuid,
        event_type: EventType,
        event_filter: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<String, TopicError> {
        if namespace.is_empty() {
            return Err(TopicError::EmptySegment("namespace"));
        }
        if namespace.contains('/') || !is_valid_publication_topic(namespace) {
            return Err(TopicError::InvalidNamespace(namespace.to_string()));
        }

        let event_filter = validate_filter_policy(event_type, event_filter)?;

        let correlation_id = match (event_type.is_one_way(), correlation_id) {
            (true, None) => None,
            (true, Some(_)) => return Err(TopicError::UnexpectedCorrelationId(event_type)),
            (false, None) => return Err(TopicError::MissingCorrelationId(event_type)),
            (false, Some(id)) => {
                if id.is_empty() {
                    return Err(TopicError::MissingCorrelationId(event_type));
                }
                if id.contains('/') || !is_valid_publication_topic(id) {
                    return Err(TopicError::InvalidCorrelationId(id.to_string()));
                }
                Some(id)
            }
        };

        let event_level = match &event_filter {
            Some(filter) => format!("{}:{}", event_type.code(), filter),
            None => event_type.code().to_string(),
        };

        let mut topic = format!(
            "{PROTOCOL_NAME}/{PROTOCOL_VERSION}/{namespace}/{event_level}/{source_id}"
        );
        if let Some(id) = correlation_id {
            topic.push('/');
            topic.push_str(id);
        }
        Ok(topic)
    }

    /// Build a subscription filter string for inbound events.
    ///
    /// An absent namespace means "all namespaces" and is rendered as `+`.
    /// The source level is always `+`; subscribers never filter on a
    /// specific publisher at this layer. For two-way event types an absent
    /// correlation id means "any exchange" and is rendered as `+`.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] if a given event filter, namespace, or
    /// correlation id is not a single literal topic level, or if a
    /// correlation id is given for a one-way event type. A value containing
    /// `/` or a wildcard would render a filter that can never match a valid
    /// topic, so it is rejected here instead.
    pub fn subscribe_filter(
        event_type: EventType,
        event_filter: Option<&str>,
        namespace: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<String, TopicError> {
        if let Some(filter) = event_filter {
            if !is_valid_event_filter(filter) {
                return Err(TopicError::InvalidEventFilter(filter.to_string()));
            }
        }
        if let Some(ns) = namespace {
            if ns.is_empty() {
                return Err(TopicError::EmptySegment("namespace"));
            }
            if ns.contains('/') || !is_valid_publication_topic(ns) {
                return Err(TopicError::InvalidNamespace(ns.to_string()));
            }
        }
        if let Some(id) = correlation_id {
            if event_type.is_one_way() {
                return Err(TopicError::UnexpectedCorrelationId(event_type));
            }
            if id.is_empty() {
                return Err(TopicError::MissingCorrelationId(event_type));
            }
            if id.contains('/') || !is_valid_publication_topic(id) {
                return Err(TopicError::InvalidCorrelationId(id.to_string()));
            }
        }

        let event_level = match event_filter {
            Some(filter) => format!("{}:{}", event_type.code(), filter),
            None => event_type.code().to_string(),
        };
        let namespace = namespace.unwrap_or("+");

        let mut filter =
            format!("{PROTOCOL_NAME}/{PROTOCOL_VERSION}/{namespace}/{event_level}/+");
        if !event_type.is_one_way() {
            filter.push('/');
            filter.push_str(correlation_id.unwrap_or("+"));
        }
        Ok(filter)
    }
}

fn validate_filter_policy(
    event_type: EventType,
    filter: Option<&str>,
) -> Result<Option<String>, TopicError> {
    if event_type.requires_filter() {
        match filter {
            Some(f) if !f.is_empty() => {
                if !is_valid_event_filter(f) {
                    return Err(TopicError::InvalidEventFilter(f.to_string()));
                }
                Ok(Some(f.to_string()))
            }
            _ => Err(TopicError::MissingEventFilter(event_type)),
        }
    } else {
        match filter {
            None => Ok(None),
            Some(_) => Err(TopicError::UnexpectedEventFilter(event_type)),
        }
    }
}

/// Whether a name may be used as a publication topic.
///
/// Publication topics must be non-empty and free of NUL and the wildcard
/// characters `#` and `+`.
#[must_use]
pub fn is_valid_publication_topic(name: &str) -> bool {
    !name.is_empty() && !name.contains(['\0', '#', '+'])
}

/// Whether a name may be used as a subscription filter.
///
/// Subscription filters must be non-empty and free of NUL; wildcards are
/// permitted.
#[must_use]
pub fn is_valid_subscription_topic(name: &str) -> bool {
    !name.is_empty() && !name.contains('\0')
}

/// Whether a name may be used as an event filter suffix.
///
/// Event filters occupy part of a single topic level, so they must be
/// publication-valid and must not contain a level separator.
#[must_use]
pub fn is_valid_event_filter(filter: &str) -> bool {
    is_valid_publication_topic(filter) && !filter.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "c0fbb160-50e5-4f3a-9213-f306b2fb26e0";

    fn source() -> Uuid {
        Uuid::parse_str(SOURCE).unwrap()
    }

    #[test]
    fn test_advertise_end_to_end() {
        let topic = Topic::publish_topic(
            "com.example",
            source(),
            EventType::Advertise,
            Some("CoatyObject"),
            None,
        )
        .unwrap();
        assert_eq!(topic, format!("coaty/1/com.example/ADV:CoatyObject/{SOURCE}"));

        let parsed = Topic::parse(&topic).unwrap();
        assert_eq!(parsed.event_type, EventType::Advertise);
        assert_eq!(parsed.event_filter.as_deref(), Some("CoatyObject"));
        assert_eq!(parsed.namespace, "com.example");
        assert_eq!(parsed.source_id, source());
        assert_eq!(parsed.correlation_id, None);
        assert_eq!(parsed.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_publish_parse_roundtrip_all_event_types() {
        for et in EventType::ALL {
            let filter = et.requires_filter().then_some("Filter.Value");
            let correlation = (!et.is_one_way()).then_some("corr-123");
            let topic =
                Topic::publish_topic("ns", source(), et, filter, correlation).unwrap();
            let parsed = Topic::parse(&topic).unwrap();
            assert_eq!(parsed.event_type, et);
            assert_eq!(parsed.event_filter.as_deref(), filter);
            assert_eq!(parsed.namespace, "ns");
            assert_eq!(parsed.source_id, source());
            assert_eq!(parsed.correlation_id.as_deref(), correlation);
        }
    }

    #[test]
    fn test_parse_segment_count() {
        assert_eq!(
            Topic::parse("coaty/1/ns/ADV:X"),
            Err(TopicError::SegmentCount(4))
        );
        assert_eq!(Topic::parse("coaty"), Err(TopicError::SegmentCount(1)));
        // Seventh non-empty level is invalid
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/DSC/{SOURCE}/corr/extra")),
            Err(TopicError::SegmentCount(7))
        );
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/DSC/{SOURCE}/corr/extra/more")),
            Err(TopicError::SegmentCount(8))
        );
    }

    #[test]
    fn test_parse_trailing_slash_tolerated() {
        let parsed = Topic::parse(&format!("coaty/1/ns/DSC/{SOURCE}/corr/")).unwrap();
        assert_eq!(parsed.correlation_id.as_deref(), Some("corr"));
    }

    #[test]
    fn test_parse_protocol_name() {
        assert_eq!(
            Topic::parse(&format!("mqtt/1/ns/ADV:X/{SOURCE}")),
            Err(TopicError::ProtocolNameMismatch("mqtt".to_string()))
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            Topic::parse(&format!("coaty//ns/ADV:X/{SOURCE}")),
            Err(TopicError::EmptySegment("version"))
        );
        assert_eq!(
            Topic::parse(&format!("coaty/one/ns/ADV:X/{SOURCE}")),
            Err(TopicError::InvalidVersion("one".to_string()))
        );
        // Version value other than the current one parses fine
        let parsed = Topic::parse(&format!("coaty/42/ns/ADV:X/{SOURCE}")).unwrap();
        assert_eq!(parsed.protocol_version, 42);
    }

    #[test]
    fn test_parse_namespace() {
        assert_eq!(
            Topic::parse(&format!("coaty/1//ADV:X/{SOURCE}")),
            Err(TopicError::EmptySegment("namespace"))
        );
    }

    #[test]
    fn test_parse_event_level() {
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns//{SOURCE}")),
            Err(TopicError::EmptySegment("event"))
        );
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/XYZ/{SOURCE}")),
            Err(TopicError::UnknownEventType("XYZ".to_string()))
        );
        // Advertise requires a filter
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/ADV/{SOURCE}")),
            Err(TopicError::MissingEventFilter(EventType::Advertise))
        );
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/ADV:/{SOURCE}")),
            Err(TopicError::MissingEventFilter(EventType::Advertise))
        );
        // Deadvertise forbids one
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/DAD:X/{SOURCE}")),
            Err(TopicError::UnexpectedEventFilter(EventType::Deadvertise))
        );
    }

    #[test]
    fn test_parse_source_id() {
        assert_eq!(
            Topic::parse("coaty/1/ns/ADV:X/not-a-uuid"),
            Err(TopicError::InvalidSourceId("not-a-uuid".to_string()))
        );
    }

    #[test]
    fn test_parse_correlation_policy() {
        // Two-way without a correlation id
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/DSC/{SOURCE}")),
            Err(TopicError::MissingCorrelationId(EventType::Discover))
        );
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/DSC/{SOURCE}/")),
            Err(TopicError::MissingCorrelationId(EventType::Discover))
        );
        // One-way with a correlation id
        assert_eq!(
            Topic::parse(&format!("coaty/1/ns/ADV:X/{SOURCE}/corr")),
            Err(TopicError::UnexpectedCorrelationId(EventType::Advertise))
        );
    }

    #[test]
    fn test_publish_topic_fails_fast() {
        // Filter on a filterless one-way type
        assert!(matches!(
            Topic::publish_topic("ns", source(), EventType::Deadvertise, Some("X"), None),
            Err(TopicError::UnexpectedEventFilter(_))
        ));
        // Missing filter on a filter-carrying type
        assert!(matches!(
            Topic::publish_topic("ns", source(), EventType::Advertise, None, None),
            Err(TopicError::MissingEventFilter(_))
        ));
        // Two-way without a correlation id
        assert!(matches!(
            Topic::publish_topic("ns", source(), EventType::Discover, None, None),
            Err(TopicError::MissingCorrelationId(_))
        ));
        // One-way with a correlation id
        assert!(matches!(
            Topic::publish_topic("ns", source(), EventType::IoValue, None, Some("c")),
            Err(TopicError::UnexpectedCorrelationId(_))
        ));
        // Namespace must be a single literal level
        assert!(matches!(
            Topic::publish_topic("a/b", source(), EventType::IoValue, None, None),
            Err(TopicError::InvalidNamespace(_))
        ));
        assert!(matches!(
            Topic::publish_topic("ns+", source(), EventType::IoValue, None, None),
            Err(TopicError::InvalidNamespace(_))
        ));
        // Filter must not span levels or contain wildcards
        assert!(matches!(
            Topic::publish_topic("ns", source(), EventType::Call, Some("a/b"), None),
            Err(TopicError::InvalidEventFilter(_))
        ));
    }

    #[test]
    fn test_subscribe_filter_rendering() {
        assert_eq!(
            Topic::subscribe_filter(EventType::Advertise, Some("CoatyObject"), Some("ns"), None)
                .unwrap(),
            "coaty/1/ns/ADV:CoatyObject/+"
        );
        // Absent namespace means all namespaces
        assert_eq!(
            Topic::subscribe_filter(EventType::Deadvertise, None, None, None).unwrap(),
            "coaty/1/+/DAD/+"
        );
        // Two-way filters carry a correlation level
        assert_eq!(
            Topic::subscribe_filter(EventType::Resolve, None, Some("ns"), Some("corr-1"))
                .unwrap(),
            "coaty/1/ns/RSV/+/corr-1"
        );
        assert_eq!(
            Topic::subscribe_filter(EventType::Resolve, None, None, None).unwrap(),
            "coaty/1/+/RSV/+/+"
        );
    }

    #[test]
    fn test_subscribe_filter_rejects_invalid_levels() {
        // A filter spanning levels would render a broken subscription
        assert!(matches!(
            Topic::subscribe_filter(EventType::Advertise, Some("a/b"), Some("ns"), None),
            Err(TopicError::InvalidEventFilter(_))
        ));
        assert!(matches!(
            Topic::subscribe_filter(EventType::Advertise, Some("a#b"), Some("ns"), None),
            Err(TopicError::InvalidEventFilter(_))
        ));
        assert!(matches!(
            Topic::subscribe_filter(EventType::Advertise, Some("Task"), Some("a/b"), None),
            Err(TopicError::InvalidNamespace(_))
        ));
        assert!(matches!(
            Topic::subscribe_filter(EventType::Advertise, Some("Task"), Some(""), None),
            Err(TopicError::EmptySegment("namespace"))
        ));
        assert!(matches!(
            Topic::subscribe_filter(EventType::Resolve, None, None, Some("c/1")),
            Err(TopicError::InvalidCorrelationId(_))
        ));
        assert!(matches!(
            Topic::subscribe_filter(EventType::Advertise, Some("Task"), None, Some("c")),
            Err(TopicError::UnexpectedCorrelationId(_))
        ));
    }

    #[test]
    fn test_validity_checks() {
        assert!(is_valid_publication_topic("coaty/1/ns/ADV:X/abc"));
        assert!(!is_valid_publication_topic(""));
        assert!(!is_valid_publication_topic("a/#"));
        assert!(!is_valid_publication_topic("a/+/b"));
        assert!(!is_valid_publication_topic("a\0b"));

        assert!(is_valid_subscription_topic("coaty/1/+/ADV:X/#"));
        assert!(!is_valid_subscription_topic(""));
        assert!(!is_valid_subscription_topic("a\0b"));

        assert!(is_valid_event_filter("CoatyObject"));
        assert!(!is_valid_event_filter(""));
        assert!(!is_valid_event_filter("a/b"));
        assert!(!is_valid_event_filter("a+b"));
    }
}
