//! Object type registry and payload codec seam.
//!
//! The topic layer treats payloads as opaque bytes. Applications that want
//! typed access decode them through a [`PayloadCodec`] constructed with an
//! explicit [`ObjectTypeRegistry`]. The registry is a plain value handed in
//! at startup; there is no process-wide registration.

use bytes::Bytes;
use std::collections::HashSet;
use thiserror::Error;

/// Core object type names shipped with the Coaty object model.
pub const CORE_OBJECT_TYPES: [&str; 11] = [
    "CoatyObject",
    "User",
    "Annotation",
    "Task",
    "IoSource",
    "IoActor",
    "IoContext",
    "Identity",
    "Log",
    "Location",
    "Snapshot",
];

/// Payload codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload names an object type the registry does not know.
    #[error("Unregistered object type: {0:?}")]
    UnregisteredObjectType(String),
}

/// An explicit registry of known object type names.
#[derive(Debug, Clone, Default)]
pub struct ObjectTypeRegistry {
    types: HashSet<String>,
}

impl ObjectTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the core object types.
    #[must_use]
    pub fn with_core_types() -> Self {
        let mut registry = Self::new();
        for name in CORE_OBJECT_TYPES {
            registry.register(name);
        }
        registry
    }

    /// Register an object type name. Registering twice is a no-op.
    pub fn register(&mut self, object_type: impl Into<String>) {
        self.types.insert(object_type.into());
    }

    /// Whether an object type name is registered.
    #[must_use]
    pub fn is_registered(&self, object_type: &str) -> bool {
        self.types.contains(object_type)
    }

    /// Number of registered object types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Encodes and decodes application objects to and from payload bytes.
pub trait PayloadCodec: Send + Sync {
    /// Encode an object into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be encoded or names an
    /// unregistered object type.
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError>;

    /// Decode payload bytes into an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or names an
    /// unregistered object type.
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// JSON payload codec backed by an object type registry.
///
/// Payloads carrying an `objectType` field must name a registered type;
/// payloads without one (id lists, operation parameters) pass through.
#[derive(Debug, Clone)]
pub struct JsonPayloadCodec {
    registry: ObjectTypeRegistry,
}

impl JsonPayloadCodec {
    /// Create a codec over the given registry.
    #[must_use]
    pub fn new(registry: ObjectTypeRegistry) -> Self {
        Self { registry }
    }

    /// The registry this codec validates against.
    #[must_use]
    pub fn registry(&self) -> &ObjectTypeRegistry {
        &self.registry
    }

    fn check_object_type(&self, value: &serde_json::Value) -> Result<(), CodecError> {
        if let Some(object_type) = value.get("objectType").and_then(|v| v.as_str()) {
            if !self.registry.is_registered(object_type) {
                return Err(CodecError::UnregisteredObjectType(object_type.to_string()));
            }
        }
        Ok(())
    }
}

impl PayloadCodec for JsonPayloadCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError> {
        self.check_object_type(value)?;
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, CodecError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        self.check_object_type(&value)?;
        Ok(value)
    }
}
