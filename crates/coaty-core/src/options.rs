//! Typed configuration for a communication session.
//!
//! All knobs are named struct fields validated up front; there is no
//! string-keyed option dictionary anywhere in this crate.

use coaty_protocol::topic::is_valid_publication_topic;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "-";

/// Option validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Namespace must be non-empty.
    #[error("Namespace must not be empty")]
    EmptyNamespace,

    /// Namespace must be a single literal topic level.
    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),
}

/// Configuration for a [`CommunicationManager`](crate::CommunicationManager).
#[derive(Debug, Clone)]
pub struct CommunicationOptions {
    /// Namespace isolating this application from others on the same
    /// transport. A single topic level; no `/`, wildcards, or NUL.
    pub namespace: String,

    /// Object id identifying this agent as the source of published events.
    pub source_id: Uuid,

    /// Deadline applied to every two-way request. `None` means requests
    /// stay open until the caller disposes them.
    pub response_timeout: Option<Duration>,
}

impl Default for CommunicationOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            source_id: Uuid::new_v4(),
            response_timeout: None,
        }
    }
}

impl CommunicationOptions {
    /// Create options for the given namespace with a fresh source id.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Set the response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is empty or not a single literal
    /// topic level.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.namespace.is_empty() {
            return Err(OptionsError::EmptyNamespace);
        }
        if self.namespace.contains('/') || !is_valid_publication_topic(&self.namespace) {
            return Err(OptionsError::InvalidNamespace(self.namespace.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        let options = CommunicationOptions::default();
        assert_eq!(options.namespace, DEFAULT_NAMESPACE);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_namespaces() {
        let mut options = CommunicationOptions::with_namespace("");
        assert_eq!(options.validate(), Err(OptionsError::EmptyNamespace));

        options.namespace = "a/b".to_string();
        assert!(matches!(
            options.validate(),
            Err(OptionsError::InvalidNamespace(_))
        ));

        options.namespace = "ns+".to_string();
        assert!(matches!(
            options.validate(),
            Err(OptionsError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn test_builder_style() {
        let options = CommunicationOptions::with_namespace("com.example")
            .response_timeout(Duration::from_secs(5));
        assert_eq!(options.namespace, "com.example");
        assert_eq!(options.response_timeout, Some(Duration::from_secs(5)));
        assert!(options.validate().is_ok());
    }
}
