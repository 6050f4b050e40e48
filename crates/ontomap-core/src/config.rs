//! # Service Configuration
//!
//! Deployment settings consumed by the persistence facade.

use crate::primitives::{DEFAULT_MAX_URI_ATTEMPTS, DEFAULT_PAGE_SIZE};
use crate::types::OntomapError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every operation of a [`crate::SparqlService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Namespace under which generated identifiers are minted.
    pub base_namespace: String,
    /// Page size applied when a search does not give one.
    pub default_page_size: usize,
    /// Collision retries allowed when generating an identifier.
    pub max_uri_attempts: u32,
    /// Per-query deadline in milliseconds. `None` waits indefinitely.
    pub query_timeout_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_namespace: "http://localhost/ontomap/".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_uri_attempts: DEFAULT_MAX_URI_ATTEMPTS,
            query_timeout_ms: None,
        }
    }
}

impl ServiceConfig {
    /// Create a configuration with the given namespace and default limits.
    #[must_use]
    pub fn new(base_namespace: impl Into<String>) -> Self {
        Self {
            base_namespace: base_namespace.into(),
            ..Self::default()
        }
    }

    /// Query deadline as a [`Duration`].
    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Check the settings before a service is built from them.
    ///
    /// The namespace must be an absolute IRI ending in `/` or `#` so that
    /// appended segments stay inside it.
    pub fn validate(&self) -> Result<(), OntomapError> {
        if oxrdf::NamedNode::new(self.base_namespace.as_str()).is_err() {
            return Err(OntomapError::Config(format!(
                "base_namespace is not an absolute IRI: {}",
                self.base_namespace
            )));
        }
        if !self.base_namespace.ends_with('/') && !self.base_namespace.ends_with('#') {
            return Err(OntomapError::Config(format!(
                "base_namespace must end with '/' or '#': {}",
                self.base_namespace
            )));
        }
        if self.max_uri_attempts == 0 {
            return Err(OntomapError::Config(
                "max_uri_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
