//! # Core Types
//!
//! Shared value types of the persistence layer:
//! - Pagination (`Pagination`, `Page`)
//! - Result ordering (`OrderBy`, `SortOrder`)
//! - Error types (`OntomapError`, `ErrorKind`)

use crate::document::DocumentError;
use crate::mapping::MappingError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// PAGINATION
// =============================================================================

/// Normalized pagination request.
///
/// Built from the loosely typed values callers receive from outer layers:
/// - a missing or negative page becomes page 0
/// - a missing page size falls back to the configured default
/// - a page size `<= 0` disables pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: Option<usize>,
}

impl Pagination {
    /// Normalize caller supplied values.
    #[must_use]
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_page_size: usize) -> Self {
        let page = page.filter(|p| *p > 0).map(|p| p as usize).unwrap_or(0);
        let page_size = match page_size {
            None if default_page_size == 0 => None,
            None => Some(default_page_size),
            Some(size) if size <= 0 => None,
            Some(size) => Some(size as usize),
        };
        Self { page, page_size }
    }

    /// Pagination disabled: every match in one page.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            page: 0,
            page_size: None,
        }
    }

    /// Zero-based page index.
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    /// Page size, `None` when unpaginated.
    #[must_use]
    pub const fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Number of matches to skip.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page_size
            .map(|size| self.page.saturating_mul(size))
            .unwrap_or(0)
    }

    /// Whether the requested page starts before `total` matches run out.
    #[must_use]
    pub fn reaches(&self, total: usize) -> bool {
        self.offset() < total
    }
}

/// One page of search results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Instances of the requested page, in result order.
    pub items: Vec<T>,
    /// Zero-based page index.
    pub page: usize,
    /// Page size used, `0` when unpaginated.
    pub page_size: usize,
    /// Matches across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    /// Whether more matches exist after this page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page_size > 0
            && (self.page.saturating_add(1)).saturating_mul(self.page_size) < self.total
    }

    /// Apply `f` to every item, keeping pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
        }
    }
}

// =============================================================================
// ORDERING
// =============================================================================

/// Direction of an ordering criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Ordering criterion on a mapped field (or the identifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse classification used by outer layers (e.g. to pick 404 / 409 / 500)
/// without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    /// The request conflicts with stored state.
    Conflict,
    /// The request itself is malformed.
    Invalid,
    /// Store, transport or internal failure.
    Failure,
}

/// Errors raised by the persistence layer.
///
/// - No silent failures
/// - Store failures keep the query text that triggered them
/// - No implicit retries besides identifier collisions
#[derive(Debug, Error)]
pub enum OntomapError {
    /// An entity mapping failed validation.
    #[error("Invalid entity mapping: {0}")]
    Mapping(#[from] MappingError),

    /// A client supplied identifier is already in use.
    #[error("URI already exists: {0}")]
    DuplicateUri(String),

    /// More than one stored object matched a single identifier.
    #[error("Multiple objects for the same URI: {0}")]
    AmbiguousUri(String),

    /// A lookup by a value expected to be unique matched several objects.
    #[error("Multiple {type_name} objects with {field} = {value}")]
    NotUnique {
        type_name: String,
        field: String,
        value: String,
    },

    /// No stored object of the expected type has this identifier.
    #[error("{type_name} not found: {uri}")]
    NotFound { type_name: String, uri: String },

    /// A query failed at the store.
    #[error("{operation} query failed: {source}")]
    Query {
        operation: &'static str,
        query: String,
        #[source]
        source: StoreError,
    },

    /// Starting, committing or rolling back a transaction failed.
    #[error("Transaction error: {0}")]
    Transaction(#[source] StoreError),

    /// An operation failed and the rollback that followed failed too.
    #[error("Rollback failed after error ({cause}): {rollback}")]
    RollbackFailed {
        cause: Box<OntomapError>,
        rollback: Box<OntomapError>,
    },

    /// A filter, ordering or value referenced a field the type does not map.
    #[error("Unknown field '{field}' on {type_name}")]
    UnknownField { type_name: String, field: String },

    /// A field value could not be converted or violates its cardinality.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Every candidate identifier collided.
    #[error("No free URI under {base} after {attempts} attempts")]
    UriGenerationExhausted { base: String, attempts: u32 },

    /// Service configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The document store failed.
    #[error("Document store error: {0}")]
    Document(#[from] DocumentError),
}

impl OntomapError {
    /// Classify the error for callers that map it onto a status.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateUri(_) | Self::AmbiguousUri(_) | Self::NotUnique { .. } => {
                ErrorKind::Conflict
            }
            Self::UnknownField { .. } | Self::InvalidValue { .. } => ErrorKind::Invalid,
            Self::Document(DocumentError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Document(DocumentError::DuplicateId { .. }) => ErrorKind::Conflict,
            Self::Mapping(_)
            | Self::RollbackFailed { .. }
            | Self::Query { .. }
            | Self::Transaction(_)
            | Self::UriGenerationExhausted { .. }
            | Self::Config(_)
            | Self::Document(_) => ErrorKind::Failure,
        }
    }

    pub(crate) fn not_found(type_name: &str, uri: &str) -> Self {
        Self::NotFound {
            type_name: type_name.to_string(),
            uri: uri.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_page_defaults_to_zero() {
        let p = Pagination::new(None, Some(10), 20);
        assert_eq!(p.page(), 0);
        assert_eq!(p.page_size(), Some(10));
    }

    #[test]
    fn negative_page_coerced_to_zero() {
        let p = Pagination::new(Some(-3), Some(10), 20);
        assert_eq!(p.page(), 0);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn missing_page_size_uses_default() {
        let p = Pagination::new(Some(2), None, 20);
        assert_eq!(p.page_size(), Some(20));
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn non_positive_page_size_disables_pagination() {
        assert_eq!(Pagination::new(Some(4), Some(0), 20).page_size(), None);
        assert_eq!(Pagination::new(Some(4), Some(-1), 20).page_size(), None);
        assert_eq!(Pagination::new(Some(4), Some(0), 20).offset(), 0);
    }

    #[test]
    fn reaches_compares_offset_to_total() {
        let p = Pagination::new(Some(1), Some(10), 20);
        assert!(p.reaches(11));
        assert!(!p.reaches(10));
        assert!(Pagination::all().reaches(1));
        assert!(!Pagination::all().reaches(0));
    }

    #[test]
    fn page_has_next() {
        let page = Page {
            items: vec![1, 2],
            page: 0,
            page_size: 2,
            total: 3,
        };
        assert!(page.has_next());
        let last = Page {
            items: vec![3],
            page: 1,
            page_size: 2,
            total: 3,
        };
        assert!(!last.has_next());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            OntomapError::not_found("Sample", "http://x/1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OntomapError::DuplicateUri("http://x/1".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            OntomapError::invalid("label", "missing").kind(),
            ErrorKind::Invalid
        );
        // A failed rollback outranks whatever triggered it.
        let wrapped = OntomapError::RollbackFailed {
            cause: Box::new(OntomapError::DuplicateUri("u".into())),
            rollback: Box::new(OntomapError::Config("x".into())),
        };
        assert_eq!(wrapped.kind(), ErrorKind::Failure);
        let missing = OntomapError::RollbackFailed {
            cause: Box::new(OntomapError::not_found("Sample", "u")),
            rollback: Box::new(OntomapError::Config("x".into())),
        };
        assert_eq!(missing.kind(), ErrorKind::Failure);
    }
}
