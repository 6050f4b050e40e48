//! # Document Store
//!
//! JSON documents addressed by `(collection, id)`, with the same
//! begin / commit / rollback envelope as the triple store so the
//! [`coordinator`](crate::coordinator) can drive both.

pub mod redb_documents;

pub use redb_documents::RedbDocumentStore;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Document '{id}' already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: String },

    #[error("Document storage error: {0}")]
    Storage(String),

    #[error("Document serialization error: {0}")]
    Serialization(String),
}

impl DocumentError {
    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn duplicate(collection: &str, id: &str) -> Self {
        Self::DuplicateId {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Collection operations, available on the store (autocommit) and inside a
/// transaction.
pub trait DocumentCollections {
    /// Fails with `DuplicateId` when the id is taken.
    fn insert(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DocumentError>;

    /// Fails with `NotFound` when the id is unknown.
    fn replace(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError>;

    /// Fails with `NotFound` when the id is unknown.
    fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError>;

    /// Every document of the collection, ordered by id.
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, DocumentError>;

    fn count(&self, collection: &str) -> Result<usize, DocumentError> {
        Ok(self.list(collection)?.len())
    }
}

pub trait DocumentStore: DocumentCollections + Send + Sync {
    fn start_transaction(&self) -> Result<Box<dyn DocumentTransaction + '_>, DocumentError>;
}

/// Consumed by `commit` or `rollback`.
pub trait DocumentTransaction: DocumentCollections {
    fn commit(self: Box<Self>) -> Result<(), DocumentError>;

    fn rollback(self: Box<Self>) -> Result<(), DocumentError>;
}
