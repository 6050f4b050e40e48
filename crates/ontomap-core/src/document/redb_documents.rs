//! # redb-backed Document Store
//!
//! One table keyed by `(collection, id)`, values are JSON bytes.

use crate::document::{DocumentCollections, DocumentError, DocumentStore, DocumentTransaction};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Table for documents: (collection, id) -> JSON bytes
const DOCUMENTS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("documents");

type Key = (&'static str, &'static str);

fn storage(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Storage(e.to_string())
}

fn encode(document: &Value) -> Result<Vec<u8>, DocumentError> {
    serde_json::to_vec(document).map_err(|e| DocumentError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Value, DocumentError> {
    serde_json::from_slice(bytes).map_err(|e| DocumentError::Serialization(e.to_string()))
}

// =============================================================================
// TABLE OPERATIONS
// =============================================================================

fn get_from(
    table: &impl ReadableTable<Key, &'static [u8]>,
    collection: &str,
    id: &str,
) -> Result<Option<Value>, DocumentError> {
    match table.get((collection, id)).map_err(storage)? {
        Some(bytes) => decode(bytes.value()).map(Some),
        None => Ok(None),
    }
}

fn list_from(
    table: &impl ReadableTable<Key, &'static [u8]>,
    collection: &str,
) -> Result<Vec<(String, Value)>, DocumentError> {
    let mut documents = Vec::new();
    for entry in table.range((collection, "")..).map_err(storage)? {
        let (key, value) = entry.map_err(storage)?;
        let (entry_collection, id) = key.value();
        if entry_collection != collection {
            break;
        }
        documents.push((id.to_string(), decode(value.value())?));
    }
    Ok(documents)
}

fn insert_in(
    txn: &WriteTransaction,
    collection: &str,
    id: &str,
    document: &Value,
) -> Result<(), DocumentError> {
    let bytes = encode(document)?;
    let mut table = txn.open_table(DOCUMENTS).map_err(storage)?;
    if table.get((collection, id)).map_err(storage)?.is_some() {
        return Err(DocumentError::duplicate(collection, id));
    }
    table.insert((collection, id), bytes.as_slice()).map_err(storage)?;
    Ok(())
}

fn replace_in(
    txn: &WriteTransaction,
    collection: &str,
    id: &str,
    document: &Value,
) -> Result<(), DocumentError> {
    let bytes = encode(document)?;
    let mut table = txn.open_table(DOCUMENTS).map_err(storage)?;
    if table.get((collection, id)).map_err(storage)?.is_none() {
        return Err(DocumentError::not_found(collection, id));
    }
    table.insert((collection, id), bytes.as_slice()).map_err(storage)?;
    Ok(())
}

fn delete_in(txn: &WriteTransaction, collection: &str, id: &str) -> Result<(), DocumentError> {
    let mut table = txn.open_table(DOCUMENTS).map_err(storage)?;
    if table.remove((collection, id)).map_err(storage)?.is_none() {
        return Err(DocumentError::not_found(collection, id));
    }
    Ok(())
}

// =============================================================================
// STORE
// =============================================================================

/// Document store in its own redb database file.
pub struct RedbDocumentStore {
    db: Database,
}

impl std::fmt::Debug for RedbDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDocumentStore").finish_non_exhaustive()
    }
}

impl RedbDocumentStore {
    /// Open or create a document database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;
        {
            let write_txn = db.begin_write().map_err(storage)?;
            let _ = write_txn.open_table(DOCUMENTS).map_err(storage)?;
            write_txn.commit().map_err(storage)?;
        }
        Ok(Self { db })
    }

    /// Run `op` in a write transaction of its own.
    fn autocommit<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, DocumentError>,
    ) -> Result<T, DocumentError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        match op(&write_txn) {
            Ok(value) => {
                write_txn.commit().map_err(storage)?;
                Ok(value)
            }
            Err(e) => {
                write_txn.abort().map_err(storage)?;
                Err(e)
            }
        }
    }
}

impl DocumentCollections for RedbDocumentStore {
    fn insert(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError> {
        self.autocommit(|txn| insert_in(txn, collection, id, document))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DocumentError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(DOCUMENTS).map_err(storage)?;
        get_from(&table, collection, id)
    }

    fn replace(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError> {
        self.autocommit(|txn| replace_in(txn, collection, id, document))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError> {
        self.autocommit(|txn| delete_in(txn, collection, id))
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, DocumentError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(DOCUMENTS).map_err(storage)?;
        list_from(&table, collection)
    }
}

impl DocumentStore for RedbDocumentStore {
    fn start_transaction(&self) -> Result<Box<dyn DocumentTransaction + '_>, DocumentError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        debug!("document transaction started");
        Ok(Box::new(RedbDocumentTransaction { write_txn }))
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Write transaction on a [`RedbDocumentStore`]; reads see its own writes.
pub struct RedbDocumentTransaction {
    write_txn: WriteTransaction,
}

impl std::fmt::Debug for RedbDocumentTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDocumentTransaction").finish_non_exhaustive()
    }
}

impl DocumentCollections for RedbDocumentTransaction {
    fn insert(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError> {
        insert_in(&self.write_txn, collection, id, document)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DocumentError> {
        let table = self.write_txn.open_table(DOCUMENTS).map_err(storage)?;
        get_from(&table, collection, id)
    }

    fn replace(&self, collection: &str, id: &str, document: &Value) -> Result<(), DocumentError> {
        replace_in(&self.write_txn, collection, id, document)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError> {
        delete_in(&self.write_txn, collection, id)
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, DocumentError> {
        let table = self.write_txn.open_table(DOCUMENTS).map_err(storage)?;
        list_from(&table, collection)
    }
}

impl DocumentTransaction for RedbDocumentTransaction {
    fn commit(self: Box<Self>) -> Result<(), DocumentError> {
        self.write_txn.commit().map_err(storage)?;
        debug!("document transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), DocumentError> {
        self.write_txn.abort().map_err(storage)
    }
}
