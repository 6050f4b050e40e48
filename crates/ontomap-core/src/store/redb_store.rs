//! # redb-backed Triple Store
//!
//! Embedded store: quads persisted in redb, queried through an in-memory
//! [`Dataset`] snapshot.
//!
//! ## Concurrency
//!
//! - Readers clone the current snapshot (`Arc`) and never block writers
//! - redb admits one write transaction at a time, so transactions are
//!   serialized by `begin_write`
//! - A transaction works on a private copy of the snapshot and publishes
//!   it on commit; rollback aborts the redb transaction and drops the copy

use crate::primitives::STORE_FORMAT_VERSION;
use crate::query::{AskQuery, ConstructQuery, DescribeQuery, SelectQuery, UpdateRequest};
use crate::store::dataset::{Change, Dataset, Delta, EncodedQuad};
use crate::store::{QueryExecutor, Solution, StoreConnection, StoreError, Transaction};
use oxrdf::Triple;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Table for quads: postcard-encoded `EncodedQuad` -> ()
const QUADS: TableDefinition<&[u8], ()> = TableDefinition::new("quads");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Embedded triple store persisted with redb.
pub struct RedbTripleStore {
    db: Database,
    snapshot: RwLock<Arc<Dataset>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for RedbTripleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTripleStore")
            .field("quads", &self.quad_count())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedbTripleStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        // Initialize tables and check the format version
        {
            let write_txn = db.begin_write().map_err(storage)?;
            let _ = write_txn.open_table(QUADS).map_err(storage)?;
            {
                let mut meta = write_txn.open_table(METADATA).map_err(storage)?;
                let stored = meta
                    .get("format_version")
                    .map_err(storage)?
                    .map(|v| v.value());
                match stored {
                    None => {
                        meta.insert("format_version", u64::from(STORE_FORMAT_VERSION))
                            .map_err(storage)?;
                    }
                    Some(version) if version == u64::from(STORE_FORMAT_VERSION) => {}
                    Some(version) => {
                        return Err(StoreError::Storage(format!(
                            "unsupported store format version {version} (expected {STORE_FORMAT_VERSION})"
                        )));
                    }
                }
            }
            write_txn.commit().map_err(storage)?;
        }

        // Load the snapshot
        let mut dataset = Dataset::new();
        {
            let read_txn = db.begin_read().map_err(storage)?;
            let table = read_txn.open_table(QUADS).map_err(storage)?;
            for entry in table.iter().map_err(storage)? {
                let (key, _) = entry.map_err(storage)?;
                let quad: EncodedQuad = postcard::from_bytes(key.value()).map_err(storage)?;
                dataset.insert(&quad);
            }
        }
        debug!(quads = dataset.len(), path = %path.as_ref().display(), "triple store opened");

        Ok(Self {
            db,
            snapshot: RwLock::new(Arc::new(dataset)),
            timeout: None,
        })
    }

    /// Abort queries that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn quad_count(&self) -> usize {
        self.current().len()
    }

    /// Named graphs holding at least one quad.
    #[must_use]
    pub fn graphs(&self) -> Vec<String> {
        self.current().graphs()
    }

    fn current(&self) -> Arc<Dataset> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Open a write transaction. Blocks while another one is open.
    pub fn begin(&self) -> Result<RedbTransaction<'_>, StoreError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        let working = (*self.current()).clone();
        Ok(RedbTransaction {
            store: self,
            write_txn,
            working: RefCell::new(working),
        })
    }
}

impl QueryExecutor for RedbTripleStore {
    fn ask(&self, query: &AskQuery) -> Result<bool, StoreError> {
        self.current().ask(query, self.timeout)
    }

    fn select_with(
        &self,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        for row in self.current().select(query, self.timeout)? {
            on_row(row)?;
        }
        Ok(())
    }

    fn construct(&self, query: &ConstructQuery) -> Result<Vec<Triple>, StoreError> {
        self.current().construct(query, self.timeout)
    }

    fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError> {
        self.current().describe(query)
    }

    /// Autocommit: one transaction per request.
    fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        let txn = self.begin()?;
        match txn.update(request) {
            Ok(()) => Box::new(txn).commit(),
            Err(e) => {
                if let Err(rollback) = Box::new(txn).rollback() {
                    warn!(error = %rollback, "rollback after failed update also failed");
                }
                Err(e)
            }
        }
    }
}

impl StoreConnection for RedbTripleStore {
    fn backend(&self) -> &'static str {
        "embedded"
    }

    fn start_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(self.begin()?))
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Write transaction on a [`RedbTripleStore`].
pub struct RedbTransaction<'a> {
    store: &'a RedbTripleStore,
    write_txn: WriteTransaction,
    working: RefCell<Dataset>,
}

impl std::fmt::Debug for RedbTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTransaction")
            .field("quads", &self.working.borrow().len())
            .finish_non_exhaustive()
    }
}

impl RedbTransaction<'_> {
    fn persist(&self, delta: &Delta) -> Result<(), StoreError> {
        let mut table = self.write_txn.open_table(QUADS).map_err(storage)?;
        for change in &delta.changes {
            match change {
                Change::Inserted(quad) => {
                    let key = postcard::to_allocvec(quad).map_err(storage)?;
                    table.insert(key.as_slice(), ()).map_err(storage)?;
                }
                Change::Removed(quad) => {
                    let key = postcard::to_allocvec(quad).map_err(storage)?;
                    table.remove(key.as_slice()).map_err(storage)?;
                }
            }
        }
        Ok(())
    }
}

impl QueryExecutor for RedbTransaction<'_> {
    fn ask(&self, query: &AskQuery) -> Result<bool, StoreError> {
        self.working.borrow().ask(query, self.store.timeout)
    }

    fn select_with(
        &self,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // Rows are collected first so callbacks may query this transaction.
        let rows = self.working.borrow().select(query, self.store.timeout)?;
        for row in rows {
            on_row(row)?;
        }
        Ok(())
    }

    fn construct(&self, query: &ConstructQuery) -> Result<Vec<Triple>, StoreError> {
        self.working.borrow().construct(query, self.store.timeout)
    }

    fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError> {
        self.working.borrow().describe(query)
    }

    fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        let delta = self
            .working
            .borrow_mut()
            .update(request, self.store.timeout)?;
        if let Err(e) = self.persist(&delta) {
            self.working.borrow_mut().revert(&delta);
            return Err(e);
        }
        Ok(())
    }
}

impl Transaction for RedbTransaction<'_> {
    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let RedbTransaction {
            store,
            write_txn,
            working,
        } = *self;
        // Hold the snapshot lock across the commit so the next writer
        // starts from the published state.
        let mut snapshot = store
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        write_txn.commit().map_err(storage)?;
        *snapshot = Arc::new(working.into_inner());
        debug!(quads = snapshot.len(), "triple store transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.write_txn.abort().map_err(storage)
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}
