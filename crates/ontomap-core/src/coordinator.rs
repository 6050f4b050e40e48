//! # Cross-Store Transactions
//!
//! Fixed protocol for writes that touch both the triple store and the
//! document store:
//!
//! 1. Start a transaction on each store the [`StorePlan`] names, triple
//!    store first
//! 2. Run the triple store step, then the document step
//! 3. On success commit in the same order, otherwise roll back every
//!    started transaction in the same order
//!
//! There is no prepare phase. A document commit that fails after the
//! triple store committed leaves the stores inconsistent; that case is
//! reported as [`CoordinatorError::PartialCommit`] and never hidden.

use crate::document::{DocumentStore, DocumentTransaction};
use crate::service::{SparqlService, SparqlTransaction};
use crate::types::{ErrorKind, OntomapError};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Which stores an operation writes to. Unused stores get no transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePlan {
    pub triple_store: bool,
    pub document_store: bool,
}

impl StorePlan {
    #[must_use]
    pub const fn both() -> Self {
        Self {
            triple_store: true,
            document_store: true,
        }
    }

    #[must_use]
    pub const fn triple_store_only() -> Self {
        Self {
            triple_store: true,
            document_store: false,
        }
    }

    #[must_use]
    pub const fn document_store_only() -> Self {
        Self {
            triple_store: false,
            document_store: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    TripleStore,
    DocumentStore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TripleStore => f.write_str("triple store"),
            Self::DocumentStore => f.write_str("document store"),
        }
    }
}

fn list_failures(failures: &[(StoreKind, OntomapError)]) -> String {
    failures
        .iter()
        .map(|(store, error)| format!("{store}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A transaction could not be started. Nothing was written.
    #[error("Failed to start {store} transaction: {source}")]
    Begin {
        store: StoreKind,
        #[source]
        source: OntomapError,
    },

    /// A step failed and every started transaction was rolled back.
    #[error("Operation failed, changes rolled back: {0}")]
    Operation(#[source] OntomapError),

    /// A commit failed before any store had committed.
    #[error("Commit failed on {store}, nothing committed: {source}")]
    CommitFailed {
        store: StoreKind,
        #[source]
        source: OntomapError,
    },

    /// Something failed and rolling back failed too.
    #[error("Operation failed ({cause}) and rollback failed: {}", list_failures(.failures))]
    RollbackFailed {
        cause: Box<OntomapError>,
        failures: Vec<(StoreKind, OntomapError)>,
    },

    /// One store committed, the other did not.
    #[error("{committed} committed but {failed} commit failed: {source}")]
    PartialCommit {
        committed: StoreKind,
        failed: StoreKind,
        #[source]
        source: OntomapError,
    },
}

impl CoordinatorError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Operation(error) => error.kind(),
            Self::Begin { .. }
            | Self::RollbackFailed { .. }
            | Self::CommitFailed { .. }
            | Self::PartialCommit { .. } => ErrorKind::Failure,
        }
    }

    /// Whether the stores may disagree or hold partial writes.
    #[must_use]
    pub fn is_inconsistent(&self) -> bool {
        matches!(
            self,
            Self::PartialCommit { .. } | Self::RollbackFailed { .. }
        )
    }
}

/// Roll back the started transactions, triple store first, collecting
/// failures.
fn rollback_all(
    triple: Option<SparqlTransaction<'_>>,
    document: Option<Box<dyn DocumentTransaction + '_>>,
) -> Vec<(StoreKind, OntomapError)> {
    let mut failures = Vec::new();
    if let Some(transaction) = triple {
        if let Err(e) = transaction.rollback() {
            warn!(store = %StoreKind::TripleStore, error = %e, "rollback failed");
            failures.push((StoreKind::TripleStore, e));
        }
    }
    if let Some(transaction) = document {
        if let Err(e) = transaction.rollback() {
            warn!(store = %StoreKind::DocumentStore, error = %e, "rollback failed");
            failures.push((StoreKind::DocumentStore, OntomapError::from(e)));
        }
    }
    failures
}

fn after_rollback(
    cause: OntomapError,
    failures: Vec<(StoreKind, OntomapError)>,
    clean: impl FnOnce(OntomapError) -> CoordinatorError,
) -> CoordinatorError {
    if failures.is_empty() {
        clean(cause)
    } else {
        CoordinatorError::RollbackFailed {
            cause: Box::new(cause),
            failures,
        }
    }
}

/// Run a write across both stores.
///
/// `triple_step` gets the triple store transaction (or `None` when the
/// plan skips it); its output is handed to `document_step` together with
/// the document transaction.
pub fn execute<A, T>(
    sparql: &SparqlService,
    documents: &dyn DocumentStore,
    plan: StorePlan,
    triple_step: impl FnOnce(Option<&SparqlTransaction<'_>>) -> Result<A, OntomapError>,
    document_step: impl FnOnce(Option<&dyn DocumentTransaction>, A) -> Result<T, OntomapError>,
) -> Result<T, CoordinatorError> {
    let triple = if plan.triple_store {
        Some(sparql.begin().map_err(|source| CoordinatorError::Begin {
            store: StoreKind::TripleStore,
            source,
        })?)
    } else {
        None
    };
    let document = if plan.document_store {
        match documents.start_transaction() {
            Ok(transaction) => Some(transaction),
            Err(e) => {
                let failures = rollback_all(triple, None);
                return Err(after_rollback(e.into(), failures, |source| {
                    CoordinatorError::Begin {
                        store: StoreKind::DocumentStore,
                        source,
                    }
                }));
            }
        }
    } else {
        None
    };
    debug!(?plan, "cross-store transaction started");

    let outcome = triple_step(triple.as_ref())
        .and_then(|output| document_step(document.as_deref(), output));
    let value = match outcome {
        Ok(value) => value,
        Err(cause) => {
            warn!(error = %cause, "cross-store operation failed, rolling back");
            let failures = rollback_all(triple, document);
            return Err(after_rollback(cause, failures, CoordinatorError::Operation));
        }
    };

    let mut triple_committed = false;
    if let Some(transaction) = triple {
        if let Err(e) = transaction.commit() {
            let failures = rollback_all(None, document);
            return Err(after_rollback(e, failures, |source| {
                CoordinatorError::CommitFailed {
                    store: StoreKind::TripleStore,
                    source,
                }
            }));
        }
        triple_committed = true;
    }
    if let Some(transaction) = document {
        if let Err(e) = transaction.commit() {
            let source = OntomapError::from(e);
            if triple_committed {
                warn!(error = %source, "document commit failed after triple store commit");
                return Err(CoordinatorError::PartialCommit {
                    committed: StoreKind::TripleStore,
                    failed: StoreKind::DocumentStore,
                    source,
                });
            }
            return Err(CoordinatorError::CommitFailed {
                store: StoreKind::DocumentStore,
                source,
            });
        }
    }
    debug!(?plan, "cross-store transaction committed");
    Ok(value)
}
