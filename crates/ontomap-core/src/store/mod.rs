//! # Store Connections
//!
//! The seam between the facade and a triple store backend.
//!
//! - [`QueryExecutor`]: ASK / SELECT / CONSTRUCT / DESCRIBE / UPDATE
//! - [`StoreConnection`]: a shareable backend handle; its executor methods
//!   run in autocommit mode
//! - [`Transaction`]: an explicit context, consumed by `commit` or
//!   `rollback` so it cannot be reused
//!
//! Backends:
//! - [`RedbTripleStore`]: embedded, persisted with redb
//! - `Rdf4jConnection` (feature `rdf4j`): RDF4J server over HTTP

pub mod dataset;
#[cfg(feature = "rdf4j")]
pub mod rdf4j;
pub mod redb_store;

pub use dataset::Dataset;
#[cfg(feature = "rdf4j")]
pub use rdf4j::Rdf4jConnection;
pub use redb_store::RedbTripleStore;

use crate::query::{
    AskQuery, ConstructQuery, DescribeQuery, SelectQuery, UpdateOperation, UpdateRequest,
};
use oxrdf::{NamedNode, Term, Triple};
use oxttl::NTriplesParser;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// RESULT ROWS
// =============================================================================

/// One result row: variable name (without `?`) to bound term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    values: BTreeMap<String, Term>,
}

impl Solution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.values.get(variable)
    }

    pub fn insert(&mut self, variable: impl Into<String>, term: Term) {
        self.values.insert(variable.into(), term);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Term)> for Solution {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A query could not be evaluated.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// The backend does not handle this construct.
    #[error("Unsupported query construct: {0}")]
    Unsupported(String),

    /// The deadline configured on the connection passed.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The request never got a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote store answered with an error status.
    #[error("Remote store returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The response could not be parsed.
    #[error("Malformed response: {0}")]
    Response(String),
}

/// Parse an N-Triples document.
pub fn read_ntriples(reader: impl Read) -> Result<Vec<Triple>, StoreError> {
    NTriplesParser::new()
        .for_reader(reader)
        .map(|triple| triple.map_err(|e| StoreError::Response(e.to_string())))
        .collect()
}

// =============================================================================
// CONNECTION TRAITS
// =============================================================================

/// Query execution against one store context.
pub trait QueryExecutor {
    fn ask(&self, query: &AskQuery) -> Result<bool, StoreError>;

    /// Run a select, handing every row to `on_row` as it is read.
    fn select_with(
        &self,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    fn construct(&self, query: &ConstructQuery) -> Result<Vec<Triple>, StoreError>;

    fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError>;

    fn update(&self, request: &UpdateRequest) -> Result<(), StoreError>;

    /// Collect every row of a select.
    fn select(&self, query: &SelectQuery) -> Result<Vec<Solution>, StoreError> {
        let mut rows = Vec::new();
        self.select_with(query, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Delete requests travel on the update channel.
    fn delete(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        self.update(request)
    }

    fn clear_graph(&self, graph: &NamedNode) -> Result<(), StoreError> {
        self.update(&UpdateOperation::ClearGraph {
            graph: graph.clone(),
        }
        .into())
    }
}

/// A backend handle shared across threads.
pub trait StoreConnection: QueryExecutor + Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    fn start_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;

    fn as_executor(&self) -> &dyn QueryExecutor;
}

/// An open transaction. Reads see the transaction's own writes.
pub trait Transaction: QueryExecutor {
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;

    fn as_executor(&self) -> &dyn QueryExecutor;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use oxrdf::Literal;

    #[test]
    fn solution_accessors() {
        let mut solution = Solution::new();
        assert!(solution.is_empty());
        solution.insert("label", Literal::new_simple_literal("a").into());
        assert_eq!(solution.len(), 1);
        assert_eq!(
            solution.get("label"),
            Some(&Term::from(Literal::new_simple_literal("a")))
        );
        assert!(solution.get("missing").is_none());
    }

    #[test]
    fn ntriples_are_parsed() {
        let document = "<http://x/a> <http://x/p> \"v\" .\n<http://x/a> <http://x/q> <http://x/b> .\n";
        let triples = read_ntriples(document.as_bytes()).unwrap();
        assert_eq!(triples.len(), 2);
        assert!(read_ntriples("<http://x/a> broken".as_bytes()).is_err());
    }
}
