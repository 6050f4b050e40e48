//! # RDF4J Connection
//!
//! Blocking client for the RDF4J server REST protocol.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | query | `POST /repositories/{id}` (`application/sparql-query`) |
//! | update | `POST /repositories/{id}/statements` (`application/sparql-update`) |
//! | begin | `POST /repositories/{id}/transactions`, id in `Location` |
//! | query / update in tx | `PUT {tx}?action=QUERY` / `?action=UPDATE` |
//! | commit | `PUT {tx}?action=COMMIT` |
//! | rollback | `DELETE {tx}` |
//!
//! Select and ask results are read as SPARQL JSON, graph results as
//! N-Triples.

use crate::query::{AskQuery, ConstructQuery, DescribeQuery, SelectQuery, UpdateRequest};
use crate::store::{
    QueryExecutor, Solution, StoreConnection, StoreError, Transaction, read_ntriples,
};
use oxrdf::Triple;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use sparesults::{QueryResultsFormat, QueryResultsParser, ReaderQueryResultsParserOutput};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_UPDATE: &str = "application/sparql-update";
const SPARQL_JSON: &str = "application/sparql-results+json";
const N_TRIPLES: &str = "application/n-triples";

/// Where a request is sent: the repository itself or an open transaction.
#[derive(Debug, Clone, Copy)]
enum Endpoint<'u> {
    Repository,
    Transaction(&'u str),
}

/// Connection to one repository of an RDF4J server.
#[derive(Debug, Clone)]
pub struct Rdf4jConnection {
    client: Client,
    repository_url: String,
    timeout: Option<Duration>,
}

impl Rdf4jConnection {
    /// `server_url` is the server root, e.g. `http://localhost:8080/rdf4j-server`.
    pub fn new(
        server_url: &str,
        repository: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            repository_url: repository_url(server_url, repository),
            timeout,
        })
    }

    #[must_use]
    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    fn transport(&self, error: &reqwest::Error) -> StoreError {
        match self.timeout {
            Some(timeout) if error.is_timeout() => StoreError::Timeout(timeout),
            _ => StoreError::Transport(error.to_string()),
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().map_err(|e| self.transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(StoreError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    fn query(&self, endpoint: Endpoint<'_>, query: String, accept: &str) -> Result<Response, StoreError> {
        let request = match endpoint {
            Endpoint::Repository => self.client.post(&self.repository_url),
            Endpoint::Transaction(url) => self.client.put(url).query(&[("action", "QUERY")]),
        };
        debug!(backend = "rdf4j", %query, "query");
        self.send(
            request
                .header(CONTENT_TYPE, SPARQL_QUERY)
                .header(ACCEPT, accept)
                .body(query),
        )
    }

    fn execute_update(&self, endpoint: Endpoint<'_>, update: String) -> Result<(), StoreError> {
        let request = match endpoint {
            Endpoint::Repository => self
                .client
                .post(format!("{}/statements", self.repository_url)),
            Endpoint::Transaction(url) => self.client.put(url).query(&[("action", "UPDATE")]),
        };
        debug!(backend = "rdf4j", %update, "update");
        self.send(request.header(CONTENT_TYPE, SPARQL_UPDATE).body(update))?;
        Ok(())
    }

    fn ask_at(&self, endpoint: Endpoint<'_>, query: &AskQuery) -> Result<bool, StoreError> {
        parse_boolean(self.query(endpoint, query.to_string(), SPARQL_JSON)?)
    }

    fn select_at(
        &self,
        endpoint: Endpoint<'_>,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        parse_solutions(self.query(endpoint, query.to_string(), SPARQL_JSON)?, on_row)
    }

    fn graph_at(&self, endpoint: Endpoint<'_>, query: String) -> Result<Vec<Triple>, StoreError> {
        read_ntriples(self.query(endpoint, query, N_TRIPLES)?)
    }
}

fn repository_url(server_url: &str, repository: &str) -> String {
    format!(
        "{}/repositories/{}",
        server_url.trim_end_matches('/'),
        repository.trim_matches('/')
    )
}

/// RDF4J answers `Location` with an absolute URL; relative ones are
/// resolved against the repository.
fn transaction_url(repository_url: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        format!(
            "{}/transactions/{}",
            repository_url,
            location.rsplit('/').next().unwrap_or(location)
        )
    }
}

fn malformed(e: impl std::fmt::Display) -> StoreError {
    StoreError::Response(e.to_string())
}

fn parse_boolean(reader: impl Read) -> Result<bool, StoreError> {
    match QueryResultsParser::from_format(QueryResultsFormat::Json)
        .for_reader(reader)
        .map_err(malformed)?
    {
        ReaderQueryResultsParserOutput::Boolean(value) => Ok(value),
        ReaderQueryResultsParserOutput::Solutions(_) => {
            Err(malformed("expected a boolean result, got solutions"))
        }
    }
}

fn parse_solutions(
    reader: impl Read,
    on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    match QueryResultsParser::from_format(QueryResultsFormat::Json)
        .for_reader(reader)
        .map_err(malformed)?
    {
        ReaderQueryResultsParserOutput::Solutions(solutions) => {
            for solution in solutions {
                let solution = solution.map_err(malformed)?;
                on_row(
                    solution
                        .iter()
                        .map(|(variable, term)| (variable.as_str().to_string(), term.clone()))
                        .collect(),
                )?;
            }
            Ok(())
        }
        ReaderQueryResultsParserOutput::Boolean(_) => {
            Err(malformed("expected solutions, got a boolean result"))
        }
    }
}

impl QueryExecutor for Rdf4jConnection {
    fn ask(&self, query: &AskQuery) -> Result<bool, StoreError> {
        self.ask_at(Endpoint::Repository, query)
    }

    fn select_with(
        &self,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.select_at(Endpoint::Repository, query, on_row)
    }

    fn construct(&self, query: &ConstructQuery) -> Result<Vec<Triple>, StoreError> {
        self.graph_at(Endpoint::Repository, query.to_string())
    }

    fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError> {
        self.graph_at(Endpoint::Repository, query.to_string())
    }

    fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        if request.is_empty() {
            return Ok(());
        }
        self.execute_update(Endpoint::Repository, request.to_string())
    }
}

impl StoreConnection for Rdf4jConnection {
    fn backend(&self) -> &'static str {
        "rdf4j"
    }

    fn start_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let response =
            self.send(self.client.post(format!("{}/transactions", self.repository_url)))?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| malformed("transaction response without a Location header"))?;
        let url = transaction_url(&self.repository_url, location);
        debug!(backend = "rdf4j", transaction = %url, "transaction started");
        Ok(Box::new(Rdf4jTransaction {
            connection: self,
            url,
            closed: false,
        }))
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Server-side transaction. Dropped without commit or rollback, it is
/// rolled back on a best-effort basis.
#[derive(Debug)]
pub struct Rdf4jTransaction<'a> {
    connection: &'a Rdf4jConnection,
    url: String,
    closed: bool,
}

impl Rdf4jTransaction<'_> {
    fn endpoint(&self) -> Endpoint<'_> {
        Endpoint::Transaction(&self.url)
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.connection
            .send(self.connection.client.delete(&self.url))
            .map(drop)
    }
}

impl QueryExecutor for Rdf4jTransaction<'_> {
    fn ask(&self, query: &AskQuery) -> Result<bool, StoreError> {
        self.connection.ask_at(self.endpoint(), query)
    }

    fn select_with(
        &self,
        query: &SelectQuery,
        on_row: &mut dyn FnMut(Solution) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.connection.select_at(self.endpoint(), query, on_row)
    }

    fn construct(&self, query: &ConstructQuery) -> Result<Vec<Triple>, StoreError> {
        self.connection.graph_at(self.endpoint(), query.to_string())
    }

    fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError> {
        self.connection.graph_at(self.endpoint(), query.to_string())
    }

    fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        if request.is_empty() {
            return Ok(());
        }
        self.connection
            .execute_update(self.endpoint(), request.to_string())
    }
}

impl Transaction for Rdf4jTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.connection.send(
            self.connection
                .client
                .put(&self.url)
                .query(&[("action", "COMMIT")]),
        )?;
        self.closed = true;
        debug!(backend = "rdf4j", transaction = %self.url, "transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.closed = true;
        self.delete()
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

impl Drop for Rdf4jTransaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.delete() {
                warn!(transaction = %self.url, error = %e, "abandoned transaction not rolled back");
            }
        }
    }
}
