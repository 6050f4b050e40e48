//! # ontomap-core
//!
//! Typed persistence of domain objects in an RDF triple store.
//!
//! A domain type declares its mapping once ([`Entity`]); the
//! [`QueryBuilder`] turns that mapping into SPARQL algebra, and the
//! [`Repository`] operations run it against a [`StoreConnection`] while
//! converting between objects and triples.
//!
//! ## Layers
//!
//! - `uri`: identifier generation for new objects
//! - `mapping`: entity descriptors, field bindings, literal deserializers
//! - `query`: SPARQL algebra, filters and the query synthesizer
//! - `store`: connection traits, the embedded redb store, the RDF4J client
//! - `service`: the persistence facade
//! - `document` + `coordinator`: writes spanning a triple store and a
//!   document store
//!
//! ## Architectural Constraints
//!
//! - Blocking API: callers own their threads, no async runtime
//! - Mapping tables are static: no reflection, one descriptor per type
//! - Transactions are consumed by commit or rollback
//! - Failures are returned, never logged and dropped

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod document;
pub mod mapping;
pub mod primitives;
pub mod query;
pub mod service;
pub mod store;
pub mod types;
pub mod uri;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use config::ServiceConfig;
pub use types::{ErrorKind, OntomapError, OrderBy, Page, Pagination, SortOrder};

// =============================================================================
// RE-EXPORTS: Mapping
// =============================================================================

pub use mapping::{
    Cardinality, DescriptorRegistry, Deserializer, Deserializers, Entity, EntityDescriptor,
    EntityMapping, FieldDescriptor, FieldKind, FieldMapping, Fields, MappingError, RdfValue,
    XsdDeserializer,
};
pub use uri::{DigestUriGenerator, SlugUriGenerator, UriGenerator};

// =============================================================================
// RE-EXPORTS: Queries and Stores
// =============================================================================

pub use query::{Filter, FilterSet, FilterValue, QueryBuilder};
#[cfg(feature = "rdf4j")]
pub use store::Rdf4jConnection;
pub use store::{QueryExecutor, RedbTripleStore, Solution, StoreConnection, StoreError, Transaction};

// =============================================================================
// RE-EXPORTS: Facade and Coordination
// =============================================================================

pub use coordinator::{CoordinatorError, StoreKind, StorePlan};
pub use document::{
    DocumentCollections, DocumentError, DocumentStore, DocumentTransaction, RedbDocumentStore,
};
pub use service::{Repository, ServiceContext, SparqlService, SparqlTransaction};
