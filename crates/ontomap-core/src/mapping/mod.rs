//! # Entity Mapping
//!
//! Static declaration of how a Rust type maps onto RDF.
//!
//! A type implements [`Entity`] and returns an [`EntityMapping`] built with
//! [`FieldMapping`] entries. The mapping is validated once into an
//! [`EntityDescriptor`] and cached per type by the [`DescriptorRegistry`].
//!
//! ```text
//! EntityMapping::new("http://example.org/Sample")
//!     .identifier("uri")
//!     .field(FieldMapping::string("label", "http://www.w3.org/2000/01/rdf-schema#label"))
//!     .field(FieldMapping::data("value", "http://example.org/value", xsd::DECIMAL.as_str()).optional())
//! ```

pub mod descriptor;
pub mod deserializer;
pub mod registry;
pub mod value;

pub use descriptor::{Cardinality, EntityDescriptor, FieldDescriptor, FieldKind, FieldTarget};
pub use deserializer::{Deserializer, Deserializers, XsdDeserializer};
pub use registry::DescriptorRegistry;
pub use value::{Fields, RdfValue};

use crate::types::OntomapError;
use crate::uri::UriGenerator;
use oxrdf::NamedNode;
use oxrdf::vocab::xsd;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// ENTITY TRAIT
// =============================================================================

/// A domain type persisted in the triple store.
///
/// `write_fields` and `read_fields` use the field names declared in
/// `mapping()`. Values written for undeclared names are rejected.
pub trait Entity: Sized + 'static {
    /// Declared mapping. Called once per registry.
    fn mapping() -> EntityMapping;

    /// Identifier, `None` until the instance is persisted.
    fn uri(&self) -> Option<&NamedNode>;

    fn set_uri(&mut self, uri: NamedNode);

    fn write_fields(&self, fields: &mut Fields);

    fn read_fields(uri: NamedNode, fields: &mut Fields) -> Result<Self, OntomapError>;
}

// =============================================================================
// DECLARATION BUILDERS
// =============================================================================

/// Unvalidated mapping of one type.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub(crate) rdf_type: String,
    pub(crate) identifier: Option<String>,
    pub(crate) segment: Option<String>,
    pub(crate) graph: Option<String>,
    pub(crate) generator: Option<Arc<dyn UriGenerator>>,
    pub(crate) fields: Vec<FieldMapping>,
}

impl EntityMapping {
    /// Start a mapping for instances of the given RDF class.
    #[must_use]
    pub fn new(rdf_type: impl Into<String>) -> Self {
        Self {
            rdf_type: rdf_type.into(),
            identifier: None,
            segment: None,
            graph: None,
            generator: None,
            fields: Vec::new(),
        }
    }

    /// Name under which the identifier is addressed in filters and ordering.
    #[must_use]
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.identifier = Some(name.into());
        self
    }

    /// Path segment inserted between the namespace and generated ids.
    /// Defaults to the lowercased local name of the class.
    #[must_use]
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    /// Named graph holding the instances. Defaults to the default graph.
    #[must_use]
    pub fn graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Identifier generator. Defaults to [`crate::uri::DigestUriGenerator`].
    #[must_use]
    pub fn generator(mut self, generator: impl UriGenerator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }
}

/// Unvalidated binding of one field to a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub(crate) name: String,
    pub(crate) predicate: String,
    /// `None` for object (IRI valued) fields.
    pub(crate) datatype: Option<String>,
    pub(crate) cardinality: Cardinality,
    pub(crate) inverse: bool,
}

impl FieldMapping {
    /// Required literal field of the given datatype.
    #[must_use]
    pub fn data(
        name: impl Into<String>,
        predicate: impl Into<String>,
        datatype: impl AsRef<str>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: predicate.into(),
            datatype: Some(datatype.as_ref().to_string()),
            cardinality: Cardinality::Required,
            inverse: false,
        }
    }

    /// Required `xsd:string` field.
    #[must_use]
    pub fn string(name: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self::data(name, predicate, xsd::STRING.as_str())
    }

    /// Required field pointing at another resource.
    #[must_use]
    pub fn object(name: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicate: predicate.into(),
            datatype: None,
            cardinality: Cardinality::Required,
            inverse: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    /// Multi-valued field, loaded with a separate query.
    #[must_use]
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Stored as `?value <predicate> ?instance` instead of the reverse.
    #[must_use]
    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a mapping could not be turned into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("{type_name}: no identifier field declared")]
    MissingIdentifier { type_name: String },

    #[error("{type_name}: invalid IRI '{iri}' for {context}")]
    InvalidIri {
        type_name: String,
        context: String,
        iri: String,
    },

    #[error("{type_name}: field '{field}' declared twice")]
    DuplicateField { type_name: String, field: String },

    #[error("{type_name}: field name '{field}' is reserved")]
    ReservedField { type_name: String, field: String },

    #[error("{type_name}: field name '{field}' is not a valid SPARQL variable name")]
    InvalidFieldName { type_name: String, field: String },

    #[error("{type_name}: no deserializer for datatype <{datatype}> of field '{field}'")]
    UnsupportedDatatype {
        type_name: String,
        field: String,
        datatype: String,
    },

    #[error("{type_name}: data field '{field}' cannot be inverse")]
    InverseLiteral { type_name: String, field: String },

    #[error(
        "{type_name}: predicate <{predicate}> is shared by {fields:?}, which are not all multi-valued with distinct value kinds"
    )]
    AmbiguousPredicate {
        type_name: String,
        predicate: String,
        fields: Vec<String>,
    },
}
