//! # Entity Descriptor
//!
//! Validated, immutable form of an [`EntityMapping`]: resolved IRIs,
//! SPARQL variables and deserializers for every field.

use super::{Deserializers, Entity, EntityMapping, Fields, MappingError};
use crate::mapping::deserializer::Deserializer;
use crate::primitives::{COUNT_VAR, ITEM_SUFFIX, TYPE_VAR, URI_VAR};
use crate::types::OntomapError;
use crate::uri::{DigestUriGenerator, UriGenerator};
use oxrdf::{NamedNode, Term, Variable};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// FIELD DESCRIPTOR
// =============================================================================

/// How many values a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one value.
    Required,
    /// Zero or one value.
    Optional,
    /// Any number of values.
    Many,
}

/// Literal or resource valued.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Data(Arc<dyn Deserializer>),
    Object,
}

/// A validated field binding.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    variable: Variable,
    item_variable: Variable,
    predicate: NamedNode,
    kind: FieldKind,
    cardinality: Cardinality,
    inverse: bool,
    /// Another field of the type binds the same predicate.
    shared: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable bound to the field value in generated queries.
    #[must_use]
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Variable used inside `EXISTS` blocks filtering a multi-valued field.
    #[must_use]
    pub fn item_variable(&self) -> &Variable {
        &self.item_variable
    }

    #[must_use]
    pub fn predicate(&self) -> &NamedNode {
        &self.predicate
    }

    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    #[must_use]
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    #[must_use]
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.cardinality == Cardinality::Required
    }

    /// Values of a shared predicate are told apart by term kind and
    /// datatype.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    fn value_class(&self) -> &str {
        self.datatype().map_or("", NamedNode::as_str)
    }

    /// Datatype IRI of a data field.
    #[must_use]
    pub fn datatype(&self) -> Option<&NamedNode> {
        match &self.kind {
            FieldKind::Data(deserializer) => Some(deserializer.datatype()),
            FieldKind::Object => None,
        }
    }

    /// Check a term against the field kind and return its canonical form.
    pub fn normalize(&self, term: &Term) -> Result<Term, OntomapError> {
        match (&self.kind, term) {
            (FieldKind::Data(deserializer), Term::Literal(literal)) => deserializer
                .normalize(literal.value())
                .map(Term::from)
                .map_err(|reason| OntomapError::invalid(&self.name, reason)),
            (FieldKind::Data(_), other) => Err(OntomapError::invalid(
                &self.name,
                format!("expected a literal, found {other}"),
            )),
            (FieldKind::Object, Term::NamedNode(_)) => Ok(term.clone()),
            (FieldKind::Object, other) => Err(OntomapError::invalid(
                &self.name,
                format!("expected an IRI, found {other}"),
            )),
        }
    }

    /// Turn a caller supplied lexical form into a term of this field.
    pub fn parse(&self, lexical: &str) -> Result<Term, OntomapError> {
        match &self.kind {
            FieldKind::Data(deserializer) => deserializer
                .normalize(lexical)
                .map(Term::from)
                .map_err(|reason| OntomapError::invalid(&self.name, reason)),
            FieldKind::Object => NamedNode::new(lexical)
                .map(Term::from)
                .map_err(|e| OntomapError::invalid(&self.name, e.to_string())),
        }
    }
}

/// What a field name used in a filter or ordering refers to.
#[derive(Debug, Clone, Copy)]
pub enum FieldTarget<'a> {
    Identifier,
    Field(&'a FieldDescriptor),
}

// =============================================================================
// ENTITY DESCRIPTOR
// =============================================================================

/// Validated mapping of one type. Built once, shared through `Arc`.
#[derive(Debug)]
pub struct EntityDescriptor {
    type_name: String,
    rdf_type: NamedNode,
    identifier: String,
    segment: String,
    graph: Option<NamedNode>,
    generator: Arc<dyn UriGenerator>,
    fields: Vec<FieldDescriptor>,
    index: BTreeMap<String, usize>,
}

impl EntityDescriptor {
    /// Validate a mapping.
    ///
    /// Fails when the identifier is missing, a name or IRI is malformed, a
    /// datatype has no deserializer, or a predicate is shared by fields
    /// that are not all multi-valued or whose values cannot be told apart
    /// by datatype or term kind.
    pub fn build(
        type_name: &str,
        mapping: EntityMapping,
        deserializers: &Deserializers,
    ) -> Result<Self, MappingError> {
        let invalid_iri = |context: String, iri: &str| MappingError::InvalidIri {
            type_name: type_name.to_string(),
            context,
            iri: iri.to_string(),
        };

        let identifier = mapping
            .identifier
            .clone()
            .ok_or_else(|| MappingError::MissingIdentifier {
                type_name: type_name.to_string(),
            })?;
        let rdf_type = NamedNode::new(mapping.rdf_type.as_str())
            .map_err(|_| invalid_iri("the RDF type".to_string(), &mapping.rdf_type))?;
        let graph = mapping
            .graph
            .as_deref()
            .map(|g| NamedNode::new(g).map_err(|_| invalid_iri("the graph".to_string(), g)))
            .transpose()?;

        let mut fields = Vec::with_capacity(mapping.fields.len());
        let mut index = BTreeMap::new();
        for field in mapping.fields {
            let reserved = field.name == identifier
                || field.name == URI_VAR
                || field.name == TYPE_VAR
                || field.name == COUNT_VAR
                || field.name.ends_with(ITEM_SUFFIX);
            if reserved {
                return Err(MappingError::ReservedField {
                    type_name: type_name.to_string(),
                    field: field.name,
                });
            }
            if index.contains_key(&field.name) {
                return Err(MappingError::DuplicateField {
                    type_name: type_name.to_string(),
                    field: field.name,
                });
            }
            let invalid_name = || MappingError::InvalidFieldName {
                type_name: type_name.to_string(),
                field: field.name.clone(),
            };
            let variable = Variable::new(field.name.as_str()).map_err(|_| invalid_name())?;
            let item_variable =
                Variable::new(format!("{}{ITEM_SUFFIX}", field.name)).map_err(|_| invalid_name())?;
            let predicate = NamedNode::new(field.predicate.as_str()).map_err(|_| {
                invalid_iri(format!("field '{}'", field.name), &field.predicate)
            })?;
            let kind = match &field.datatype {
                Some(datatype) => {
                    if field.inverse {
                        return Err(MappingError::InverseLiteral {
                            type_name: type_name.to_string(),
                            field: field.name,
                        });
                    }
                    let deserializer = deserializers.get(datatype).ok_or_else(|| {
                        MappingError::UnsupportedDatatype {
                            type_name: type_name.to_string(),
                            field: field.name.clone(),
                            datatype: datatype.clone(),
                        }
                    })?;
                    FieldKind::Data(deserializer)
                }
                None => FieldKind::Object,
            };
            index.insert(field.name.clone(), fields.len());
            fields.push(FieldDescriptor {
                name: field.name,
                variable,
                item_variable,
                predicate,
                kind,
                cardinality: field.cardinality,
                inverse: field.inverse,
                shared: false,
            });
        }

        // Fields may share a predicate only when all are multi-valued and
        // no two of them can hold the same kind of value.
        let mut by_predicate: BTreeMap<(&str, bool), Vec<usize>> = BTreeMap::new();
        for (position, field) in fields.iter().enumerate() {
            by_predicate
                .entry((field.predicate.as_str(), field.inverse))
                .or_default()
                .push(position);
        }
        let mut shared = Vec::new();
        for ((predicate, _), sharing) in &by_predicate {
            if sharing.len() < 2 {
                continue;
            }
            let classes: BTreeSet<&str> = sharing.iter().map(|&i| fields[i].value_class()).collect();
            let distinct = classes.len() == sharing.len();
            if !distinct || !sharing.iter().all(|&i| fields[i].is_many()) {
                return Err(MappingError::AmbiguousPredicate {
                    type_name: type_name.to_string(),
                    predicate: (*predicate).to_string(),
                    fields: sharing.iter().map(|&i| fields[i].name.clone()).collect(),
                });
            }
            shared.extend(sharing.iter().copied());
        }
        for position in shared {
            fields[position].shared = true;
        }

        let segment = mapping
            .segment
            .unwrap_or_else(|| local_name(rdf_type.as_str()).to_lowercase());
        let generator = mapping
            .generator
            .unwrap_or_else(|| Arc::new(DigestUriGenerator));

        Ok(Self {
            type_name: type_name.to_string(),
            rdf_type,
            identifier,
            segment,
            graph,
            generator,
            fields,
            index,
        })
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn rdf_type(&self) -> &NamedNode {
        &self.rdf_type
    }

    /// Name of the identifier field.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    #[must_use]
    pub fn graph(&self) -> Option<&NamedNode> {
        self.graph.as_ref()
    }

    #[must_use]
    pub fn generator(&self) -> &dyn UriGenerator {
        self.generator.as_ref()
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_many())
    }

    pub fn many_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_many())
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).and_then(|i| self.fields.get(*i))
    }

    /// Resolve a caller supplied field name.
    pub fn resolve(&self, name: &str) -> Result<FieldTarget<'_>, OntomapError> {
        if name == self.identifier {
            return Ok(FieldTarget::Identifier);
        }
        self.field(name)
            .map(FieldTarget::Field)
            .ok_or_else(|| OntomapError::UnknownField {
                type_name: self.type_name.clone(),
                field: name.to_string(),
            })
    }

    /// Extract, validate and canonicalize the field values of an instance.
    pub fn collect_fields<T: Entity>(&self, instance: &T) -> Result<Fields, OntomapError> {
        let mut raw = Fields::new();
        instance.write_fields(&mut raw);
        if let Some(unknown) = raw.names().find(|name| self.field(name).is_none()) {
            return Err(OntomapError::UnknownField {
                type_name: self.type_name.clone(),
                field: unknown.to_string(),
            });
        }

        let mut fields = Fields::new();
        for field in &self.fields {
            let mut seen = BTreeSet::new();
            let mut terms = Vec::new();
            for term in raw.get(field.name()) {
                let normalized = field.normalize(term)?;
                if seen.insert(normalized.to_string()) {
                    terms.push(normalized);
                }
            }
            match (field.cardinality, terms.len()) {
                (Cardinality::Required, 0) => {
                    return Err(OntomapError::invalid(field.name(), "required value missing"));
                }
                (Cardinality::Required | Cardinality::Optional, n) if n > 1 => {
                    return Err(OntomapError::invalid(
                        field.name(),
                        format!("expected a single value, found {n}"),
                    ));
                }
                (_, 0) => {}
                _ => fields.insert_terms(field.name(), terms),
            }
        }
        Ok(fields)
    }
}

/// Part of an IRI after the last `#` or `/`.
pub(crate) fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}
