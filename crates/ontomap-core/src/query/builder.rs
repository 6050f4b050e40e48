//! # Query Synthesizer
//!
//! Builds every query and update the facade runs from an
//! [`EntityDescriptor`]. No per-entity query text exists anywhere else.
//!
//! Instance pattern shared by select and count:
//!
//! ```text
//! ?rdfType rdfs:subClassOf* <Type> .
//! ?uri rdf:type ?rdfType .
//! ?uri <required> ?required .
//! OPTIONAL { ?uri <optional> ?optional }
//! ```
//!
//! Multi-valued fields are not part of it; they are fetched with one
//! `list_builder` query per field for a whole page of identifiers.

use super::{
    AskQuery, CompareOp, DescribeQuery, Expression, FilterSet, GroupPattern, OrderCondition, PathPattern,
    PatternElement, Projection, SelectQuery, TermPattern, TriplePattern, UpdateOperation,
    UpdateRequest,
};
use crate::mapping::{EntityDescriptor, FieldDescriptor, FieldTarget, Fields};
use crate::primitives::{COUNT_VAR, TYPE_VAR, URI_VAR};
use crate::types::{OntomapError, OrderBy, SortOrder};
use oxrdf::vocab::{rdf, rdfs};
use oxrdf::{NamedNode, Term, Triple, Variable};
use std::collections::BTreeSet;

/// Variable bound to instance identifiers.
pub(crate) fn uri_var() -> Variable {
    Variable::new_unchecked(URI_VAR)
}

pub(crate) fn type_var() -> Variable {
    Variable::new_unchecked(TYPE_VAR)
}

pub(crate) fn count_var() -> Variable {
    Variable::new_unchecked(COUNT_VAR)
}

/// `subject <p> value`, or `value <p> subject` for inverse fields.
pub(crate) fn field_triple(
    field: &FieldDescriptor,
    subject: impl Into<TermPattern>,
    value: impl Into<TermPattern>,
) -> TriplePattern {
    if field.is_inverse() {
        TriplePattern::new(value, field.predicate(), subject)
    } else {
        TriplePattern::new(subject, field.predicate(), value)
    }
}

/// `FILTER` keeping only the values of `field` when it shares its
/// predicate with other fields.
pub(crate) fn kind_guard(field: &FieldDescriptor, value: &Variable) -> Option<PatternElement> {
    if !field.is_shared() {
        return None;
    }
    let operand = Box::new(Expression::Variable(value.clone()));
    let guard = match field.datatype() {
        Some(datatype) => Expression::compare(
            CompareOp::Equal,
            Expression::Datatype(operand),
            Expression::Constant(datatype.clone().into()),
        ),
        None => Expression::IsIri(operand),
    };
    Some(PatternElement::Filter(guard))
}

/// Triple binding `value` to one value of `field`, guarded when the
/// predicate is shared.
pub(crate) fn value_pattern(
    field: &FieldDescriptor,
    subject: impl Into<TermPattern>,
    value: &Variable,
) -> GroupPattern {
    let mut pattern = GroupPattern::new().with(field_triple(field, subject, value));
    if let Some(guard) = kind_guard(field, value) {
        pattern.push(guard);
    }
    pattern
}

/// Concrete triple storing one field value, `None` when an inverse field
/// holds a literal.
fn value_triple(field: &FieldDescriptor, uri: &NamedNode, value: &Term) -> Option<Triple> {
    if !field.is_inverse() {
        return Some(Triple::new(
            uri.clone(),
            field.predicate().clone(),
            value.clone(),
        ));
    }
    match value {
        Term::NamedNode(node) => Some(Triple::new(
            node.clone(),
            field.predicate().clone(),
            uri.clone(),
        )),
        Term::BlankNode(node) => Some(Triple::new(
            node.clone(),
            field.predicate().clone(),
            uri.clone(),
        )),
        _ => None,
    }
}

fn type_patterns(rdf_type: &NamedNode, subject: TermPattern) -> Vec<PatternElement> {
    vec![
        PatternElement::Triple(TriplePattern::new(
            type_var(),
            PathPattern::ZeroOrMore(rdfs::SUB_CLASS_OF.into_owned()),
            rdf_type,
        )),
        PatternElement::Triple(TriplePattern {
            subject,
            path: PathPattern::Predicate(rdf::TYPE.into_owned()),
            object: TermPattern::Variable(type_var()),
        }),
    ]
}

/// Wrap `inner` in the descriptor's named graph, if any.
fn scoped(descriptor: &EntityDescriptor, inner: GroupPattern) -> GroupPattern {
    match descriptor.graph() {
        Some(graph) => GroupPattern::new().with(PatternElement::Graph {
            graph: graph.clone(),
            pattern: inner,
        }),
        None => inner,
    }
}

fn instance_pattern(descriptor: &EntityDescriptor) -> GroupPattern {
    let mut inner = GroupPattern::from(type_patterns(descriptor.rdf_type(), uri_var().into()));
    for field in descriptor.scalar_fields() {
        let triple = field_triple(field, uri_var(), field.variable());
        if field.is_required() {
            inner.push(triple);
        } else {
            inner.push(PatternElement::Optional(GroupPattern::new().with(triple)));
        }
    }
    scoped(descriptor, inner)
}

/// Add filters next to the instance triples, inside the graph block when
/// the type lives in a named graph.
fn restrict(descriptor: &EntityDescriptor, pattern: &mut GroupPattern, filters: Vec<Expression>) {
    match pattern.elements.first_mut() {
        Some(PatternElement::Graph { pattern: inner, .. }) if descriptor.graph().is_some() => {
            for filter in filters {
                inner.push(filter);
            }
        }
        _ => {
            for filter in filters {
                pattern.push(filter);
            }
        }
    }
}

/// `DELETE { s <p> ?v } WHERE { s <p> ?v }` for one field of one instance.
fn wipe_field(descriptor: &EntityDescriptor, field: &FieldDescriptor, uri: &NamedNode) -> UpdateOperation {
    let triple = field_triple(field, uri, field.variable());
    UpdateOperation::DeleteInsert {
        graph: descriptor.graph().cloned(),
        delete: vec![triple.clone()],
        insert: Vec::new(),
        pattern: GroupPattern::new().with(triple),
    }
}

/// Stateless builder of entity queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    // =========================================================================
    // READ QUERIES
    // =========================================================================

    /// Distinct rows of identifier plus single-valued fields.
    #[must_use]
    pub fn select_builder(descriptor: &EntityDescriptor) -> SelectQuery {
        let mut variables = vec![uri_var()];
        variables.extend(descriptor.scalar_fields().map(|f| f.variable().clone()));
        SelectQuery {
            distinct: true,
            projection: Projection::Variables(variables),
            pattern: instance_pattern(descriptor),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Same pattern as [`QueryBuilder::select_builder`], counting distinct
    /// identifiers.
    #[must_use]
    pub fn count_builder(descriptor: &EntityDescriptor) -> SelectQuery {
        SelectQuery {
            distinct: false,
            projection: Projection::Count {
                variable: uri_var(),
                alias: count_var(),
            },
            pattern: instance_pattern(descriptor),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Filtered, ordered select. The identifier is always the last ordering
    /// key so that pages are stable.
    pub fn search_builder(
        descriptor: &EntityDescriptor,
        filters: &FilterSet,
        order: &[OrderBy],
    ) -> Result<SelectQuery, OntomapError> {
        let mut query = Self::select_builder(descriptor);
        restrict(descriptor, &mut query.pattern, filters.compile(descriptor)?);
        query.order_by = Self::order_conditions(descriptor, order)?;
        if !query.order_by.iter().any(|c| c.variable == uri_var()) {
            query.order_by.push(OrderCondition {
                variable: uri_var(),
                descending: false,
            });
        }
        Ok(query)
    }

    /// Count with the same filters as [`QueryBuilder::search_builder`].
    pub fn count_filtered(
        descriptor: &EntityDescriptor,
        filters: &FilterSet,
    ) -> Result<SelectQuery, OntomapError> {
        let mut query = Self::count_builder(descriptor);
        restrict(descriptor, &mut query.pattern, filters.compile(descriptor)?);
        Ok(query)
    }

    /// Select restricted to the given identifiers.
    #[must_use]
    pub fn select_by_uris(descriptor: &EntityDescriptor, uris: &[NamedNode]) -> SelectQuery {
        let mut query = Self::select_builder(descriptor);
        query.pattern.elements.insert(
            0,
            PatternElement::Values {
                variable: uri_var(),
                terms: uris.iter().cloned().map(Term::from).collect(),
            },
        );
        query
    }

    /// Values of one multi-valued field for a batch of identifiers.
    #[must_use]
    pub fn list_builder(
        descriptor: &EntityDescriptor,
        field: &FieldDescriptor,
        uris: &[NamedNode],
    ) -> SelectQuery {
        let mut pattern = GroupPattern::new().with(PatternElement::Values {
            variable: uri_var(),
            terms: uris.iter().cloned().map(Term::from).collect(),
        });
        pattern
            .elements
            .extend(value_pattern(field, uri_var(), field.variable()).elements);
        let mut query = SelectQuery::new(
            vec![uri_var(), field.variable().clone()],
            scoped(descriptor, pattern),
        );
        query.distinct = true;
        query
    }

    /// True iff `uri` is an instance of the type or one of its subclasses.
    #[must_use]
    pub fn ask_builder(descriptor: &EntityDescriptor, uri: &NamedNode) -> AskQuery {
        AskQuery {
            pattern: scoped(
                descriptor,
                GroupPattern::from(type_patterns(descriptor.rdf_type(), uri.into())),
            ),
        }
    }

    /// Type check against an arbitrary class, across all graphs.
    #[must_use]
    pub fn ask_type(rdf_type: &NamedNode, uri: &NamedNode) -> AskQuery {
        AskQuery {
            pattern: GroupPattern::from(type_patterns(rdf_type, uri.into())),
        }
    }

    /// True iff `uri` appears as subject or object of any triple.
    #[must_use]
    pub fn exists_builder(uri: &NamedNode) -> AskQuery {
        let p = Variable::new_unchecked("p");
        AskQuery {
            pattern: GroupPattern::new().with(PatternElement::Union(vec![
                GroupPattern::new().with(TriplePattern::new(
                    uri,
                    p.clone(),
                    Variable::new_unchecked("o"),
                )),
                GroupPattern::new().with(TriplePattern::new(Variable::new_unchecked("s"), p, uri)),
            ])),
        }
    }

    #[must_use]
    pub fn describe_builder(uri: &NamedNode) -> DescribeQuery {
        DescribeQuery {
            resource: uri.clone(),
        }
    }

    /// Resolve ordering criteria. Multi-valued fields cannot be ordered on.
    pub fn order_conditions(
        descriptor: &EntityDescriptor,
        order: &[OrderBy],
    ) -> Result<Vec<OrderCondition>, OntomapError> {
        order
            .iter()
            .map(|criterion| {
                let variable = match descriptor.resolve(&criterion.field)? {
                    FieldTarget::Identifier => uri_var(),
                    FieldTarget::Field(f) if f.is_many() => {
                        return Err(OntomapError::invalid(
                            f.name(),
                            "cannot order by a multi-valued field",
                        ));
                    }
                    FieldTarget::Field(f) => f.variable().clone(),
                };
                Ok(OrderCondition {
                    variable,
                    descending: criterion.order == SortOrder::Descending,
                })
            })
            .collect()
    }

    // =========================================================================
    // WRITE FRAGMENTS
    // =========================================================================

    /// Triples describing one new instance: its type plus every value.
    #[must_use]
    pub fn create_fragment(
        descriptor: &EntityDescriptor,
        uri: &NamedNode,
        fields: &Fields,
    ) -> Vec<Triple> {
        let mut triples = vec![Triple::new(
            uri.clone(),
            rdf::TYPE.into_owned(),
            descriptor.rdf_type().clone(),
        )];
        for field in descriptor.fields() {
            triples.extend(
                fields
                    .get(field.name())
                    .iter()
                    .filter_map(|value| value_triple(field, uri, value)),
            );
        }
        triples
    }

    /// One `INSERT DATA` for a batch of new instances.
    #[must_use]
    pub fn create_fragment_all(
        descriptor: &EntityDescriptor,
        instances: &[(NamedNode, Fields)],
    ) -> UpdateRequest {
        let triples = instances
            .iter()
            .flat_map(|(uri, fields)| Self::create_fragment(descriptor, uri, fields))
            .collect();
        UpdateOperation::InsertData {
            graph: descriptor.graph().cloned(),
            triples,
        }
        .into()
    }

    /// Replace the values of fields whose value set changed; untouched
    /// fields produce no operation.
    #[must_use]
    pub fn update_fragment(
        descriptor: &EntityDescriptor,
        uri: &NamedNode,
        stored: &Fields,
        updated: &Fields,
    ) -> Vec<UpdateOperation> {
        let mut operations = Vec::new();
        for field in descriptor.fields() {
            let before: BTreeSet<String> =
                stored.get(field.name()).iter().map(Term::to_string).collect();
            let after: BTreeSet<String> =
                updated.get(field.name()).iter().map(Term::to_string).collect();
            if before == after {
                continue;
            }
            if field.is_shared() {
                // Only this field's own values; the predicate holds others too.
                let triples: Vec<Triple> = stored
                    .get(field.name())
                    .iter()
                    .filter_map(|value| value_triple(field, uri, value))
                    .collect();
                if !triples.is_empty() {
                    operations.push(UpdateOperation::DeleteData {
                        graph: descriptor.graph().cloned(),
                        triples,
                    });
                }
            } else {
                operations.push(wipe_field(descriptor, field, uri));
            }
            let triples: Vec<Triple> = updated
                .get(field.name())
                .iter()
                .filter_map(|value| value_triple(field, uri, value))
                .collect();
            if !triples.is_empty() {
                operations.push(UpdateOperation::InsertData {
                    graph: descriptor.graph().cloned(),
                    triples,
                });
            }
        }
        operations
    }

    /// Remove the type triples and every mapped value of an instance.
    /// Triples of other resources pointing at it are left alone.
    #[must_use]
    pub fn delete_fragment(descriptor: &EntityDescriptor, uri: &NamedNode) -> Vec<UpdateOperation> {
        let mut operations: Vec<UpdateOperation> = descriptor
            .fields()
            .iter()
            .map(|field| wipe_field(descriptor, field, uri))
            .collect();
        let type_triple = TriplePattern::new(uri, rdf::TYPE.into_owned(), type_var());
        operations.push(UpdateOperation::DeleteInsert {
            graph: descriptor.graph().cloned(),
            delete: vec![type_triple.clone()],
            insert: Vec::new(),
            pattern: GroupPattern::new().with(type_triple),
        });
        operations
    }

    #[must_use]
    pub fn insert_data(graph: Option<&NamedNode>, triples: Vec<Triple>) -> UpdateRequest {
        UpdateOperation::InsertData {
            graph: graph.cloned(),
            triples,
        }
        .into()
    }

    #[must_use]
    pub fn clear_graph(graph: &NamedNode) -> UpdateRequest {
        UpdateOperation::ClearGraph {
            graph: graph.clone(),
        }
        .into()
    }

    /// Move every triple of `from` into `to`, replacing what `to` held.
    #[must_use]
    pub fn move_graph(from: &NamedNode, to: &NamedNode) -> UpdateRequest {
        UpdateOperation::MoveGraph {
            from: from.clone(),
            to: to.clone(),
        }
        .into()
    }

    /// Identifiers only, with the filters and ordering of
    /// [`QueryBuilder::search_builder`].
    pub fn search_uris_builder(
        descriptor: &EntityDescriptor,
        filters: &FilterSet,
        order: &[OrderBy],
    ) -> Result<SelectQuery, OntomapError> {
        let mut query = Self::search_builder(descriptor, filters, order)?;
        query.projection = Projection::Variables(vec![uri_var()]);
        Ok(query)
    }

    /// `DELETE DATA` of `subject <predicate> object` for each object.
    #[must_use]
    pub fn delete_relations(
        graph: Option<&NamedNode>,
        subject: &NamedNode,
        predicate: &NamedNode,
        objects: &[NamedNode],
    ) -> UpdateRequest {
        UpdateOperation::DeleteData {
            graph: graph.cloned(),
            triples: objects
                .iter()
                .map(|object| Triple::new(subject.clone(), predicate.clone(), object.clone()))
                .collect(),
        }
        .into()
    }

    /// Drop every `subject <predicate> ?o` and store `subject <predicate> object`.
    #[must_use]
    pub fn replace_relation(
        graph: Option<&NamedNode>,
        subject: &NamedNode,
        predicate: &NamedNode,
        object: &NamedNode,
    ) -> UpdateRequest {
        let old = TriplePattern::new(subject.clone(), predicate.clone(), Variable::new_unchecked("old"));
        let mut request = UpdateRequest::new();
        request.push(UpdateOperation::DeleteInsert {
            graph: graph.cloned(),
            delete: vec![old.clone()],
            insert: Vec::new(),
            pattern: GroupPattern::new().with(old),
        });
        request.push(UpdateOperation::InsertData {
            graph: graph.cloned(),
            triples: vec![Triple::new(subject.clone(), predicate.clone(), object.clone())],
        });
        request
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mapping::{Deserializers, EntityMapping, FieldMapping};
    use oxrdf::vocab::xsd;
    use oxrdf::Literal;

    fn descriptor(graph: Option<&str>) -> EntityDescriptor {
        let mut mapping = EntityMapping::new("http://example.org/Sample")
            .identifier("uri")
            .field(FieldMapping::string("label", "http://example.org/label"))
            .field(FieldMapping::data("value", "http://example.org/value", xsd::DECIMAL.as_str()).optional())
            .field(FieldMapping::object("tags", "http://example.org/tag").many())
            .field(FieldMapping::object("partOf", "http://example.org/hasPart").optional().inverse());
        if let Some(graph) = graph {
            mapping = mapping.graph(graph);
        }
        EntityDescriptor::build("Sample", mapping, &Deserializers::standard()).unwrap()
    }

    fn uri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(value)
    }

    #[test]
    fn select_projects_scalars_only() {
        let query = QueryBuilder::select_builder(&descriptor(None));
        assert_eq!(
            query.to_string(),
            "SELECT DISTINCT ?uri ?label ?value ?partOf WHERE { \
             ?rdfType <http://www.w3.org/2000/01/rdf-schema#subClassOf>* <http://example.org/Sample> . \
             ?uri <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> ?rdfType . \
             ?uri <http://example.org/label> ?label . \
             OPTIONAL { ?uri <http://example.org/value> ?value . } \
             OPTIONAL { ?partOf <http://example.org/hasPart> ?uri . } }"
        );
    }

    #[test]
    fn count_shares_the_pattern() {
        let d = descriptor(None);
        let select = QueryBuilder::select_builder(&d);
        let count = QueryBuilder::count_builder(&d);
        assert_eq!(select.pattern, count.pattern);
        assert!(count.to_string().starts_with("SELECT (COUNT(DISTINCT ?uri) AS ?count)"));
    }

    #[test]
    fn graph_scoping() {
        let query = QueryBuilder::select_builder(&descriptor(Some("http://example.org/g")));
        assert!(query.to_string().contains("WHERE { GRAPH <http://example.org/g> {"));
    }

    #[test]
    fn create_fragment_skips_absent_values() {
        let d = descriptor(None);
        let mut fields = Fields::new();
        fields.insert_terms("label", vec![Literal::new_simple_literal("a").into()]);
        fields.insert_terms(
            "tags",
            vec![uri("http://x/t1").into(), uri("http://x/t2").into()],
        );
        fields.insert_terms("partOf", vec![uri("http://x/parent").into()]);
        let triples = QueryBuilder::create_fragment(&d, &uri("http://x/s1"), &fields);
        assert_eq!(triples.len(), 5);
        assert!(triples.contains(&Triple::new(
            uri("http://x/parent"),
            uri("http://example.org/hasPart"),
            uri("http://x/s1"),
        )));
    }

    #[test]
    fn update_touches_changed_fields_only() {
        let d = descriptor(None);
        let mut stored = Fields::new();
        stored.insert_terms("label", vec![Literal::new_simple_literal("a").into()]);
        stored.insert_terms(
            "value",
            vec![Literal::new_typed_literal("1", xsd::DECIMAL).into()],
        );
        let mut updated = stored.clone();
        updated.insert_terms("label", vec![Literal::new_simple_literal("b").into()]);

        let operations = QueryBuilder::update_fragment(&d, &uri("http://x/s1"), &stored, &updated);
        assert_eq!(operations.len(), 2);
        let rendered = UpdateRequest { operations }.to_string();
        assert!(rendered.contains("<http://example.org/label>"));
        assert!(!rendered.contains("<http://example.org/value>"));
    }

    #[test]
    fn cleared_field_only_deletes() {
        let d = descriptor(None);
        let mut stored = Fields::new();
        stored.insert_terms(
            "value",
            vec![Literal::new_typed_literal("1", xsd::DECIMAL).into()],
        );
        let operations = QueryBuilder::update_fragment(&d, &uri("http://x/s1"), &stored, &Fields::new());
        assert_eq!(operations.len(), 1);
        assert!(matches!(operations[0], UpdateOperation::DeleteInsert { .. }));
    }

    #[test]
    fn delete_covers_every_field_and_type() {
        let d = descriptor(Some("http://example.org/g"));
        let operations = QueryBuilder::delete_fragment(&d, &uri("http://x/s1"));
        assert_eq!(operations.len(), d.fields().len() + 1);
        assert!(operations.iter().all(|op| matches!(
            op,
            UpdateOperation::DeleteInsert { graph: Some(g), .. } if g.as_str() == "http://example.org/g"
        )));
    }

    #[test]
    fn order_on_list_field_rejected() {
        let d = descriptor(None);
        assert!(QueryBuilder::order_conditions(&d, &[OrderBy::asc("tags")]).is_err());
        let conditions =
            QueryBuilder::order_conditions(&d, &[OrderBy::desc("label"), OrderBy::asc("uri")])
                .unwrap();
        assert_eq!(conditions[0].variable.as_str(), "label");
        assert!(conditions[0].descending);
        assert_eq!(conditions[1].variable.as_str(), "uri");
    }

    #[test]
    fn filters_land_inside_the_graph() {
        let d = descriptor(Some("http://example.org/g"));
        let filters = FilterSet::new().and(crate::query::Filter::eq("label", "a"));
        let search = QueryBuilder::search_builder(&d, &filters, &[]).unwrap();
        let count = QueryBuilder::count_filtered(&d, &filters).unwrap();
        assert_eq!(search.pattern, count.pattern);
        assert_eq!(search.pattern.elements.len(), 1);
        assert!(search.to_string().ends_with("FILTER((?label = \"a\")) } } ORDER BY ASC(?uri)"));
    }

    #[test]
    fn exists_checks_both_directions() {
        let query = QueryBuilder::exists_builder(&uri("http://x/a"));
        assert_eq!(
            query.to_string(),
            "ASK { { <http://x/a> ?p ?o . } UNION { ?s ?p <http://x/a> . } }"
        );
    }

    #[test]
    fn uri_search_projects_identifier_only() {
        let d = descriptor(None);
        let query = QueryBuilder::search_uris_builder(&d, &FilterSet::new(), &[]).unwrap();
        assert!(query.to_string().starts_with("SELECT DISTINCT ?uri WHERE {"));
        assert_eq!(query.order_by.len(), 1);
    }

    #[test]
    fn relation_updates() {
        let g = uri("http://x/g");
        let removed = QueryBuilder::delete_relations(
            Some(&g),
            &uri("http://x/s"),
            &uri("http://x/p"),
            &[uri("http://x/o1"), uri("http://x/o2")],
        );
        assert!(removed.to_string().starts_with("DELETE DATA { GRAPH <http://x/g> {"));
        assert!(removed.to_string().contains("<http://x/s> <http://x/p> <http://x/o2> ."));

        let replaced =
            QueryBuilder::replace_relation(None, &uri("http://x/s"), &uri("http://x/p"), &uri("http://x/n"));
        let text = replaced.to_string();
        assert!(text.contains("DELETE { <http://x/s> <http://x/p> ?old . }"));
        assert!(text.contains("INSERT DATA { <http://x/s> <http://x/p> <http://x/n> . }"));
    }
}
