//! # Caller Filters
//!
//! Field-level search criteria, resolved against an entity descriptor into
//! SPARQL filter expressions.
//!
//! Criteria in a [`FilterSet`] are ANDed. `FilterSet::and_opt` skips
//! criteria the caller left unspecified, so optional search parameters map
//! one-to-one onto builder calls.
//!
//! On multi-valued fields every criterion means "some value matches" and
//! compiles to an `EXISTS` block.

use super::builder::{uri_var, value_pattern};
use super::{CompareOp, Expression, PatternElement};
use crate::mapping::{EntityDescriptor, FieldKind, FieldTarget, RdfValue};
use crate::types::OntomapError;
use oxrdf::{Literal, NamedNode, Term};
use oxsdatatypes::Decimal;
use std::fmt;

// =============================================================================
// FILTER VALUES
// =============================================================================

/// A value compared against a field.
///
/// Lexical values are parsed with the field's deserializer, so `"1.50"`
/// matches a stored `1.5` decimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Lexical(String),
    Term(Term),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Lexical(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Lexical(value)
    }
}

impl From<NamedNode> for FilterValue {
    fn from(value: NamedNode) -> Self {
        Self::Term(value.into())
    }
}

impl From<&NamedNode> for FilterValue {
    fn from(value: &NamedNode) -> Self {
        Self::Term(value.clone().into())
    }
}

impl From<Literal> for FilterValue {
    fn from(value: Literal) -> Self {
        Self::Term(value.into())
    }
}

impl From<Term> for FilterValue {
    fn from(value: Term) -> Self {
        Self::Term(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Term(value.to_term())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Term(value.to_term())
    }
}

impl From<Decimal> for FilterValue {
    fn from(value: Decimal) -> Self {
        Self::Term(value.to_term())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical(value) => write!(f, "\"{value}\""),
            Self::Term(term) => write!(f, "{term}"),
        }
    }
}

// =============================================================================
// FILTER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: FilterValue,
    },
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    In {
        field: String,
        values: Vec<FilterValue>,
    },
    Bound {
        field: String,
        bound: bool,
    },
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Equality; on a multi-valued field, "contains".
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Equal, value)
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::NotEqual, value)
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Less, value)
    }

    #[must_use]
    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::LessOrEqual, value)
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Greater, value)
    }

    #[must_use]
    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::GreaterOrEqual, value)
    }

    /// Alias of [`Filter::eq`] that reads better on list fields.
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::eq(field, value)
    }

    /// Case-insensitive regular expression match.
    #[must_use]
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: true,
        }
    }

    #[must_use]
    pub fn regex_case_sensitive(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    #[must_use]
    pub fn one_of<V: Into<FilterValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_bound(field: impl Into<String>) -> Self {
        Self::Bound {
            field: field.into(),
            bound: true,
        }
    }

    #[must_use]
    pub fn is_unbound(field: impl Into<String>) -> Self {
        Self::Bound {
            field: field.into(),
            bound: false,
        }
    }

    #[must_use]
    pub fn all(filters: Vec<Filter>) -> Self {
        Self::All(filters)
    }

    #[must_use]
    pub fn any(filters: Vec<Filter>) -> Self {
        Self::Any(filters)
    }

    #[must_use]
    pub fn negate(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Resolve field names and values against `descriptor`.
    pub fn compile(&self, descriptor: &EntityDescriptor) -> Result<Expression, OntomapError> {
        match self {
            Self::Compare { field, op, value } => {
                let target = descriptor.resolve(field)?;
                let term = resolve_value(target, field, value)?;
                Ok(on_target(target, |operand| {
                    Expression::compare(*op, operand, Expression::Constant(term.clone()))
                }))
            }
            Self::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let target = descriptor.resolve(field)?;
                regex::RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| OntomapError::invalid(field, e.to_string()))?;
                let textual = matches!(
                    target,
                    FieldTarget::Field(f) if matches!(f.kind(), FieldKind::Data(_))
                );
                Ok(on_target(target, |operand| Expression::Regex {
                    text: Box::new(if textual {
                        operand
                    } else {
                        Expression::Str(Box::new(operand))
                    }),
                    pattern: pattern.clone(),
                    case_insensitive: *case_insensitive,
                }))
            }
            Self::In { field, values } => {
                let target = descriptor.resolve(field)?;
                let terms = values
                    .iter()
                    .map(|value| resolve_value(target, field, value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(on_target(target, |operand| {
                    Expression::In(Box::new(operand), terms.clone())
                }))
            }
            Self::Bound { field, bound } => {
                let target = descriptor.resolve(field)?;
                let expression = match target {
                    FieldTarget::Identifier => Expression::Constant(Literal::from(true).into()),
                    FieldTarget::Field(f) if f.is_many() => {
                        Expression::Exists(value_pattern(f, uri_var(), f.item_variable()))
                    }
                    FieldTarget::Field(f) => Expression::Bound(f.variable().clone()),
                };
                Ok(if *bound {
                    expression
                } else {
                    Expression::not(expression)
                })
            }
            Self::All(filters) => filters
                .iter()
                .map(|f| f.compile(descriptor))
                .collect::<Result<Vec<_>, _>>()
                .map(Expression::And),
            Self::Any(filters) => filters
                .iter()
                .map(|f| f.compile(descriptor))
                .collect::<Result<Vec<_>, _>>()
                .map(Expression::Or),
            Self::Not(inner) => inner.compile(descriptor).map(Expression::not),
        }
    }
}

/// Apply `build` to the value of the target, wrapping multi-valued fields
/// in `EXISTS { ?uri <p> ?item . FILTER(...) }`.
fn on_target(target: FieldTarget<'_>, build: impl Fn(Expression) -> Expression) -> Expression {
    match target {
        FieldTarget::Identifier => build(Expression::Variable(uri_var())),
        FieldTarget::Field(f) if f.is_many() => {
            let item = f.item_variable().clone();
            Expression::Exists(
                value_pattern(f, uri_var(), &item)
                    .with(PatternElement::Filter(build(Expression::Variable(item)))),
            )
        }
        FieldTarget::Field(f) => build(Expression::Variable(f.variable().clone())),
    }
}

fn resolve_value(
    target: FieldTarget<'_>,
    field: &str,
    value: &FilterValue,
) -> Result<Term, OntomapError> {
    match (target, value) {
        (FieldTarget::Identifier, FilterValue::Lexical(lexical)) => NamedNode::new(lexical.as_str())
            .map(Term::from)
            .map_err(|e| OntomapError::invalid(field, e.to_string())),
        (FieldTarget::Identifier, FilterValue::Term(term @ Term::NamedNode(_))) => Ok(term.clone()),
        (FieldTarget::Identifier, FilterValue::Term(other)) => Err(OntomapError::invalid(
            field,
            format!("expected an IRI, found {other}"),
        )),
        (FieldTarget::Field(f), FilterValue::Lexical(lexical)) => f.parse(lexical),
        (FieldTarget::Field(f), FilterValue::Term(term)) => f.normalize(term),
    }
}

// =============================================================================
// FILTER SET
// =============================================================================

/// Conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add the filter if the caller specified it.
    #[must_use]
    pub fn and_opt(mut self, filter: Option<Filter>) -> Self {
        if let Some(filter) = filter {
            self.filters.push(filter);
        }
        self
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// One filter expression per criterion.
    pub fn compile(&self, descriptor: &EntityDescriptor) -> Result<Vec<Expression>, OntomapError> {
        self.filters.iter().map(|f| f.compile(descriptor)).collect()
    }
}

impl From<Filter> for FilterSet {
    fn from(filter: Filter) -> Self {
        Self {
            filters: vec![filter],
        }
    }
}

impl FromIterator<Filter> for FilterSet {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
