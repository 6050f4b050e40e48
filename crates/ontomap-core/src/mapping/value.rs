//! # Field Values
//!
//! Conversion between Rust field values and RDF terms, and the `Fields`
//! bag an [`Entity`](super::Entity) fills in and reads back.

use crate::types::OntomapError;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, Term};
use oxsdatatypes::{Boolean, Date, DateTime, Decimal, Double};
use std::collections::BTreeMap;
use std::str::FromStr;

// =============================================================================
// RDF VALUE CONVERSION
// =============================================================================

/// A Rust value that can be stored as an RDF term.
///
/// `to_term` picks the natural XSD datatype of the Rust type; the
/// descriptor re-types the literal to the datatype declared by the field
/// before anything is written.
pub trait RdfValue: Sized {
    fn to_term(&self) -> Term;

    /// Read a value back. The error is a human readable reason.
    fn from_term(term: &Term) -> Result<Self, String>;
}

fn lexical(term: &Term) -> Result<&str, String> {
    match term {
        Term::Literal(literal) => Ok(literal.value()),
        other => Err(format!("expected a literal, found {other}")),
    }
}

fn parse_lexical<T>(term: &Term) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = lexical(term)?;
    T::from_str(value.trim()).map_err(|e| format!("'{value}': {e}"))
}

impl RdfValue for String {
    fn to_term(&self) -> Term {
        Literal::new_simple_literal(self.as_str()).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        lexical(term).map(str::to_string)
    }
}

impl RdfValue for bool {
    fn to_term(&self) -> Term {
        Literal::from(*self).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical::<Boolean>(term).map(bool::from)
    }
}

impl RdfValue for i64 {
    fn to_term(&self) -> Term {
        Literal::new_typed_literal(self.to_string(), xsd::INTEGER).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical::<i64>(term)
    }
}

impl RdfValue for Decimal {
    fn to_term(&self) -> Term {
        Literal::new_typed_literal(self.to_string(), xsd::DECIMAL).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical(term)
    }
}

impl RdfValue for Double {
    fn to_term(&self) -> Term {
        Literal::new_typed_literal(self.to_string(), xsd::DOUBLE).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical(term)
    }
}

impl RdfValue for Date {
    fn to_term(&self) -> Term {
        Literal::new_typed_literal(self.to_string(), xsd::DATE).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical(term)
    }
}

impl RdfValue for DateTime {
    fn to_term(&self) -> Term {
        Literal::new_typed_literal(self.to_string(), xsd::DATE_TIME).into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        parse_lexical(term)
    }
}

impl RdfValue for NamedNode {
    fn to_term(&self) -> Term {
        self.clone().into()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        match term {
            Term::NamedNode(node) => Ok(node.clone()),
            other => Err(format!("expected an IRI, found {other}")),
        }
    }
}

impl RdfValue for Term {
    fn to_term(&self) -> Term {
        self.clone()
    }

    fn from_term(term: &Term) -> Result<Self, String> {
        Ok(term.clone())
    }
}

// =============================================================================
// FIELD BAG
// =============================================================================

/// Field name to RDF values, in field-name order.
///
/// Single-valued fields hold at most one term. Absent and empty entries are
/// equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: BTreeMap<String, Vec<Term>>,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued field.
    pub fn set<V: RdfValue>(&mut self, name: &str, value: &V) {
        self.values.insert(name.to_string(), vec![value.to_term()]);
    }

    /// Set an optional field; `None` leaves it absent.
    pub fn set_opt<V: RdfValue>(&mut self, name: &str, value: Option<&V>) {
        match value {
            Some(value) => self.set(name, value),
            None => {
                self.values.remove(name);
            }
        }
    }

    /// Set a multi-valued field.
    pub fn set_all<'a, V, I>(&mut self, name: &str, values: I)
    where
        V: RdfValue + 'a,
        I: IntoIterator<Item = &'a V>,
    {
        let terms: Vec<Term> = values.into_iter().map(RdfValue::to_term).collect();
        self.values.insert(name.to_string(), terms);
    }

    /// Take a required single value.
    pub fn take<V: RdfValue>(&mut self, name: &str) -> Result<V, OntomapError> {
        self.take_opt(name)?
            .ok_or_else(|| OntomapError::invalid(name, "required value missing"))
    }

    /// Take an optional single value.
    pub fn take_opt<V: RdfValue>(&mut self, name: &str) -> Result<Option<V>, OntomapError> {
        let mut terms = self.values.remove(name).unwrap_or_default();
        if terms.len() > 1 {
            return Err(OntomapError::invalid(
                name,
                format!("expected a single value, found {}", terms.len()),
            ));
        }
        terms
            .pop()
            .map(|term| V::from_term(&term).map_err(|reason| OntomapError::invalid(name, reason)))
            .transpose()
    }

    /// Take every value of a multi-valued field.
    pub fn take_all<V: RdfValue>(&mut self, name: &str) -> Result<Vec<V>, OntomapError> {
        self.values
            .remove(name)
            .unwrap_or_default()
            .iter()
            .map(|term| V::from_term(term).map_err(|reason| OntomapError::invalid(name, reason)))
            .collect()
    }

    /// Raw terms of a field, empty when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &[Term] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty entries in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Term])> {
        self.values
            .iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(name, terms)| (name.as_str(), terms.as_slice()))
    }

    /// Names of every entry, including empty ones.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.values().all(Vec::is_empty)
    }

    pub(crate) fn insert_terms(&mut self, name: &str, terms: Vec<Term>) {
        self.values.insert(name.to_string(), terms);
    }

    pub(crate) fn push(&mut self, name: &str, term: Term) {
        self.values.entry(name.to_string()).or_default().push(term);
    }
}
