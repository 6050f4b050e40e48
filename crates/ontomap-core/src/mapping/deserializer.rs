//! # Datatype Deserializers
//!
//! Each data field declares an XSD datatype; the deserializer registered
//! for it validates lexical forms and produces the canonical literal that
//! is written to, and compared against, the store.

use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, NamedNodeRef};
use oxsdatatypes::{Boolean, Date, DateTime, Decimal, Double, Float, Integer};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

/// Parser for the lexical space of one datatype.
pub trait Deserializer: Send + Sync + fmt::Debug {
    /// Datatype IRI this deserializer handles.
    fn datatype(&self) -> &NamedNode;

    /// Validate `lexical` and return the canonical literal.
    fn normalize(&self, lexical: &str) -> Result<Literal, String>;
}

/// Deserializer backed by a canonicalizing function.
#[derive(Debug, Clone)]
pub struct XsdDeserializer {
    datatype: NamedNode,
    canonicalize: fn(&str) -> Result<String, String>,
}

impl XsdDeserializer {
    #[must_use]
    pub fn new(datatype: NamedNodeRef<'_>, canonicalize: fn(&str) -> Result<String, String>) -> Self {
        Self {
            datatype: datatype.into_owned(),
            canonicalize,
        }
    }
}

impl Deserializer for XsdDeserializer {
    fn datatype(&self) -> &NamedNode {
        &self.datatype
    }

    fn normalize(&self, lexical: &str) -> Result<Literal, String> {
        let canonical = (self.canonicalize)(lexical)?;
        Ok(Literal::new_typed_literal(canonical, self.datatype.clone()))
    }
}

fn canonical<T>(lexical: &str) -> Result<String, String>
where
    T: FromStr + Display,
    T::Err: Display,
{
    T::from_str(lexical.trim())
        .map(|value| value.to_string())
        .map_err(|e| format!("'{lexical}' is not a valid value: {e}"))
}

fn verbatim(lexical: &str) -> Result<String, String> {
    Ok(lexical.to_string())
}

fn any_uri(lexical: &str) -> Result<String, String> {
    NamedNode::new(lexical.trim())
        .map(NamedNode::into_string)
        .map_err(|e| format!("'{lexical}' is not an absolute IRI: {e}"))
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Deserializers keyed by datatype IRI.
#[derive(Debug, Clone)]
pub struct Deserializers {
    by_datatype: BTreeMap<String, Arc<dyn Deserializer>>,
}

impl Default for Deserializers {
    fn default() -> Self {
        Self::standard()
    }
}

impl Deserializers {
    /// Registry with no datatype at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_datatype: BTreeMap::new(),
        }
    }

    /// The XSD datatypes most vocabularies use.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(XsdDeserializer::new(xsd::STRING, verbatim));
        registry.register(XsdDeserializer::new(xsd::BOOLEAN, canonical::<Boolean>));
        registry.register(XsdDeserializer::new(xsd::INTEGER, canonical::<Integer>));
        registry.register(XsdDeserializer::new(xsd::INT, canonical::<Integer>));
        registry.register(XsdDeserializer::new(xsd::LONG, canonical::<Integer>));
        registry.register(XsdDeserializer::new(xsd::DECIMAL, canonical::<Decimal>));
        registry.register(XsdDeserializer::new(xsd::DOUBLE, canonical::<Double>));
        registry.register(XsdDeserializer::new(xsd::FLOAT, canonical::<Float>));
        registry.register(XsdDeserializer::new(xsd::DATE, canonical::<Date>));
        registry.register(XsdDeserializer::new(xsd::DATE_TIME, canonical::<DateTime>));
        registry.register(XsdDeserializer::new(xsd::ANY_URI, any_uri));
        registry
    }

    /// Add or replace the deserializer of a datatype.
    pub fn register(&mut self, deserializer: impl Deserializer + 'static) {
        self.by_datatype.insert(
            deserializer.datatype().as_str().to_string(),
            Arc::new(deserializer),
        );
    }

    #[must_use]
    pub fn get(&self, datatype: &str) -> Option<Arc<dyn Deserializer>> {
        self.by_datatype.get(datatype).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_datatype.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_datatype.is_empty()
    }
}
