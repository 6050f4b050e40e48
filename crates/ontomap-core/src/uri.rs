//! # Identifier Generation
//!
//! Candidate identifiers for new instances.
//!
//! A generator is a pure function of the namespace, the entity descriptor,
//! the instance field values and a retry counter. The facade checks each
//! candidate against the store and increments the counter on collision,
//! up to `ServiceConfig::max_uri_attempts`.
//!
//! Shape of generated IRIs:
//!
//! ```text
//! {base_namespace}{segment}/{local}          retry = 0
//! {base_namespace}{segment}/{local}-{retry}  retry > 0
//! ```

use crate::mapping::{EntityDescriptor, Fields};
use crate::primitives::{MAX_SLUG_LEN, URI_DIGEST_HEX_LEN};
use crate::types::OntomapError;
use oxrdf::{NamedNode, Term};
use std::fmt;

/// Produces candidate identifiers.
pub trait UriGenerator: Send + Sync + fmt::Debug {
    fn generate(
        &self,
        base: &str,
        descriptor: &EntityDescriptor,
        fields: &Fields,
        retry: u32,
    ) -> Result<NamedNode, OntomapError>;
}

fn compose(
    base: &str,
    descriptor: &EntityDescriptor,
    local: &str,
    retry: u32,
) -> Result<NamedNode, OntomapError> {
    let mut iri = format!("{base}{}/{local}", descriptor.segment());
    if retry > 0 {
        iri.push_str(&format!("-{retry}"));
    }
    NamedNode::new(iri).map_err(|e| OntomapError::invalid(descriptor.identifier(), e.to_string()))
}

// =============================================================================
// DIGEST GENERATOR
// =============================================================================

/// Identifier derived from a BLAKE3 digest of the type and field values.
///
/// Identical instances produce the same first candidate and are told apart
/// by the retry suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestUriGenerator;

impl UriGenerator for DigestUriGenerator {
    fn generate(
        &self,
        base: &str,
        descriptor: &EntityDescriptor,
        fields: &Fields,
        retry: u32,
    ) -> Result<NamedNode, OntomapError> {
        compose(base, descriptor, &digest(descriptor, fields), retry)
    }
}

fn digest(descriptor: &EntityDescriptor, fields: &Fields) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(descriptor.rdf_type().as_str().as_bytes());
    for (name, terms) in fields.iter() {
        hasher.update(&[0x1e]);
        hasher.update(name.as_bytes());
        for term in terms {
            hasher.update(&[0x1f]);
            hasher.update(term.to_string().as_bytes());
        }
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()
        .get(..URI_DIGEST_HEX_LEN)
        .unwrap_or(hex.as_str())
        .to_string()
}

// =============================================================================
// SLUG GENERATOR
// =============================================================================

/// Human readable identifier built from one field value, e.g. a name.
///
/// Falls back to the digest when the field is absent or slugs to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugUriGenerator {
    field: String,
}

impl SlugUriGenerator {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl UriGenerator for SlugUriGenerator {
    fn generate(
        &self,
        base: &str,
        descriptor: &EntityDescriptor,
        fields: &Fields,
        retry: u32,
    ) -> Result<NamedNode, OntomapError> {
        let slug = fields
            .get(&self.field)
            .first()
            .map(|term| match term {
                Term::Literal(literal) => slugify(literal.value()),
                Term::NamedNode(node) => slugify(crate::mapping::descriptor::local_name(node.as_str())),
                other => slugify(&other.to_string()),
            })
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| digest(descriptor, fields));
        compose(base, descriptor, &slug, retry)
    }
}

/// Lowercase ASCII alphanumerics, every other run collapsed to one `-`.
pub(crate) fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mapping::{Deserializers, EntityMapping, FieldMapping};

    const BASE: &str = "http://example.org/";

    fn descriptor(mapping: EntityMapping) -> EntityDescriptor {
        EntityDescriptor::build("Sample", mapping, &Deserializers::standard()).unwrap()
    }

    fn sample() -> EntityDescriptor {
        descriptor(
            EntityMapping::new("http://example.org/Sample")
                .identifier("uri")
                .field(FieldMapping::string("label", "http://example.org/label")),
        )
    }

    fn fields(label: &str) -> Fields {
        let mut fields = Fields::new();
        fields.set("label", &label.to_string());
        fields
    }

    #[test]
    fn digest_is_deterministic() {
        let d = sample();
        let a = DigestUriGenerator.generate(BASE, &d, &fields("x"), 0).unwrap();
        let b = DigestUriGenerator.generate(BASE, &d, &fields("x"), 0).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("http://example.org/sample/"));
        let local = a.as_str().rsplit('/').next().unwrap();
        assert_eq!(local.len(), URI_DIGEST_HEX_LEN);
    }

    #[test]
    fn retry_changes_candidate() {
        let d = sample();
        let first = DigestUriGenerator.generate(BASE, &d, &fields("x"), 0).unwrap();
        let second = DigestUriGenerator.generate(BASE, &d, &fields("x"), 1).unwrap();
        assert_ne!(first, second);
        assert_eq!(second.as_str(), format!("{}-1", first.as_str()));
    }

    #[test]
    fn different_values_differ() {
        let d = sample();
        let a = DigestUriGenerator.generate(BASE, &d, &fields("x"), 0).unwrap();
        let b = DigestUriGenerator.generate(BASE, &d, &fields("y"), 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn slug_from_field() {
        let d = sample();
        let generator = SlugUriGenerator::new("label");
        let uri = generator
            .generate(BASE, &d, &fields("  Wheat Plot #12 "), 2)
            .unwrap();
        assert_eq!(uri.as_str(), "http://example.org/sample/wheat-plot-12-2");
    }

    #[test]
    fn slug_falls_back_to_digest() {
        let d = sample();
        let generator = SlugUriGenerator::new("label");
        let uri = generator.generate(BASE, &d, &fields("###"), 0).unwrap();
        let digest_uri = DigestUriGenerator.generate(BASE, &d, &fields("###"), 0).unwrap();
        assert_eq!(uri, digest_uri);
    }

    #[test]
    fn slugify_truncates() {
        let long = "a".repeat(200);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
        assert_eq!(slugify("--A--b--"), "a-b");
    }
}
