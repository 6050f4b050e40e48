//! # Primitives
//!
//! Fixed constants shared by the synthesizer, the facade and the stores.
//!
//! Variable names used in generated SPARQL live here so that the query
//! builder, the embedded evaluator and the result readers agree on them.

// =============================================================================
// SPARQL VARIABLES
// =============================================================================

/// Variable bound to the subject IRI of every mapped instance.
pub const URI_VAR: &str = "uri";

/// Variable bound to the concrete `rdf:type` of a matched instance.
pub const TYPE_VAR: &str = "rdfType";

/// Alias of the aggregate produced by count queries.
pub const COUNT_VAR: &str = "count";

/// Suffix of the helper variable used when filtering multi-valued fields.
pub const ITEM_SUFFIX: &str = "_item";

// =============================================================================
// PAGINATION
// =============================================================================

/// Page size used when a caller does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

// =============================================================================
// IDENTIFIER GENERATION
// =============================================================================

/// Upper bound on collision retries before `create` gives up.
pub const DEFAULT_MAX_URI_ATTEMPTS: u32 = 1000;

/// Number of hex characters of the BLAKE3 digest kept in generated URIs.
pub const URI_DIGEST_HEX_LEN: usize = 16;

/// Maximum length of a slug derived from a field value.
pub const MAX_SLUG_LEN: usize = 64;

// =============================================================================
// STORAGE
// =============================================================================

/// On-disk format version of the embedded triple store.
pub const STORE_FORMAT_VERSION: u32 = 1;
