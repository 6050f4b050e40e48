//! # Descriptor Registry
//!
//! Per-type cache of [`EntityDescriptor`]s. The only shared mutable state
//! of the persistence facade.

use super::{Deserializers, Entity, EntityDescriptor, MappingError};
use crate::types::OntomapError;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Builds descriptors on first use and returns the cached one afterwards.
/// A mapping that fails validation is cached as its error, so it is
/// validated once as well.
///
/// Concurrent first lookups may both build; the first to publish wins and
/// every caller gets that instance. Building is deterministic, so the
/// discarded copy is identical.
#[derive(Debug)]
pub struct DescriptorRegistry {
    deserializers: Deserializers,
    cache: RwLock<BTreeMap<TypeId, Result<Arc<EntityDescriptor>, MappingError>>>,
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorRegistry {
    /// Registry using the standard XSD deserializers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_deserializers(Deserializers::standard())
    }

    #[must_use]
    pub fn with_deserializers(deserializers: Deserializers) -> Self {
        Self {
            deserializers,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Descriptor of `T`, built and validated on first call.
    pub fn describe<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, OntomapError> {
        let id = TypeId::of::<T>();
        if let Some(entry) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return entry.clone().map_err(OntomapError::from);
        }

        let built = EntityDescriptor::build(short_type_name::<T>(), T::mapping(), &self.deserializers)
            .map(Arc::new);
        match &built {
            Ok(descriptor) => tracing::debug!(
                entity = descriptor.type_name(),
                rdf_type = descriptor.rdf_type().as_str(),
                fields = descriptor.fields().len(),
                "entity descriptor built"
            ),
            Err(error) => tracing::warn!(%error, "entity mapping rejected"),
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.entry(id).or_insert(built).clone().map_err(OntomapError::from)
    }

    #[must_use]
    pub fn deserializers(&self) -> &Deserializers {
        &self.deserializers
    }

    /// Number of cached entries, rejected mappings included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `crate::model::Sample` -> `Sample`.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
