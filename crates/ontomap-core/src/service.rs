//! # Persistence Facade
//!
//! Typed create / read / update / delete / search over a triple store.
//!
//! [`Repository`] carries every operation as a provided method. Two types
//! implement it:
//!
//! - [`SparqlService`]: autocommit, each write runs in its own short
//!   transaction
//! - [`SparqlTransaction`]: an explicit transaction, ended by `commit` or
//!   `rollback`
//!
//! Every query is logged at `DEBUG` before it runs. Store failures come
//! back as [`OntomapError::Query`] carrying the query text.

use crate::config::ServiceConfig;
use crate::mapping::{DescriptorRegistry, Entity, EntityDescriptor, Fields};
use crate::primitives::{COUNT_VAR, URI_VAR};
use crate::query::{AskQuery, Filter, FilterSet, FilterValue, QueryBuilder, SelectQuery, UpdateRequest};
use crate::store::{QueryExecutor, StoreConnection, StoreError, Transaction};
use crate::types::{OntomapError, OrderBy, Page, Pagination};
use oxrdf::{NamedNode, Term, Triple};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// CONTEXT
// =============================================================================

/// Configuration plus descriptor cache, shared by a service and its
/// transactions.
#[derive(Debug)]
pub struct ServiceContext {
    registry: DescriptorRegistry,
    config: ServiceConfig,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig) -> Result<Self, OntomapError> {
        Self::with_registry(config, DescriptorRegistry::new())
    }

    pub fn with_registry(
        config: ServiceConfig,
        registry: DescriptorRegistry,
    ) -> Result<Self, OntomapError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn descriptor<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, OntomapError> {
        self.registry.describe::<T>()
    }
}

// =============================================================================
// QUERY EXECUTION
// =============================================================================

fn failed(operation: &'static str, query: &impl fmt::Display, source: StoreError) -> OntomapError {
    OntomapError::Query {
        operation,
        query: query.to_string(),
        source,
    }
}

fn run_ask(
    executor: &dyn QueryExecutor,
    operation: &'static str,
    query: &AskQuery,
) -> Result<bool, OntomapError> {
    debug!(operation, query = %query, "ask");
    executor
        .ask(query)
        .map_err(|source| failed(operation, query, source))
}

fn run_select(
    executor: &dyn QueryExecutor,
    operation: &'static str,
    query: &SelectQuery,
) -> Result<Vec<crate::store::Solution>, OntomapError> {
    debug!(operation, query = %query, "select");
    executor
        .select(query)
        .map_err(|source| failed(operation, query, source))
}

fn run_update(
    executor: &dyn QueryExecutor,
    operation: &'static str,
    request: &UpdateRequest,
) -> Result<(), OntomapError> {
    if request.is_empty() {
        return Ok(());
    }
    debug!(operation, query = %request, "update");
    executor
        .update(request)
        .map_err(|source| failed(operation, request, source))
}

fn run_delete(executor: &dyn QueryExecutor, request: &UpdateRequest) -> Result<(), OntomapError> {
    if request.is_empty() {
        return Ok(());
    }
    debug!(operation = "delete", query = %request, "update");
    executor
        .delete(request)
        .map_err(|source| failed("delete", request, source))
}

/// Raw field values of every instance matched by `query`, in result order.
///
/// More than one row for an identifier means a single-valued field holds
/// several values in the store: `AmbiguousUri`.
fn load_fields(
    executor: &dyn QueryExecutor,
    descriptor: &EntityDescriptor,
    query: &SelectQuery,
) -> Result<Vec<(NamedNode, Fields)>, OntomapError> {
    let mut instances: Vec<(NamedNode, Fields)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for row in run_select(executor, "select", query)? {
        let uri = match row.get(URI_VAR) {
            Some(Term::NamedNode(uri)) => uri.clone(),
            _ => {
                return Err(OntomapError::invalid(
                    descriptor.identifier(),
                    "result row without an IRI identifier",
                ));
            }
        };
        if index.contains_key(uri.as_str()) {
            return Err(OntomapError::AmbiguousUri(uri.into_string()));
        }
        let mut fields = Fields::new();
        for field in descriptor.scalar_fields() {
            if let Some(term) = row.get(field.variable().as_str()) {
                fields.push(field.name(), term.clone());
            }
        }
        index.insert(uri.as_str().to_string(), instances.len());
        instances.push((uri, fields));
    }

    if instances.is_empty() {
        return Ok(instances);
    }
    let uris: Vec<NamedNode> = instances.iter().map(|(uri, _)| uri.clone()).collect();
    for field in descriptor.many_fields() {
        let query = QueryBuilder::list_builder(descriptor, field, &uris);
        for row in run_select(executor, "list", &query)? {
            let (Some(Term::NamedNode(uri)), Some(value)) =
                (row.get(URI_VAR), row.get(field.variable().as_str()))
            else {
                continue;
            };
            if let Some(&position) = index.get(uri.as_str()) {
                instances[position].1.push(field.name(), value.clone());
            }
        }
    }
    Ok(instances)
}

fn load<T: Entity>(
    executor: &dyn QueryExecutor,
    descriptor: &EntityDescriptor,
    query: &SelectQuery,
) -> Result<Vec<T>, OntomapError> {
    load_fields(executor, descriptor, query)?
        .into_iter()
        .map(|(uri, mut fields)| T::read_fields(uri, &mut fields))
        .collect()
}

/// First candidate identifier that is neither stored nor taken by the
/// current batch.
fn generate_uri(
    executor: &dyn QueryExecutor,
    config: &ServiceConfig,
    descriptor: &EntityDescriptor,
    fields: &Fields,
    taken: &BTreeSet<String>,
) -> Result<NamedNode, OntomapError> {
    for retry in 0..config.max_uri_attempts {
        let candidate =
            descriptor
                .generator()
                .generate(&config.base_namespace, descriptor, fields, retry)?;
        if !taken.contains(candidate.as_str())
            && !run_ask(executor, "uri_exists", &QueryBuilder::exists_builder(&candidate))?
        {
            return Ok(candidate);
        }
        debug!(uri = %candidate, retry, "identifier collision");
    }
    Err(OntomapError::UriGenerationExhausted {
        base: config.base_namespace.clone(),
        attempts: config.max_uri_attempts,
    })
}

fn parse_count(row: Option<&crate::store::Solution>) -> Result<usize, OntomapError> {
    match row.and_then(|r| r.get(COUNT_VAR)) {
        None => Ok(0),
        Some(Term::Literal(literal)) => literal
            .value()
            .parse::<usize>()
            .map_err(|_| OntomapError::invalid(COUNT_VAR, format!("not a count: {literal}"))),
        Some(other) => Err(OntomapError::invalid(
            COUNT_VAR,
            format!("not a count: {other}"),
        )),
    }
}

/// Commit on success, roll back on failure. A failed rollback is reported
/// together with the error that caused it.
fn finish<R>(
    transaction: Box<dyn Transaction + '_>,
    result: Result<R, OntomapError>,
) -> Result<R, OntomapError> {
    match result {
        Ok(value) => {
            transaction.commit().map_err(OntomapError::Transaction)?;
            Ok(value)
        }
        Err(cause) => {
            debug!(error = %cause, "rolling back transaction");
            match transaction.rollback() {
                Ok(()) => Err(cause),
                Err(rollback) => {
                    warn!(error = %cause, rollback = %rollback, "rollback failed");
                    Err(OntomapError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback: Box::new(OntomapError::Transaction(rollback)),
                    })
                }
            }
        }
    }
}

// =============================================================================
// REPOSITORY
// =============================================================================

/// Typed persistence operations.
pub trait Repository {
    /// Where reads run.
    fn executor(&self) -> &dyn QueryExecutor;

    fn context(&self) -> &ServiceContext;

    /// Run the write `op`. The default runs it on [`Repository::executor`];
    /// autocommit implementations wrap it in a transaction.
    fn write_scope<R>(
        &self,
        op: impl FnOnce(&dyn QueryExecutor) -> Result<R, OntomapError>,
    ) -> Result<R, OntomapError> {
        op(self.executor())
    }

    /// Persist a new instance and assign its identifier.
    ///
    /// A caller supplied identifier that is already in use fails with
    /// `DuplicateUri`.
    fn create<T: Entity>(&self, instance: &mut T) -> Result<NamedNode, OntomapError> {
        let mut uris = self.create_all(std::slice::from_mut(instance))?;
        uris.pop().ok_or_else(|| {
            OntomapError::invalid(URI_VAR, "create produced no identifier")
        })
    }

    /// Persist new instances with a single update request.
    ///
    /// Identifiers are assigned to the instances only once the request has
    /// succeeded.
    fn create_all<T: Entity>(&self, instances: &mut [T]) -> Result<Vec<NamedNode>, OntomapError> {
        if instances.is_empty() {
            return Ok(Vec::new());
        }
        let context = self.context();
        let descriptor = context.descriptor::<T>()?;
        let prepared = instances
            .iter()
            .map(|instance| descriptor.collect_fields(instance))
            .collect::<Result<Vec<_>, _>>()?;
        let supplied: Vec<Option<NamedNode>> =
            instances.iter().map(|i| i.uri().cloned()).collect();

        let uris = self.write_scope(|executor| {
            let mut taken = BTreeSet::new();
            let mut batch = Vec::with_capacity(prepared.len());
            for (supplied, fields) in supplied.into_iter().zip(prepared) {
                let uri = match supplied {
                    Some(uri) => {
                        if taken.contains(uri.as_str())
                            || run_ask(
                                executor,
                                "uri_exists",
                                &QueryBuilder::exists_builder(&uri),
                            )?
                        {
                            return Err(OntomapError::DuplicateUri(uri.into_string()));
                        }
                        uri
                    }
                    None => generate_uri(
                        executor,
                        context.config(),
                        &descriptor,
                        &fields,
                        &taken,
                    )?,
                };
                taken.insert(uri.as_str().to_string());
                batch.push((uri, fields));
            }
            run_update(
                executor,
                "create",
                &QueryBuilder::create_fragment_all(&descriptor, &batch),
            )?;
            Ok(batch.into_iter().map(|(uri, _)| uri).collect::<Vec<_>>())
        })?;

        for (instance, uri) in instances.iter_mut().zip(&uris) {
            instance.set_uri(uri.clone());
        }
        debug!(entity = descriptor.type_name(), count = uris.len(), "instances created");
        Ok(uris)
    }

    /// Write the changed fields of a stored instance.
    fn update<T: Entity>(&self, instance: &T) -> Result<(), OntomapError> {
        self.update_all(std::slice::from_ref(instance))
    }

    /// Reload each instance, diff it against the given state and send the
    /// changed fields as one update request.
    fn update_all<T: Entity>(&self, instances: &[T]) -> Result<(), OntomapError> {
        if instances.is_empty() {
            return Ok(());
        }
        let descriptor = self.context().descriptor::<T>()?;
        let mut updated = Vec::with_capacity(instances.len());
        for instance in instances {
            let uri = instance.uri().cloned().ok_or_else(|| {
                OntomapError::invalid(descriptor.identifier(), "instance has no identifier")
            })?;
            updated.push((uri, descriptor.collect_fields(instance)?));
        }

        self.write_scope(|executor| {
            let uris: Vec<NamedNode> = updated.iter().map(|(uri, _)| uri.clone()).collect();
            let stored: BTreeMap<String, Fields> = load_fields(
                executor,
                &descriptor,
                &QueryBuilder::select_by_uris(&descriptor, &uris),
            )?
            .into_iter()
            .map(|(uri, fields)| (uri.into_string(), fields))
            .collect();

            let mut request = UpdateRequest::new();
            for (uri, fields) in &updated {
                let current = stored
                    .get(uri.as_str())
                    .ok_or_else(|| OntomapError::not_found(descriptor.type_name(), uri.as_str()))?;
                for operation in QueryBuilder::update_fragment(&descriptor, uri, current, fields) {
                    request.push(operation);
                }
            }
            run_update(executor, "update", &request)
        })
    }

    /// Remove a stored instance. Unknown identifiers fail with `NotFound`.
    fn delete<T: Entity>(&self, uri: &NamedNode) -> Result<(), OntomapError> {
        self.delete_all::<T>(std::slice::from_ref(uri))
    }

    /// Remove stored instances with a single update request.
    fn delete_all<T: Entity>(&self, uris: &[NamedNode]) -> Result<(), OntomapError> {
        if uris.is_empty() {
            return Ok(());
        }
        let descriptor = self.context().descriptor::<T>()?;
        self.write_scope(|executor| {
            let mut request = UpdateRequest::new();
            for uri in uris {
                if !run_ask(executor, "exists", &QueryBuilder::ask_builder(&descriptor, uri))? {
                    return Err(OntomapError::not_found(descriptor.type_name(), uri.as_str()));
                }
                for operation in QueryBuilder::delete_fragment(&descriptor, uri) {
                    request.push(operation);
                }
            }
            run_delete(executor, &request)
        })
    }

    /// Remove every instance whose object `field` points at `object`.
    /// Returns how many were removed.
    fn delete_by_object_relation<T: Entity>(
        &self,
        field: &str,
        object: &NamedNode,
    ) -> Result<usize, OntomapError> {
        let uris = self.search_uris::<T>(&FilterSet::new().and(Filter::eq(field, object)), &[])?;
        self.delete_all::<T>(&uris)?;
        Ok(uris.len())
    }

    /// Exactly one instance, `NotFound`, or `AmbiguousUri`.
    fn get_by_uri<T: Entity>(&self, uri: &NamedNode) -> Result<T, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        self.find_by_uri(uri)?
            .ok_or_else(|| OntomapError::not_found(descriptor.type_name(), uri.as_str()))
    }

    fn find_by_uri<T: Entity>(&self, uri: &NamedNode) -> Result<Option<T>, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        let query = QueryBuilder::select_by_uris(&descriptor, std::slice::from_ref(uri));
        Ok(load(self.executor(), &descriptor, &query)?.into_iter().next())
    }

    /// Instances found among `uris`, in the requested order. Unknown
    /// identifiers are skipped.
    fn get_by_uris<T: Entity>(&self, uris: &[NamedNode]) -> Result<Vec<T>, OntomapError> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let descriptor = self.context().descriptor::<T>()?;
        let query = QueryBuilder::select_by_uris(&descriptor, uris);
        let mut found: BTreeMap<String, T> = load::<T>(self.executor(), &descriptor, &query)?
            .into_iter()
            .filter_map(|instance| {
                let key = instance.uri()?.as_str().to_string();
                Some((key, instance))
            })
            .collect();
        Ok(uris
            .iter()
            .filter_map(|uri| found.remove(uri.as_str()))
            .collect())
    }

    /// One page of matches plus the total count.
    ///
    /// The count runs first; a page starting past the total comes back
    /// empty without a select.
    fn search<T: Entity>(
        &self,
        filters: &FilterSet,
        order: &[OrderBy],
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Page<T>, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        let pagination = Pagination::new(page, page_size, self.context().config().default_page_size);
        let total = self.count::<T>(filters)?;
        let mut result = Page {
            items: Vec::new(),
            page: pagination.page(),
            page_size: pagination.page_size().unwrap_or(0),
            total,
        };
        if !pagination.reaches(total) {
            return Ok(result);
        }
        let mut query = QueryBuilder::search_builder(&descriptor, filters, order)?;
        if let Some(size) = pagination.page_size() {
            query.offset = Some(pagination.offset());
            query.limit = Some(size);
        }
        result.items = load(self.executor(), &descriptor, &query)?;
        Ok(result)
    }

    /// Every match, unpaginated.
    fn search_all<T: Entity>(
        &self,
        filters: &FilterSet,
        order: &[OrderBy],
    ) -> Result<Vec<T>, OntomapError> {
        Ok(self.search(filters, order, None, Some(0))?.items)
    }

    /// Identifiers of every match, in the same order as
    /// [`Repository::search_all`], without loading the instances.
    fn search_uris<T: Entity>(
        &self,
        filters: &FilterSet,
        order: &[OrderBy],
    ) -> Result<Vec<NamedNode>, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        let query = QueryBuilder::search_uris_builder(&descriptor, filters, order)?;
        run_select(self.executor(), "search_uris", &query)?
            .iter()
            .map(|row| match row.get(URI_VAR) {
                Some(Term::NamedNode(uri)) => Ok(uri.clone()),
                _ => Err(OntomapError::invalid(
                    descriptor.identifier(),
                    "result row without an IRI identifier",
                )),
            })
            .collect()
    }

    /// The single instance whose `field` holds `value`, `None` when there
    /// is none. Several matches fail with `NotUnique`.
    fn get_by_unique_value<T: Entity>(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
    ) -> Result<Option<T>, OntomapError> {
        let value = value.into();
        let descriptor = self.context().descriptor::<T>()?;
        let filters = FilterSet::new().and(Filter::eq(field, value.clone()));
        let mut query = QueryBuilder::search_builder(&descriptor, &filters, &[])?;
        query.limit = Some(2);
        let mut found: Vec<T> = load(self.executor(), &descriptor, &query)?;
        if found.len() > 1 {
            return Err(OntomapError::NotUnique {
                type_name: descriptor.type_name().to_string(),
                field: field.to_string(),
                value: value.to_string(),
            });
        }
        Ok(found.pop())
    }

    /// Whether any instance's `field` holds `value`.
    fn exists_by_unique_value<T: Entity>(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
    ) -> Result<bool, OntomapError> {
        let filters = FilterSet::new().and(Filter::eq(field, value));
        Ok(self.count::<T>(&filters)? > 0)
    }

    fn count<T: Entity>(&self, filters: &FilterSet) -> Result<usize, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        let query = QueryBuilder::count_filtered(&descriptor, filters)?;
        parse_count(run_select(self.executor(), "count", &query)?.first())
    }

    /// Whether `uri` appears in any triple, as subject or object.
    fn exists(&self, uri: &NamedNode) -> Result<bool, OntomapError> {
        run_ask(self.executor(), "exists", &QueryBuilder::exists_builder(uri))
    }

    /// Whether `uri` is an instance of `T`'s type or a subclass of it.
    fn exists_of_type<T: Entity>(&self, uri: &NamedNode) -> Result<bool, OntomapError> {
        let descriptor = self.context().descriptor::<T>()?;
        run_ask(
            self.executor(),
            "exists",
            &QueryBuilder::ask_builder(&descriptor, uri),
        )
    }

    /// Whether `uri` is an instance of `rdf_type` or a subclass of it.
    fn exists_with_type(&self, rdf_type: &NamedNode, uri: &NamedNode) -> Result<bool, OntomapError> {
        run_ask(
            self.executor(),
            "exists",
            &QueryBuilder::ask_type(rdf_type, uri),
        )
    }

    /// Every triple with `uri` as subject.
    fn describe(&self, uri: &NamedNode) -> Result<Vec<Triple>, OntomapError> {
        let query = QueryBuilder::describe_builder(uri);
        debug!(operation = "describe", query = %query, "describe");
        self.executor()
            .describe(&query)
            .map_err(|source| failed("describe", &query, source))
    }

    fn clear_graph(&self, graph: &NamedNode) -> Result<(), OntomapError> {
        self.write_scope(|executor| {
            run_update(executor, "clear_graph", &QueryBuilder::clear_graph(graph))
        })
    }

    /// Move the content of `from` into `to`, replacing whatever `to` held.
    /// Renaming a graph onto itself changes nothing.
    fn rename_graph(&self, from: &NamedNode, to: &NamedNode) -> Result<(), OntomapError> {
        self.write_scope(|executor| {
            run_update(executor, "rename_graph", &QueryBuilder::move_graph(from, to))
        })
    }

    /// Remove `subject <predicate> object` in `graph`.
    fn delete_object_relation(
        &self,
        graph: Option<&NamedNode>,
        subject: &NamedNode,
        predicate: &NamedNode,
        object: &NamedNode,
    ) -> Result<(), OntomapError> {
        self.delete_object_relations(graph, subject, predicate, std::slice::from_ref(object))
    }

    /// Remove `subject <predicate> o` in `graph` for each of `objects`.
    fn delete_object_relations(
        &self,
        graph: Option<&NamedNode>,
        subject: &NamedNode,
        predicate: &NamedNode,
        objects: &[NamedNode],
    ) -> Result<(), OntomapError> {
        if objects.is_empty() {
            return Ok(());
        }
        self.write_scope(|executor| {
            run_update(
                executor,
                "delete_relations",
                &QueryBuilder::delete_relations(graph, subject, predicate, objects),
            )
        })
    }

    /// Point `subject <predicate>` at `object` alone in `graph`.
    fn update_object_relation(
        &self,
        graph: Option<&NamedNode>,
        subject: &NamedNode,
        predicate: &NamedNode,
        object: &NamedNode,
    ) -> Result<(), OntomapError> {
        self.write_scope(|executor| {
            run_update(
                executor,
                "update_relation",
                &QueryBuilder::replace_relation(graph, subject, predicate, object),
            )
        })
    }

    /// Insert raw triples (ontologies, bulk loads). Returns how many were
    /// sent.
    fn insert_triples(
        &self,
        graph: Option<&NamedNode>,
        triples: Vec<Triple>,
    ) -> Result<usize, OntomapError> {
        if triples.is_empty() {
            return Ok(0);
        }
        let sent = triples.len();
        self.write_scope(|executor| {
            run_update(
                executor,
                "insert_triples",
                &QueryBuilder::insert_data(graph, triples),
            )
        })?;
        Ok(sent)
    }
}

// =============================================================================
// AUTOCOMMIT SERVICE
// =============================================================================

/// Entry point of the facade. Cheap to clone; clones share the connection
/// and the descriptor cache.
#[derive(Clone)]
pub struct SparqlService {
    connection: Arc<dyn StoreConnection>,
    context: Arc<ServiceContext>,
}

impl fmt::Debug for SparqlService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparqlService")
            .field("backend", &self.connection.backend())
            .field("context", &self.context)
            .finish()
    }
}

impl SparqlService {
    pub fn new(
        connection: Arc<dyn StoreConnection>,
        config: ServiceConfig,
    ) -> Result<Self, OntomapError> {
        Ok(Self {
            connection,
            context: Arc::new(ServiceContext::new(config)?),
        })
    }

    pub fn with_registry(
        connection: Arc<dyn StoreConnection>,
        config: ServiceConfig,
        registry: DescriptorRegistry,
    ) -> Result<Self, OntomapError> {
        Ok(Self {
            connection,
            context: Arc::new(ServiceContext::with_registry(config, registry)?),
        })
    }

    #[must_use]
    pub fn connection(&self) -> &dyn StoreConnection {
        self.connection.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        self.context.config()
    }

    /// Open an explicit transaction.
    pub fn begin(&self) -> Result<SparqlTransaction<'_>, OntomapError> {
        let transaction = self
            .connection
            .start_transaction()
            .map_err(OntomapError::Transaction)?;
        debug!(backend = self.connection.backend(), "transaction started");
        Ok(SparqlTransaction {
            transaction,
            context: &self.context,
        })
    }

    /// Run `op` in a transaction, committing on success and rolling back
    /// on error.
    pub fn transaction<R>(
        &self,
        op: impl FnOnce(&SparqlTransaction<'_>) -> Result<R, OntomapError>,
    ) -> Result<R, OntomapError> {
        let transaction = self.begin()?;
        let result = op(&transaction);
        finish(transaction.transaction, result)
    }
}

impl Repository for SparqlService {
    fn executor(&self) -> &dyn QueryExecutor {
        self.connection.as_executor()
    }

    fn context(&self) -> &ServiceContext {
        &self.context
    }

    fn write_scope<R>(
        &self,
        op: impl FnOnce(&dyn QueryExecutor) -> Result<R, OntomapError>,
    ) -> Result<R, OntomapError> {
        let transaction = self
            .connection
            .start_transaction()
            .map_err(OntomapError::Transaction)?;
        let result = op(transaction.as_executor());
        finish(transaction, result)
    }
}

// =============================================================================
// EXPLICIT TRANSACTION
// =============================================================================

/// Open transaction on the triple store. Reads see its own writes.
pub struct SparqlTransaction<'a> {
    transaction: Box<dyn Transaction + 'a>,
    context: &'a ServiceContext,
}

impl fmt::Debug for SparqlTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparqlTransaction").finish_non_exhaustive()
    }
}

impl SparqlTransaction<'_> {
    pub fn commit(self) -> Result<(), OntomapError> {
        self.transaction.commit().map_err(OntomapError::Transaction)?;
        debug!("transaction committed");
        Ok(())
    }

    pub fn rollback(self) -> Result<(), OntomapError> {
        self.transaction
            .rollback()
            .map_err(OntomapError::Transaction)?;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl Repository for SparqlTransaction<'_> {
    fn executor(&self) -> &dyn QueryExecutor {
        self.transaction.as_executor()
    }

    fn context(&self) -> &ServiceContext {
        self.context
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use oxrdf::Literal;
    use oxrdf::vocab::xsd;

    #[test]
    fn count_parsing() {
        let mut row = crate::store::Solution::new();
        row.insert(
            COUNT_VAR,
            Literal::new_typed_literal("42", xsd::INTEGER).into(),
        );
        assert_eq!(parse_count(Some(&row)).unwrap(), 42);
        assert_eq!(parse_count(None).unwrap(), 0);

        let mut bad = crate::store::Solution::new();
        bad.insert(COUNT_VAR, NamedNode::new_unchecked("http://x/a").into());
        assert!(parse_count(Some(&bad)).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            ServiceContext::new(ServiceConfig::new("not an iri")),
            Err(OntomapError::Config(_))
        ));
        assert!(ServiceContext::new(ServiceConfig::new("http://example.org/")).is_ok());
    }
}
