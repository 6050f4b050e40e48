//! # Persistence Facade Tests
//!
//! End-to-end behavior of `SparqlService` over the embedded store.

use ontomap_core::{
    Entity, EntityMapping, ErrorKind, FieldMapping, Fields, Filter, FilterSet, OntomapError,
    OrderBy, RedbTripleStore, Repository, ServiceConfig, SlugUriGenerator, SparqlService,
};
use oxrdf::vocab::{rdf, rdfs, xsd};
use oxrdf::{Literal, NamedNode, Triple};
use oxsdatatypes::Decimal;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

const BASE: &str = "http://example.org/data/";

// =============================================================================
// FIXTURES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    uri: Option<NamedNode>,
    label: String,
    value: Option<Decimal>,
    tags: Vec<String>,
}

impl Sample {
    fn new(label: &str, value: Option<&str>, tags: &[&str]) -> Self {
        Self {
            uri: None,
            label: label.to_string(),
            value: value.map(|v| Decimal::from_str(v).expect("decimal")),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl Entity for Sample {
    fn mapping() -> EntityMapping {
        EntityMapping::new("http://example.org/onto#Sample")
            .identifier("uri")
            .field(FieldMapping::string("label", rdfs::LABEL.as_str()))
            .field(
                FieldMapping::data("value", "http://example.org/onto#value", xsd::DECIMAL.as_str())
                    .optional(),
            )
            .field(FieldMapping::string("tags", "http://example.org/onto#tag").many())
    }

    fn uri(&self) -> Option<&NamedNode> {
        self.uri.as_ref()
    }

    fn set_uri(&mut self, uri: NamedNode) {
        self.uri = Some(uri);
    }

    fn write_fields(&self, fields: &mut Fields) {
        fields.set("label", &self.label);
        fields.set_opt("value", self.value.as_ref());
        fields.set_all("tags", &self.tags);
    }

    fn read_fields(uri: NamedNode, fields: &mut Fields) -> Result<Self, OntomapError> {
        Ok(Self {
            uri: Some(uri),
            label: fields.take("label")?,
            value: fields.take_opt("value")?,
            tags: fields.take_all("tags")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Person {
    uri: Option<NamedNode>,
    name: String,
}

impl Entity for Person {
    fn mapping() -> EntityMapping {
        EntityMapping::new("http://example.org/onto#Person")
            .identifier("uri")
            .graph("http://example.org/graphs/people")
            .generator(SlugUriGenerator::new("name"))
            .field(FieldMapping::string("name", "http://example.org/onto#name"))
    }

    fn uri(&self) -> Option<&NamedNode> {
        self.uri.as_ref()
    }

    fn set_uri(&mut self, uri: NamedNode) {
        self.uri = Some(uri);
    }

    fn write_fields(&self, fields: &mut Fields) {
        fields.set("name", &self.name);
    }

    fn read_fields(uri: NamedNode, fields: &mut Fields) -> Result<Self, OntomapError> {
        Ok(Self {
            uri: Some(uri),
            name: fields.take("name")?,
        })
    }
}

/// Text mentions and resource mentions share one predicate.
#[derive(Debug, Clone, PartialEq)]
struct Article {
    uri: Option<NamedNode>,
    title: String,
    quotes: Vec<String>,
    cites: Vec<NamedNode>,
}

const MENTIONS: &str = "http://example.org/onto#mentions";

impl Entity for Article {
    fn mapping() -> EntityMapping {
        EntityMapping::new("http://example.org/onto#Article")
            .identifier("uri")
            .field(FieldMapping::string("title", rdfs::LABEL.as_str()))
            .field(FieldMapping::string("quotes", MENTIONS).many())
            .field(FieldMapping::object("cites", MENTIONS).many())
    }

    fn uri(&self) -> Option<&NamedNode> {
        self.uri.as_ref()
    }

    fn set_uri(&mut self, uri: NamedNode) {
        self.uri = Some(uri);
    }

    fn write_fields(&self, fields: &mut Fields) {
        fields.set("title", &self.title);
        fields.set_all("quotes", &self.quotes);
        fields.set_all("cites", &self.cites);
    }

    fn read_fields(uri: NamedNode, fields: &mut Fields) -> Result<Self, OntomapError> {
        Ok(Self {
            uri: Some(uri),
            title: fields.take("title")?,
            quotes: fields.take_all("quotes")?,
            cites: fields.take_all("cites")?,
        })
    }
}

/// Two string lists on one predicate cannot be told apart.
struct Clashing;

impl Entity for Clashing {
    fn mapping() -> EntityMapping {
        EntityMapping::new("http://example.org/onto#Clashing")
            .identifier("uri")
            .field(FieldMapping::string("a", MENTIONS).many())
            .field(FieldMapping::string("b", MENTIONS).many())
    }

    fn uri(&self) -> Option<&NamedNode> {
        None
    }

    fn set_uri(&mut self, _uri: NamedNode) {}

    fn write_fields(&self, _fields: &mut Fields) {}

    fn read_fields(_uri: NamedNode, _fields: &mut Fields) -> Result<Self, OntomapError> {
        Ok(Self)
    }
}

fn open_service(path: &Path) -> SparqlService {
    let store = RedbTripleStore::open(path.join("triples.redb")).expect("open store");
    SparqlService::new(Arc::new(store), ServiceConfig::new(BASE)).expect("service")
}

fn service() -> (TempDir, SparqlService) {
    let dir = tempdir().expect("tempdir");
    let service = open_service(dir.path());
    (dir, service)
}

fn decimal(value: &str) -> Decimal {
    Decimal::from_str(value).expect("decimal")
}

// =============================================================================
// CREATE / READ
// =============================================================================

#[test]
fn create_assigns_uri_under_namespace() {
    let (_dir, service) = service();
    let mut sample = Sample::new("first", Some("1.5"), &["a", "b"]);
    let uri = service.create(&mut sample).expect("create");

    assert!(uri.as_str().starts_with("http://example.org/data/sample/"));
    assert_eq!(sample.uri.as_ref(), Some(&uri));

    let loaded: Sample = service.get_by_uri(&uri).expect("get");
    assert_eq!(loaded, sample);
}

#[test]
fn identical_instances_get_distinct_uris() {
    let (_dir, service) = service();
    let mut samples = vec![
        Sample::new("twin", None, &[]),
        Sample::new("twin", None, &[]),
    ];
    let uris = service.create_all(&mut samples).expect("create");
    assert_eq!(uris.len(), 2);
    assert_ne!(uris[0], uris[1]);
    assert_eq!(service.count::<Sample>(&FilterSet::new()).expect("count"), 2);
}

#[test]
fn supplied_duplicate_uri_is_rejected() {
    let (_dir, service) = service();
    let uri = NamedNode::new_unchecked("http://example.org/data/sample/fixed");
    let mut first = Sample::new("first", None, &[]);
    first.uri = Some(uri.clone());
    service.create(&mut first).expect("create");

    let mut second = Sample::new("second", None, &[]);
    second.uri = Some(uri.clone());
    let err = service.create(&mut second).expect_err("duplicate");
    assert!(matches!(err, OntomapError::DuplicateUri(ref u) if u == uri.as_str()));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let loaded: Sample = service.get_by_uri(&uri).expect("get");
    assert_eq!(loaded.label, "first");
}

#[test]
fn failed_batch_leaves_no_instance_and_no_uri() {
    let (_dir, service) = service();
    let taken = NamedNode::new_unchecked("http://example.org/data/sample/taken");
    let mut existing = Sample::new("existing", None, &[]);
    existing.uri = Some(taken.clone());
    service.create(&mut existing).expect("create");

    let mut clash = Sample::new("clash", None, &[]);
    clash.uri = Some(taken);
    let mut batch = vec![Sample::new("fresh", None, &[]), clash];
    assert!(service.create_all(&mut batch).is_err());
    assert!(batch[0].uri.is_none());
    assert_eq!(service.count::<Sample>(&FilterSet::new()).expect("count"), 1);
}

#[test]
fn second_value_for_single_field_is_ambiguous() {
    let (_dir, service) = service();
    let mut sample = Sample::new("one", None, &[]);
    let uri = service.create(&mut sample).expect("create");
    service
        .insert_triples(
            None,
            vec![Triple::new(
                uri.clone(),
                rdfs::LABEL,
                Literal::new_simple_literal("two"),
            )],
        )
        .expect("insert");

    let err = service.get_by_uri::<Sample>(&uri).expect_err("ambiguous");
    assert!(matches!(err, OntomapError::AmbiguousUri(_)));
}

#[test]
fn missing_instance_is_not_found() {
    let (_dir, service) = service();
    let uri = NamedNode::new_unchecked("http://example.org/data/sample/missing");
    let err = service.get_by_uri::<Sample>(&uri).expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("Sample"));
    assert_eq!(service.find_by_uri::<Sample>(&uri).expect("find"), None);
}

#[test]
fn get_by_uris_keeps_request_order_and_skips_unknown() {
    let (_dir, service) = service();
    let mut samples = vec![
        Sample::new("a", None, &[]),
        Sample::new("b", None, &[]),
        Sample::new("c", None, &[]),
    ];
    let uris = service.create_all(&mut samples).expect("create");
    let unknown = NamedNode::new_unchecked("http://example.org/data/sample/nope");

    let requested = vec![uris[2].clone(), unknown, uris[0].clone()];
    let loaded: Vec<Sample> = service.get_by_uris(&requested).expect("get");
    let labels: Vec<&str> = loaded.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["c", "a"]);
}

// =============================================================================
// UPDATE / DELETE
// =============================================================================

#[test]
fn update_writes_changed_fields_only() {
    let (_dir, service) = service();
    let mut sample = Sample::new("before", Some("2"), &["x", "y"]);
    let uri = service.create(&mut sample).expect("create");

    sample.label = "after".to_string();
    sample.value = None;
    sample.tags = vec!["y".to_string(), "z".to_string()];
    service.update(&sample).expect("update");

    let loaded: Sample = service.get_by_uri(&uri).expect("get");
    assert_eq!(loaded.label, "after");
    assert_eq!(loaded.value, None);
    let tags: BTreeSet<String> = loaded.tags.into_iter().collect();
    let expected: BTreeSet<String> = ["y", "z"].iter().map(|t| (*t).to_string()).collect();
    assert_eq!(tags, expected);
    // Type triple and identifier survive the diff
    assert!(service.exists_of_type::<Sample>(&uri).expect("exists"));
}

#[test]
fn update_of_unknown_instance_is_not_found() {
    let (_dir, service) = service();
    let mut ghost = Sample::new("ghost", None, &[]);
    ghost.uri = Some(NamedNode::new_unchecked("http://example.org/data/sample/ghost"));
    let err = service.update(&ghost).expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!service.exists(ghost.uri.as_ref().expect("uri")).expect("exists"));
}

#[test]
fn delete_removes_instance_and_unknown_is_not_found() {
    let (_dir, service) = service();
    let mut sample = Sample::new("gone", Some("3"), &["t"]);
    let uri = service.create(&mut sample).expect("create");

    service.delete::<Sample>(&uri).expect("delete");
    assert_eq!(service.find_by_uri::<Sample>(&uri).expect("find"), None);
    assert!(!service.exists(&uri).expect("exists"));

    let err = service.delete::<Sample>(&uri).expect_err("second delete");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn delete_all_is_all_or_nothing() {
    let (_dir, service) = service();
    let mut samples = vec![Sample::new("a", None, &[]), Sample::new("b", None, &[])];
    let mut uris = service.create_all(&mut samples).expect("create");
    uris.push(NamedNode::new_unchecked("http://example.org/data/sample/unknown"));

    assert!(service.delete_all::<Sample>(&uris).is_err());
    assert_eq!(service.count::<Sample>(&FilterSet::new()).expect("count"), 2);
}

#[test]
fn shared_predicate_fields_keep_their_own_values() {
    let (_dir, service) = service();
    let cited = NamedNode::new_unchecked("http://example.org/data/paper/1");
    let mut article = Article {
        uri: None,
        title: "survey".to_string(),
        quotes: vec!["x".to_string()],
        cites: vec![cited.clone()],
    };
    let uri = service.create(&mut article).expect("create");

    let loaded: Article = service.get_by_uri(&uri).expect("get");
    assert_eq!(loaded.quotes, vec!["x".to_string()]);
    assert_eq!(loaded.cites, vec![cited.clone()]);

    let mut changed = loaded.clone();
    changed.quotes = vec!["z".to_string()];
    service.update(&changed).expect("update");

    let reloaded: Article = service.get_by_uri(&uri).expect("get");
    assert_eq!(reloaded.quotes, vec!["z".to_string()]);
    assert_eq!(reloaded.cites, vec![cited]);

    let quoting = FilterSet::from(Filter::contains("quotes", "z"));
    assert_eq!(service.count::<Article>(&quoting).expect("count"), 1);
    let unquoted = FilterSet::from(Filter::is_unbound("quotes"));
    assert_eq!(service.count::<Article>(&unquoted).expect("count"), 0);
}

#[test]
fn indistinguishable_shared_predicate_is_rejected() {
    let (_dir, service) = service();
    let err = service
        .count::<Clashing>(&FilterSet::new())
        .expect_err("ambiguous mapping");
    assert!(matches!(err, OntomapError::Mapping(_)));
}

// =============================================================================
// SEARCH
// =============================================================================

fn seed(service: &SparqlService) {
    let mut samples = vec![
        Sample::new("Alpha", Some("1"), &["red"]),
        Sample::new("beta", Some("5.5"), &["red", "blue"]),
        Sample::new("Gamma", Some("10"), &["blue"]),
        Sample::new("delta", None, &[]),
        Sample::new("alphabet", Some("7"), &["green"]),
    ];
    service.create_all(&mut samples).expect("seed");
}

#[test]
fn search_filters_and_orders() {
    let (_dir, service) = service();
    seed(&service);

    let filters = FilterSet::new().and(Filter::gt("value", "2"));
    let found = service
        .search::<Sample>(&filters, &[OrderBy::desc("value")], None, Some(0))
        .expect("search");
    let labels: Vec<&str> = found.items.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Gamma", "alphabet", "beta"]);
    assert_eq!(found.total, 3);

    let regex = FilterSet::from(Filter::regex("label", "^alpha"));
    let mut labels: Vec<String> = service
        .search_all::<Sample>(&regex, &[])
        .expect("search")
        .into_iter()
        .map(|s| s.label)
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["Alpha".to_string(), "alphabet".to_string()]);
}

#[test]
fn search_on_list_field_and_missing_value() {
    let (_dir, service) = service();
    seed(&service);

    let blue = FilterSet::from(Filter::contains("tags", "blue"));
    assert_eq!(service.count::<Sample>(&blue).expect("count"), 2);
    let found = service
        .search_all::<Sample>(&blue, &[OrderBy::asc("value")])
        .expect("search");
    assert_eq!(found[0].label, "beta");
    // Every tag comes back, not only the matching one
    assert_eq!(found[0].tags.len(), 2);

    let unset = FilterSet::from(Filter::Bound {
        field: "value".to_string(),
        bound: false,
    });
    let found = service.search_all::<Sample>(&unset, &[]).expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].label, "delta");

    let exact = FilterSet::from(Filter::eq("value", decimal("5.50")));
    assert_eq!(service.count::<Sample>(&exact).expect("count"), 1);
}

#[test]
fn unknown_filter_field_is_invalid() {
    let (_dir, service) = service();
    let err = service
        .count::<Sample>(&FilterSet::from(Filter::eq("colour", "red")))
        .expect_err("unknown field");
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn pagination_walks_every_match_once() {
    let (_dir, service) = service();
    seed(&service);

    let mut seen = BTreeSet::new();
    for page in 0..3 {
        let result = service
            .search::<Sample>(&FilterSet::new(), &[OrderBy::asc("label")], Some(page), Some(2))
            .expect("page");
        assert_eq!(result.total, 5);
        assert_eq!(result.page_size, 2);
        for sample in result.items {
            assert!(seen.insert(sample.label));
        }
    }
    assert_eq!(seen.len(), 5);

    let past = service
        .search::<Sample>(&FilterSet::new(), &[], Some(3), Some(2))
        .expect("past the end");
    assert!(past.items.is_empty());
    assert_eq!(past.total, 5);
    assert!(!past.has_next());

    let negative = service
        .search::<Sample>(&FilterSet::new(), &[], Some(-4), Some(2))
        .expect("negative page");
    assert_eq!(negative.page, 0);
    assert_eq!(negative.items.len(), 2);
    assert!(negative.has_next());
}

#[test]
fn uri_search_follows_search_order() {
    let (_dir, service) = service();
    seed(&service);

    let filters = FilterSet::new().and(Filter::gt("value", "2"));
    let order = [OrderBy::desc("value")];
    let uris = service.search_uris::<Sample>(&filters, &order).expect("uris");
    let loaded: Vec<NamedNode> = service
        .search_all::<Sample>(&filters, &order)
        .expect("search")
        .into_iter()
        .filter_map(|s| s.uri)
        .collect();
    assert_eq!(uris.len(), 3);
    assert_eq!(uris, loaded);
}

#[test]
fn lookup_by_unique_value() {
    let (_dir, service) = service();
    seed(&service);

    let gamma: Option<Sample> = service.get_by_unique_value("label", "Gamma").expect("lookup");
    assert_eq!(gamma.map(|s| s.value), Some(Some(decimal("10"))));
    let nobody: Option<Sample> = service.get_by_unique_value("label", "nobody").expect("lookup");
    assert!(nobody.is_none());
    assert!(service.exists_by_unique_value::<Sample>("label", "Gamma").expect("exists"));
    assert!(!service.exists_by_unique_value::<Sample>("label", "nobody").expect("exists"));

    let mut twin = Sample::new("Gamma", None, &[]);
    service.create(&mut twin).expect("create");
    let err = service
        .get_by_unique_value::<Sample>("label", "Gamma")
        .expect_err("two matches");
    assert!(matches!(err, OntomapError::NotUnique { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn delete_by_object_relation_removes_referrers_only() {
    let (_dir, service) = service();
    let target = NamedNode::new_unchecked("http://example.org/data/source/1");
    let other = NamedNode::new_unchecked("http://example.org/data/source/2");
    let mut articles: Vec<Article> = [("a", &target), ("b", &target), ("c", &other)]
        .into_iter()
        .map(|(title, cited)| Article {
            uri: None,
            title: title.to_string(),
            quotes: vec!["q".to_string()],
            cites: vec![cited.clone()],
        })
        .collect();
    service.create_all(&mut articles).expect("create");

    let removed = service
        .delete_by_object_relation::<Article>("cites", &target)
        .expect("delete");
    assert_eq!(removed, 2);
    let left = service.search_all::<Article>(&FilterSet::new(), &[]).expect("search");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].title, "c");

    let none = service
        .delete_by_object_relation::<Article>("cites", &target)
        .expect("nothing left");
    assert_eq!(none, 0);
}

// =============================================================================
// GRAPHS, TRANSACTIONS, CONCURRENCY
// =============================================================================

#[test]
fn named_graph_entity_with_slug_identifiers() {
    let (_dir, service) = service();
    let mut ada = Person {
        uri: None,
        name: "Ada Lovelace".to_string(),
    };
    let mut other_ada = ada.clone();
    let first = service.create(&mut ada).expect("create");
    let second = service.create(&mut other_ada).expect("create");

    assert_eq!(first.as_str(), "http://example.org/data/person/ada-lovelace");
    assert_eq!(second.as_str(), "http://example.org/data/person/ada-lovelace-1");

    let people = service
        .search_all::<Person>(&FilterSet::from(Filter::eq("name", "Ada Lovelace")), &[])
        .expect("search");
    assert_eq!(people.len(), 2);

    service
        .clear_graph(&NamedNode::new_unchecked("http://example.org/graphs/people"))
        .expect("clear");
    assert_eq!(service.count::<Person>(&FilterSet::new()).expect("count"), 0);
}

#[test]
fn renamed_graph_takes_its_instances_along() {
    let (_dir, service) = service();
    let people = NamedNode::new_unchecked("http://example.org/graphs/people");
    let archive = NamedNode::new_unchecked("http://example.org/graphs/archive");
    let mut ada = Person {
        uri: None,
        name: "Ada".to_string(),
    };
    let uri = service.create(&mut ada).expect("create");

    service.rename_graph(&people, &archive).expect("rename");
    assert_eq!(service.count::<Person>(&FilterSet::new()).expect("count"), 0);
    assert_eq!(service.describe(&uri).expect("describe").len(), 2);

    service.rename_graph(&archive, &archive).expect("same graph");
    service.rename_graph(&archive, &people).expect("rename back");
    let back: Person = service.get_by_uri(&uri).expect("get");
    assert_eq!(back.name, "Ada");
}

#[test]
fn object_relations_are_edited_in_place() {
    let (_dir, service) = service();
    let graph = NamedNode::new_unchecked("http://example.org/graphs/links");
    let subject = NamedNode::new_unchecked("http://example.org/data/s");
    let link = NamedNode::new_unchecked("http://example.org/onto#link");
    let target = |n: u8| NamedNode::new_unchecked(format!("http://example.org/data/t{n}"));
    let triples = (1..=3)
        .map(|n| Triple::new(subject.clone(), link.clone(), target(n)))
        .collect();
    service.insert_triples(Some(&graph), triples).expect("insert");

    service
        .delete_object_relation(Some(&graph), &subject, &link, &target(1))
        .expect("delete one");
    assert!(!service.exists(&target(1)).expect("exists"));
    assert_eq!(service.describe(&subject).expect("describe").len(), 2);

    service
        .delete_object_relations(Some(&graph), &subject, &link, &[])
        .expect("nothing to delete");
    service
        .delete_object_relations(Some(&graph), &subject, &link, &[target(2)])
        .expect("delete many");
    assert_eq!(service.describe(&subject).expect("describe").len(), 1);

    service
        .update_object_relation(Some(&graph), &subject, &link, &target(9))
        .expect("update");
    assert_eq!(
        service.describe(&subject).expect("describe"),
        vec![Triple::new(subject.clone(), link.clone(), target(9))]
    );
}

#[test]
fn subclass_instances_match_type_checks() {
    let (_dir, service) = service();
    let special = NamedNode::new_unchecked("http://example.org/onto#SpecialSample");
    let item = NamedNode::new_unchecked("http://example.org/data/special/1");
    service
        .insert_triples(
            None,
            vec![
                Triple::new(
                    special.clone(),
                    rdfs::SUB_CLASS_OF,
                    NamedNode::new_unchecked("http://example.org/onto#Sample"),
                ),
                Triple::new(item.clone(), rdf::TYPE, special.clone()),
                Triple::new(item.clone(), rdfs::LABEL, Literal::new_simple_literal("sub")),
            ],
        )
        .expect("insert");

    assert!(service.exists_of_type::<Sample>(&item).expect("exists"));
    assert!(service.exists_with_type(&special, &item).expect("exists"));
    let loaded: Sample = service.get_by_uri(&item).expect("get");
    assert_eq!(loaded.label, "sub");

    let described = service.describe(&item).expect("describe");
    assert_eq!(described.len(), 2);
}

#[test]
fn explicit_transaction_rolls_back() {
    let (_dir, service) = service();
    let transaction = service.begin().expect("begin");
    let mut sample = Sample::new("pending", None, &[]);
    let uri = transaction.create(&mut sample).expect("create");
    // Visible inside the transaction only
    assert!(transaction.exists(&uri).expect("exists"));
    transaction.rollback().expect("rollback");

    assert!(!service.exists(&uri).expect("exists"));

    let result: Result<(), OntomapError> = service.transaction(|tx| {
        let mut sample = Sample::new("doomed", None, &[]);
        tx.create(&mut sample)?;
        Err(OntomapError::Config("abort".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(service.count::<Sample>(&FilterSet::new()).expect("count"), 0);
}

#[test]
fn concurrent_creates_get_distinct_uris() {
    let (_dir, service) = service();
    let uris: Vec<NamedNode> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                scope.spawn(move || {
                    (0..5)
                        .map(|_| {
                            let mut sample = Sample::new("same", None, &[]);
                            service.create(&mut sample).expect("create")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("join"))
            .collect()
    });

    let distinct: BTreeSet<&str> = uris.iter().map(NamedNode::as_str).collect();
    assert_eq!(distinct.len(), 20);
    assert_eq!(service.count::<Sample>(&FilterSet::new()).expect("count"), 20);
}

#[test]
fn data_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let uri = {
        let service = open_service(dir.path());
        let mut sample = Sample::new("durable", Some("4.25"), &["kept"]);
        service.create(&mut sample).expect("create")
    };

    let service = open_service(dir.path());
    let loaded: Sample = service.get_by_uri(&uri).expect("get");
    assert_eq!(loaded.value, Some(decimal("4.25")));
    assert_eq!(loaded.tags, vec!["kept".to_string()]);
}
