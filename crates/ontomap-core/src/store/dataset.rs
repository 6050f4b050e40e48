//! # In-Memory Dataset
//!
//! Indexed quad set plus an evaluator for the query algebra of
//! [`crate::query`]. Backs the embedded store: redb holds the durable copy,
//! queries run against this structure.
//!
//! ## Encoding
//!
//! Terms are kept in their N-Triples form (`<iri>`, `_:b0`,
//! `"lex"^^<dt>`), which makes term equality a string comparison. The
//! default graph is the empty string.
//!
//! ## Dataset semantics
//!
//! - Patterns outside `GRAPH` match the union of all graphs
//! - Inserts without a graph go to the default graph
//! - Deletes without a graph remove matching triples from every graph

use crate::query::{
    AskQuery, CompareOp, ConstructQuery, DescribeQuery, Expression, GroupPattern, PathPattern,
    PatternElement, Projection, SelectQuery, TermPattern, TriplePattern, UpdateOperation,
    UpdateRequest,
};
use crate::store::{Solution, StoreError};
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, Subject, Term, Triple};
use oxsdatatypes::{Boolean, Date, DateTime, Decimal, Double};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// ENCODED QUADS
// =============================================================================

type Key = Arc<str>;
type QuadKey = (Key, Key, Key, Key);

/// A quad in its encoded form; also the persisted record of the
/// embedded store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodedQuad {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Empty for the default graph.
    pub graph: String,
}

impl EncodedQuad {
    #[must_use]
    pub fn new(triple: &Triple, graph: Option<&NamedNode>) -> Self {
        Self {
            subject: triple.subject.to_string(),
            predicate: triple.predicate.to_string(),
            object: triple.object.to_string(),
            graph: graph.map(ToString::to_string).unwrap_or_default(),
        }
    }

    /// Decode back into a triple, dropping the graph.
    pub fn to_triple(&self) -> Result<Triple, StoreError> {
        decode_triple(&self.subject, &self.predicate, &self.object)
    }

    fn key(&self) -> QuadKey {
        (
            Key::from(self.subject.as_str()),
            Key::from(self.predicate.as_str()),
            Key::from(self.object.as_str()),
            Key::from(self.graph.as_str()),
        )
    }

    fn from_key((s, p, o, g): &QuadKey) -> Self {
        Self {
            subject: s.to_string(),
            predicate: p.to_string(),
            object: o.to_string(),
            graph: g.to_string(),
        }
    }
}

fn decode(encoded: &str) -> Result<Term, StoreError> {
    Term::from_str(encoded).map_err(|e| StoreError::Evaluation(format!("corrupt term {encoded}: {e}")))
}

fn decode_triple(subject: &str, predicate: &str, object: &str) -> Result<Triple, StoreError> {
    let subject: Subject = match decode(subject)? {
        Term::NamedNode(node) => node.into(),
        Term::BlankNode(node) => node.into(),
        other => {
            return Err(StoreError::Evaluation(format!(
                "term {other} cannot be a subject"
            )));
        }
    };
    let predicate = NamedNode::from_str(predicate)
        .map_err(|e| StoreError::Evaluation(format!("corrupt predicate {predicate}: {e}")))?;
    Ok(Triple::new(subject, predicate, decode(object)?))
}

fn is_resource(encoded: &str) -> bool {
    encoded.starts_with('<') || encoded.starts_with("_:")
}

// =============================================================================
// DATASET
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum GraphScope {
    /// Union of every graph.
    All,
    Named(Key),
}

impl GraphScope {
    fn of(graph: Option<&NamedNode>) -> Self {
        graph
            .map(|g| Self::Named(Key::from(g.to_string())))
            .unwrap_or(Self::All)
    }

    fn admits(&self, graph: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(name) => name.as_ref() == graph,
        }
    }
}

/// One effective change made by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Inserted(EncodedQuad),
    Removed(EncodedQuad),
}

/// Ordered list of the changes an update request made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub changes: Vec<Change>,
}

impl Delta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Quads indexed by subject, predicate, object and graph.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    spog: BTreeSet<QuadKey>,
    posg: BTreeSet<QuadKey>,
    ospg: BTreeSet<QuadKey>,
    gspo: BTreeSet<QuadKey>,
}

fn empty_key() -> Key {
    Key::from("")
}

/// Entries of `index` whose first components equal the bound prefix.
fn scan<'a>(
    index: &'a BTreeSet<QuadKey>,
    first: Option<&str>,
    second: Option<&str>,
) -> Box<dyn Iterator<Item = &'a QuadKey> + 'a> {
    match (first, second) {
        (None, _) => Box::new(index.iter()),
        (Some(a), None) => {
            let a: Key = Key::from(a);
            let start = (a.clone(), empty_key(), empty_key(), empty_key());
            Box::new(index.range(start..).take_while(move |k| k.0 == a))
        }
        (Some(a), Some(b)) => {
            let a: Key = Key::from(a);
            let b: Key = Key::from(b);
            let start = (a.clone(), b.clone(), empty_key(), empty_key());
            Box::new(
                index
                    .range(start..)
                    .take_while(move |k| k.0 == a && k.1 == b),
            )
        }
    }
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spog.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spog.is_empty()
    }

    /// Returns whether the quad was absent.
    pub fn insert(&mut self, quad: &EncodedQuad) -> bool {
        let (s, p, o, g) = quad.key();
        if !self.spog.insert((s.clone(), p.clone(), o.clone(), g.clone())) {
            return false;
        }
        self.posg.insert((p.clone(), o.clone(), s.clone(), g.clone()));
        self.ospg.insert((o.clone(), s.clone(), p.clone(), g.clone()));
        self.gspo.insert((g, s, p, o));
        true
    }

    /// Returns whether the quad was present.
    pub fn remove(&mut self, quad: &EncodedQuad) -> bool {
        let (s, p, o, g) = quad.key();
        if !self.spog.remove(&(s.clone(), p.clone(), o.clone(), g.clone())) {
            return false;
        }
        self.posg.remove(&(p.clone(), o.clone(), s.clone(), g.clone()));
        self.ospg.remove(&(o.clone(), s.clone(), p.clone(), g.clone()));
        self.gspo.remove(&(g, s, p, o));
        true
    }

    #[must_use]
    pub fn contains(&self, quad: &EncodedQuad) -> bool {
        self.spog.contains(&quad.key())
    }

    /// Every quad in subject order.
    pub fn quads(&self) -> impl Iterator<Item = EncodedQuad> + '_ {
        self.spog.iter().map(EncodedQuad::from_key)
    }

    /// Named graphs holding at least one quad.
    #[must_use]
    pub fn graphs(&self) -> Vec<String> {
        let mut graphs: Vec<String> = Vec::new();
        for (g, _, _, _) in &self.gspo {
            if !g.is_empty() && graphs.last().map(String::as_str) != Some(&**g) {
                graphs.push(g.to_string());
            }
        }
        graphs
    }

    /// Quads matching the bound positions, normalized to (s, p, o, g).
    fn matching(
        &self,
        s: Option<&str>,
        p: Option<&str>,
        o: Option<&str>,
        scope: &GraphScope,
    ) -> Vec<QuadKey> {
        let candidates: Vec<QuadKey> = if s.is_some() {
            scan(&self.spog, s, p).cloned().collect()
        } else if p.is_some() {
            scan(&self.posg, p, o)
                .map(|(p, o, s, g)| (s.clone(), p.clone(), o.clone(), g.clone()))
                .collect()
        } else if o.is_some() {
            scan(&self.ospg, o, None)
                .map(|(o, s, p, g)| (s.clone(), p.clone(), o.clone(), g.clone()))
                .collect()
        } else {
            self.spog.iter().cloned().collect()
        };
        candidates
            .into_iter()
            .filter(|(qs, qp, qo, qg)| {
                s.is_none_or(|s| qs.as_ref() == s)
                    && p.is_none_or(|p| qp.as_ref() == p)
                    && o.is_none_or(|o| qo.as_ref() == o)
                    && scope.admits(qg)
            })
            .collect()
    }

    fn quads_in_graph(&self, graph: &str) -> Vec<EncodedQuad> {
        scan(&self.gspo, Some(graph), None)
            .map(|(g, s, p, o)| {
                EncodedQuad::from_key(&(s.clone(), p.clone(), o.clone(), g.clone()))
            })
            .collect()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn select(
        &self,
        query: &SelectQuery,
        timeout: Option<Duration>,
    ) -> Result<Vec<Solution>, StoreError> {
        let evaluator = Evaluator::new(self, timeout);
        let rows = evaluator.eval_group(&query.pattern, vec![Row::new()], &GraphScope::All)?;
        evaluator.finish_select(query, rows)
    }

    pub fn ask(&self, query: &AskQuery, timeout: Option<Duration>) -> Result<bool, StoreError> {
        let evaluator = Evaluator::new(self, timeout);
        let rows = evaluator.eval_group(&query.pattern, vec![Row::new()], &GraphScope::All)?;
        Ok(!rows.is_empty())
    }

    pub fn construct(
        &self,
        query: &ConstructQuery,
        timeout: Option<Duration>,
    ) -> Result<Vec<Triple>, StoreError> {
        let evaluator = Evaluator::new(self, timeout);
        let rows = evaluator.eval_group(&query.pattern, vec![Row::new()], &GraphScope::All)?;
        let mut seen = BTreeSet::new();
        let mut triples = Vec::new();
        for row in &rows {
            for template in &query.template {
                if let Some((s, p, o)) = instantiate(template, row)? {
                    if seen.insert((s.clone(), p.clone(), o.clone())) {
                        triples.push(decode_triple(&s, &p, &o)?);
                    }
                }
            }
        }
        Ok(triples)
    }

    /// Every triple with the resource as subject, across graphs.
    pub fn describe(&self, query: &DescribeQuery) -> Result<Vec<Triple>, StoreError> {
        let subject = query.resource.to_string();
        let mut seen = BTreeSet::new();
        let mut triples = Vec::new();
        for (s, p, o, _) in self.matching(Some(&subject), None, None, &GraphScope::All) {
            if seen.insert((p.clone(), o.clone())) {
                triples.push(decode_triple(&s, &p, &o)?);
            }
        }
        Ok(triples)
    }

    // =========================================================================
    // UPDATES
    // =========================================================================

    /// Apply every operation in order. On error the dataset is restored to
    /// its state before the request.
    pub fn update(
        &mut self,
        request: &UpdateRequest,
        timeout: Option<Duration>,
    ) -> Result<Delta, StoreError> {
        let mut delta = Delta::default();
        for operation in &request.operations {
            if let Err(e) = self.apply_operation(operation, timeout, &mut delta) {
                self.revert(&delta);
                return Err(e);
            }
        }
        Ok(delta)
    }

    /// Undo the changes of `delta`, newest first.
    pub fn revert(&mut self, delta: &Delta) {
        for change in delta.changes.iter().rev() {
            match change {
                Change::Inserted(quad) => {
                    self.remove(quad);
                }
                Change::Removed(quad) => {
                    self.insert(quad);
                }
            }
        }
    }

    fn record_insert(&mut self, quad: EncodedQuad, delta: &mut Delta) {
        if self.insert(&quad) {
            delta.changes.push(Change::Inserted(quad));
        }
    }

    fn record_remove(&mut self, quad: EncodedQuad, delta: &mut Delta) {
        if self.remove(&quad) {
            delta.changes.push(Change::Removed(quad));
        }
    }

    /// Remove (s, p, o) from `graph`, or from every graph when `None`.
    fn remove_triple(&mut self, s: &str, p: &str, o: &str, graph: Option<&str>, delta: &mut Delta) {
        match graph {
            Some(graph) => self.record_remove(
                EncodedQuad {
                    subject: s.to_string(),
                    predicate: p.to_string(),
                    object: o.to_string(),
                    graph: graph.to_string(),
                },
                delta,
            ),
            None => {
                for key in self.matching(Some(s), Some(p), Some(o), &GraphScope::All) {
                    self.record_remove(EncodedQuad::from_key(&key), delta);
                }
            }
        }
    }

    fn apply_operation(
        &mut self,
        operation: &UpdateOperation,
        timeout: Option<Duration>,
        delta: &mut Delta,
    ) -> Result<(), StoreError> {
        match operation {
            UpdateOperation::InsertData { graph, triples } => {
                for triple in triples {
                    self.record_insert(EncodedQuad::new(triple, graph.as_ref()), delta);
                }
            }
            UpdateOperation::DeleteData { graph, triples } => {
                let graph = graph.as_ref().map(ToString::to_string);
                for triple in triples {
                    let quad = EncodedQuad::new(triple, None);
                    self.remove_triple(
                        &quad.subject,
                        &quad.predicate,
                        &quad.object,
                        graph.as_deref(),
                        delta,
                    );
                }
            }
            UpdateOperation::DeleteInsert {
                graph,
                delete,
                insert,
                pattern,
            } => {
                let scope = GraphScope::of(graph.as_ref());
                let (removals, additions) = {
                    let evaluator = Evaluator::new(self, timeout);
                    let rows = evaluator.eval_group(pattern, vec![Row::new()], &scope)?;
                    let mut removals = Vec::new();
                    let mut additions = Vec::new();
                    for row in &rows {
                        for template in delete {
                            removals.extend(instantiate(template, row)?);
                        }
                        for template in insert {
                            additions.extend(instantiate(template, row)?);
                        }
                    }
                    (removals, additions)
                };
                let graph = graph.as_ref().map(ToString::to_string);
                for (s, p, o) in removals {
                    self.remove_triple(&s, &p, &o, graph.as_deref(), delta);
                }
                for (s, p, o) in additions {
                    self.record_insert(
                        EncodedQuad {
                            subject: s.to_string(),
                            predicate: p.to_string(),
                            object: o.to_string(),
                            graph: graph.clone().unwrap_or_default(),
                        },
                        delta,
                    );
                }
            }
            UpdateOperation::ClearGraph { graph } => {
                for quad in self.quads_in_graph(&graph.to_string()) {
                    self.record_remove(quad, delta);
                }
            }
            UpdateOperation::MoveGraph { from, to } => {
                if from == to {
                    return Ok(());
                }
                let target = to.to_string();
                for quad in self.quads_in_graph(&target) {
                    self.record_remove(quad, delta);
                }
                for quad in self.quads_in_graph(&from.to_string()) {
                    let moved = EncodedQuad {
                        graph: target.clone(),
                        ..quad.clone()
                    };
                    self.record_remove(quad, delta);
                    self.record_insert(moved, delta);
                }
            }
        }
        Ok(())
    }
}

/// Concrete (s, p, o) of a template under a row; `None` when a variable is
/// unbound or a position holds an ill-typed term.
fn instantiate(template: &TriplePattern, row: &Row) -> Result<Option<(Key, Key, Key)>, StoreError> {
    let term = |pattern: &TermPattern| match pattern {
        TermPattern::Variable(v) => row.get(v.as_str()).cloned(),
        TermPattern::Term(t) => Some(Key::from(t.to_string())),
    };
    let predicate = match &template.path {
        PathPattern::Predicate(p) => Some(Key::from(p.to_string())),
        PathPattern::Variable(v) => row.get(v.as_str()).cloned(),
        PathPattern::ZeroOrMore(_) => {
            return Err(StoreError::Unsupported(
                "property path in an update template".to_string(),
            ));
        }
    };
    match (term(&template.subject), predicate, term(&template.object)) {
        (Some(s), Some(p), Some(o)) if is_resource(&s) && p.starts_with('<') => Ok(Some((s, p, o))),
        _ => Ok(None),
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Variable name to encoded term.
type Row = BTreeMap<String, Key>;

enum Slot<'r> {
    Bound(Key),
    Free(&'r str),
}

impl Slot<'_> {
    fn value(&self) -> Option<&str> {
        match self {
            Self::Bound(key) => Some(key),
            Self::Free(_) => None,
        }
    }
}

fn slot<'r>(pattern: &'r TermPattern, row: &Row) -> Slot<'r> {
    match pattern {
        TermPattern::Variable(v) => match row.get(v.as_str()) {
            Some(key) => Slot::Bound(key.clone()),
            None => Slot::Free(v.as_str()),
        },
        TermPattern::Term(t) => Slot::Bound(Key::from(t.to_string())),
    }
}

/// Bind `var` to `value`; false when it is already bound to something else.
fn bind(row: &mut Row, var: &str, value: &Key) -> bool {
    match row.get(var) {
        Some(existing) => existing == value,
        None => {
            row.insert(var.to_string(), value.clone());
            true
        }
    }
}

struct Evaluator<'a> {
    dataset: &'a Dataset,
    deadline: Option<(Instant, Duration)>,
    regexes: RefCell<BTreeMap<(String, bool), Regex>>,
}

impl<'a> Evaluator<'a> {
    fn new(dataset: &'a Dataset, timeout: Option<Duration>) -> Self {
        Self {
            dataset,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
            regexes: RefCell::new(BTreeMap::new()),
        }
    }

    fn check_deadline(&self) -> Result<(), StoreError> {
        match self.deadline {
            Some((deadline, timeout)) if Instant::now() >= deadline => {
                Err(StoreError::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    fn eval_group(
        &self,
        group: &GroupPattern,
        mut rows: Vec<Row>,
        scope: &GraphScope,
    ) -> Result<Vec<Row>, StoreError> {
        let mut filters = Vec::new();
        for element in &group.elements {
            self.check_deadline()?;
            rows = match element {
                PatternElement::Triple(triple) => self.eval_triple(triple, rows, scope)?,
                PatternElement::Graph { graph, pattern } => {
                    self.eval_group(pattern, rows, &GraphScope::of(Some(graph)))?
                }
                PatternElement::Optional(pattern) => {
                    let mut joined = Vec::with_capacity(rows.len());
                    for row in rows {
                        let extended = self.eval_group(pattern, vec![row.clone()], scope)?;
                        if extended.is_empty() {
                            joined.push(row);
                        } else {
                            joined.extend(extended);
                        }
                    }
                    joined
                }
                PatternElement::Union(branches) => {
                    let mut joined = Vec::new();
                    for branch in branches {
                        joined.extend(self.eval_group(branch, rows.clone(), scope)?);
                    }
                    joined
                }
                PatternElement::Values { variable, terms } => {
                    let keys: Vec<Key> = terms.iter().map(|t| Key::from(t.to_string())).collect();
                    let mut joined = Vec::new();
                    for row in rows {
                        for key in &keys {
                            let mut candidate = row.clone();
                            if bind(&mut candidate, variable.as_str(), key) {
                                joined.push(candidate);
                            }
                        }
                    }
                    joined
                }
                PatternElement::Filter(expression) => {
                    filters.push(expression);
                    rows
                }
            };
        }
        if filters.is_empty() {
            return Ok(rows);
        }
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            let mut keep = true;
            for filter in &filters {
                if self.truth(filter, &row, scope)? != Some(true) {
                    keep = false;
                    break;
                }
            }
            if keep {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    fn eval_triple(
        &self,
        triple: &TriplePattern,
        rows: Vec<Row>,
        scope: &GraphScope,
    ) -> Result<Vec<Row>, StoreError> {
        let mut out = Vec::new();
        for row in rows {
            self.check_deadline()?;
            let subject = slot(&triple.subject, &row);
            let object = slot(&triple.object, &row);
            match &triple.path {
                PathPattern::ZeroOrMore(predicate) => {
                    let predicate = predicate.to_string();
                    match (&subject, &object) {
                        (Slot::Bound(start), _) => {
                            for node in self.closure(start, &predicate, scope, true) {
                                let mut candidate = row.clone();
                                let ok = match &object {
                                    Slot::Bound(end) => *end == node,
                                    Slot::Free(var) => bind(&mut candidate, var, &node),
                                };
                                if ok {
                                    out.push(candidate);
                                }
                            }
                        }
                        (Slot::Free(var), Slot::Bound(end)) => {
                            for node in self.closure(end, &predicate, scope, false) {
                                let mut candidate = row.clone();
                                if bind(&mut candidate, var, &node) {
                                    out.push(candidate);
                                }
                            }
                        }
                        (Slot::Free(_), Slot::Free(_)) => {
                            return Err(StoreError::Unsupported(
                                "property path with both ends unbound".to_string(),
                            ));
                        }
                    }
                }
                path => {
                    let (predicate, predicate_var) = match path {
                        PathPattern::Predicate(p) => (Some(Key::from(p.to_string())), None),
                        PathPattern::Variable(v) => match row.get(v.as_str()) {
                            Some(bound) => (Some(bound.clone()), None),
                            None => (None, Some(v.as_str())),
                        },
                        PathPattern::ZeroOrMore(_) => (None, None),
                    };
                    for (s, p, o, _) in self.dataset.matching(
                        subject.value(),
                        predicate.as_deref(),
                        object.value(),
                        scope,
                    ) {
                        let mut candidate = row.clone();
                        let mut ok = true;
                        if let Slot::Free(var) = &subject {
                            ok &= bind(&mut candidate, var, &s);
                        }
                        if let Some(var) = predicate_var {
                            ok &= bind(&mut candidate, var, &p);
                        }
                        if let Slot::Free(var) = &object {
                            ok &= bind(&mut candidate, var, &o);
                        }
                        if ok {
                            out.push(candidate);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Nodes reachable from `start` over zero or more `predicate` edges.
    fn closure(&self, start: &Key, predicate: &str, scope: &GraphScope, forward: bool) -> Vec<Key> {
        let mut seen: BTreeSet<Key> = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        let mut order = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            order.push(node.clone());
            let next = if forward {
                self.dataset
                    .matching(Some(&*node), Some(predicate), None, scope)
                    .into_iter()
                    .map(|(_, _, o, _)| o)
                    .collect::<Vec<_>>()
            } else {
                self.dataset
                    .matching(None, Some(predicate), Some(&*node), scope)
                    .into_iter()
                    .map(|(s, _, _, _)| s)
                    .collect::<Vec<_>>()
            };
            queue.extend(next.into_iter().filter(|n| !seen.contains(n)));
        }
        order
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    /// Effective boolean value; `None` on a type error or unbound variable.
    fn truth(
        &self,
        expression: &Expression,
        row: &Row,
        scope: &GraphScope,
    ) -> Result<Option<bool>, StoreError> {
        Ok(self
            .eval(expression, row, scope)?
            .and_then(|term| effective_boolean(&term)))
    }

    fn eval(
        &self,
        expression: &Expression,
        row: &Row,
        scope: &GraphScope,
    ) -> Result<Option<Term>, StoreError> {
        let boolean = |value: Option<bool>| value.map(|b| Term::from(Literal::from(b)));
        Ok(match expression {
            Expression::Variable(v) => row.get(v.as_str()).map(|k| decode(k)).transpose()?,
            Expression::Constant(term) => Some(term.clone()),
            Expression::Compare(op, left, right) => {
                let left = self.eval(left, row, scope)?;
                let right = self.eval(right, row, scope)?;
                match (left, right) {
                    (Some(l), Some(r)) => boolean(compare(*op, &l, &r)),
                    _ => None,
                }
            }
            Expression::And(items) => {
                let mut result = Some(true);
                for item in items {
                    match self.truth(item, row, scope)? {
                        Some(false) => {
                            result = Some(false);
                            break;
                        }
                        None => result = None,
                        Some(true) => {}
                    }
                }
                boolean(result)
            }
            Expression::Or(items) => {
                let mut result = Some(false);
                for item in items {
                    match self.truth(item, row, scope)? {
                        Some(true) => {
                            result = Some(true);
                            break;
                        }
                        None => result = None,
                        Some(false) => {}
                    }
                }
                boolean(result)
            }
            Expression::Not(inner) => boolean(self.truth(inner, row, scope)?.map(|b| !b)),
            Expression::Bound(v) => boolean(Some(row.contains_key(v.as_str()))),
            Expression::Regex {
                text,
                pattern,
                case_insensitive,
            } => match self.eval(text, row, scope)? {
                Some(Term::Literal(literal)) if is_textual(&literal) => {
                    let matched = self.with_regex(pattern, *case_insensitive, |re| {
                        re.is_match(literal.value())
                    })?;
                    boolean(Some(matched))
                }
                _ => None,
            },
            Expression::In(inner, terms) => match self.eval(inner, row, scope)? {
                Some(value) => boolean(Some(
                    terms
                        .iter()
                        .any(|t| compare(CompareOp::Equal, &value, t) == Some(true)),
                )),
                None => None,
            },
            Expression::Str(inner) => match self.eval(inner, row, scope)? {
                Some(Term::NamedNode(node)) => {
                    Some(Literal::new_simple_literal(node.as_str()).into())
                }
                Some(Term::Literal(literal)) => {
                    Some(Literal::new_simple_literal(literal.value()).into())
                }
                _ => None,
            },
            Expression::IsIri(inner) => self
                .eval(inner, row, scope)?
                .map(|term| Term::from(Literal::from(matches!(term, Term::NamedNode(_))))),
            Expression::Datatype(inner) => match self.eval(inner, row, scope)? {
                Some(Term::Literal(literal)) => Some(literal.datatype().into_owned().into()),
                _ => None,
            },
            Expression::Exists(pattern) => {
                let found = !self.eval_group(pattern, vec![row.clone()], scope)?.is_empty();
                boolean(Some(found))
            }
        })
    }

    fn with_regex<T>(
        &self,
        pattern: &str,
        case_insensitive: bool,
        f: impl FnOnce(&Regex) -> T,
    ) -> Result<T, StoreError> {
        let key = (pattern.to_string(), case_insensitive);
        let mut cache = self.regexes.borrow_mut();
        if !cache.contains_key(&key) {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| StoreError::Evaluation(format!("invalid regex {pattern}: {e}")))?;
            cache.insert(key.clone(), compiled);
        }
        cache
            .get(&key)
            .map(f)
            .ok_or_else(|| StoreError::Evaluation(format!("regex cache miss for {pattern}")))
    }

    // =========================================================================
    // SOLUTION MODIFIERS
    // =========================================================================

    fn finish_select(&self, query: &SelectQuery, rows: Vec<Row>) -> Result<Vec<Solution>, StoreError> {
        let mut rows = rows;
        if !query.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let keys = query
                    .order_by
                    .iter()
                    .map(|c| row.get(c.variable.as_str()).map(|k| decode(k)).transpose())
                    .collect::<Result<Vec<_>, _>>()?;
                keyed.push((keys, row));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                for (condition, (x, y)) in query.order_by.iter().zip(a.iter().zip(b.iter())) {
                    let ordering = order_terms(x.as_ref(), y.as_ref());
                    let ordering = if condition.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        let mut solutions = match &query.projection {
            Projection::Count { variable, alias } => {
                let distinct: BTreeSet<&Key> =
                    rows.iter().filter_map(|row| row.get(variable.as_str())).collect();
                let count = Literal::new_typed_literal(distinct.len().to_string(), xsd::INTEGER);
                let mut solution = Solution::new();
                solution.insert(alias.as_str(), count.into());
                vec![solution]
            }
            Projection::Variables(variables) => {
                let mut seen = BTreeSet::new();
                let mut solutions = Vec::with_capacity(rows.len());
                for row in &rows {
                    let projected: Vec<(String, Key)> = if variables.is_empty() {
                        row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                    } else {
                        variables
                            .iter()
                            .filter_map(|v| {
                                row.get(v.as_str()).map(|k| (v.as_str().to_string(), k.clone()))
                            })
                            .collect()
                    };
                    if query.distinct && !seen.insert(projected.clone()) {
                        continue;
                    }
                    let mut solution = Solution::new();
                    for (name, key) in projected {
                        solution.insert(name, decode(&key)?);
                    }
                    solutions.push(solution);
                }
                solutions
            }
        };

        let offset = query.offset.unwrap_or(0).min(solutions.len());
        solutions.drain(..offset);
        if let Some(limit) = query.limit {
            solutions.truncate(limit);
        }
        Ok(solutions)
    }
}

// =============================================================================
// VALUE COMPARISON
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueClass {
    Exact,
    Floating,
    Boolean,
    Text,
    DateTime,
    Date,
    Other,
}

fn classify(literal: &Literal) -> ValueClass {
    let datatype = literal.datatype();
    if datatype == xsd::DECIMAL
        || datatype == xsd::INTEGER
        || datatype == xsd::INT
        || datatype == xsd::LONG
        || datatype == xsd::SHORT
        || datatype == xsd::BYTE
        || datatype == xsd::NON_NEGATIVE_INTEGER
        || datatype == xsd::POSITIVE_INTEGER
        || datatype == xsd::NEGATIVE_INTEGER
        || datatype == xsd::NON_POSITIVE_INTEGER
        || datatype == xsd::UNSIGNED_INT
        || datatype == xsd::UNSIGNED_LONG
    {
        ValueClass::Exact
    } else if datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
        ValueClass::Floating
    } else if datatype == xsd::BOOLEAN {
        ValueClass::Boolean
    } else if datatype == xsd::STRING || literal.language().is_some() {
        ValueClass::Text
    } else if datatype == xsd::DATE_TIME {
        ValueClass::DateTime
    } else if datatype == xsd::DATE {
        ValueClass::Date
    } else {
        ValueClass::Other
    }
}

fn is_textual(literal: &Literal) -> bool {
    classify(literal) == ValueClass::Text
}

fn parse_cmp<T: FromStr + PartialOrd>(a: &str, b: &str) -> Option<Ordering> {
    let a = T::from_str(a.trim()).ok()?;
    let b = T::from_str(b.trim()).ok()?;
    a.partial_cmp(&b)
}

fn compare_literals(a: &Literal, b: &Literal) -> Option<Ordering> {
    use ValueClass::{Boolean as Bool, Date as D, DateTime as Dt, Exact, Floating, Text};
    match (classify(a), classify(b)) {
        (Exact, Exact) => parse_cmp::<Decimal>(a.value(), b.value()),
        (Exact | Floating, Exact | Floating) => parse_cmp::<Double>(a.value(), b.value()),
        (Bool, Bool) => {
            let a = bool::from(Boolean::from_str(a.value()).ok()?);
            let b = bool::from(Boolean::from_str(b.value()).ok()?);
            Some(a.cmp(&b))
        }
        (Text, Text) if a.language() == b.language() => Some(a.value().cmp(b.value())),
        (Dt, Dt) => parse_cmp::<DateTime>(a.value(), b.value()),
        (D, D) => parse_cmp::<Date>(a.value(), b.value()),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn compare_terms(a: &Term, b: &Term) -> Option<Ordering> {
    match (a, b) {
        (Term::Literal(a), Term::Literal(b)) => compare_literals(a, b),
        (Term::NamedNode(a), Term::NamedNode(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

/// SPARQL operator semantics. `None` is a type error.
fn compare(op: CompareOp, a: &Term, b: &Term) -> Option<bool> {
    let equal = || a == b || compare_terms(a, b) == Some(Ordering::Equal);
    match op {
        CompareOp::Equal => Some(equal()),
        CompareOp::NotEqual => Some(!equal()),
        CompareOp::Less => compare_terms(a, b).map(Ordering::is_lt),
        CompareOp::LessOrEqual => compare_terms(a, b).map(Ordering::is_le),
        CompareOp::Greater => compare_terms(a, b).map(Ordering::is_gt),
        CompareOp::GreaterOrEqual => compare_terms(a, b).map(Ordering::is_ge),
    }
}

fn kind_rank(term: Option<&Term>) -> u8 {
    match term {
        None => 0,
        Some(Term::BlankNode(_)) => 1,
        Some(Term::NamedNode(_)) => 2,
        Some(_) => 3,
    }
}

/// Total order for ORDER BY: unbound, blank nodes, IRIs, then literals.
fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if kind_rank(a) == kind_rank(b) => compare_terms(x, y)
            .unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn effective_boolean(term: &Term) -> Option<bool> {
    let Term::Literal(literal) = term else {
        return None;
    };
    match classify(literal) {
        ValueClass::Boolean => Boolean::from_str(literal.value()).ok().map(bool::from),
        ValueClass::Exact | ValueClass::Floating => {
            let digits = literal.value().trim().trim_start_matches(['+', '-']);
            let zero = digits
                .split(['e', 'E'])
                .next()
                .is_some_and(|mantissa| mantissa.chars().all(|c| c == '0' || c == '.'));
            Some(!zero && digits != "NaN")
        }
        ValueClass::Text => Some(!literal.value().is_empty()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::query::{OrderCondition, QueryBuilder};
    use oxrdf::Variable;
    use oxrdf::vocab::{rdf, rdfs};

    fn iri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(value)
    }

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn insert(dataset: &mut Dataset, s: &str, p: &str, o: impl Into<Term>) {
        let triple = Triple::new(iri(s), iri(p), o);
        dataset.insert(&EncodedQuad::new(&triple, None));
    }

    fn sample_dataset() -> Dataset {
        let mut dataset = Dataset::new();
        insert(&mut dataset, "http://x/Sub", rdfs::SUB_CLASS_OF.as_str(), iri("http://x/Sample"));
        for (id, label, value, class) in [
            ("a", "alpha", "3", "http://x/Sample"),
            ("b", "beta", "1.5", "http://x/Sub"),
            ("c", "Gamma", "10", "http://x/Sample"),
        ] {
            let s = format!("http://x/{id}");
            insert(&mut dataset, &s, rdf::TYPE.as_str(), iri(class));
            insert(&mut dataset, &s, "http://x/label", Literal::new_simple_literal(label));
            insert(
                &mut dataset,
                &s,
                "http://x/value",
                Literal::new_typed_literal(value, xsd::DECIMAL),
            );
        }
        dataset
    }

    fn instances_query() -> SelectQuery {
        let pattern = GroupPattern::new()
            .with(TriplePattern::new(
                var("t"),
                PathPattern::ZeroOrMore(rdfs::SUB_CLASS_OF.into_owned()),
                iri("http://x/Sample"),
            ))
            .with(TriplePattern::new(var("uri"), rdf::TYPE.into_owned(), var("t")))
            .with(TriplePattern::new(var("uri"), iri("http://x/label"), var("label")))
            .with(TriplePattern::new(var("uri"), iri("http://x/value"), var("value")));
        let mut query = SelectQuery::new(vec![var("uri"), var("label"), var("value")], pattern);
        query.distinct = true;
        query
    }

    #[test]
    fn insert_and_remove_keep_indexes_in_sync() {
        let mut dataset = Dataset::new();
        let quad = EncodedQuad::new(
            &Triple::new(iri("http://x/a"), iri("http://x/p"), iri("http://x/b")),
            Some(&iri("http://x/g")),
        );
        assert!(dataset.insert(&quad));
        assert!(!dataset.insert(&quad));
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.graphs(), vec!["<http://x/g>".to_string()]);
        assert!(dataset.remove(&quad));
        assert!(dataset.is_empty());
        assert!(dataset.graphs().is_empty());
    }

    #[test]
    fn subclass_instances_are_matched() {
        let rows = sample_dataset().select(&instances_query(), None).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn numeric_filter_and_ordering() {
        let mut query = instances_query();
        query.pattern.push(Expression::compare(
            CompareOp::Greater,
            Expression::Variable(var("value")),
            Expression::Constant(Literal::new_typed_literal("2", xsd::DECIMAL).into()),
        ));
        query.order_by.push(OrderCondition {
            variable: var("value"),
            descending: false,
        });
        let rows = sample_dataset().select(&query, None).unwrap();
        let labels: Vec<String> = rows
            .iter()
            .map(|r| match r.get("label") {
                Some(Term::Literal(l)) => l.value().to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(labels, vec!["alpha", "Gamma"]);
    }

    #[test]
    fn regex_is_case_insensitive_on_request() {
        let mut query = instances_query();
        query.pattern.push(Expression::Regex {
            text: Box::new(Expression::Variable(var("label"))),
            pattern: "^g".to_string(),
            case_insensitive: true,
        });
        assert_eq!(sample_dataset().select(&query, None).unwrap().len(), 1);
    }

    #[test]
    fn count_offset_and_limit() {
        let dataset = sample_dataset();
        let mut count = instances_query();
        count.projection = Projection::Count {
            variable: var("uri"),
            alias: var("count"),
        };
        let rows = dataset.select(&count, None).unwrap();
        assert_eq!(
            rows[0].get("count"),
            Some(&Literal::new_typed_literal("3", xsd::INTEGER).into())
        );

        let mut page = instances_query();
        page.order_by.push(OrderCondition {
            variable: var("uri"),
            descending: false,
        });
        page.offset = Some(2);
        page.limit = Some(5);
        let rows = dataset.select(&page, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("uri"), Some(&iri("http://x/c").into()));
    }

    #[test]
    fn optional_keeps_unmatched_rows() {
        let mut dataset = sample_dataset();
        insert(&mut dataset, "http://x/a", "http://x/comment", Literal::new_simple_literal("hi"));
        let pattern = GroupPattern::new()
            .with(TriplePattern::new(var("uri"), iri("http://x/label"), var("label")))
            .with(PatternElement::Optional(GroupPattern::new().with(
                TriplePattern::new(var("uri"), iri("http://x/comment"), var("comment")),
            )));
        let rows = dataset
            .select(&SelectQuery::new(vec![var("uri"), var("comment")], pattern), None)
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r.get("comment").is_some()).count(), 1);
    }

    #[test]
    fn exists_and_values() {
        let dataset = sample_dataset();
        assert!(dataset
            .ask(&QueryBuilder::exists_builder(&iri("http://x/Sample")), None)
            .unwrap());
        assert!(!dataset
            .ask(&QueryBuilder::exists_builder(&iri("http://x/nothing")), None)
            .unwrap());

        let mut query = instances_query();
        query.pattern.elements.insert(
            0,
            PatternElement::Values {
                variable: var("uri"),
                terms: vec![iri("http://x/b").into()],
            },
        );
        assert_eq!(dataset.select(&query, None).unwrap().len(), 1);
    }

    #[test]
    fn delete_insert_replaces_values() {
        let mut dataset = sample_dataset();
        let subject = iri("http://x/a");
        let template = TriplePattern::new(&subject, iri("http://x/label"), var("old"));
        let request = UpdateRequest {
            operations: vec![
                UpdateOperation::DeleteInsert {
                    graph: None,
                    delete: vec![template.clone()],
                    insert: Vec::new(),
                    pattern: GroupPattern::new().with(template),
                },
                UpdateOperation::InsertData {
                    graph: None,
                    triples: vec![Triple::new(
                        subject.clone(),
                        iri("http://x/label"),
                        Literal::new_simple_literal("renamed"),
                    )],
                },
            ],
        };
        let delta = dataset.update(&request, None).unwrap();
        assert_eq!(delta.changes.len(), 2);
        let described = dataset
            .describe(&DescribeQuery { resource: subject })
            .unwrap();
        assert!(described
            .iter()
            .any(|t| t.object == Literal::new_simple_literal("renamed").into()));
        assert!(!described
            .iter()
            .any(|t| t.object == Literal::new_simple_literal("alpha").into()));
    }

    #[test]
    fn failed_update_is_reverted() {
        let mut dataset = sample_dataset();
        let before = dataset.len();
        let request = UpdateRequest {
            operations: vec![
                UpdateOperation::InsertData {
                    graph: None,
                    triples: vec![Triple::new(iri("http://x/z"), iri("http://x/p"), iri("http://x/q"))],
                },
                UpdateOperation::DeleteInsert {
                    graph: None,
                    delete: vec![TriplePattern::new(
                        var("s"),
                        PathPattern::ZeroOrMore(iri("http://x/p")),
                        var("o"),
                    )],
                    insert: Vec::new(),
                    pattern: GroupPattern::new().with(TriplePattern::new(
                        var("s"),
                        iri("http://x/p"),
                        var("o"),
                    )),
                },
            ],
        };
        assert!(matches!(
            dataset.update(&request, None),
            Err(StoreError::Unsupported(_))
        ));
        assert_eq!(dataset.len(), before);
    }

    #[test]
    fn delete_data_without_graph_hits_every_graph() {
        let mut dataset = Dataset::new();
        let triple = Triple::new(iri("http://x/a"), iri("http://x/p"), iri("http://x/b"));
        dataset.insert(&EncodedQuad::new(&triple, None));
        dataset.insert(&EncodedQuad::new(&triple, Some(&iri("http://x/g"))));
        dataset
            .update(
                &UpdateOperation::DeleteData {
                    graph: None,
                    triples: vec![triple],
                }
                .into(),
                None,
            )
            .unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn clear_graph_leaves_other_graphs() {
        let mut dataset = Dataset::new();
        let triple = Triple::new(iri("http://x/a"), iri("http://x/p"), iri("http://x/b"));
        dataset.insert(&EncodedQuad::new(&triple, None));
        dataset.insert(&EncodedQuad::new(&triple, Some(&iri("http://x/g"))));
        dataset
            .update(&QueryBuilder::clear_graph(&iri("http://x/g")), None)
            .unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn move_graph_replaces_target() {
        let mut dataset = Dataset::new();
        let kept = Triple::new(iri("http://x/a"), iri("http://x/p"), iri("http://x/b"));
        let stale = Triple::new(iri("http://x/c"), iri("http://x/p"), iri("http://x/d"));
        dataset.insert(&EncodedQuad::new(&kept, Some(&iri("http://x/old"))));
        dataset.insert(&EncodedQuad::new(&stale, Some(&iri("http://x/new"))));
        dataset
            .update(
                &QueryBuilder::move_graph(&iri("http://x/old"), &iri("http://x/new")),
                None,
            )
            .unwrap();
        assert!(dataset.quads_in_graph("<http://x/old>").is_empty());
        assert_eq!(
            dataset.quads_in_graph("<http://x/new>"),
            vec![EncodedQuad::new(&kept, Some(&iri("http://x/new")))]
        );
    }

    #[test]
    fn kind_tests_split_values() {
        let mut dataset = Dataset::new();
        let subject = iri("http://x/a");
        let predicate = iri("http://x/p");
        for object in [
            Term::from(iri("http://x/b")),
            Term::from(Literal::new_simple_literal("b")),
            Term::from(Literal::new_typed_literal("1", xsd::INTEGER)),
        ] {
            dataset.insert(&EncodedQuad::new(
                &Triple::new(subject.clone(), predicate.clone(), object),
                None,
            ));
        }
        let select = |guard: Expression| {
            let pattern = GroupPattern::new()
                .with(TriplePattern::new(&subject, &predicate, var("o")))
                .with(PatternElement::Filter(guard));
            dataset
                .select(&SelectQuery::new(vec![var("o")], pattern), None)
                .unwrap()
        };
        let iris = select(Expression::IsIri(Box::new(Expression::Variable(var("o")))));
        assert_eq!(iris.len(), 1);
        assert_eq!(iris[0].get("o"), Some(&Term::from(iri("http://x/b"))));

        let strings = select(Expression::compare(
            CompareOp::Equal,
            Expression::Datatype(Box::new(Expression::Variable(var("o")))),
            Expression::Constant(xsd::STRING.into_owned().into()),
        ));
        assert_eq!(strings.len(), 1);
        assert_eq!(
            strings[0].get("o"),
            Some(&Term::from(Literal::new_simple_literal("b")))
        );
    }

    #[test]
    fn expired_deadline_times_out() {
        let result = sample_dataset().select(&instances_query(), Some(Duration::ZERO));
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[test]
    fn literal_comparison_semantics() {
        let decimal: Term = Literal::new_typed_literal("1.0", xsd::DECIMAL).into();
        let integer: Term = Literal::new_typed_literal("1", xsd::INTEGER).into();
        let double: Term = Literal::new_typed_literal("2.5E0", xsd::DOUBLE).into();
        let text: Term = Literal::new_simple_literal("1").into();
        assert_eq!(compare(CompareOp::Equal, &decimal, &integer), Some(true));
        assert_eq!(compare(CompareOp::Less, &integer, &double), Some(true));
        assert_eq!(compare(CompareOp::Less, &integer, &text), None);
        assert_eq!(compare(CompareOp::Equal, &integer, &text), Some(false));
    }

    #[test]
    fn effective_boolean_values() {
        assert_eq!(effective_boolean(&Literal::from(true).into()), Some(true));
        assert_eq!(
            effective_boolean(&Literal::new_typed_literal("0.0", xsd::DECIMAL).into()),
            Some(false)
        );
        assert_eq!(effective_boolean(&Literal::new_simple_literal("").into()), Some(false));
        assert_eq!(effective_boolean(&iri("http://x/a").into()), None);
    }
}
