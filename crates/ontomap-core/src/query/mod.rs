//! # Query Algebra
//!
//! The subset of SPARQL 1.1 the synthesizer produces, as plain data.
//!
//! Every query type renders to SPARQL text through `Display`, which is what
//! remote stores receive and what gets logged. The embedded store evaluates
//! the structures directly without reparsing.
//!
//! ## Supported constructs
//!
//! - triple patterns, `<p>*` paths, `GRAPH`, `OPTIONAL`, `UNION`, `VALUES`
//! - `FILTER` with comparisons, boolean operators, `BOUND`, `REGEX`, `IN`,
//!   `STR` and `EXISTS`
//! - `SELECT [DISTINCT]`, `COUNT(DISTINCT ...)`, `ORDER BY`, `OFFSET`, `LIMIT`
//! - `ASK`, `CONSTRUCT`, `DESCRIBE`
//! - `INSERT DATA`, `DELETE DATA`, `WITH .. DELETE .. INSERT .. WHERE`,
//!   `CLEAR GRAPH`

pub mod builder;
pub mod filter;

pub use builder::QueryBuilder;
pub use filter::{Filter, FilterSet, FilterValue};

use oxrdf::{Literal, NamedNode, Term, Triple, Variable};
use std::fmt;

// =============================================================================
// TERMS AND TRIPLE PATTERNS
// =============================================================================

/// Subject or object position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermPattern {
    Variable(Variable),
    Term(Term),
}

impl From<Variable> for TermPattern {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<&Variable> for TermPattern {
    fn from(variable: &Variable) -> Self {
        Self::Variable(variable.clone())
    }
}

impl From<NamedNode> for TermPattern {
    fn from(node: NamedNode) -> Self {
        Self::Term(node.into())
    }
}

impl From<&NamedNode> for TermPattern {
    fn from(node: &NamedNode) -> Self {
        Self::Term(node.clone().into())
    }
}

impl From<Term> for TermPattern {
    fn from(term: Term) -> Self {
        Self::Term(term)
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(variable) => fmt::Display::fmt(variable, f),
            Self::Term(term) => fmt::Display::fmt(term, f),
        }
    }
}

/// Predicate position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Variable(Variable),
    Predicate(NamedNode),
    /// `<p>*`, reflexive transitive closure.
    ZeroOrMore(NamedNode),
}

impl From<NamedNode> for PathPattern {
    fn from(node: NamedNode) -> Self {
        Self::Predicate(node)
    }
}

impl From<&NamedNode> for PathPattern {
    fn from(node: &NamedNode) -> Self {
        Self::Predicate(node.clone())
    }
}

impl From<Variable> for PathPattern {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(variable) => fmt::Display::fmt(variable, f),
            Self::Predicate(node) => fmt::Display::fmt(node, f),
            Self::ZeroOrMore(node) => write!(f, "{node}*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub path: PathPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    #[must_use]
    pub fn new(
        subject: impl Into<TermPattern>,
        path: impl Into<PathPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            path: path.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.path, self.object)
    }
}

// =============================================================================
// GRAPH PATTERNS
// =============================================================================

/// `{ ... }` block. Filters apply to the whole block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPattern {
    pub elements: Vec<PatternElement>,
}

impl GroupPattern {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: impl Into<PatternElement>) {
        self.elements.push(element.into());
    }

    #[must_use]
    pub fn with(mut self, element: impl Into<PatternElement>) -> Self {
        self.push(element);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl From<Vec<PatternElement>> for GroupPattern {
    fn from(elements: Vec<PatternElement>) -> Self {
        Self { elements }
    }
}

impl fmt::Display for GroupPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for element in &self.elements {
            write!(f, " {element}")?;
        }
        f.write_str(" }")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElement {
    Triple(TriplePattern),
    Graph {
        graph: NamedNode,
        pattern: GroupPattern,
    },
    Optional(GroupPattern),
    Union(Vec<GroupPattern>),
    Values {
        variable: Variable,
        terms: Vec<Term>,
    },
    Filter(Expression),
}

impl From<TriplePattern> for PatternElement {
    fn from(triple: TriplePattern) -> Self {
        Self::Triple(triple)
    }
}

impl From<Expression> for PatternElement {
    fn from(expression: Expression) -> Self {
        Self::Filter(expression)
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triple(triple) => fmt::Display::fmt(triple, f),
            Self::Graph { graph, pattern } => write!(f, "GRAPH {graph} {pattern}"),
            Self::Optional(pattern) => write!(f, "OPTIONAL {pattern}"),
            Self::Union(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" UNION ")?;
                    }
                    fmt::Display::fmt(branch, f)?;
                }
                Ok(())
            }
            Self::Values { variable, terms } => {
                write!(f, "VALUES {variable} {{")?;
                for term in terms {
                    write!(f, " {term}")?;
                }
                f.write_str(" }")
            }
            Self::Filter(expression) => write!(f, "FILTER({expression})"),
        }
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Variable(Variable),
    Constant(Term),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    /// Empty conjunction is true.
    And(Vec<Expression>),
    /// Empty disjunction is false.
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Bound(Variable),
    Regex {
        text: Box<Expression>,
        pattern: String,
        case_insensitive: bool,
    },
    In(Box<Expression>, Vec<Term>),
    Str(Box<Expression>),
    IsIri(Box<Expression>),
    Datatype(Box<Expression>),
    Exists(GroupPattern),
}

impl Expression {
    #[must_use]
    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Self::Compare(op, Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn not(inner: Expression) -> Self {
        Self::Not(Box::new(inner))
    }
}

impl From<Variable> for Expression {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<Term> for Expression {
    fn from(term: Term) -> Self {
        Self::Constant(term)
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    items: &[Expression],
    separator: &str,
    empty: &str,
) -> fmt::Result {
    if items.is_empty() {
        return f.write_str(empty);
    }
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(variable) => fmt::Display::fmt(variable, f),
            Self::Constant(term) => fmt::Display::fmt(term, f),
            Self::Compare(op, left, right) => write!(f, "({left} {} {right})", op.symbol()),
            Self::And(items) => write_joined(f, items, " && ", "true"),
            Self::Or(items) => write_joined(f, items, " || ", "false"),
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Bound(variable) => write!(f, "BOUND({variable})"),
            Self::Regex {
                text,
                pattern,
                case_insensitive,
            } => {
                let pattern = Literal::new_simple_literal(pattern.as_str());
                if *case_insensitive {
                    write!(f, "REGEX({text}, {pattern}, \"i\")")
                } else {
                    write!(f, "REGEX({text}, {pattern})")
                }
            }
            Self::In(inner, terms) => {
                write!(f, "({inner} IN (")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt::Display::fmt(term, f)?;
                }
                f.write_str("))")
            }
            Self::Str(inner) => write!(f, "STR({inner})"),
            Self::IsIri(inner) => write!(f, "isIRI({inner})"),
            Self::Datatype(inner) => write!(f, "DATATYPE({inner})"),
            Self::Exists(pattern) => write!(f, "EXISTS {pattern}"),
        }
    }
}

// =============================================================================
// QUERIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Variables(Vec<Variable>),
    /// `(COUNT(DISTINCT ?variable) AS ?alias)`
    Count { variable: Variable, alias: Variable },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCondition {
    pub variable: Variable,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projection: Projection,
    pub pattern: GroupPattern,
    pub order_by: Vec<OrderCondition>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// `SELECT ?vars WHERE { pattern }` without modifiers.
    #[must_use]
    pub fn new(variables: Vec<Variable>, pattern: GroupPattern) -> Self {
        Self {
            distinct: false,
            projection: Projection::Variables(variables),
            pattern,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT")?;
        if self.distinct {
            f.write_str(" DISTINCT")?;
        }
        match &self.projection {
            Projection::Variables(variables) if variables.is_empty() => f.write_str(" *")?,
            Projection::Variables(variables) => {
                for variable in variables {
                    write!(f, " {variable}")?;
                }
            }
            Projection::Count { variable, alias } => {
                write!(f, " (COUNT(DISTINCT {variable}) AS {alias})")?;
            }
        }
        write!(f, " WHERE {}", self.pattern)?;
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY")?;
            for condition in &self.order_by {
                if condition.descending {
                    write!(f, " DESC({})", condition.variable)?;
                } else {
                    write!(f, " ASC({})", condition.variable)?;
                }
            }
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskQuery {
    pub pattern: GroupPattern,
}

impl fmt::Display for AskQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ASK {}", self.pattern)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructQuery {
    pub template: Vec<TriplePattern>,
    pub pattern: GroupPattern,
}

fn write_template(f: &mut fmt::Formatter<'_>, template: &[TriplePattern]) -> fmt::Result {
    f.write_str("{")?;
    for triple in template {
        write!(f, " {triple}")?;
    }
    f.write_str(" }")
}

impl fmt::Display for ConstructQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CONSTRUCT ")?;
        write_template(f, &self.template)?;
        write!(f, " WHERE {}", self.pattern)
    }
}

/// Concise description: every triple with the resource as subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeQuery {
    pub resource: NamedNode,
}

impl fmt::Display for DescribeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DESCRIBE {}", self.resource)
    }
}

// =============================================================================
// UPDATES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    /// Without a graph, data goes to the default graph.
    InsertData {
        graph: Option<NamedNode>,
        triples: Vec<Triple>,
    },
    /// Without a graph, matching triples are removed from every graph.
    DeleteData {
        graph: Option<NamedNode>,
        triples: Vec<Triple>,
    },
    /// `WITH <graph> DELETE { .. } INSERT { .. } WHERE { .. }`
    DeleteInsert {
        graph: Option<NamedNode>,
        delete: Vec<TriplePattern>,
        insert: Vec<TriplePattern>,
        pattern: GroupPattern,
    },
    ClearGraph {
        graph: NamedNode,
    },
    /// Replace the content of `to` with the content of `from`, leaving
    /// `from` empty.
    MoveGraph {
        from: NamedNode,
        to: NamedNode,
    },
}

fn write_data(
    f: &mut fmt::Formatter<'_>,
    graph: Option<&NamedNode>,
    triples: &[Triple],
) -> fmt::Result {
    f.write_str("{")?;
    if let Some(graph) = graph {
        write!(f, " GRAPH {graph} {{")?;
    }
    for triple in triples {
        write!(f, " {triple} .")?;
    }
    if graph.is_some() {
        f.write_str(" }")?;
    }
    f.write_str(" }")
}

impl fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertData { graph, triples } => {
                f.write_str("INSERT DATA ")?;
                write_data(f, graph.as_ref(), triples)
            }
            Self::DeleteData { graph, triples } => {
                f.write_str("DELETE DATA ")?;
                write_data(f, graph.as_ref(), triples)
            }
            Self::DeleteInsert {
                graph,
                delete,
                insert,
                pattern,
            } => {
                if let Some(graph) = graph {
                    write!(f, "WITH {graph} ")?;
                }
                if !delete.is_empty() || insert.is_empty() {
                    f.write_str("DELETE ")?;
                    write_template(f, delete)?;
                    f.write_str(" ")?;
                }
                if !insert.is_empty() {
                    f.write_str("INSERT ")?;
                    write_template(f, insert)?;
                    f.write_str(" ")?;
                }
                write!(f, "WHERE {pattern}")
            }
            Self::ClearGraph { graph } => write!(f, "CLEAR SILENT GRAPH {graph}"),
            Self::MoveGraph { from, to } => write!(f, "MOVE SILENT GRAPH {from} TO GRAPH {to}"),
        }
    }
}

/// Operations executed in order as one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub operations: Vec<UpdateOperation>,
}

impl UpdateRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: UpdateOperation) {
        self.operations.push(operation);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl From<UpdateOperation> for UpdateRequest {
    fn from(operation: UpdateOperation) -> Self {
        Self {
            operations: vec![operation],
        }
    }
}

impl fmt::Display for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, operation) in self.operations.iter().enumerate() {
            if i > 0 {
                f.write_str(" ;\n")?;
            }
            fmt::Display::fmt(operation, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use oxrdf::vocab::{rdf, rdfs};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn iri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(value)
    }

    #[test]
    fn select_renders_modifiers() {
        let pattern = GroupPattern::new()
            .with(TriplePattern::new(
                var("t"),
                PathPattern::ZeroOrMore(rdfs::SUB_CLASS_OF.into_owned()),
                iri("http://example.org/Sample"),
            ))
            .with(TriplePattern::new(var("uri"), rdf::TYPE.into_owned(), var("t")));
        let mut query = SelectQuery::new(vec![var("uri")], pattern);
        query.distinct = true;
        query.order_by.push(OrderCondition {
            variable: var("uri"),
            descending: true,
        });
        query.offset = Some(20);
        query.limit = Some(10);

        assert_eq!(
            query.to_string(),
            "SELECT DISTINCT ?uri WHERE { ?t <http://www.w3.org/2000/01/rdf-schema#subClassOf>* <http://example.org/Sample> . ?uri <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> ?t . } ORDER BY DESC(?uri) OFFSET 20 LIMIT 10"
        );
    }

    #[test]
    fn count_projection() {
        let query = SelectQuery {
            distinct: false,
            projection: Projection::Count {
                variable: var("uri"),
                alias: var("count"),
            },
            pattern: GroupPattern::new(),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        };
        assert_eq!(
            query.to_string(),
            "SELECT (COUNT(DISTINCT ?uri) AS ?count) WHERE { }"
        );
    }

    #[test]
    fn regex_pattern_is_escaped() {
        let expression = Expression::Regex {
            text: Box::new(Expression::Variable(var("label"))),
            pattern: "say \"hi\"".to_string(),
            case_insensitive: true,
        };
        assert_eq!(
            expression.to_string(),
            "REGEX(?label, \"say \\\"hi\\\"\", \"i\")"
        );
    }

    #[test]
    fn union_and_values() {
        let element = PatternElement::Union(vec![
            GroupPattern::new().with(TriplePattern::new(iri("http://x/a"), var("p"), var("o"))),
            GroupPattern::new().with(TriplePattern::new(var("s"), var("p"), iri("http://x/a"))),
        ]);
        assert_eq!(
            element.to_string(),
            "{ <http://x/a> ?p ?o . } UNION { ?s ?p <http://x/a> . }"
        );

        let values = PatternElement::Values {
            variable: var("uri"),
            terms: vec![iri("http://x/a").into(), iri("http://x/b").into()],
        };
        assert_eq!(values.to_string(), "VALUES ?uri { <http://x/a> <http://x/b> }");
    }

    #[test]
    fn empty_boolean_operators() {
        assert_eq!(Expression::And(Vec::new()).to_string(), "true");
        assert_eq!(Expression::Or(Vec::new()).to_string(), "false");
    }

    #[test]
    fn boolean_operators_join_operands() {
        let expression = Expression::Or(vec![
            Expression::Bound(var("label")),
            Expression::And(vec![
                Expression::IsIri(Box::new(Expression::Variable(var("link")))),
                Expression::not(Expression::Bound(var("value"))),
            ]),
        ]);
        assert_eq!(
            expression.to_string(),
            "(BOUND(?label) || (isIRI(?link) && (!BOUND(?value))))"
        );
        let datatype = Expression::compare(
            CompareOp::Equal,
            Expression::Datatype(Box::new(Expression::Variable(var("value")))),
            Expression::Constant(iri("http://www.w3.org/2001/XMLSchema#string").into()),
        );
        assert_eq!(
            datatype.to_string(),
            "(DATATYPE(?value) = <http://www.w3.org/2001/XMLSchema#string>)"
        );
    }

    #[test]
    fn update_rendering() {
        let triple = Triple::new(
            iri("http://x/a"),
            iri("http://x/p"),
            Literal::new_simple_literal("v"),
        );
        let request = UpdateRequest {
            operations: vec![
                UpdateOperation::InsertData {
                    graph: Some(iri("http://x/g")),
                    triples: vec![triple],
                },
                UpdateOperation::DeleteInsert {
                    graph: None,
                    delete: vec![TriplePattern::new(iri("http://x/a"), iri("http://x/p"), var("o"))],
                    insert: Vec::new(),
                    pattern: GroupPattern::new().with(TriplePattern::new(
                        iri("http://x/a"),
                        iri("http://x/p"),
                        var("o"),
                    )),
                },
                UpdateOperation::ClearGraph {
                    graph: iri("http://x/g"),
                },
            ],
        };
        assert_eq!(
            request.to_string(),
            "INSERT DATA { GRAPH <http://x/g> { <http://x/a> <http://x/p> \"v\" . } } ;\n\
             DELETE { <http://x/a> <http://x/p> ?o . } WHERE { <http://x/a> <http://x/p> ?o . } ;\n\
             CLEAR SILENT GRAPH <http://x/g>"
        );
    }
}
