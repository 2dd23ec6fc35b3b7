//! RDF value model handed to and returned from the store
//!
//! These types wrap the oxrdf primitives. They are store-agnostic: the store
//! interns them into [`crate::store::MemValue`] entries on first use.

use oxrdf::{
    BlankNode as OxBlankNode, GraphName as OxGraphName, Literal as OxLiteral,
    NamedNode as OxNamedNode, Quad as OxQuad, Subject as OxSubject, Term as OxTerm,
};
use std::fmt;
use thiserror::Error;

/// RDF errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RdfError {
    /// Invalid IRI
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),

    /// Invalid blank node
    #[error("Invalid blank node: {0}")]
    InvalidBlankNode(String),

    /// Invalid literal
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    /// Term kind not allowed in this position (e.g. a literal subject)
    #[error("Unsupported term: {0}")]
    UnsupportedTerm(String),
}

pub type RdfResult<T> = Result<T, RdfError>;

/// Named node (IRI)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedNode(OxNamedNode);

impl NamedNode {
    /// Create a new named node from an IRI string
    pub fn new(iri: &str) -> RdfResult<Self> {
        OxNamedNode::new(iri)
            .map(Self)
            .map_err(|e| RdfError::InvalidIri(e.to_string()))
    }

    /// Rebuild a node from an IRI that was validated when it was first stored
    pub(crate) fn new_unchecked(iri: impl Into<String>) -> Self {
        Self(OxNamedNode::new_unchecked(iri))
    }

    /// Get the IRI string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner oxrdf NamedNode
    pub fn inner(&self) -> &OxNamedNode {
        &self.0
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_str())
    }
}

impl From<OxNamedNode> for NamedNode {
    fn from(node: OxNamedNode) -> Self {
        Self(node)
    }
}

impl From<NamedNode> for OxNamedNode {
    fn from(node: NamedNode) -> Self {
        node.0
    }
}

/// Blank node (anonymous node)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlankNode(OxBlankNode);

impl BlankNode {
    /// Create a new blank node with a fresh random identifier
    pub fn new() -> Self {
        Self(OxBlankNode::default())
    }

    /// Create a blank node from a string identifier
    pub fn with_id(id: &str) -> RdfResult<Self> {
        OxBlankNode::new(id)
            .map(Self)
            .map_err(|e| RdfError::InvalidBlankNode(e.to_string()))
    }

    pub(crate) fn new_unchecked(id: impl Into<String>) -> Self {
        Self(OxBlankNode::new_unchecked(id))
    }

    /// Get the blank node identifier
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for BlankNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.as_str())
    }
}

impl From<OxBlankNode> for BlankNode {
    fn from(node: OxBlankNode) -> Self {
        Self(node)
    }
}

/// RDF literal value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal(OxLiteral);

impl Literal {
    /// Create a simple literal (xsd:string)
    pub fn new_simple_literal(value: impl Into<String>) -> Self {
        Self(OxLiteral::new_simple_literal(value))
    }

    /// Create a literal with language tag
    pub fn new_language_tagged_literal(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> RdfResult<Self> {
        OxLiteral::new_language_tagged_literal(value, language)
            .map(Self)
            .map_err(|e| RdfError::InvalidLiteral(e.to_string()))
    }

    /// Create a typed literal
    pub fn new_typed_literal(value: impl Into<String>, datatype: NamedNode) -> Self {
        Self(OxLiteral::new_typed_literal(value, datatype.0))
    }

    pub(crate) fn from_parts_unchecked(
        value: impl Into<String>,
        datatype: &str,
        language: Option<&str>,
    ) -> Self {
        match language {
            Some(lang) => Self(OxLiteral::new_language_tagged_literal_unchecked(value, lang)),
            None => Self(OxLiteral::new_typed_literal(
                value,
                OxNamedNode::new_unchecked(datatype),
            )),
        }
    }

    /// Get the lexical value
    pub fn value(&self) -> &str {
        self.0.value()
    }

    /// Get the language tag if present
    pub fn language(&self) -> Option<&str> {
        self.0.language()
    }

    /// Get the datatype
    pub fn datatype(&self) -> NamedNode {
        NamedNode(self.0.datatype().into_owned())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(lang) = self.language() {
            write!(f, "\"{}\"@{}", self.value(), lang)
        } else {
            write!(f, "\"{}\"^^{}", self.value(), self.datatype())
        }
    }
}

impl From<OxLiteral> for Literal {
    fn from(lit: OxLiteral) -> Self {
        Self(lit)
    }
}

/// A resource: anything that may appear as subject or context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
}

impl Resource {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, Resource::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, Resource::BlankNode(_))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::NamedNode(n) => write!(f, "{}", n),
            Resource::BlankNode(b) => write!(f, "{}", b),
        }
    }
}

impl From<NamedNode> for Resource {
    fn from(node: NamedNode) -> Self {
        Resource::NamedNode(node)
    }
}

impl From<BlankNode> for Resource {
    fn from(node: BlankNode) -> Self {
        Resource::BlankNode(node)
    }
}

impl TryFrom<Term> for Resource {
    type Error = RdfError;

    fn try_from(term: Term) -> RdfResult<Self> {
        match term {
            Term::NamedNode(n) => Ok(Resource::NamedNode(n)),
            Term::BlankNode(b) => Ok(Resource::BlankNode(b)),
            Term::Literal(l) => Err(RdfError::UnsupportedTerm(format!(
                "literal {} cannot be used as a resource",
                l
            ))),
        }
    }
}

impl TryFrom<OxSubject> for Resource {
    type Error = RdfError;

    fn try_from(subject: OxSubject) -> RdfResult<Self> {
        match subject {
            OxSubject::NamedNode(n) => Ok(Resource::NamedNode(n.into())),
            OxSubject::BlankNode(b) => Ok(Resource::BlankNode(b.into())),
            #[allow(unreachable_patterns)]
            other => Err(RdfError::UnsupportedTerm(other.to_string())),
        }
    }
}

impl From<Resource> for OxSubject {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::NamedNode(n) => OxSubject::NamedNode(n.0),
            Resource::BlankNode(b) => OxSubject::BlankNode(b.0),
        }
    }
}

/// Any RDF value: IRI, blank node or literal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
    /// Literal value
    Literal(Literal),
}

impl Term {
    /// Check if this is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(n) => write!(f, "{}", n),
            Term::BlankNode(b) => write!(f, "{}", b),
            Term::Literal(l) => write!(f, "{}", l),
        }
    }
}

impl From<NamedNode> for Term {
    fn from(node: NamedNode) -> Self {
        Term::NamedNode(node)
    }
}

impl From<BlankNode> for Term {
    fn from(node: BlankNode) -> Self {
        Term::BlankNode(node)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

impl From<Resource> for Term {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::NamedNode(n) => Term::NamedNode(n),
            Resource::BlankNode(b) => Term::BlankNode(b),
        }
    }
}

impl TryFrom<OxTerm> for Term {
    type Error = RdfError;

    fn try_from(term: OxTerm) -> RdfResult<Self> {
        match term {
            OxTerm::NamedNode(n) => Ok(Term::NamedNode(n.into())),
            OxTerm::BlankNode(b) => Ok(Term::BlankNode(b.into())),
            OxTerm::Literal(l) => Ok(Term::Literal(l.into())),
            #[allow(unreachable_patterns)]
            other => Err(RdfError::UnsupportedTerm(other.to_string())),
        }
    }
}

impl From<Term> for OxTerm {
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(n) => OxTerm::NamedNode(n.0),
            Term::BlankNode(b) => OxTerm::BlankNode(b.0),
            Term::Literal(l) => OxTerm::Literal(l.0),
        }
    }
}

/// A statement: subject, predicate, object and an optional context
/// (`None` = default graph)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: Resource,
    pub predicate: NamedNode,
    pub object: Term,
    pub context: Option<Resource>,
}

impl Statement {
    /// Create a statement in the default graph
    pub fn new(subject: impl Into<Resource>, predicate: NamedNode, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            context: None,
        }
    }

    /// Place this statement in a named context
    pub fn in_context(mut self, context: impl Into<Resource>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Convert to an oxrdf quad
    pub fn to_oxrdf(&self) -> OxQuad {
        let graph_name = match &self.context {
            Some(Resource::NamedNode(n)) => OxGraphName::NamedNode(n.0.clone()),
            Some(Resource::BlankNode(b)) => OxGraphName::BlankNode(b.0.clone()),
            None => OxGraphName::DefaultGraph,
        };
        OxQuad::new(
            OxSubject::from(self.subject.clone()),
            self.predicate.0.clone(),
            OxTerm::from(self.object.clone()),
            graph_name,
        )
    }
}

impl TryFrom<OxQuad> for Statement {
    type Error = RdfError;

    fn try_from(quad: OxQuad) -> RdfResult<Self> {
        let context = match quad.graph_name {
            OxGraphName::NamedNode(n) => Some(Resource::NamedNode(n.into())),
            OxGraphName::BlankNode(b) => Some(Resource::BlankNode(b.into())),
            OxGraphName::DefaultGraph => None,
        };
        Ok(Self {
            subject: Resource::try_from(quad.subject)?,
            predicate: quad.predicate.into(),
            object: Term::try_from(quad.object)?,
            context,
        })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(
                f,
                "{} {} {} {} .",
                self.subject, self.predicate, self.object, context
            ),
            None => write!(f, "{} {} {} .", self.subject, self.predicate, self.object),
        }
    }
}

/// Pattern over statements; `None` positions are wildcards.
///
/// An empty `contexts` list matches every context. A `None` entry inside
/// the list selects the default graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuadPattern {
    pub subject: Option<Resource>,
    pub predicate: Option<NamedNode>,
    pub object: Option<Term>,
    pub contexts: Vec<Option<Resource>>,
}

impl QuadPattern {
    /// Create a pattern over all contexts
    pub fn new(
        subject: Option<Resource>,
        predicate: Option<NamedNode>,
        object: Option<Term>,
    ) -> Self {
        Self {
            subject,
            predicate,
            object,
            contexts: Vec::new(),
        }
    }

    /// Pattern matching every statement
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict the pattern to the given contexts
    pub fn with_contexts(mut self, contexts: Vec<Option<Resource>>) -> Self {
        self.contexts = contexts;
        self
    }

    /// Check if a statement matches this pattern
    pub fn matches(&self, statement: &Statement) -> bool {
        if let Some(ref s) = self.subject {
            if s != &statement.subject {
                return false;
            }
        }
        if let Some(ref p) = self.predicate {
            if p != &statement.predicate {
                return false;
            }
        }
        if let Some(ref o) = self.object {
            if o != &statement.object {
                return false;
            }
        }
        self.contexts.is_empty() || self.contexts.contains(&statement.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_name() -> Statement {
        Statement::new(
            NamedNode::new("http://example.org/alice").unwrap(),
            NamedNode::new("http://xmlns.com/foaf/0.1/name").unwrap(),
            Literal::new_simple_literal("Alice"),
        )
    }

    #[test]
    fn test_named_node() {
        let node = NamedNode::new("http://example.org/alice").unwrap();
        assert_eq!(node.as_str(), "http://example.org/alice");
        assert_eq!(node.to_string(), "<http://example.org/alice>");
        assert!(NamedNode::new("not an iri").is_err());
    }

    #[test]
    fn test_blank_node() {
        let node1 = BlankNode::new();
        let node2 = BlankNode::new();
        assert_ne!(node1, node2);

        let named = BlankNode::with_id("b1").unwrap();
        assert_eq!(named.to_string(), "_:b1");
    }

    #[test]
    fn test_literal() {
        let lit = Literal::new_simple_literal("Alice");
        assert_eq!(lit.value(), "Alice");
        assert_eq!(lit.datatype().as_str(), "http://www.w3.org/2001/XMLSchema#string");

        let lit = Literal::new_language_tagged_literal("Alice", "en").unwrap();
        assert_eq!(lit.language(), Some("en"));

        let rebuilt = Literal::from_parts_unchecked("Alice", lit.datatype().as_str(), Some("en"));
        assert_eq!(rebuilt, lit);
    }

    #[test]
    fn test_literal_is_not_a_resource() {
        let term: Term = Literal::new_simple_literal("x").into();
        assert!(Resource::try_from(term).is_err());
    }

    #[test]
    fn test_statement_oxrdf_round_trip() {
        let graph = NamedNode::new("http://example.org/graph").unwrap();
        let statement = alice_name().in_context(graph);
        let quad = statement.to_oxrdf();
        assert_eq!(Statement::try_from(quad).unwrap(), statement);
    }

    #[test]
    fn test_pattern_matching() {
        let statement = alice_name();
        let alice: Resource = NamedNode::new("http://example.org/alice").unwrap().into();
        let bob: Resource = NamedNode::new("http://example.org/bob").unwrap().into();

        assert!(QuadPattern::any().matches(&statement));
        assert!(QuadPattern::new(Some(alice.clone()), None, None).matches(&statement));
        assert!(!QuadPattern::new(Some(bob), None, None).matches(&statement));

        let default_only = QuadPattern::any().with_contexts(vec![None]);
        assert!(default_only.matches(&statement));

        let named_only = QuadPattern::any().with_contexts(vec![Some(alice)]);
        assert!(!named_only.matches(&statement));
    }
}
