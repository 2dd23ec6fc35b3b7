//! RDF value model
//!
//! The types in this module are what collaborators exchange with the store:
//! a parser feeds [`Statement`]s in, a query evaluator sends [`QuadPattern`]s
//! and reads [`Statement`]s back. They carry no store identity; the store
//! interns them on first use.
//!
//! # Example
//!
//! ```rust
//! use quadstore::rdf::{Literal, NamedNode, QuadPattern, Statement};
//!
//! let alice = NamedNode::new("http://example.org/alice").unwrap();
//! let name = NamedNode::new("http://xmlns.com/foaf/0.1/name").unwrap();
//! let st = Statement::new(alice.clone(), name, Literal::new_simple_literal("Alice"));
//!
//! let pattern = QuadPattern::new(Some(alice.into()), None, None);
//! assert!(pattern.matches(&st));
//! ```

mod namespace;
mod types;

pub use types::{
    BlankNode, Literal, NamedNode, QuadPattern, RdfError, RdfResult, Resource, Statement, Term,
};

pub use namespace::{Namespace, NamespaceManager, PrefixError, PrefixResult};
