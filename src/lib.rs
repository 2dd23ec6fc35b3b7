//! In-memory, snapshot-isolated quad store
//!
//! Versioned storage of RDF statements with repeatable-read isolation:
//! readers pin a version and never block writers, writers serialize with
//! each other, and removed statements are reclaimed once no pinned reader
//! can see them.
//!
//! # Modules
//!
//! - [`rdf`]: terms, statements and patterns exchanged with collaborators
//! - [`iteration`]: pull-based iteration protocol with deterministic close,
//!   plus filter, convert and intersect combinators
//! - [`store`]: value registry, statement index, snapshots, reclamation,
//!   connections
//!
//! ## Example Usage
//!
//! ```rust
//! use quadstore::iteration::collect_all;
//! use quadstore::rdf::{NamedNode, QuadPattern, Statement};
//! use quadstore::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let mut writer = store.connection();
//! let s = NamedNode::new("http://example.org/s1").unwrap();
//! let p = NamedNode::new("http://example.org/p1").unwrap();
//! let o1 = NamedNode::new("http://example.org/o1").unwrap();
//! writer.add(&Statement::new(s.clone(), p.clone(), o1.clone())).unwrap();
//!
//! // A reader keeps its snapshot while the writer goes on
//! let mut reader = store.connection();
//! reader.begin().unwrap();
//! writer.remove_statements(&QuadPattern::new(None, None, Some(o1.into()))).unwrap();
//!
//! let seen = collect_all(reader.get_statements(&QuadPattern::any(), false).unwrap()).unwrap();
//! assert_eq!(seen.len(), 1);
//! reader.commit().unwrap();
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod iteration;
pub mod rdf;
pub mod store;

// Re-export main types for convenience
pub use iteration::{
    collect_all, BoxedIteration, CloseableIteration, ConvertIteration, FilterIteration,
    IntersectIteration, IterationError, IterationResult,
};

pub use rdf::{
    BlankNode, Literal, NamedNode, Namespace, NamespaceManager, QuadPattern, RdfError, RdfResult,
    Resource, Statement, Term,
};

pub use store::{
    MemoryStore, ReclaimPolicy, ReclaimStats, SnapshotManager, StoreConfig, StoreConnection,
    StoreError, StoreResult, TripleSource, Version,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
