//! Store-internal value model
//!
//! [`MemValue`] is the structural form of an atomic value (what the registry
//! deduplicates on). [`ValueId`] is the handle the registry hands out; it is
//! only meaningful inside the store that minted it.

use super::{StoreError, StoreResult};
use crate::rdf::{BlankNode, Literal, NamedNode, Resource, Term};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one store instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(u32);

impl StoreId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Handle to an interned value.
///
/// The generation changes whenever a registry slot is reused, so a handle
/// to an evicted value never resolves to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId {
    pub(crate) store: StoreId,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ValueId {
    /// Store that minted this handle
    pub fn store(&self) -> StoreId {
        self.store
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}.{}", self.store, self.index, self.generation)
    }
}

/// Position a value occupies in a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Subject,
    Predicate,
    Object,
    Context,
}

impl Role {
    pub(crate) fn slot(self) -> usize {
        match self {
            Role::Subject => 0,
            Role::Predicate => 1,
            Role::Object => 2,
            Role::Context => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Subject => write!(f, "subject"),
            Role::Predicate => write!(f, "predicate"),
            Role::Object => write!(f, "object"),
            Role::Context => write!(f, "context"),
        }
    }
}

/// Structural form of an atomic value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemValue {
    Iri(String),
    BlankNode(String),
    Literal {
        lexical: String,
        datatype: String,
        language: Option<String>,
    },
}

impl MemValue {
    pub fn is_iri(&self) -> bool {
        matches!(self, MemValue::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, MemValue::Literal { .. })
    }

    /// Reject values that cannot occupy `role`
    pub fn check_role(&self, role: Role) -> StoreResult<()> {
        let allowed = match role {
            Role::Subject | Role::Context => !self.is_literal(),
            Role::Predicate => self.is_iri(),
            Role::Object => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(StoreError::InvalidRole {
                role,
                value: self.to_string(),
            })
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            MemValue::Iri(iri) => Term::NamedNode(NamedNode::new_unchecked(iri.as_str())),
            MemValue::BlankNode(id) => Term::BlankNode(BlankNode::new_unchecked(id.as_str())),
            MemValue::Literal {
                lexical,
                datatype,
                language,
            } => Term::Literal(Literal::from_parts_unchecked(
                lexical.as_str(),
                datatype,
                language.as_deref(),
            )),
        }
    }

    pub fn to_resource(&self, role: Role) -> StoreResult<Resource> {
        match self {
            MemValue::Iri(iri) => Ok(Resource::NamedNode(NamedNode::new_unchecked(iri.as_str()))),
            MemValue::BlankNode(id) => Ok(Resource::BlankNode(BlankNode::new_unchecked(id.as_str()))),
            MemValue::Literal { .. } => Err(StoreError::InvalidRole {
                role,
                value: self.to_string(),
            }),
        }
    }

    pub fn to_named_node(&self) -> StoreResult<NamedNode> {
        match self {
            MemValue::Iri(iri) => Ok(NamedNode::new_unchecked(iri.as_str())),
            _ => Err(StoreError::InvalidRole {
                role: Role::Predicate,
                value: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for MemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_term())
    }
}

impl From<&NamedNode> for MemValue {
    fn from(node: &NamedNode) -> Self {
        MemValue::Iri(node.as_str().to_string())
    }
}

impl From<&BlankNode> for MemValue {
    fn from(node: &BlankNode) -> Self {
        MemValue::BlankNode(node.as_str().to_string())
    }
}

impl From<&Literal> for MemValue {
    fn from(literal: &Literal) -> Self {
        MemValue::Literal {
            lexical: literal.value().to_string(),
            datatype: literal.datatype().as_str().to_string(),
            language: literal.language().map(str::to_string),
        }
    }
}

impl From<&Resource> for MemValue {
    fn from(resource: &Resource) -> Self {
        match resource {
            Resource::NamedNode(n) => n.into(),
            Resource::BlankNode(b) => b.into(),
        }
    }
}

impl From<&Term> for MemValue {
    fn from(term: &Term) -> Self {
        match term {
            Term::NamedNode(n) => n.into(),
            Term::BlankNode(b) => b.into(),
            Term::Literal(l) => l.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_checks() {
        let lit = MemValue::from(&Literal::new_simple_literal("x"));
        let iri = MemValue::Iri("http://example.org/a".into());
        let bnode = MemValue::BlankNode("b0".into());

        assert!(lit.check_role(Role::Object).is_ok());
        assert!(matches!(
            lit.check_role(Role::Subject),
            Err(StoreError::InvalidRole { role: Role::Subject, .. })
        ));
        assert!(bnode.check_role(Role::Context).is_ok());
        assert!(bnode.check_role(Role::Predicate).is_err());
        assert!(iri.check_role(Role::Predicate).is_ok());
    }

    #[test]
    fn test_term_conversion_preserves_literal() {
        let lit = Literal::new_language_tagged_literal("chat", "fr").unwrap();
        let value = MemValue::from(&lit);
        assert_eq!(value.to_term(), Term::Literal(lit));

        let typed = Literal::new_typed_literal(
            "42",
            NamedNode::new("http://www.w3.org/2001/XMLSchema#integer").unwrap(),
        );
        assert_eq!(MemValue::from(&typed).to_term(), Term::Literal(typed));
    }

    #[test]
    fn test_store_ids_are_unique() {
        assert_ne!(StoreId::next(), StoreId::next());
    }
}
