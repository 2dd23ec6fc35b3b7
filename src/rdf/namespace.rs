//! Namespace prefix table kept alongside the statements of a store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Prefix errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Not of the form `prefix:local`
    #[error("Invalid compact IRI: {0}")]
    InvalidCompactIri(String),
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Namespace (prefix → IRI mapping)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub prefix: String,
    pub iri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            iri: iri.into(),
        }
    }
}

/// Prefix table. Starts empty; [`NamespaceManager::with_common_prefixes`]
/// preloads the usual vocabularies.
#[derive(Debug, Clone, Default)]
pub struct NamespaceManager {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with rdf, rdfs, xsd, owl and foaf
    pub fn with_common_prefixes() -> Self {
        let mut mgr = Self::new();
        mgr.set("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        mgr.set("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        mgr.set("xsd", "http://www.w3.org/2001/XMLSchema#");
        mgr.set("owl", "http://www.w3.org/2002/07/owl#");
        mgr.set("foaf", "http://xmlns.com/foaf/0.1/");
        mgr
    }

    /// Bind a prefix, returning the IRI it was previously bound to
    pub fn set(&mut self, prefix: impl Into<String>, iri: impl Into<String>) -> Option<String> {
        self.prefixes.insert(prefix.into(), iri.into())
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    pub fn remove(&mut self, prefix: &str) -> Option<String> {
        self.prefixes.remove(prefix)
    }

    pub fn clear(&mut self) {
        self.prefixes.clear();
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Expand a compact IRI (prefix:local) to a full IRI
    pub fn expand(&self, compact_iri: &str) -> PrefixResult<String> {
        let (prefix, local) = compact_iri
            .split_once(':')
            .ok_or_else(|| PrefixError::InvalidCompactIri(compact_iri.to_string()))?;
        let iri = self
            .get(prefix)
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))?;
        Ok(format!("{}{}", iri, local))
    }

    /// Compact an IRI using the longest matching namespace
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{}:{}", prefix, &iri[ns.len()..]))
    }

    /// Snapshot of all bindings, ordered by prefix
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.prefixes
            .iter()
            .map(|(prefix, iri)| Namespace::new(prefix.clone(), iri.clone()))
            .collect()
    }
}
