//! Ontology graph: the triple model the compiler reads.
//!
//! - **In-memory layer** ([`Graph`]): BTree-indexed triples for deterministic
//!   pattern matching by subject or object
//! - **Template layer** ([`SparqlStore`]): `oxigraph` executes CONSTRUCT/ASK
//!   templates over the same triples and keeps the in-memory layer in sync
//!
//! Both layers share the same [`Triple`] data model. The compiler only talks to
//! them through [`GraphCollaborator`], so any triple store can stand in.

pub mod index;
pub mod load;
pub mod sparql;
pub mod vocab;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

pub use index::Graph;
pub use load::{load_graph, parse_graph, InputFormat};
pub use sparql::SparqlStore;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A literal value with its datatype and optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub datatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A node in the ontology graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// A resource named by an IRI.
    Named(String),
    /// An anonymous resource, identified only within one graph.
    Blank(String),
    /// A literal value.
    Literal(Literal),
}

impl Node {
    pub fn named(iri: impl Into<String>) -> Self {
        Self::Named(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Self::Blank(id.into())
    }

    /// A typed literal without language tag.
    pub fn literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        })
    }

    /// The IRI, if this is a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Named(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    /// Whether the node is named by exactly this IRI.
    pub fn is_iri(&self, iri: &str) -> bool {
        self.as_iri() == Some(iri)
    }

    /// Local name of a named node (see [`local_name`]).
    pub fn local_name(&self) -> Option<&str> {
        self.as_iri().map(local_name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(iri) => write!(f, "<{iri}>"),
            Self::Blank(id) => write!(f, "_:{id}"),
            Self::Literal(Literal {
                value,
                language: Some(lang),
                ..
            }) => write!(f, "{value:?}@{lang}"),
            Self::Literal(Literal {
                value, datatype, ..
            }) => write!(f, "{value:?}^^<{datatype}>"),
        }
    }
}

/// A triple (subject, predicate, object) in the ontology graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// The subject: a named or blank node.
    pub subject: Node,
    /// The predicate IRI.
    pub predicate: String,
    /// The object.
    pub object: Node,
}

impl Triple {
    pub fn new(subject: Node, predicate: impl Into<String>, object: Node) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Local name of an IRI: the part after the last `#`, else after the last `/`,
/// else after the last `:`.
pub fn local_name(iri: &str) -> &str {
    let cut = iri
        .rfind('#')
        .or_else(|| iri.trim_end_matches('/').rfind('/'))
        .or_else(|| iri.rfind(':'));
    match cut {
        Some(pos) => iri[pos + 1..].trim_end_matches('/'),
        None => iri,
    }
}

/// The graph store contract the compiler consumes.
///
/// Implementations answer pattern lookups and execute query templates.
/// `ask` is not used by the compiler itself; downstream layers rely on it.
pub trait GraphCollaborator {
    /// All triples matching the pattern; `None` matches anything.
    fn match_pattern(
        &self,
        subject: Option<&Node>,
        predicate: Option<&str>,
        object: Option<&Node>,
    ) -> Vec<Triple>;

    /// Execute a CONSTRUCT-style template and return the produced triples.
    fn run_template(&self, template: &str) -> GraphResult<Vec<Triple>>;

    /// Execute an ASK-style template.
    fn ask(&self, template: &str) -> GraphResult<bool>;

    /// Add a triple. Returns `false` if it was already present.
    fn insert(&mut self, triple: &Triple) -> GraphResult<bool>;

    /// Remove a triple. Returns `false` if it was absent.
    fn remove(&mut self, triple: &Triple) -> GraphResult<bool>;

    /// Number of triples held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the current triples.
    fn snapshot(&self) -> Graph;
}
