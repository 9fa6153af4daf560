//! In-memory triple graph with subject and object indexes.
//!
//! Uses `BTreeSet`/`BTreeMap` throughout so every iteration order is canonical:
//! two graphs holding the same triples are walked identically, whatever order
//! the triples were inserted in.

use std::collections::{BTreeMap, BTreeSet};

use super::{Node, Triple};

/// In-memory ontology graph with dual indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: BTreeSet<Triple>,
    /// Subject → triples with that subject.
    by_subject: BTreeMap<Node, BTreeSet<Triple>>,
    /// Object → triples with that object.
    by_object: BTreeMap<Node, BTreeSet<Triple>>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.triples.contains(&triple) {
            return false;
        }
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .insert(triple.clone());
        self.by_object
            .entry(triple.object.clone())
            .or_default()
            .insert(triple.clone());
        self.triples.insert(triple)
    }

    /// Remove a triple. Returns `false` if it was absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        if !self.triples.remove(triple) {
            return false;
        }
        remove_indexed(&mut self.by_subject, &triple.subject, triple);
        remove_indexed(&mut self.by_object, &triple.object, triple);
        true
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// All triples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Distinct subjects in canonical order.
    pub fn subjects(&self) -> impl Iterator<Item = &Node> {
        self.by_subject.keys()
    }

    /// Triples whose subject is `node`.
    pub fn outgoing<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Triple> + use<'a> {
        self.by_subject.get(node).into_iter().flatten()
    }

    /// Triples whose object is `node`.
    pub fn incoming<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Triple> + use<'a> {
        self.by_object.get(node).into_iter().flatten()
    }

    /// Objects of `(subject, predicate, ?)`.
    pub fn objects<'a>(&'a self, subject: &Node, predicate: &'a str) -> Vec<&'a Node> {
        self.outgoing(subject)
            .filter(|t| t.predicate == predicate)
            .map(|t| &t.object)
            .collect()
    }

    /// Whether `node` appears as the object of any triple with `predicate`.
    pub fn is_object_of(&self, node: &Node, predicate: &str) -> bool {
        self.incoming(node).any(|t| t.predicate == predicate)
    }

    /// All triples matching the pattern; `None` matches anything.
    pub fn match_pattern(
        &self,
        subject: Option<&Node>,
        predicate: Option<&str>,
        object: Option<&Node>,
    ) -> Vec<Triple> {
        let candidates: Box<dyn Iterator<Item = &Triple>> = match (subject, object) {
            (Some(s), _) => Box::new(self.outgoing(s)),
            (None, Some(o)) => Box::new(self.incoming(o)),
            (None, None) => Box::new(self.triples.iter()),
        };
        candidates
            .filter(|t| predicate.is_none_or(|p| t.predicate == p))
            .filter(|t| object.is_none_or(|o| &t.object == o))
            .cloned()
            .collect()
    }
}

fn remove_indexed(index: &mut BTreeMap<Node, BTreeSet<Triple>>, key: &Node, triple: &Triple) {
    if let Some(set) = index.get_mut(key) {
        set.remove(triple);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        graph.extend(iter);
        graph
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        for triple in iter {
            self.insert(triple);
        }
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}
