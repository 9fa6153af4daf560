//! SPARQL template execution backed by oxigraph.
//!
//! [`SparqlStore`] holds the working copy of an ontology graph during
//! expansion: oxigraph evaluates CONSTRUCT/ASK templates while an in-memory
//! [`Graph`] mirror answers pattern lookups.

use oxigraph::model::{
    BlankNode, GraphName, Literal as OxLiteral, NamedNode, Quad, Term, Triple as OxTriple,
};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::GraphError;

use super::{Graph, GraphCollaborator, GraphResult, Literal, Node, Triple};

/// SPARQL-capable working copy of an ontology graph.
pub struct SparqlStore {
    store: Store,
    mirror: Graph,
}

impl SparqlStore {
    /// Create a new empty in-memory store.
    pub fn in_memory() -> GraphResult<Self> {
        let store = Store::new().map_err(|e| GraphError::Sparql {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self {
            store,
            mirror: Graph::new(),
        })
    }

    /// Create a store holding a copy of `graph`.
    pub fn from_graph(graph: &Graph) -> GraphResult<Self> {
        let mut store = Self::in_memory()?;
        for triple in graph {
            store.insert_triple(triple)?;
        }
        Ok(store)
    }

    /// Insert a triple into both layers.
    pub fn insert_triple(&mut self, triple: &Triple) -> GraphResult<bool> {
        if self.mirror.contains(triple) {
            return Ok(false);
        }
        let quad = to_quad(triple)?;
        self.store.insert(&quad).map_err(|e| GraphError::Sparql {
            message: format!("insert failed: {e}"),
        })?;
        Ok(self.mirror.insert(triple.clone()))
    }

    /// Remove a triple from both layers.
    pub fn remove_triple(&mut self, triple: &Triple) -> GraphResult<bool> {
        if !self.mirror.contains(triple) {
            return Ok(false);
        }
        let quad = to_quad(triple)?;
        self.store.remove(&quad).map_err(|e| GraphError::Sparql {
            message: format!("remove failed: {e}"),
        })?;
        Ok(self.mirror.remove(triple))
    }

    /// Execute a CONSTRUCT query and return the produced triples.
    ///
    /// Triples whose terms have no counterpart in [`Node`] (quoted triples)
    /// are dropped.
    pub fn construct(&self, template: &str) -> GraphResult<Vec<Triple>> {
        let results = self.store.query(template).map_err(|e| GraphError::Template {
            message: e.to_string(),
        })?;

        match results {
            QueryResults::Graph(triples) => {
                let mut out = Vec::new();
                for triple in triples {
                    let triple = triple.map_err(|e| GraphError::Template {
                        message: format!("evaluation error: {e}"),
                    })?;
                    if let Some(triple) = from_ox_triple(triple) {
                        out.push(triple);
                    }
                }
                Ok(out)
            }
            QueryResults::Solutions(_) | QueryResults::Boolean(_) => Err(GraphError::Template {
                message: "expected a CONSTRUCT query producing triples".into(),
            }),
        }
    }

    /// Execute a SPARQL ASK query.
    pub fn query_ask(&self, template: &str) -> GraphResult<bool> {
        let results = self.store.query(template).map_err(|e| GraphError::Template {
            message: e.to_string(),
        })?;
        match results {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(GraphError::Template {
                message: "expected boolean result from ASK query".into(),
            }),
        }
    }

    /// The in-memory mirror.
    pub fn graph(&self) -> &Graph {
        &self.mirror
    }

    /// Consume the store, keeping the in-memory mirror.
    pub fn into_graph(self) -> Graph {
        self.mirror
    }
}

impl GraphCollaborator for SparqlStore {
    fn match_pattern(
        &self,
        subject: Option<&Node>,
        predicate: Option<&str>,
        object: Option<&Node>,
    ) -> Vec<Triple> {
        self.mirror.match_pattern(subject, predicate, object)
    }

    fn run_template(&self, template: &str) -> GraphResult<Vec<Triple>> {
        self.construct(template)
    }

    fn ask(&self, template: &str) -> GraphResult<bool> {
        self.query_ask(template)
    }

    fn insert(&mut self, triple: &Triple) -> GraphResult<bool> {
        self.insert_triple(triple)
    }

    fn remove(&mut self, triple: &Triple) -> GraphResult<bool> {
        self.remove_triple(triple)
    }

    fn len(&self) -> usize {
        self.mirror.len()
    }

    fn snapshot(&self) -> Graph {
        self.mirror.clone()
    }
}

impl std::fmt::Debug for SparqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlStore")
            .field("triples", &self.mirror.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Term conversion
// ---------------------------------------------------------------------------

fn named_node(iri: &str) -> GraphResult<NamedNode> {
    NamedNode::new(iri).map_err(|e| GraphError::InvalidTerm {
        term: format!("<{iri}>"),
        message: e.to_string(),
    })
}

fn blank_node(id: &str) -> GraphResult<BlankNode> {
    BlankNode::new(id).map_err(|e| GraphError::InvalidTerm {
        term: format!("_:{id}"),
        message: e.to_string(),
    })
}

fn to_term(node: &Node) -> GraphResult<Term> {
    match node {
        Node::Named(iri) => Ok(named_node(iri)?.into()),
        Node::Blank(id) => Ok(blank_node(id)?.into()),
        Node::Literal(Literal {
            value,
            language: Some(lang),
            ..
        }) => OxLiteral::new_language_tagged_literal(value.as_str(), lang.as_str())
            .map(Term::from)
            .map_err(|e| GraphError::InvalidTerm {
                term: node.to_string(),
                message: e.to_string(),
            }),
        Node::Literal(Literal {
            value, datatype, ..
        }) => Ok(OxLiteral::new_typed_literal(value.as_str(), named_node(datatype)?).into()),
    }
}

pub(crate) fn to_quad(triple: &Triple) -> GraphResult<Quad> {
    let predicate = named_node(&triple.predicate)?;
    let object = to_term(&triple.object)?;
    match &triple.subject {
        Node::Named(iri) => Ok(Quad::new(
            named_node(iri)?,
            predicate,
            object,
            GraphName::DefaultGraph,
        )),
        Node::Blank(id) => Ok(Quad::new(
            blank_node(id)?,
            predicate,
            object,
            GraphName::DefaultGraph,
        )),
        Node::Literal(_) => Err(GraphError::LiteralSubject {
            term: triple.subject.to_string(),
        }),
    }
}

/// Convert an oxigraph term; quoted triples have no counterpart.
pub(crate) fn from_term(term: Term) -> Option<Node> {
    #[allow(unreachable_patterns)]
    match term {
        Term::NamedNode(n) => Some(Node::Named(n.into_string())),
        Term::BlankNode(b) => Some(Node::Blank(b.into_string())),
        Term::Literal(l) => Some(Node::Literal(Literal {
            value: l.value().to_string(),
            datatype: l.datatype().as_str().to_string(),
            language: l.language().map(str::to_string),
        })),
        _ => None,
    }
}

pub(crate) fn from_ox_triple(triple: OxTriple) -> Option<Triple> {
    let subject = from_term(Term::from(triple.subject))?;
    let object = from_term(triple.object)?;
    Some(Triple::new(subject, triple.predicate.into_string(), object))
}
