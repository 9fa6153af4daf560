//! Reading ontology graphs from RDF documents.

use std::path::Path;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Term;

use crate::error::GraphError;

use super::sparql::from_term;
use super::{Graph, GraphResult, Triple};

/// Serializations the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Turtle,
    NTriples,
    RdfXml,
}

impl InputFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ttl" | "turtle" => Some(Self::Turtle),
            "nt" => Some(Self::NTriples),
            "rdf" | "owl" | "xml" => Some(Self::RdfXml),
            _ => None,
        }
    }

    fn rdf_format(self) -> RdfFormat {
        match self {
            Self::Turtle => RdfFormat::Turtle,
            Self::NTriples => RdfFormat::NTriples,
            Self::RdfXml => RdfFormat::RdfXml,
        }
    }
}

/// Parse an RDF document into a [`Graph`]. Named graphs are flattened.
pub fn parse_graph(data: &str, format: InputFormat) -> GraphResult<Graph> {
    let mut graph = Graph::new();
    for quad in RdfParser::from_format(format.rdf_format()).for_reader(data.as_bytes()) {
        let quad = quad.map_err(|e| GraphError::Parse {
            message: e.to_string(),
        })?;
        let subject = from_term(Term::from(quad.subject));
        let object = from_term(quad.object);
        if let (Some(subject), Some(object)) = (subject, object) {
            graph.insert(Triple::new(subject, quad.predicate.into_string(), object));
        }
    }
    tracing::debug!(triples = graph.len(), ?format, "parsed ontology graph");
    Ok(graph)
}

/// Read and parse an RDF file, choosing the format from its extension.
pub fn load_graph(path: &Path) -> GraphResult<Graph> {
    let format = InputFormat::from_path(path).ok_or_else(|| GraphError::UnsupportedFormat {
        path: path.display().to_string(),
    })?;
    let data = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_graph(&data, format)
}
