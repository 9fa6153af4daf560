//! Reading class expressions and RDF lists out of the graph.

use std::collections::BTreeSet;

use crate::facts::ClassExpression;
use crate::graph::vocab::{owl, rdf};
use crate::graph::{Graph, Node, Triple};

/// Class constructors an anonymous node may carry.
const CONSTRUCTORS: [&str; 4] = [
    owl::UNION_OF,
    owl::INTERSECTION_OF,
    owl::COMPLEMENT_OF,
    owl::ONE_OF,
];

/// A class expression plus every triple it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadExpression {
    pub expression: ClassExpression,
    pub sources: BTreeSet<Triple>,
}

/// Read the class expression rooted at `node`.
///
/// Named nodes are returned as is. Anonymous nodes must carry exactly one of
/// `unionOf`, `intersectionOf`, `complementOf` or `oneOf`; anything else comes
/// back as [`ClassExpression::Unsupported`] with the reason.
pub fn read_expression(graph: &Graph, node: &Node) -> ReadExpression {
    let mut sources = BTreeSet::new();
    let mut visiting = BTreeSet::new();
    let expression = read_inner(graph, node, &mut sources, &mut visiting);
    ReadExpression {
        expression,
        sources,
    }
}

fn read_inner(
    graph: &Graph,
    node: &Node,
    sources: &mut BTreeSet<Triple>,
    visiting: &mut BTreeSet<Node>,
) -> ClassExpression {
    let outcome = match node {
        Node::Named(iri) => return ClassExpression::Named(iri.clone()),
        Node::Literal(_) => Err("a literal is not a class expression".to_string()),
        Node::Blank(_) if !visiting.insert(node.clone()) => {
            Err("cyclic class expression".to_string())
        }
        Node::Blank(_) => {
            let read = read_anonymous(graph, node, sources, visiting);
            visiting.remove(node);
            read
        }
    };
    outcome.unwrap_or_else(|reason| ClassExpression::Unsupported {
        node: node.clone(),
        reason,
    })
}

fn read_anonymous(
    graph: &Graph,
    node: &Node,
    sources: &mut BTreeSet<Triple>,
    visiting: &mut BTreeSet<Node>,
) -> Result<ClassExpression, String> {
    let outgoing: Vec<&Triple> = graph.outgoing(node).collect();
    if outgoing
        .iter()
        .any(|t| t.predicate == rdf::TYPE && t.object.is_iri(owl::RESTRICTION))
    {
        return Err("a restriction cannot be used as a class expression here".into());
    }
    let constructors: Vec<&Triple> = outgoing
        .iter()
        .copied()
        .filter(|t| CONSTRUCTORS.contains(&t.predicate.as_str()))
        .collect();
    let constructor = match constructors.as_slice() {
        [] => return Err("no class constructor".into()),
        [one] => *one,
        _ => return Err("more than one class constructor".into()),
    };

    // Typing triples (`a owl:Class`, `a rdfs:Datatype`) belong to the expression.
    sources.extend(
        outgoing
            .iter()
            .filter(|t| t.predicate == rdf::TYPE)
            .map(|t| (*t).clone()),
    );
    sources.insert(constructor.clone());

    if constructor.predicate == owl::COMPLEMENT_OF {
        let inner = read_inner(graph, &constructor.object, sources, visiting);
        return Ok(ClassExpression::Complement(Box::new(inner)));
    }
    let list = read_list(graph, &constructor.object)?;
    sources.extend(list.sources);
    let mut operands = || -> Vec<ClassExpression> {
        list.items
            .iter()
            .map(|item| read_inner(graph, item, sources, visiting))
            .collect()
    };
    Ok(match constructor.predicate.as_str() {
        owl::ONE_OF => ClassExpression::OneOf(list.items.clone()),
        owl::UNION_OF => ClassExpression::Union(operands()),
        _ => ClassExpression::Intersection(operands()),
    })
}

/// Items of an RDF list plus its `rdf:first`/`rdf:rest` triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadList {
    pub items: Vec<Node>,
    pub sources: BTreeSet<Triple>,
}

/// Walk an RDF list from its head. Every cell needs exactly one `rdf:first`
/// and one `rdf:rest`; cycles are rejected.
pub fn read_list(graph: &Graph, head: &Node) -> Result<ReadList, String> {
    let mut items = Vec::new();
    let mut sources = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut cell = head.clone();
    while !cell.is_iri(rdf::NIL) {
        if !seen.insert(cell.clone()) {
            return Err(format!("cyclic RDF list at {cell}"));
        }
        let firsts: Vec<&Triple> = graph
            .outgoing(&cell)
            .filter(|t| t.predicate == rdf::FIRST)
            .collect();
        let rests: Vec<&Triple> = graph
            .outgoing(&cell)
            .filter(|t| t.predicate == rdf::REST)
            .collect();
        let (first, rest) = match (firsts.as_slice(), rests.as_slice()) {
            ([first], [rest]) => (*first, *rest),
            _ => return Err(format!("malformed RDF list cell {cell}")),
        };
        items.push(first.object.clone());
        sources.insert(first.clone());
        sources.insert(rest.clone());
        cell = rest.object.clone();
    }
    Ok(ReadList { items, sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{parse_graph, InputFormat};

    fn ttl(body: &str) -> Graph {
        let doc = format!(
            "@prefix owl: <http://www.w3.org/2002/07/owl#> .\n\
             @prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .\n\
             @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n\
             @prefix ex: <http://ex.org/> .\n{body}"
        );
        parse_graph(&doc, InputFormat::Turtle).unwrap()
    }

    fn range_of(graph: &Graph, property: &str) -> Node {
        graph.objects(&Node::named(property), crate::graph::vocab::rdfs::RANGE)[0].clone()
    }

    #[test]
    fn union_of_datatypes() {
        let graph = ttl("ex:age <http://www.w3.org/2000/01/rdf-schema#range> [ owl:unionOf ( xsd:int xsd:long ) ] .");
        let read = read_expression(&graph, &range_of(&graph, "http://ex.org/age"));
        assert_eq!(
            read.expression,
            ClassExpression::Union(vec![
                ClassExpression::named("http://www.w3.org/2001/XMLSchema#int"),
                ClassExpression::named("http://www.w3.org/2001/XMLSchema#long"),
            ])
        );
        // unionOf + 2 × (first, rest)
        assert_eq!(read.sources.len(), 5);
    }

    #[test]
    fn nested_complement_and_enumeration() {
        let graph = ttl(
            "ex:p <http://www.w3.org/2000/01/rdf-schema#range> [ owl:intersectionOf ( ex:A [ owl:complementOf ex:B ] ) ] .\n\
             ex:q <http://www.w3.org/2000/01/rdf-schema#range> [ owl:oneOf ( ex:red ex:green ) ] .",
        );
        let p = read_expression(&graph, &range_of(&graph, "http://ex.org/p")).expression;
        assert_eq!(
            p,
            ClassExpression::Intersection(vec![
                ClassExpression::named("http://ex.org/A"),
                ClassExpression::Complement(Box::new(ClassExpression::named("http://ex.org/B"))),
            ])
        );
        let q = read_expression(&graph, &range_of(&graph, "http://ex.org/q")).expression;
        assert_eq!(
            q,
            ClassExpression::OneOf(vec![
                Node::named("http://ex.org/red"),
                Node::named("http://ex.org/green")
            ])
        );
    }

    #[test]
    fn anonymous_node_without_constructor_is_unsupported() {
        let graph = ttl("ex:p <http://www.w3.org/2000/01/rdf-schema#range> [ owl:onDatatype xsd:int ] .");
        let read = read_expression(&graph, &range_of(&graph, "http://ex.org/p"));
        assert!(matches!(
            read.expression,
            ClassExpression::Unsupported { ref reason, .. } if reason == "no class constructor"
        ));
        assert!(read.sources.is_empty());
    }

    #[test]
    fn cyclic_lists_are_rejected() {
        let a = Node::blank("a");
        let b = Node::blank("b");
        let graph: Graph = [
            Triple::new(a.clone(), rdf::FIRST, Node::named("http://ex.org/X")),
            Triple::new(a.clone(), rdf::REST, b.clone()),
            Triple::new(b.clone(), rdf::FIRST, Node::named("http://ex.org/Y")),
            Triple::new(b.clone(), rdf::REST, a.clone()),
        ]
        .into_iter()
        .collect();
        let err = read_list(&graph, &a).unwrap_err();
        assert!(err.starts_with("cyclic RDF list"));
    }

    #[test]
    fn empty_list() {
        let list = read_list(&Graph::new(), &Node::named(rdf::NIL)).unwrap();
        assert!(list.items.is_empty());
        assert!(list.sources.is_empty());
    }
}
