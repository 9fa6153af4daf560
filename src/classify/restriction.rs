//! Restriction shape classification.
//!
//! A restriction node is classified into exactly one shape by which
//! value-constraint predicate it carries. Zero or several shapes, a repeated
//! shape predicate, or a malformed qualification is rejected; no shape is
//! ever guessed.

use std::collections::BTreeSet;

use crate::facts::{ClassExpression, Restriction, RestrictionShape};
use crate::graph::vocab::owl;
use crate::graph::{Graph, Node, Triple};

use super::expression::read_expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    HasValue,
    SomeValuesFrom,
    AllValuesFrom,
    Exact,
    Min,
    Max,
    QualifiedExact,
    QualifiedMin,
    QualifiedMax,
}

impl ShapeKind {
    fn is_qualified(self) -> bool {
        matches!(
            self,
            Self::QualifiedExact | Self::QualifiedMin | Self::QualifiedMax
        )
    }
}

/// Shape predicates in the order they are reported.
const SHAPES: [(&str, ShapeKind); 9] = [
    (owl::HAS_VALUE, ShapeKind::HasValue),
    (owl::SOME_VALUES_FROM, ShapeKind::SomeValuesFrom),
    (owl::ALL_VALUES_FROM, ShapeKind::AllValuesFrom),
    (owl::CARDINALITY, ShapeKind::Exact),
    (owl::MIN_CARDINALITY, ShapeKind::Min),
    (owl::MAX_CARDINALITY, ShapeKind::Max),
    (owl::QUALIFIED_CARDINALITY, ShapeKind::QualifiedExact),
    (owl::MIN_QUALIFIED_CARDINALITY, ShapeKind::QualifiedMin),
    (owl::MAX_QUALIFIED_CARDINALITY, ShapeKind::QualifiedMax),
];

const QUALIFIERS: [&str; 2] = [owl::ON_CLASS, owl::ON_DATA_RANGE];

/// A classified restriction and the triples it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRestriction {
    pub restriction: Restriction,
    pub sources: BTreeSet<Triple>,
}

/// Why a restriction node could not be classified, with its triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRestriction {
    pub reason: String,
    pub sources: BTreeSet<Triple>,
}

/// Classify the restriction at `node`, declared on the class `on_type`.
pub fn read_restriction(
    graph: &Graph,
    node: &Node,
    on_type: &str,
) -> Result<ReadRestriction, RejectedRestriction> {
    let outgoing: Vec<&Triple> = graph.outgoing(node).collect();
    let mut sources: BTreeSet<Triple> = outgoing.iter().map(|t| (*t).clone()).collect();
    let reject = |reason: String, sources: BTreeSet<Triple>| RejectedRestriction { reason, sources };
    let with_predicate = |predicate: &str| -> Vec<&Triple> {
        outgoing
            .iter()
            .copied()
            .filter(|t| t.predicate == predicate)
            .collect()
    };

    let on_property = match with_predicate(owl::ON_PROPERTY).as_slice() {
        [t] => match t.object.as_iri() {
            Some(iri) => iri.to_string(),
            None => return Err(reject("onProperty is not a named property".into(), sources)),
        },
        [] => return Err(reject("missing onProperty".into(), sources)),
        _ => return Err(reject("more than one onProperty".into(), sources)),
    };

    let present: Vec<(&str, ShapeKind, Vec<&Triple>)> = SHAPES
        .iter()
        .map(|(predicate, kind)| (*predicate, *kind, with_predicate(*predicate)))
        .filter(|(_, _, triples)| !triples.is_empty())
        .collect();
    let (predicate, kind, value) = match present.as_slice() {
        [] => return Err(reject("no value constraint".into(), sources)),
        [(predicate, kind, triples)] if triples.len() == 1 => (*predicate, *kind, &triples[0].object),
        [(predicate, _, _)] => {
            return Err(reject(
                format!("{} appears more than once", local(predicate)),
                sources,
            ))
        }
        several => {
            let names: Vec<&str> = several.iter().map(|(p, _, _)| local(p)).collect();
            return Err(reject(
                format!("ambiguous shape ({})", names.join(", ")),
                sources,
            ));
        }
    };

    let qualifiers: Vec<&Triple> = QUALIFIERS
        .iter()
        .flat_map(|q| with_predicate(*q))
        .collect();
    let qualification = match (kind.is_qualified(), qualifiers.as_slice()) {
        (false, []) => None,
        (false, _) => {
            return Err(reject(
                format!("{} does not take a qualification", local(predicate)),
                sources,
            ))
        }
        (true, [q]) => {
            let read = read_expression(graph, &q.object);
            sources.extend(read.sources);
            Some(read.expression)
        }
        (true, []) => {
            return Err(reject(
                format!("{} needs onClass or onDataRange", local(predicate)),
                sources,
            ))
        }
        (true, _) => {
            return Err(reject(
                format!("{} has more than one qualification", local(predicate)),
                sources,
            ))
        }
    };

    let count = || -> Result<u32, String> {
        value
            .as_literal()
            .and_then(|lit| lit.value.trim().parse::<u32>().ok())
            .ok_or_else(|| format!("{} is not a non-negative integer: {value}", local(predicate)))
    };
    let mut expression = |node: &Node| -> ClassExpression {
        let read = read_expression(graph, node);
        sources.extend(read.sources);
        read.expression
    };
    let qualification = qualification.unwrap_or_else(|| ClassExpression::named(owl::THING));

    let shape = match kind {
        ShapeKind::HasValue => Ok(RestrictionShape::HasValue(value.clone())),
        ShapeKind::SomeValuesFrom => Ok(RestrictionShape::SomeValuesFrom(expression(value))),
        ShapeKind::AllValuesFrom => Ok(RestrictionShape::AllValuesFrom(expression(value))),
        ShapeKind::Exact => count().map(RestrictionShape::ExactCardinality),
        ShapeKind::Min => count().map(RestrictionShape::MinCardinality),
        ShapeKind::Max => count().map(RestrictionShape::MaxCardinality),
        ShapeKind::QualifiedExact => count().map(|count| RestrictionShape::QualifiedCardinality {
            count,
            qualification,
        }),
        ShapeKind::QualifiedMin => count().map(|count| RestrictionShape::MinQualifiedCardinality {
            count,
            qualification,
        }),
        ShapeKind::QualifiedMax => count().map(|count| RestrictionShape::MaxQualifiedCardinality {
            count,
            qualification,
        }),
    };

    match shape {
        Ok(shape) => Ok(ReadRestriction {
            restriction: Restriction {
                on_type: on_type.to_string(),
                on_property,
                shape,
            },
            sources,
        }),
        Err(reason) => Err(reject(reason, sources)),
    }
}

fn local(predicate: &str) -> &str {
    crate::graph::local_name(predicate)
}
