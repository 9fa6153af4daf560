//! Facts: typed interpretations of parts of the ontology graph.
//!
//! The classifier emits facts, the [`FactStore`] keeps them in an append-only
//! ledger, and the resolver consumes them to build the schema model.

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::Node;
use crate::schema::PropertyKind;

pub use store::{FactId, FactOrigin, FactRecord, FactStore};

// ---------------------------------------------------------------------------
// Class expressions
// ---------------------------------------------------------------------------

/// A class description read from the graph, before it is resolved against the
/// schema model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassExpression {
    /// A class or datatype named by an IRI.
    Named(String),
    Union(Vec<ClassExpression>),
    Intersection(Vec<ClassExpression>),
    Complement(Box<ClassExpression>),
    /// An enumeration of individuals or values.
    OneOf(Vec<Node>),
    /// A node that could not be read as a class expression.
    Unsupported { node: Node, reason: String },
}

impl ClassExpression {
    pub fn named(iri: impl Into<String>) -> Self {
        Self::Named(iri.into())
    }

    pub fn as_named(&self) -> Option<&str> {
        match self {
            Self::Named(iri) => Some(iri),
            _ => None,
        }
    }

    /// The first unsupported sub-expression, if any.
    pub fn unsupported(&self) -> Option<(&Node, &str)> {
        match self {
            Self::Unsupported { node, reason } => Some((node, reason)),
            Self::Union(ops) | Self::Intersection(ops) => ops.iter().find_map(Self::unsupported),
            Self::Complement(inner) => inner.unsupported(),
            Self::Named(_) | Self::OneOf(_) => None,
        }
    }
}

impl fmt::Display for ClassExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, name: &str, ops: &[ClassExpression]| {
            write!(f, "{name}(")?;
            for (i, op) in ops.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{op}")?;
            }
            write!(f, ")")
        };
        match self {
            Self::Named(iri) => write!(f, "<{iri}>"),
            Self::Union(ops) => list(f, "unionOf", ops),
            Self::Intersection(ops) => list(f, "intersectionOf", ops),
            Self::Complement(inner) => write!(f, "complementOf({inner})"),
            Self::OneOf(nodes) => {
                write!(f, "oneOf(")?;
                for (i, n) in nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}")?;
                }
                write!(f, ")")
            }
            Self::Unsupported { node, reason } => write!(f, "unsupported {node} ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

/// The single value constraint a restriction node carries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionShape {
    HasValue(Node),
    SomeValuesFrom(ClassExpression),
    AllValuesFrom(ClassExpression),
    ExactCardinality(u32),
    MinCardinality(u32),
    MaxCardinality(u32),
    QualifiedCardinality { count: u32, qualification: ClassExpression },
    MinQualifiedCardinality { count: u32, qualification: ClassExpression },
    MaxQualifiedCardinality { count: u32, qualification: ClassExpression },
}

impl RestrictionShape {
    pub fn kind(&self) -> FactKind {
        match self {
            Self::HasValue(_) => FactKind::HasValue,
            Self::SomeValuesFrom(_) => FactKind::SomeValuesFrom,
            Self::AllValuesFrom(_) => FactKind::AllValuesFrom,
            Self::ExactCardinality(_) => FactKind::ExactCardinality,
            Self::MinCardinality(_) => FactKind::MinCardinality,
            Self::MaxCardinality(_) => FactKind::MaxCardinality,
            Self::QualifiedCardinality { .. } => FactKind::QualifiedCardinality,
            Self::MinQualifiedCardinality { .. } => FactKind::MinQualifiedCardinality,
            Self::MaxQualifiedCardinality { .. } => FactKind::MaxQualifiedCardinality,
        }
    }
}

/// A restriction read from `Class rdfs:subClassOf [a owl:Restriction; ...]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Restriction {
    /// IRI of the restricted class.
    pub on_type: String,
    /// IRI of the restricted property.
    pub on_property: String,
    pub shape: RestrictionShape,
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// A classified interpretation of part of the ontology graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fact {
    OntologyDeclaration { uri: String },
    ClassReference { uri: String },
    /// Named by naming heuristics only.
    ClassReferenceCandidate { uri: String },
    PropertyReference { uri: String, kind: PropertyKind },
    /// Named by naming heuristics only.
    PropertyReferenceCandidate { uri: String },
    SubClassOf { class: String, super_class: String },
    EquivalentClass { class: String, other: String },
    DisjointWith { class: String, other: String },
    PropertyDomain { property: String, domain: ClassExpression },
    PropertyRange { property: String, range: ClassExpression },
    SubPropertyOf { property: String, super_property: String },
    InverseOf { property: String, inverse: String },
    EquivalentProperty { property: String, other: String },
    Functional { property: String },
    Restriction(Restriction),
    /// Any predicate the classifier does not interpret.
    Extra { subject: Node, predicate: String, value: Node },
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Self::OntologyDeclaration { .. } => FactKind::OntologyDeclaration,
            Self::ClassReference { .. } => FactKind::ClassReference,
            Self::ClassReferenceCandidate { .. } => FactKind::ClassReferenceCandidate,
            Self::PropertyReference { .. } => FactKind::PropertyReference,
            Self::PropertyReferenceCandidate { .. } => FactKind::PropertyReferenceCandidate,
            Self::SubClassOf { .. } => FactKind::SubClassOf,
            Self::EquivalentClass { .. } => FactKind::EquivalentClass,
            Self::DisjointWith { .. } => FactKind::DisjointWith,
            Self::PropertyDomain { .. } => FactKind::PropertyDomain,
            Self::PropertyRange { .. } => FactKind::PropertyRange,
            Self::SubPropertyOf { .. } => FactKind::SubPropertyOf,
            Self::InverseOf { .. } => FactKind::InverseOf,
            Self::EquivalentProperty { .. } => FactKind::EquivalentProperty,
            Self::Functional { .. } => FactKind::Functional,
            Self::Restriction(r) => r.shape.kind(),
            Self::Extra { .. } => FactKind::Extra,
        }
    }

    /// The property IRI the fact is about, if any.
    pub fn property(&self) -> Option<&str> {
        match self {
            Self::PropertyReference { uri, .. } | Self::PropertyReferenceCandidate { uri } => {
                Some(uri)
            }
            Self::PropertyDomain { property, .. }
            | Self::PropertyRange { property, .. }
            | Self::SubPropertyOf { property, .. }
            | Self::InverseOf { property, .. }
            | Self::EquivalentProperty { property, .. }
            | Self::Functional { property } => Some(property),
            Self::Restriction(r) => Some(&r.on_property),
            _ => None,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OntologyDeclaration { uri } => write!(f, "ontology <{uri}>"),
            Self::ClassReference { uri } => write!(f, "class <{uri}>"),
            Self::ClassReferenceCandidate { uri } => write!(f, "class? <{uri}>"),
            Self::PropertyReference { uri, kind } => write!(f, "{kind} property <{uri}>"),
            Self::PropertyReferenceCandidate { uri } => write!(f, "property? <{uri}>"),
            Self::SubClassOf { class, super_class } => {
                write!(f, "<{class}> subClassOf <{super_class}>")
            }
            Self::EquivalentClass { class, other } => {
                write!(f, "<{class}> equivalentClass <{other}>")
            }
            Self::DisjointWith { class, other } => write!(f, "<{class}> disjointWith <{other}>"),
            Self::PropertyDomain { property, domain } => {
                write!(f, "<{property}> domain {domain}")
            }
            Self::PropertyRange { property, range } => write!(f, "<{property}> range {range}"),
            Self::SubPropertyOf {
                property,
                super_property,
            } => write!(f, "<{property}> subPropertyOf <{super_property}>"),
            Self::InverseOf { property, inverse } => write!(f, "<{property}> inverseOf <{inverse}>"),
            Self::EquivalentProperty { property, other } => {
                write!(f, "<{property}> equivalentProperty <{other}>")
            }
            Self::Functional { property } => write!(f, "<{property}> functional"),
            Self::Restriction(r) => {
                write!(f, "<{}> restricts <{}>: {:?}", r.on_type, r.on_property, r.shape)
            }
            Self::Extra {
                subject,
                predicate,
                value,
            } => write!(f, "{subject} <{predicate}> {value}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fact kinds
// ---------------------------------------------------------------------------

/// Fact kinds, including the abstract `Restriction` and `Cardinality` kinds
/// that only serve as assignability targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactKind {
    OntologyDeclaration,
    ClassReference,
    ClassReferenceCandidate,
    PropertyReference,
    PropertyReferenceCandidate,
    SubClassOf,
    EquivalentClass,
    DisjointWith,
    PropertyDomain,
    PropertyRange,
    SubPropertyOf,
    InverseOf,
    EquivalentProperty,
    Functional,
    Restriction,
    HasValue,
    SomeValuesFrom,
    AllValuesFrom,
    Cardinality,
    ExactCardinality,
    MinCardinality,
    MaxCardinality,
    QualifiedCardinality,
    MinQualifiedCardinality,
    MaxQualifiedCardinality,
    Extra,
}

impl FactKind {
    /// The more general kind this one is assignable to.
    pub fn parent(self) -> Option<FactKind> {
        use FactKind::*;
        match self {
            ClassReferenceCandidate => Some(ClassReference),
            PropertyReferenceCandidate => Some(PropertyReference),
            HasValue | SomeValuesFrom | AllValuesFrom | Cardinality => Some(Restriction),
            ExactCardinality
            | MinCardinality
            | MaxCardinality
            | QualifiedCardinality
            | MinQualifiedCardinality
            | MaxQualifiedCardinality => Some(Cardinality),
            _ => None,
        }
    }

    /// Whether a fact of this kind can be used where `target` is expected.
    pub fn is_assignable_to(self, target: FactKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == target {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_hierarchy() {
        assert!(FactKind::ClassReferenceCandidate.is_assignable_to(FactKind::ClassReference));
        assert!(!FactKind::ClassReference.is_assignable_to(FactKind::ClassReferenceCandidate));
        assert!(FactKind::MaxQualifiedCardinality.is_assignable_to(FactKind::Cardinality));
        assert!(FactKind::MaxQualifiedCardinality.is_assignable_to(FactKind::Restriction));
        assert!(FactKind::HasValue.is_assignable_to(FactKind::Restriction));
        assert!(!FactKind::HasValue.is_assignable_to(FactKind::Cardinality));
        assert!(!FactKind::SubClassOf.is_assignable_to(FactKind::Restriction));
    }

    #[test]
    fn restriction_fact_kind_follows_shape() {
        let fact = Fact::Restriction(Restriction {
            on_type: "http://ex.org/Person".into(),
            on_property: "http://ex.org/pet".into(),
            shape: RestrictionShape::ExactCardinality(1),
        });
        assert_eq!(fact.kind(), FactKind::ExactCardinality);
        assert_eq!(fact.property(), Some("http://ex.org/pet"));
    }

    #[test]
    fn unsupported_is_found_in_nested_expression() {
        let expr = ClassExpression::Union(vec![
            ClassExpression::named("http://ex.org/A"),
            ClassExpression::Complement(Box::new(ClassExpression::Unsupported {
                node: Node::blank("b1"),
                reason: "no class constructor".into(),
            })),
        ]);
        let (node, reason) = expr.unsupported().unwrap();
        assert!(node.is_blank());
        assert_eq!(reason, "no class constructor");
        assert!(ClassExpression::named("x").unsupported().is_none());
    }
}
