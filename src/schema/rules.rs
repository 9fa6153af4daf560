//! Schema-level rules attached to type and attribute definitions.
//!
//! Rules are keyed by kind: a definition holds at most one rule of each kind,
//! and a constraint is represented by presence alone. An absent
//! `MinCardinality` means no lower bound, an absent `MaxCardinality` means
//! unbounded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::Node;

use super::range::RangeExpr;

/// Kinds of [`TypeRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeRuleKind {
    SubClassOf,
    EquivalentClass,
    DisjointWith,
    OntologyType,
}

/// A constraint on a type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRule {
    /// Direct superclass ids.
    SubClassOf(BTreeSet<String>),
    EquivalentClass(BTreeSet<String>),
    DisjointWith(BTreeSet<String>),
    /// The class-marker IRIs the ontology typed this class with.
    OntologyType(BTreeSet<String>),
}

impl TypeRule {
    pub fn kind(&self) -> TypeRuleKind {
        match self {
            Self::SubClassOf(_) => TypeRuleKind::SubClassOf,
            Self::EquivalentClass(_) => TypeRuleKind::EquivalentClass,
            Self::DisjointWith(_) => TypeRuleKind::DisjointWith,
            Self::OntologyType(_) => TypeRuleKind::OntologyType,
        }
    }

    /// The id set carried by the rule.
    pub fn ids(&self) -> &BTreeSet<String> {
        match self {
            Self::SubClassOf(ids)
            | Self::EquivalentClass(ids)
            | Self::DisjointWith(ids)
            | Self::OntologyType(ids) => ids,
        }
    }

    pub(crate) fn ids_mut(&mut self) -> &mut BTreeSet<String> {
        match self {
            Self::SubClassOf(ids)
            | Self::EquivalentClass(ids)
            | Self::DisjointWith(ids)
            | Self::OntologyType(ids) => ids,
        }
    }

    /// An empty rule of the given kind.
    pub(crate) fn empty(kind: TypeRuleKind) -> Self {
        match kind {
            TypeRuleKind::SubClassOf => Self::SubClassOf(BTreeSet::new()),
            TypeRuleKind::EquivalentClass => Self::EquivalentClass(BTreeSet::new()),
            TypeRuleKind::DisjointWith => Self::DisjointWith(BTreeSet::new()),
            TypeRuleKind::OntologyType => Self::OntologyType(BTreeSet::new()),
        }
    }
}

/// Kinds of [`AttributeRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeRuleKind {
    Range,
    MinCardinality,
    MaxCardinality,
    ExactCardinality,
    MinQualifiedCardinality,
    MaxQualifiedCardinality,
    QualifiedCardinality,
    HasValue,
    SomeValuesFrom,
    AllValuesFrom,
    InverseOf,
    SubPropertyOf,
    EquivalentProperty,
}

/// A constraint on an attribute definition.
///
/// `ExactCardinality`, `QualifiedCardinality` and the value restrictions are
/// resolver output; normalization rewrites most of them into ranges and
/// min/max bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeRule {
    Range(RangeExpr),
    MinCardinality(u32),
    MaxCardinality(u32),
    ExactCardinality(u32),
    MinQualifiedCardinality { count: u32, qualification: RangeExpr },
    MaxQualifiedCardinality { count: u32, qualification: RangeExpr },
    QualifiedCardinality { count: u32, qualification: RangeExpr },
    HasValue(Node),
    SomeValuesFrom(RangeExpr),
    AllValuesFrom(RangeExpr),
    /// IRI of the inverse property.
    InverseOf(String),
    /// IRIs of the direct super-properties.
    SubPropertyOf(BTreeSet<String>),
    EquivalentProperty(BTreeSet<String>),
}

impl AttributeRule {
    pub fn kind(&self) -> AttributeRuleKind {
        match self {
            Self::Range(_) => AttributeRuleKind::Range,
            Self::MinCardinality(_) => AttributeRuleKind::MinCardinality,
            Self::MaxCardinality(_) => AttributeRuleKind::MaxCardinality,
            Self::ExactCardinality(_) => AttributeRuleKind::ExactCardinality,
            Self::MinQualifiedCardinality { .. } => AttributeRuleKind::MinQualifiedCardinality,
            Self::MaxQualifiedCardinality { .. } => AttributeRuleKind::MaxQualifiedCardinality,
            Self::QualifiedCardinality { .. } => AttributeRuleKind::QualifiedCardinality,
            Self::HasValue(_) => AttributeRuleKind::HasValue,
            Self::SomeValuesFrom(_) => AttributeRuleKind::SomeValuesFrom,
            Self::AllValuesFrom(_) => AttributeRuleKind::AllValuesFrom,
            Self::InverseOf(_) => AttributeRuleKind::InverseOf,
            Self::SubPropertyOf(_) => AttributeRuleKind::SubPropertyOf,
            Self::EquivalentProperty(_) => AttributeRuleKind::EquivalentProperty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_kinds_match_variants() {
        assert_eq!(
            AttributeRule::MinQualifiedCardinality {
                count: 1,
                qualification: RangeExpr::class("A"),
            }
            .kind(),
            AttributeRuleKind::MinQualifiedCardinality
        );
        assert_eq!(
            TypeRule::SubClassOf(BTreeSet::new()).kind(),
            TypeRuleKind::SubClassOf
        );
    }

    #[test]
    fn empty_type_rule_has_requested_kind() {
        for kind in [
            TypeRuleKind::SubClassOf,
            TypeRuleKind::EquivalentClass,
            TypeRuleKind::DisjointWith,
            TypeRuleKind::OntologyType,
        ] {
            let rule = TypeRule::empty(kind);
            assert_eq!(rule.kind(), kind);
            assert!(rule.ids().is_empty());
        }
    }
}
