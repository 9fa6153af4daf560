//! Boolean range expressions over class ids, datatypes and resources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The allowed values of an attribute, as a boolean expression tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeExpr {
    /// Instances of a class in the schema model.
    ClassId(String),
    /// Literals of a datatype.
    Datatype(String),
    /// A resource outside the schema model, or a fixed value.
    ResourceReference(String),
    And(Vec<RangeExpr>),
    Or(Vec<RangeExpr>),
    Not(Box<RangeExpr>),
}

impl RangeExpr {
    pub fn class(id: impl Into<String>) -> Self {
        Self::ClassId(id.into())
    }

    pub fn datatype(iri: impl Into<String>) -> Self {
        Self::Datatype(iri.into())
    }

    pub fn resource(iri: impl Into<String>) -> Self {
        Self::ResourceReference(iri.into())
    }

    /// Conjoin two expressions. Equal operands collapse, nested `And`s flatten.
    pub fn and(self, other: RangeExpr) -> RangeExpr {
        if self == other {
            return self;
        }
        let mut operands = match self {
            Self::And(ops) => ops,
            other => vec![other],
        };
        let extra = match other {
            Self::And(ops) => ops,
            other => vec![other],
        };
        for op in extra {
            if !operands.contains(&op) {
                operands.push(op);
            }
        }
        Self::And(operands)
    }

    /// The class id, if this is a bare class reference.
    pub fn as_class_id(&self) -> Option<&str> {
        match self {
            Self::ClassId(id) => Some(id),
            _ => None,
        }
    }

    /// Every class id mentioned anywhere in the tree.
    pub fn class_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_class_ids(&mut out);
        out
    }

    fn collect_class_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::ClassId(id) => out.push(id),
            Self::Datatype(_) | Self::ResourceReference(_) => {}
            Self::And(ops) | Self::Or(ops) => ops.iter().for_each(|op| op.collect_class_ids(out)),
            Self::Not(inner) => inner.collect_class_ids(out),
        }
    }

    /// Remove redundant supertype operands.
    ///
    /// Within each `And`/`Or` node a `ClassId` operand is dropped when another
    /// `ClassId` operand of the same node is one of its strict subclasses.
    /// Duplicate operands are dropped and single-operand nodes unwrap.
    /// `is_strict_superclass(sup, sub)` answers the hierarchy question.
    pub fn simplify<F>(&self, is_strict_superclass: &F) -> RangeExpr
    where
        F: Fn(&str, &str) -> bool,
    {
        match self {
            Self::ClassId(_) | Self::Datatype(_) | Self::ResourceReference(_) => self.clone(),
            Self::Not(inner) => Self::Not(Box::new(inner.simplify(is_strict_superclass))),
            Self::And(ops) => {
                simplify_operands(ops, is_strict_superclass, Self::And)
            }
            Self::Or(ops) => simplify_operands(ops, is_strict_superclass, Self::Or),
        }
    }
}

fn simplify_operands<F>(
    ops: &[RangeExpr],
    is_strict_superclass: &F,
    rebuild: fn(Vec<RangeExpr>) -> RangeExpr,
) -> RangeExpr
where
    F: Fn(&str, &str) -> bool,
{
    let mut simplified: Vec<RangeExpr> = Vec::with_capacity(ops.len());
    for op in ops {
        let op = op.simplify(is_strict_superclass);
        if !simplified.contains(&op) {
            simplified.push(op);
        }
    }

    let class_ids: Vec<String> = simplified
        .iter()
        .filter_map(|op| op.as_class_id().map(str::to_string))
        .collect();
    simplified.retain(|op| match op.as_class_id() {
        Some(id) => !class_ids
            .iter()
            .any(|other| other != id && is_strict_superclass(id, other)),
        None => true,
    });

    if simplified.len() == 1 {
        simplified.pop().unwrap_or_else(|| rebuild(Vec::new()))
    } else {
        rebuild(simplified)
    }
}

impl fmt::Display for RangeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, op: &str, ops: &[RangeExpr]| -> fmt::Result {
            write!(f, "(")?;
            for (i, expr) in ops.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{expr}")?;
            }
            write!(f, ")")
        };
        match self {
            Self::ClassId(id) => write!(f, "{id}"),
            Self::Datatype(iri) => write!(f, "^{iri}"),
            Self::ResourceReference(iri) => write!(f, "<{iri}>"),
            Self::And(ops) => join(f, "and", ops),
            Self::Or(ops) => join(f, "or", ops),
            Self::Not(inner) => write!(f, "not {inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Animal ⊃ Dog ⊃ Puppy
    fn hierarchy(sup: &str, sub: &str) -> bool {
        matches!(
            (sup, sub),
            ("Animal", "Dog") | ("Animal", "Puppy") | ("Dog", "Puppy")
        )
    }

    #[test]
    fn and_removes_supertype() {
        let expr = RangeExpr::And(vec![RangeExpr::class("Animal"), RangeExpr::class("Dog")]);
        assert_eq!(expr.simplify(&hierarchy), RangeExpr::class("Dog"));
    }

    #[test]
    fn or_removes_supertype() {
        let expr = RangeExpr::Or(vec![
            RangeExpr::class("Dog"),
            RangeExpr::class("Animal"),
            RangeExpr::datatype("xsd:string"),
        ]);
        assert_eq!(
            expr.simplify(&hierarchy),
            RangeExpr::Or(vec![RangeExpr::class("Dog"), RangeExpr::datatype("xsd:string")])
        );
    }

    #[test]
    fn unrelated_classes_are_kept() {
        let expr = RangeExpr::And(vec![RangeExpr::class("Dog"), RangeExpr::class("Robot")]);
        assert_eq!(expr.simplify(&hierarchy), expr);
    }

    #[test]
    fn chain_keeps_only_most_specific() {
        let expr = RangeExpr::And(vec![
            RangeExpr::class("Animal"),
            RangeExpr::class("Dog"),
            RangeExpr::class("Puppy"),
        ]);
        assert_eq!(expr.simplify(&hierarchy), RangeExpr::class("Puppy"));
    }

    #[test]
    fn nested_nodes_are_simplified_independently() {
        let expr = RangeExpr::Or(vec![
            RangeExpr::Not(Box::new(RangeExpr::And(vec![
                RangeExpr::class("Dog"),
                RangeExpr::class("Animal"),
            ]))),
            RangeExpr::class("Animal"),
        ]);
        assert_eq!(
            expr.simplify(&hierarchy),
            RangeExpr::Or(vec![
                RangeExpr::Not(Box::new(RangeExpr::class("Dog"))),
                RangeExpr::class("Animal"),
            ])
        );
    }

    #[test]
    fn and_flattens_and_dedupes() {
        let a = RangeExpr::class("A");
        let b = RangeExpr::class("B");
        let c = RangeExpr::class("C");
        assert_eq!(a.clone().and(a.clone()), a);
        let ab = a.clone().and(b.clone());
        assert_eq!(
            ab.and(RangeExpr::And(vec![b.clone(), c.clone()])),
            RangeExpr::And(vec![a, b, c])
        );
    }

    #[test]
    fn class_ids_walks_tree() {
        let expr = RangeExpr::Or(vec![
            RangeExpr::class("A"),
            RangeExpr::Not(Box::new(RangeExpr::class("B"))),
            RangeExpr::datatype("xsd:int"),
        ]);
        assert_eq!(expr.class_ids(), vec!["A", "B"]);
    }
}
