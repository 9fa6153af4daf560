//! Normalizer: rewrites resolver output into the canonical rule forms.
//!
//! After normalization an attribute carries no `ExactCardinality`, no
//! `QualifiedCardinality`, and value restrictions only where they could not be
//! expressed as a range or a bound. The passes, in order:
//!
//! 1. per-attribute rewrites (exact, qualified, hasValue, someValuesFrom,
//!    allValuesFrom)
//! 2. sub-property folding against a snapshot of the model
//! 3. range simplification against the class hierarchy
//! 4. a second someValuesFrom collapse against the final ranges
//! 5. cardinality consistency check

use std::collections::BTreeSet;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::config::NormalizationConfig;
use crate::diagnostics::Diagnostics;
use crate::graph::local_name;
use crate::schema::{AttributeDef, AttributeRule, AttributeRuleKind, RangeExpr, SchemaModel};

/// What a normalization run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Rules rewritten into ranges or bounds.
    pub rewritten: usize,
    /// Super-property definitions folded into sub-properties.
    pub merged: usize,
    /// Range expressions that simplification changed.
    pub simplified: usize,
}

/// Normalizes a resolved schema model in place.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizationConfig,
}

impl Normalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, model: &mut SchemaModel, diagnostics: &mut Diagnostics) -> NormalizationReport {
        let mut report = NormalizationReport::default();

        for type_def in model.types_mut() {
            for attribute in type_def.attributes_mut() {
                report.rewritten += rewrite(attribute, diagnostics);
            }
        }

        if self.config.merge_sub_properties {
            report.merged = merge_sub_properties(model, diagnostics);
        }

        if self.config.simplify_ranges {
            let hierarchy = model.hierarchy();
            let is_strict_superclass = |sup: &str, sub: &str| hierarchy.is_strict_superclass(sup, sub);
            for type_def in model.types_mut() {
                for attribute in type_def.attributes_mut() {
                    report.simplified += simplify_ranges(attribute, &is_strict_superclass);
                }
            }
        }

        // Folding and simplification can make a range equal to its filler.
        for type_def in model.types_mut() {
            for attribute in type_def.attributes_mut() {
                if collapse_some_values_from(attribute) {
                    report.rewritten += 1;
                }
            }
        }

        for type_def in model.types() {
            for attribute in type_def.attributes() {
                if let (Some(min), Some(max)) = (attribute.min_cardinality(), attribute.max_cardinality()) {
                    if min > max {
                        diagnostics.warning(
                            format!(
                                "min cardinality exceeds max on {}: {min} > {max}",
                                qualified_name(attribute)
                            ),
                            iter::empty(),
                        );
                    }
                }
            }
        }

        tracing::info!(
            rewritten = report.rewritten,
            merged = report.merged,
            simplified = report.simplified,
            "normalization complete"
        );
        report
    }
}

/// Normalize with default settings.
pub fn normalize(model: &mut SchemaModel, diagnostics: &mut Diagnostics) -> NormalizationReport {
    Normalizer::default().normalize(model, diagnostics)
}

fn qualified_name(attribute: &AttributeDef) -> String {
    format!("{}.{}", attribute.owner, attribute.attribute_id)
}

// ---------------------------------------------------------------------------
// Per-attribute rewrites
// ---------------------------------------------------------------------------

/// Apply every rewrite to one attribute. Returns the number of rules rewritten.
fn rewrite(attribute: &mut AttributeDef, diagnostics: &mut Diagnostics) -> usize {
    let mut rewritten = 0;

    if let Some(AttributeRule::ExactCardinality(n)) = attribute.remove_rule(AttributeRuleKind::ExactCardinality) {
        attribute.tighten_min(n);
        attribute.tighten_max(n);
        rewritten += 1;
    }

    if let Some(AttributeRule::QualifiedCardinality { count, qualification }) =
        attribute.remove_rule(AttributeRuleKind::QualifiedCardinality)
    {
        merge_qualified(
            attribute,
            AttributeRuleKind::MinQualifiedCardinality,
            count,
            qualification.clone(),
            diagnostics,
        );
        merge_qualified(
            attribute,
            AttributeRuleKind::MaxQualifiedCardinality,
            count,
            qualification,
            diagnostics,
        );
    }
    for kind in [
        AttributeRuleKind::MinQualifiedCardinality,
        AttributeRuleKind::MaxQualifiedCardinality,
    ] {
        if collapse_qualified(attribute, kind, diagnostics) {
            rewritten += 1;
        }
    }

    if let Some(AttributeRule::HasValue(value)) = attribute.get_rule(AttributeRuleKind::HasValue).cloned() {
        match value.as_iri() {
            Some(iri) => {
                attribute.remove_rule(AttributeRuleKind::HasValue);
                conjoin_range(attribute, RangeExpr::resource(iri));
                rewritten += 1;
            }
            None => diagnostics.warning(
                format!(
                    "hasValue on {} is not a resource: {value}",
                    qualified_name(attribute)
                ),
                iter::empty(),
            ),
        }
    }

    if let Some(AttributeRule::AllValuesFrom(filler)) = attribute.remove_rule(AttributeRuleKind::AllValuesFrom) {
        conjoin_range(attribute, filler);
        rewritten += 1;
    }

    if collapse_some_values_from(attribute) {
        rewritten += 1;
    }

    rewritten
}

/// Turn `SomeValuesFrom(v)` into a minimum of one when the range is exactly `v`.
/// Runs after every rewrite that touches the range, and again once ranges are
/// simplified.
fn collapse_some_values_from(attribute: &mut AttributeDef) -> bool {
    let matches_range = matches!(
        (attribute.get_rule(AttributeRuleKind::SomeValuesFrom), attribute.range()),
        (Some(AttributeRule::SomeValuesFrom(filler)), Some(range)) if filler == range
    );
    if matches_range {
        attribute.remove_rule(AttributeRuleKind::SomeValuesFrom);
        attribute.tighten_min(1);
    }
    matches_range
}

/// Set the range, or conjoin with the existing one. Equal ranges are left alone.
fn conjoin_range(attribute: &mut AttributeDef, range: RangeExpr) {
    let merged = match attribute.range() {
        None => range,
        Some(existing) => existing.clone().and(range),
    };
    attribute.set_rule(AttributeRule::Range(merged));
}

fn qualified_parts(attribute: &AttributeDef, kind: AttributeRuleKind) -> Option<(u32, RangeExpr)> {
    match attribute.get_rule(kind) {
        Some(
            AttributeRule::MinQualifiedCardinality { count, qualification }
            | AttributeRule::MaxQualifiedCardinality { count, qualification },
        ) => Some((*count, qualification.clone())),
        _ => None,
    }
}

fn merge_qualified(
    attribute: &mut AttributeDef,
    kind: AttributeRuleKind,
    count: u32,
    qualification: RangeExpr,
    diagnostics: &mut Diagnostics,
) {
    let is_min = kind == AttributeRuleKind::MinQualifiedCardinality;
    let count = match qualified_parts(attribute, kind) {
        None => count,
        Some((existing, q)) if q == qualification => {
            if is_min {
                existing.max(count)
            } else {
                existing.min(count)
            }
        }
        Some((_, q)) => {
            diagnostics.warning(
                format!(
                    "conflicting qualifications on {}: {q} and {qualification}",
                    qualified_name(attribute)
                ),
                iter::empty(),
            );
            return;
        }
    };
    let rule = if is_min {
        AttributeRule::MinQualifiedCardinality { count, qualification }
    } else {
        AttributeRule::MaxQualifiedCardinality { count, qualification }
    };
    attribute.set_rule(rule);
}

/// Collapse a qualified bound into an unqualified one when the range allows it.
fn collapse_qualified(attribute: &mut AttributeDef, kind: AttributeRuleKind, diagnostics: &mut Diagnostics) -> bool {
    let Some((count, qualification)) = qualified_parts(attribute, kind) else {
        return false;
    };
    match attribute.range() {
        None => {
            attribute.set_rule(AttributeRule::Range(qualification));
        }
        Some(range) if *range == qualification => {}
        Some(range) => {
            diagnostics.warning(
                format!(
                    "qualified cardinality on {} conflicts with its range: {qualification} vs {range}",
                    qualified_name(attribute)
                ),
                iter::empty(),
            );
            return false;
        }
    }
    attribute.remove_rule(kind);
    if kind == AttributeRuleKind::MinQualifiedCardinality {
        attribute.tighten_min(count);
    } else {
        attribute.tighten_max(count);
    }
    true
}

// ---------------------------------------------------------------------------
// Sub-property folding
// ---------------------------------------------------------------------------

/// Fold every super-attribute's rules into its sub-attributes. Super
/// definitions are read from a snapshot, so folding order does not matter.
fn merge_sub_properties(model: &mut SchemaModel, diagnostics: &mut Diagnostics) -> usize {
    let snapshot = model.clone();
    let mut merged = 0;
    for type_def in model.types_mut() {
        for attribute in type_def.attributes_mut() {
            if attribute.super_properties().is_empty() {
                continue;
            }
            let (supers, missing) = super_attributes(&snapshot, attribute);
            for uri in missing {
                diagnostics.warning(
                    format!(
                        "super-property <{uri}> of {} is not attached to any type",
                        qualified_name(attribute)
                    ),
                    iter::empty(),
                );
            }
            for sup in supers {
                fold_into(attribute, sup, diagnostics);
                merged += 1;
            }
        }
    }
    merged
}

/// Transitive super-attributes of `attribute`, nearest first, plus the
/// super-property IRIs with no attribute anywhere in the model.
fn super_attributes<'m>(snapshot: &'m SchemaModel, attribute: &AttributeDef) -> (Vec<&'m AttributeDef>, Vec<String>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut visited = BTreeSet::from([attribute.uri.clone()]);
    let mut queue: Vec<String> = attribute.super_properties().into_iter().rev().collect();
    while let Some(uri) = queue.pop() {
        if !visited.insert(uri.clone()) {
            continue;
        }
        let definition = snapshot
            .find_attribute(&attribute.owner, local_name(&uri))
            .filter(|a| a.uri == uri)
            .or_else(|| snapshot.attributes_with_uri(&uri).next());
        match definition {
            Some(def) => {
                queue.extend(def.super_properties().into_iter().rev());
                found.push(def);
            }
            None => missing.push(uri),
        }
    }
    (found, missing)
}

fn fold_into(attribute: &mut AttributeDef, sup: &AttributeDef, diagnostics: &mut Diagnostics) {
    for rule in sup.rules() {
        match rule {
            AttributeRule::MinCardinality(n) => attribute.tighten_min(*n),
            AttributeRule::MaxCardinality(n) => attribute.tighten_max(*n),
            AttributeRule::Range(range) => conjoin_range(attribute, range.clone()),
            AttributeRule::InverseOf(inverse) => diagnostics.warning(
                format!(
                    "inverseOf <{inverse}> on super-property {} is not inherited by {}",
                    sup.attribute_id,
                    qualified_name(attribute)
                ),
                iter::empty(),
            ),
            // Recursion is handled by the transitive walk.
            AttributeRule::SubPropertyOf(_) | AttributeRule::EquivalentProperty(_) => {}
            other => {
                if !attribute.has_rule(other.kind()) {
                    attribute.set_rule(other.clone());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Range simplification
// ---------------------------------------------------------------------------

fn simplify_ranges<F>(attribute: &mut AttributeDef, is_strict_superclass: &F) -> usize
where
    F: Fn(&str, &str) -> bool,
{
    let rewritten: Vec<AttributeRule> = attribute
        .rules()
        .filter_map(|rule| {
            let simplified = match rule {
                AttributeRule::Range(r) => AttributeRule::Range(r.simplify(is_strict_superclass)),
                AttributeRule::SomeValuesFrom(r) => AttributeRule::SomeValuesFrom(r.simplify(is_strict_superclass)),
                AttributeRule::AllValuesFrom(r) => AttributeRule::AllValuesFrom(r.simplify(is_strict_superclass)),
                AttributeRule::MinQualifiedCardinality { count, qualification } => {
                    AttributeRule::MinQualifiedCardinality {
                        count: *count,
                        qualification: qualification.simplify(is_strict_superclass),
                    }
                }
                AttributeRule::MaxQualifiedCardinality { count, qualification } => {
                    AttributeRule::MaxQualifiedCardinality {
                        count: *count,
                        qualification: qualification.simplify(is_strict_superclass),
                    }
                }
                AttributeRule::QualifiedCardinality { count, qualification } => AttributeRule::QualifiedCardinality {
                    count: *count,
                    qualification: qualification.simplify(is_strict_superclass),
                },
                _ => return None,
            };
            (simplified != *rule).then_some(simplified)
        })
        .collect();
    let changed = rewritten.len();
    for rule in rewritten {
        attribute.set_rule(rule);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::graph::Node;
    use crate::schema::{PropertyKind, TypeRule};

    const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";

    fn attr(id: &str, rules: Vec<AttributeRule>) -> AttributeDef {
        let mut a = AttributeDef::new(format!("http://ex.org/{id}"), id, "Person", PropertyKind::Unknown);
        for rule in rules {
            a.set_rule(rule);
        }
        a
    }

    fn model(attrs: Vec<AttributeDef>) -> SchemaModel {
        let mut model = SchemaModel::new("http://ex.org/onto");
        model.ensure_type("Animal", "http://ex.org/Animal");
        model.ensure_type("Dog", "http://ex.org/Dog")
            .merge_rule(TypeRule::SubClassOf(BTreeSet::from(["Animal".to_string()])));
        let person = model.ensure_type("Person", "http://ex.org/Person");
        for a in attrs {
            person.add_attribute(a);
        }
        model
    }

    fn run(attrs: Vec<AttributeDef>) -> (SchemaModel, Diagnostics) {
        let mut model = model(attrs);
        let mut diagnostics = Diagnostics::new();
        normalize(&mut model, &mut diagnostics);
        (model, diagnostics)
    }

    fn get<'m>(model: &'m SchemaModel, id: &str) -> &'m AttributeDef {
        model.get_type("Person").unwrap().get_attribute(id).unwrap()
    }

    #[test]
    fn exact_becomes_min_and_max() {
        let (model, _) = run(vec![attr("pet", vec![AttributeRule::ExactCardinality(1)])]);
        let pet = get(&model, "pet");
        assert_eq!(pet.min_cardinality(), Some(1));
        assert_eq!(pet.max_cardinality(), Some(1));
        assert!(!pet.has_rule(AttributeRuleKind::ExactCardinality));
    }

    #[test]
    fn exact_keeps_tighter_existing_bounds() {
        let (model, _) = run(vec![attr(
            "pet",
            vec![AttributeRule::ExactCardinality(2), AttributeRule::MaxCardinality(1)],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.min_cardinality(), Some(2));
        assert_eq!(pet.max_cardinality(), Some(1));
    }

    #[test]
    fn qualified_without_range_sets_range() {
        let (model, diagnostics) = run(vec![attr(
            "pet",
            vec![AttributeRule::QualifiedCardinality {
                count: 2,
                qualification: RangeExpr::class("Dog"),
            }],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.range(), Some(&RangeExpr::class("Dog")));
        assert_eq!(pet.min_cardinality(), Some(2));
        assert_eq!(pet.max_cardinality(), Some(2));
        assert!(pet.rules().all(|r| !matches!(
            r.kind(),
            AttributeRuleKind::QualifiedCardinality
                | AttributeRuleKind::MinQualifiedCardinality
                | AttributeRuleKind::MaxQualifiedCardinality
        )));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn qualified_matching_range_is_dropped() {
        let (model, _) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Dog")),
                AttributeRule::MaxQualifiedCardinality {
                    count: 3,
                    qualification: RangeExpr::class("Dog"),
                },
            ],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.max_cardinality(), Some(3));
        assert!(!pet.has_rule(AttributeRuleKind::MaxQualifiedCardinality));
    }

    #[test]
    fn qualified_conflicting_range_stays_with_warning() {
        let (model, diagnostics) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Animal")),
                AttributeRule::MinQualifiedCardinality {
                    count: 1,
                    qualification: RangeExpr::class("Dog"),
                },
            ],
        )]);
        let pet = get(&model, "pet");
        assert!(pet.has_rule(AttributeRuleKind::MinQualifiedCardinality));
        assert_eq!(pet.min_cardinality(), None);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn has_value_becomes_range() {
        let canine = "http://ex.org/Canine";
        let (model, _) = run(vec![attr("species", vec![AttributeRule::HasValue(Node::named(canine))])]);
        assert_eq!(get(&model, "species").range(), Some(&RangeExpr::resource(canine)));

        let (model, _) = run(vec![attr(
            "species",
            vec![
                AttributeRule::Range(RangeExpr::class("Animal")),
                AttributeRule::HasValue(Node::named(canine)),
            ],
        )]);
        assert_eq!(
            get(&model, "species").range(),
            Some(&RangeExpr::And(vec![RangeExpr::class("Animal"), RangeExpr::resource(canine)]))
        );
    }

    #[test]
    fn literal_has_value_stays() {
        let (model, diagnostics) = run(vec![attr(
            "legs",
            vec![AttributeRule::HasValue(Node::literal("4", XSD_INT))],
        )]);
        assert!(get(&model, "legs").has_rule(AttributeRuleKind::HasValue));
        assert_eq!(diagnostics.reasons(Severity::Warning).count(), 1);
    }

    #[test]
    fn some_values_from_needs_equal_range() {
        let (model, _) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Dog")),
                AttributeRule::SomeValuesFrom(RangeExpr::class("Dog")),
            ],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.min_cardinality(), Some(1));
        assert!(!pet.has_rule(AttributeRuleKind::SomeValuesFrom));

        let (model, _) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Animal")),
                AttributeRule::SomeValuesFrom(RangeExpr::class("Dog")),
            ],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.min_cardinality(), None);
        assert!(pet.has_rule(AttributeRuleKind::SomeValuesFrom));
    }

    #[test]
    fn all_values_from_conjoins_and_simplifies() {
        let (model, _) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Animal")),
                AttributeRule::AllValuesFrom(RangeExpr::class("Dog")),
            ],
        )]);
        // And(Animal, Dog) loses the supertype.
        assert_eq!(get(&model, "pet").range(), Some(&RangeExpr::class("Dog")));
    }

    #[test]
    fn some_values_from_matches_the_final_range() {
        let (model, _) = run(vec![attr(
            "pet",
            vec![
                AttributeRule::Range(RangeExpr::class("Animal")),
                AttributeRule::AllValuesFrom(RangeExpr::class("Dog")),
                AttributeRule::SomeValuesFrom(RangeExpr::class("Dog")),
            ],
        )]);
        let pet = get(&model, "pet");
        assert_eq!(pet.range(), Some(&RangeExpr::class("Dog")));
        assert_eq!(pet.min_cardinality(), Some(1));
        assert!(!pet.has_rule(AttributeRuleKind::SomeValuesFrom));
    }

    #[test]
    fn sub_property_takes_tightest_bounds() {
        let mut age = attr("age", vec![]);
        age.add_super_properties(["http://ex.org/p1".to_string(), "http://ex.org/p2".to_string()]);
        let (model, diagnostics) = run(vec![
            age,
            attr("p1", vec![AttributeRule::MaxCardinality(2)]),
            attr("p2", vec![AttributeRule::MaxCardinality(5), AttributeRule::MinCardinality(1)]),
        ]);
        let age = get(&model, "age");
        assert_eq!(age.max_cardinality(), Some(2));
        assert_eq!(age.min_cardinality(), Some(1));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn sub_property_recurses_and_survives_cycles() {
        let mut a = attr("a", vec![]);
        a.add_super_properties(["http://ex.org/b".to_string()]);
        let mut b = attr("b", vec![AttributeRule::Range(RangeExpr::class("Animal"))]);
        b.add_super_properties(["http://ex.org/c".to_string()]);
        let mut c = attr(
            "c",
            vec![
                AttributeRule::MaxCardinality(4),
                AttributeRule::InverseOf("http://ex.org/cOf".into()),
            ],
        );
        c.add_super_properties(["http://ex.org/a".to_string()]);

        let (model, diagnostics) = run(vec![a, b, c]);
        let a = get(&model, "a");
        assert_eq!(a.max_cardinality(), Some(4));
        assert_eq!(a.range(), Some(&RangeExpr::class("Animal")));
        assert!(!a.has_rule(AttributeRuleKind::InverseOf));
        assert!(diagnostics
            .reasons(Severity::Warning)
            .any(|r| r.contains("is not inherited by Person.a")));
    }

    #[test]
    fn missing_super_property_is_a_warning() {
        let mut a = attr("a", vec![]);
        a.add_super_properties(["http://ex.org/elsewhere".to_string()]);
        let (_, diagnostics) = run(vec![a]);
        assert!(diagnostics
            .by_reason("super-property <http://ex.org/elsewhere> of Person.a is not attached to any type")
            .is_some());
    }

    #[test]
    fn passes_can_be_disabled() {
        let mut a = attr("a", vec![AttributeRule::Range(RangeExpr::And(vec![
            RangeExpr::class("Animal"),
            RangeExpr::class("Dog"),
        ]))]);
        a.add_super_properties(["http://ex.org/b".to_string()]);
        let b = attr("b", vec![AttributeRule::MaxCardinality(1)]);
        let mut model = model(vec![a, b]);
        let mut diagnostics = Diagnostics::new();
        let report = Normalizer::new(NormalizationConfig {
            merge_sub_properties: false,
            simplify_ranges: false,
        })
        .normalize(&mut model, &mut diagnostics);
        assert_eq!(report.merged, 0);
        assert_eq!(report.simplified, 0);
        let a = get(&model, "a");
        assert_eq!(a.max_cardinality(), None);
        assert!(matches!(a.range(), Some(RangeExpr::And(ops)) if ops.len() == 2));
    }

    #[test]
    fn inconsistent_bounds_warn() {
        let (_, diagnostics) = run(vec![attr(
            "pet",
            vec![AttributeRule::MinCardinality(3), AttributeRule::MaxCardinality(1)],
        )]);
        assert!(diagnostics
            .by_reason("min cardinality exceeds max on Person.pet: 3 > 1")
            .is_some());
    }
}
