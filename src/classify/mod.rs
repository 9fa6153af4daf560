//! Node classifier: turns every subject of the expanded graph into facts.
//!
//! Classification is an ordered decision list, evaluated top to bottom with
//! the first match winning. The list is data ([`DECISION_LIST`]) so its order
//! can be inspected and tested on its own. Matched class and property nodes
//! then have their own predicates read into further facts.

pub mod expression;
pub mod restriction;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ClassificationConfig;
use crate::diagnostics::Diagnostics;
use crate::facts::{ClassExpression, Fact, FactStore};
use crate::graph::vocab::{self, owl, rdf, rdfs};
use crate::graph::{Graph, Node, Triple};
use crate::schema::PropertyKind;

use expression::read_expression;
use restriction::read_restriction;

/// Types that mark a node as a property, with the kind each implies.
const PROPERTY_MARKERS: [(&str, PropertyKind); 10] = [
    (rdf::PROPERTY, PropertyKind::Unknown),
    (owl::FUNCTIONAL_PROPERTY, PropertyKind::Unknown),
    (owl::DATATYPE_PROPERTY, PropertyKind::Datatype),
    (owl::OBJECT_PROPERTY, PropertyKind::Object),
    (owl::INVERSE_FUNCTIONAL_PROPERTY, PropertyKind::Object),
    (owl::TRANSITIVE_PROPERTY, PropertyKind::Object),
    (owl::SYMMETRIC_PROPERTY, PropertyKind::Object),
    (owl::ASYMMETRIC_PROPERTY, PropertyKind::Object),
    (owl::REFLEXIVE_PROPERTY, PropertyKind::Object),
    (owl::IRREFLEXIVE_PROPERTY, PropertyKind::Object),
];

fn property_marker(iri: &str) -> Option<PropertyKind> {
    PROPERTY_MARKERS
        .iter()
        .find(|(marker, _)| *marker == iri)
        .map(|(_, kind)| *kind)
}

// ---------------------------------------------------------------------------
// Node view
// ---------------------------------------------------------------------------

/// A subject node together with the graph it lives in.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'g> {
    pub graph: &'g Graph,
    pub node: &'g Node,
}

impl<'g> NodeView<'g> {
    pub fn new(graph: &'g Graph, node: &'g Node) -> Self {
        Self { graph, node }
    }

    /// Named `rdf:type` objects of the node.
    pub fn types(&self) -> impl Iterator<Item = &'g str> + use<'g> {
        self.graph
            .outgoing(self.node)
            .filter(|t| t.predicate == rdf::TYPE)
            .filter_map(|t| t.object.as_iri())
    }

    pub fn has_type(&self, iri: &str) -> bool {
        self.types().any(|t| t == iri)
    }

    pub fn is_typed(&self) -> bool {
        self.graph
            .outgoing(self.node)
            .any(|t| t.predicate == rdf::TYPE)
    }

    fn local_name_starts_with(&self, pred: fn(char) -> bool) -> bool {
        self.node
            .local_name()
            .and_then(|name| name.chars().next())
            .is_some_and(pred)
    }
}

// ---------------------------------------------------------------------------
// Decision list
// ---------------------------------------------------------------------------

/// What to do with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ontology,
    /// Handled from the node that references it, or carries no schema.
    Skip,
    Class { candidate: bool },
    Property { candidate: bool },
    Unclassifiable,
}

/// One step of the decision list.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRule {
    pub name: &'static str,
    /// Naming-heuristic steps can be switched off.
    pub heuristic: bool,
    pub matches: fn(&NodeView<'_>) -> bool,
    pub decision: Decision,
}

/// The ordered decision list. First match wins.
pub static DECISION_LIST: [DecisionRule; 10] = [
    DecisionRule {
        name: "ontology-declaration",
        heuristic: false,
        matches: |v| v.node.is_named() && v.has_type(owl::ONTOLOGY),
        decision: Decision::Ontology,
    },
    DecisionRule {
        name: "list-cell",
        heuristic: false,
        matches: |v| {
            v.graph.is_object_of(v.node, rdf::REST)
                || v.graph.outgoing(v.node).any(|t| t.predicate == rdf::FIRST)
        },
        decision: Decision::Skip,
    },
    DecisionRule {
        name: "restriction",
        heuristic: false,
        matches: |v| v.has_type(owl::RESTRICTION),
        decision: Decision::Skip,
    },
    DecisionRule {
        name: "anonymous-expression",
        heuristic: false,
        matches: |v| v.node.is_blank() && v.graph.incoming(v.node).next().is_some(),
        decision: Decision::Skip,
    },
    DecisionRule {
        name: "named-class",
        heuristic: false,
        matches: |v| v.node.is_named() && vocab::CLASS_MARKERS.iter().any(|m| v.has_type(m)),
        decision: Decision::Class { candidate: false },
    },
    DecisionRule {
        name: "annotation-property",
        heuristic: false,
        matches: |v| v.has_type(owl::ANNOTATION_PROPERTY),
        decision: Decision::Skip,
    },
    DecisionRule {
        name: "property",
        heuristic: false,
        matches: |v| v.node.is_named() && v.types().any(|t| property_marker(t).is_some()),
        decision: Decision::Property { candidate: false },
    },
    DecisionRule {
        name: "property-candidate",
        heuristic: true,
        matches: |v| {
            v.node.is_named() && !v.is_typed() && v.local_name_starts_with(char::is_lowercase)
        },
        decision: Decision::Property { candidate: true },
    },
    DecisionRule {
        name: "class-candidate",
        heuristic: true,
        matches: |v| {
            v.node.is_named() && !v.is_typed() && v.local_name_starts_with(char::is_uppercase)
        },
        decision: Decision::Class { candidate: true },
    },
    DecisionRule {
        name: "unclassifiable",
        heuristic: false,
        matches: |_| true,
        decision: Decision::Unclassifiable,
    },
];

/// The first enabled rule matching the node.
pub fn decide(view: &NodeView<'_>, config: &ClassificationConfig) -> &'static DecisionRule {
    DECISION_LIST
        .iter()
        .filter(|rule| config.naming_heuristics || !rule.heuristic)
        .find(|rule| (rule.matches)(view))
        .unwrap_or(&DECISION_LIST[DECISION_LIST.len() - 1])
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classifies every distinct subject of a graph into facts.
#[derive(Debug, Clone, Default)]
pub struct NodeClassifier {
    config: ClassificationConfig,
}

struct Run<'g, 'd> {
    graph: &'g Graph,
    facts: FactStore,
    diagnostics: &'d mut Diagnostics,
}

impl NodeClassifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    /// Classify the graph. Unclassifiable nodes and rejected constructs are
    /// recorded in `diagnostics`; everything else becomes a fact.
    pub fn classify(&self, graph: &Graph, diagnostics: &mut Diagnostics) -> FactStore {
        let mut run = Run {
            graph,
            facts: FactStore::new(),
            diagnostics,
        };
        let mut decisions: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in graph.subjects() {
            let view = NodeView::new(graph, node);
            let rule = decide(&view, &self.config);
            *decisions.entry(rule.name).or_insert(0) += 1;
            match rule.decision {
                Decision::Ontology => run.ontology(node),
                Decision::Skip => tracing::trace!(%node, step = rule.name, "skipped"),
                Decision::Class { candidate } => run.class(view, candidate),
                Decision::Property { candidate } => run.property(view, candidate),
                Decision::Unclassifiable => {
                    tracing::debug!(%node, "unclassifiable node");
                    run.diagnostics
                        .warning("unclassifiable node", graph.outgoing(node).cloned());
                }
            }
        }
        tracing::info!(
            subjects = decisions.values().sum::<usize>(),
            facts = run.facts.len(),
            ?decisions,
            "classification complete"
        );
        run.facts
    }
}

impl Run<'_, '_> {
    fn extra(&mut self, triple: &Triple) {
        self.facts.assert(
            Fact::Extra {
                subject: triple.subject.clone(),
                predicate: triple.predicate.clone(),
                value: triple.object.clone(),
            },
            [triple.clone()],
        );
    }

    fn ontology(&mut self, node: &Node) {
        let uri = node.as_iri().unwrap_or_default().to_string();
        let mut declaration = Vec::new();
        for triple in self.graph.outgoing(node) {
            if triple.predicate == rdf::TYPE && triple.object.is_iri(owl::ONTOLOGY) {
                declaration.push(triple.clone());
            } else {
                self.extra(triple);
            }
        }
        self.facts
            .assert(Fact::OntologyDeclaration { uri }, declaration);
    }

    // -- classes ------------------------------------------------------------

    fn class(&mut self, view: NodeView<'_>, candidate: bool) {
        let Some(uri) = view.node.as_iri() else {
            return;
        };
        let mut markers = Vec::new();
        for triple in view.graph.outgoing(view.node) {
            match triple.predicate.as_str() {
                rdf::TYPE if triple.object.as_iri().is_some_and(|t| vocab::CLASS_MARKERS.contains(&t)) => {
                    markers.push(triple.clone());
                }
                rdfs::SUB_CLASS_OF => self.super_class(uri, triple, false),
                owl::EQUIVALENT_CLASS => self.super_class(uri, triple, true),
                owl::DISJOINT_WITH => match triple.object.as_iri() {
                    Some(other) => {
                        self.facts.assert(
                            Fact::DisjointWith {
                                class: uri.to_string(),
                                other: other.to_string(),
                            },
                            [triple.clone()],
                        );
                    }
                    None => self.diagnostics.unresolved(
                        format!("anonymous disjointWith on {}", local(uri)),
                        [triple.clone()],
                    ),
                },
                _ => self.extra(triple),
            }
        }
        let fact = if candidate {
            Fact::ClassReferenceCandidate {
                uri: uri.to_string(),
            }
        } else {
            Fact::ClassReference {
                uri: uri.to_string(),
            }
        };
        self.facts.assert(fact, markers);
    }

    /// `subClassOf` / `equivalentClass` objects: named classes, restrictions,
    /// or intersections of those.
    fn super_class(&mut self, class: &str, triple: &Triple, equivalent: bool) {
        let link = BTreeSet::from([triple.clone()]);
        match &triple.object {
            Node::Named(other) => {
                let fact = if equivalent {
                    Fact::EquivalentClass {
                        class: class.to_string(),
                        other: other.clone(),
                    }
                } else {
                    Fact::SubClassOf {
                        class: class.to_string(),
                        super_class: other.clone(),
                    }
                };
                self.facts.assert(fact, link);
            }
            object if self.is_restriction(object) => self.restriction(class, object, link),
            object => self.anonymous_super_class(class, object, link),
        }
    }

    fn is_restriction(&self, node: &Node) -> bool {
        NodeView::new(self.graph, node).has_type(owl::RESTRICTION)
    }

    fn restriction(&mut self, class: &str, node: &Node, mut link: BTreeSet<Triple>) {
        match read_restriction(self.graph, node, class) {
            Ok(read) => {
                link.extend(read.sources);
                self.facts.assert(Fact::Restriction(read.restriction), link);
            }
            Err(rejected) => {
                link.extend(rejected.sources);
                self.diagnostics.unresolved(
                    format!(
                        "unclassifiable restriction on {}: {}",
                        local(class),
                        rejected.reason
                    ),
                    link,
                );
            }
        }
    }

    /// An anonymous superclass is accepted when it is an intersection; each
    /// operand then holds on its own. Named operands become superclasses.
    fn anonymous_super_class(&mut self, class: &str, node: &Node, mut link: BTreeSet<Triple>) {
        let intersection = self
            .graph
            .objects(node, owl::INTERSECTION_OF)
            .first()
            .map(|head| (*head).clone());
        let list = intersection
            .as_ref()
            .map(|head| expression::read_list(self.graph, head));
        let Some(Ok(list)) = list else {
            let read = read_expression(self.graph, node);
            link.extend(read.sources);
            self.diagnostics.unresolved(
                format!(
                    "unsupported superclass expression on {}: {}",
                    local(class),
                    read.expression
                ),
                link,
            );
            return;
        };
        link.extend(list.sources);
        link.extend(
            self.graph
                .outgoing(node)
                .filter(|t| t.predicate == rdf::TYPE || t.predicate == owl::INTERSECTION_OF)
                .cloned(),
        );
        for operand in &list.items {
            match operand {
                Node::Named(other) => {
                    self.facts.assert(
                        Fact::SubClassOf {
                            class: class.to_string(),
                            super_class: other.clone(),
                        },
                        link.clone(),
                    );
                }
                other if self.is_restriction(other) => self.restriction(class, other, link.clone()),
                other => {
                    let read = read_expression(self.graph, other);
                    let mut sources = link.clone();
                    sources.extend(read.sources);
                    self.diagnostics.unresolved(
                        format!(
                            "unsupported superclass expression on {}: {}",
                            local(class),
                            read.expression
                        ),
                        sources,
                    );
                }
            }
        }
    }

    // -- properties ---------------------------------------------------------

    fn property(&mut self, view: NodeView<'_>, candidate: bool) {
        let Some(uri) = view.node.as_iri() else {
            return;
        };
        let markers: Vec<&Triple> = view
            .graph
            .outgoing(view.node)
            .filter(|t| t.predicate == rdf::TYPE)
            .filter(|t| t.object.as_iri().and_then(property_marker).is_some())
            .collect();
        let kinds: BTreeSet<PropertyKind> = markers
            .iter()
            .filter_map(|t| t.object.as_iri().and_then(property_marker))
            .filter(|k| *k != PropertyKind::Unknown)
            .collect();
        let kind = match kinds.len() {
            0 => PropertyKind::Unknown,
            1 => kinds.into_iter().next().unwrap_or(PropertyKind::Unknown),
            _ => {
                self.diagnostics.unresolved(
                    format!(
                        "property {} is declared both datatype and object property",
                        local(uri)
                    ),
                    view.graph.outgoing(view.node).cloned(),
                );
                return;
            }
        };

        let fact = if candidate {
            Fact::PropertyReferenceCandidate {
                uri: uri.to_string(),
            }
        } else {
            Fact::PropertyReference {
                uri: uri.to_string(),
                kind,
            }
        };
        self.facts
            .assert(fact, markers.iter().map(|t| (*t).clone()));

        let property = uri.to_string();
        for triple in view.graph.outgoing(view.node) {
            let named = triple.object.as_iri().map(str::to_string);
            match (triple.predicate.as_str(), named) {
                (rdf::TYPE, Some(t)) if t == owl::FUNCTIONAL_PROPERTY => {
                    self.facts.assert(
                        Fact::Functional {
                            property: property.clone(),
                        },
                        [triple.clone()],
                    );
                }
                (rdf::TYPE, Some(t)) if property_marker(&t).is_some() => {}
                (rdfs::DOMAIN, _) => {
                    let read = read_expression(self.graph, &triple.object);
                    let mut sources = read.sources;
                    sources.insert(triple.clone());
                    self.facts.assert(
                        Fact::PropertyDomain {
                            property: property.clone(),
                            domain: read.expression,
                        },
                        sources,
                    );
                }
                (rdfs::RANGE, _) => {
                    let read = read_expression(self.graph, &triple.object);
                    let mut sources = read.sources;
                    sources.insert(triple.clone());
                    self.facts.assert(
                        Fact::PropertyRange {
                            property: property.clone(),
                            range: read.expression,
                        },
                        sources,
                    );
                }
                (rdfs::SUB_PROPERTY_OF, Some(super_property)) => {
                    self.facts.assert(
                        Fact::SubPropertyOf {
                            property: property.clone(),
                            super_property,
                        },
                        [triple.clone()],
                    );
                }
                (owl::INVERSE_OF, Some(inverse)) => {
                    self.facts.assert(
                        Fact::InverseOf {
                            property: property.clone(),
                            inverse,
                        },
                        [triple.clone()],
                    );
                }
                (owl::EQUIVALENT_PROPERTY, Some(other)) => {
                    self.facts.assert(
                        Fact::EquivalentProperty {
                            property: property.clone(),
                            other,
                        },
                        [triple.clone()],
                    );
                }
                (rdfs::SUB_PROPERTY_OF | owl::INVERSE_OF | owl::EQUIVALENT_PROPERTY, None) => {
                    self.diagnostics.unresolved(
                        format!(
                            "anonymous {} on {}",
                            local(&triple.predicate),
                            local(&property)
                        ),
                        [triple.clone()],
                    );
                }
                _ => self.extra(triple),
            }
        }
    }
}

fn local(iri: &str) -> &str {
    crate::graph::local_name(iri)
}

/// Whether the expression is the top class.
pub(crate) fn is_top(expression: &ClassExpression) -> bool {
    expression.as_named().is_some_and(vocab::is_top_class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{FactKind, RestrictionShape};
    use crate::graph::{parse_graph, InputFormat};

    const PREFIXES: &str = "@prefix owl: <http://www.w3.org/2002/07/owl#> .\n\
        @prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .\n\
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .\n\
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n\
        @prefix ex: <http://ex.org/> .\n";

    fn classify(body: &str) -> (FactStore, Diagnostics) {
        classify_with(body, ClassificationConfig::default())
    }

    fn classify_with(body: &str, config: ClassificationConfig) -> (FactStore, Diagnostics) {
        let graph = parse_graph(&format!("{PREFIXES}{body}"), InputFormat::Turtle).unwrap();
        let mut diagnostics = Diagnostics::new();
        let facts = NodeClassifier::new(config).classify(&graph, &mut diagnostics);
        (facts, diagnostics)
    }

    #[test]
    fn decision_list_order() {
        let names: Vec<&str> = DECISION_LIST.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            [
                "ontology-declaration",
                "list-cell",
                "restriction",
                "anonymous-expression",
                "named-class",
                "annotation-property",
                "property",
                "property-candidate",
                "class-candidate",
                "unclassifiable",
            ]
        );
    }

    #[test]
    fn class_wins_over_property() {
        let graph = parse_graph(
            &format!("{PREFIXES}ex:Both a owl:Class, owl:ObjectProperty ."),
            InputFormat::Turtle,
        )
        .unwrap();
        let node = Node::named("http://ex.org/Both");
        let rule = decide(&NodeView::new(&graph, &node), &ClassificationConfig::default());
        assert_eq!(rule.name, "named-class");
    }

    #[test]
    fn heuristics_can_be_disabled() {
        let graph = parse_graph(
            &format!("{PREFIXES}ex:Person rdfs:label \"Person\" . ex:name rdfs:label \"name\" ."),
            InputFormat::Turtle,
        )
        .unwrap();
        let person = Node::named("http://ex.org/Person");
        let name = Node::named("http://ex.org/name");
        let on = ClassificationConfig::default();
        let off = ClassificationConfig {
            naming_heuristics: false,
        };
        assert_eq!(decide(&NodeView::new(&graph, &person), &on).name, "class-candidate");
        assert_eq!(decide(&NodeView::new(&graph, &name), &on).name, "property-candidate");
        assert_eq!(decide(&NodeView::new(&graph, &person), &off).name, "unclassifiable");
    }

    #[test]
    fn class_and_property_facts() {
        let (facts, diagnostics) = classify(
            "ex:onto a owl:Ontology ; rdfs:label \"Zoo\" .\n\
             ex:Person a rdfs:Class ; rdfs:subClassOf ex:Agent ; owl:disjointWith ex:Robot .\n\
             ex:name a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:string .",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(facts.of_kind(FactKind::OntologyDeclaration).len(), 1);
        assert_eq!(facts.of_kind(FactKind::ClassReference).len(), 1);
        assert_eq!(facts.of_kind(FactKind::SubClassOf).len(), 1);
        assert_eq!(facts.of_kind(FactKind::DisjointWith).len(), 1);
        assert_eq!(facts.of_kind(FactKind::PropertyDomain).len(), 1);
        let range = facts.of_kind(FactKind::PropertyRange);
        assert_eq!(
            range[0].fact,
            Fact::PropertyRange {
                property: "http://ex.org/name".into(),
                range: ClassExpression::named(vocab::xsd::STRING),
            }
        );
        // The ontology label is kept for the resolver.
        assert_eq!(facts.of_kind(FactKind::Extra).len(), 1);
    }

    #[test]
    fn restrictions_are_read_from_their_class() {
        let (facts, _) = classify(
            "ex:Person a owl:Class ; rdfs:subClassOf [ a owl:Restriction ; owl:onProperty ex:pet ; owl:cardinality 1 ] .",
        );
        let restrictions = facts.assignable_to(FactKind::Restriction);
        assert_eq!(restrictions.len(), 1);
        let Fact::Restriction(r) = &restrictions[0].fact else {
            panic!("expected a restriction");
        };
        assert_eq!(r.on_type, "http://ex.org/Person");
        assert_eq!(r.shape, RestrictionShape::ExactCardinality(1));
        // subClassOf link + type + onProperty + cardinality
        assert_eq!(restrictions[0].sources.len(), 4);
    }

    #[test]
    fn ambiguous_restriction_goes_to_diagnostics() {
        let (facts, diagnostics) = classify(
            "ex:Dog a owl:Class ; rdfs:subClassOf [ a owl:Restriction ; owl:onProperty ex:species ; owl:hasValue ex:Canine ; owl:cardinality 1 ] .",
        );
        assert!(facts.assignable_to(FactKind::Restriction).is_empty());
        let entry = diagnostics
            .by_reason("unclassifiable restriction on Dog: ambiguous shape (hasValue, cardinality)")
            .unwrap();
        assert_eq!(entry.triples.len(), 5);
    }

    #[test]
    fn equivalent_intersection_dispatches_operands() {
        let (facts, diagnostics) = classify(
            "ex:Parent a owl:Class ; owl:equivalentClass [ owl:intersectionOf ( ex:Person [ a owl:Restriction ; owl:onProperty ex:child ; owl:minCardinality 1 ] ) ] .",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(facts.of_kind(FactKind::SubClassOf).len(), 1);
        assert_eq!(facts.of_kind(FactKind::MinCardinality).len(), 1);
    }

    #[test]
    fn property_kinds() {
        let (facts, diagnostics) = classify(
            "ex:age a owl:DatatypeProperty, owl:FunctionalProperty .\n\
             ex:knows a owl:SymmetricProperty .\n\
             ex:broken a owl:DatatypeProperty, owl:ObjectProperty .",
        );
        let kinds: BTreeMap<String, PropertyKind> = facts
            .of_kind(FactKind::PropertyReference)
            .iter()
            .filter_map(|r| match &r.fact {
                Fact::PropertyReference { uri, kind } => Some((uri.clone(), *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(kinds["http://ex.org/age"], PropertyKind::Datatype);
        assert_eq!(kinds["http://ex.org/knows"], PropertyKind::Object);
        assert!(!kinds.contains_key("http://ex.org/broken"));
        assert_eq!(facts.of_kind(FactKind::Functional).len(), 1);
        assert_eq!(diagnostics.unresolved_count(), 1);
    }

    #[test]
    fn annotation_properties_and_individuals() {
        let (facts, diagnostics) = classify(
            "ex:note a owl:AnnotationProperty .\n\
             ex:fido a ex:Dog .",
        );
        assert!(facts.is_empty());
        assert_eq!(
            diagnostics.by_reason("unclassifiable node").unwrap().triples.len(),
            1
        );
    }

    #[test]
    fn anonymous_range_is_read_from_property() {
        let (facts, _) = classify(
            "ex:age a owl:DatatypeProperty ; rdfs:range [ owl:unionOf ( xsd:int xsd:long ) ] .",
        );
        let range = facts.of_kind(FactKind::PropertyRange);
        assert_eq!(range.len(), 1);
        assert!(matches!(
            &range[0].fact,
            Fact::PropertyRange { range: ClassExpression::Union(ops), .. } if ops.len() == 2
        ));
        assert_eq!(facts.len(), 2);
    }
}
