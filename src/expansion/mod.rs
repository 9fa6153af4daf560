//! Expansion engine: fixpoint inference over the ontology graph.
//!
//! Each pass runs every rule's `expand` template against the graph and
//! inserts what it produces, so later rules in the same pass already see the
//! new triples. When a full pass leaves the triple count unchanged the
//! fixpoint is reached; every rule's `cleanup` template then runs once and its
//! matches are removed.

pub mod rules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ExpansionConfig;
use crate::error::{CompileError, CompileResult, GraphError};
use crate::graph::{Graph, GraphCollaborator, SparqlStore};

pub use rules::{ExpansionRule, ExpansionRuleSet};

/// What an expansion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionReport {
    /// Passes executed, including the final unchanged one.
    pub passes: usize,
    /// New triples per rule, summed over all passes.
    pub rule_stats: BTreeMap<String, usize>,
    /// Triples removed by cleanup templates.
    pub cleaned: usize,
    pub initial_triples: usize,
    pub final_triples: usize,
}

impl ExpansionReport {
    /// Net change in triple count.
    pub fn net_added(&self) -> i64 {
        self.final_triples as i64 - self.initial_triples as i64
    }

    /// Triples derived before cleanup.
    pub fn derived(&self) -> usize {
        self.rule_stats.values().sum()
    }
}

/// Runs an [`ExpansionRuleSet`] to a fixpoint.
#[derive(Debug, Clone)]
pub struct ExpansionEngine {
    rules: ExpansionRuleSet,
    max_passes: usize,
}

impl ExpansionEngine {
    pub fn new(rules: ExpansionRuleSet, max_passes: usize) -> Self {
        Self { rules, max_passes }
    }

    pub fn from_config(config: &ExpansionConfig, rules: ExpansionRuleSet) -> Self {
        Self::new(rules, config.max_passes)
    }

    pub fn rules(&self) -> &ExpansionRuleSet {
        &self.rules
    }

    /// Expand a copy of `graph` in an in-memory SPARQL store.
    pub fn expand(&self, graph: &Graph) -> CompileResult<(Graph, ExpansionReport)> {
        let mut store = SparqlStore::from_graph(graph)?;
        let report = self.run(&mut store)?;
        Ok((store.into_graph(), report))
    }

    /// Expand the collaborator's graph in place.
    pub fn run<G: GraphCollaborator>(&self, store: &mut G) -> CompileResult<ExpansionReport> {
        self.validate(store)?;

        let mut report = ExpansionReport {
            initial_triples: store.len(),
            ..Default::default()
        };
        let mut previous = store.len();
        let mut reached_fixpoint = false;

        for pass in 1..=self.max_passes {
            report.passes = pass;
            for rule in &self.rules.rules {
                let produced = store
                    .run_template(&rule.expand)
                    .map_err(|e| template_error(&rule.name, e))?;
                let mut added = 0;
                for triple in &produced {
                    if store.insert(triple)? {
                        added += 1;
                    }
                }
                *report.rule_stats.entry(rule.name.clone()).or_insert(0) += added;
                tracing::debug!(pass, rule = %rule.name, added, "expansion rule applied");
            }
            if store.len() == previous {
                reached_fixpoint = true;
                break;
            }
            previous = store.len();
        }

        if !reached_fixpoint {
            return Err(CompileError::ExpansionDiverged {
                max_passes: self.max_passes,
            });
        }

        for rule in &self.rules.rules {
            let Some(cleanup) = &rule.cleanup else {
                continue;
            };
            let matched = store
                .run_template(cleanup)
                .map_err(|e| template_error(&rule.name, e))?;
            for triple in &matched {
                if store.remove(triple)? {
                    report.cleaned += 1;
                }
            }
        }

        report.final_triples = store.len();
        tracing::info!(
            passes = report.passes,
            derived = report.derived(),
            cleaned = report.cleaned,
            net_added = report.net_added(),
            "expansion reached fixpoint"
        );
        Ok(report)
    }

    /// Reject malformed rules before the graph is touched. Every template is
    /// executed once; its results are discarded.
    fn validate<G: GraphCollaborator>(&self, store: &G) -> CompileResult<()> {
        for rule in &self.rules.rules {
            rule.check()?;
            store
                .run_template(&rule.expand)
                .map_err(|e| template_error(&rule.name, e))?;
            if let Some(cleanup) = &rule.cleanup {
                store
                    .run_template(cleanup)
                    .map_err(|e| template_error(&rule.name, e))?;
            }
        }
        Ok(())
    }
}

fn template_error(rule_name: &str, error: GraphError) -> CompileError {
    CompileError::RuleTemplate {
        rule_name: rule_name.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::vocab::{owl, rdf, rdfs, ONTOPROFILE_NS};
    use crate::graph::{Node, Triple};

    fn ex(local: &str) -> Node {
        Node::named(format!("http://ex.org/{local}"))
    }

    fn chain() -> Graph {
        [
            Triple::new(ex("Puppy"), rdf::TYPE, Node::named(owl::CLASS)),
            Triple::new(ex("Puppy"), rdfs::SUB_CLASS_OF, ex("Dog")),
            Triple::new(ex("Dog"), rdfs::SUB_CLASS_OF, ex("Animal")),
            Triple::new(ex("Animal"), rdfs::SUB_CLASS_OF, ex("Thing")),
        ]
        .into_iter()
        .collect()
    }

    fn builtin_engine() -> ExpansionEngine {
        ExpansionEngine::new(ExpansionRuleSet::builtin(), 64)
    }

    #[test]
    fn ancestors_become_classes_and_markers_are_cleaned() {
        let (expanded, report) = builtin_engine().expand(&chain()).unwrap();
        for class in ["Dog", "Animal", "Thing"] {
            assert!(expanded.contains(&Triple::new(ex(class), rdf::TYPE, Node::named(owl::CLASS))));
        }
        let marker = format!("{ONTOPROFILE_NS}ancestor");
        assert!(expanded.match_pattern(None, Some(&marker), None).is_empty());
        // Puppy→Dog, Puppy→Animal, Puppy→Thing, Dog→Animal, Dog→Thing, Animal→Thing
        assert_eq!(report.cleaned, 6);
        assert_eq!(report.net_added(), 3);
        assert!(report.passes >= 2);
    }

    #[test]
    fn expansion_is_idempotent() {
        let engine = builtin_engine();
        let (once, _) = engine.expand(&chain()).unwrap();
        let (twice, report) = engine.expand(&once).unwrap();
        assert_eq!(report.net_added(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn symmetric_rules() {
        let graph: Graph = [
            Triple::new(ex("parentOf"), owl::INVERSE_OF, ex("childOf")),
            Triple::new(ex("Human"), owl::EQUIVALENT_CLASS, ex("Person")),
        ]
        .into_iter()
        .collect();
        let (expanded, report) = builtin_engine().expand(&graph).unwrap();
        assert!(expanded.contains(&Triple::new(ex("childOf"), owl::INVERSE_OF, ex("parentOf"))));
        assert!(expanded.contains(&Triple::new(ex("Person"), owl::EQUIVALENT_CLASS, ex("Human"))));
        assert_eq!(report.rule_stats["inverse-of-symmetric"], 1);
        assert_eq!(report.rule_stats["equivalent-class-symmetric"], 1);
    }

    #[test]
    fn malformed_template_is_fatal_and_named() {
        let rules = ExpansionRuleSet::new(
            "broken",
            vec![ExpansionRule::new("typo", "CONSTRCT { ?s ?p ?o } WHERE { ?s ?p ?o }")],
        );
        let err = ExpansionEngine::new(rules, 8).expand(&chain()).unwrap_err();
        assert!(matches!(err, CompileError::RuleTemplate { ref rule_name, .. } if rule_name == "typo"));
    }

    #[test]
    fn non_construct_template_is_fatal() {
        let rules = ExpansionRuleSet::new(
            "select",
            vec![ExpansionRule::new("select", "SELECT ?s WHERE { ?s ?p ?o }")],
        );
        let err = ExpansionEngine::new(rules, 8).expand(&chain()).unwrap_err();
        assert!(matches!(err, CompileError::RuleTemplate { .. }));
    }

    #[test]
    fn fresh_blank_nodes_diverge() {
        let rules = ExpansionRuleSet::new(
            "minting",
            vec![ExpansionRule::new(
                "mint",
                "CONSTRUCT { ?s <http://ex.org/next> [] } WHERE { ?s ?p ?o }",
            )],
        );
        let err = ExpansionEngine::new(rules, 3).expand(&chain()).unwrap_err();
        assert!(matches!(err, CompileError::ExpansionDiverged { max_passes: 3 }));
    }

    #[test]
    fn empty_rule_set_is_a_single_pass() {
        let engine = ExpansionEngine::new(ExpansionRuleSet::default(), 4);
        let (expanded, report) = engine.expand(&chain()).unwrap();
        assert_eq!(expanded, chain());
        assert_eq!(report.passes, 1);
        assert_eq!(report.net_added(), 0);
    }
}
