//! Compilation pipeline: expansion → classification → resolution → normalization.
//!
//! A [`Compiler`] owns the configuration and the expansion rule set and runs
//! one linear compilation per call. Fatal problems come back as
//! [`CompileError`]; everything recoverable lands in the returned
//! [`Diagnostics`] ledger next to the (possibly partial) schema model.

use crate::classify::NodeClassifier;
use crate::config::CompilerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{CompileResult, ConfigResult};
use crate::expansion::{ExpansionEngine, ExpansionReport, ExpansionRuleSet};
use crate::facts::FactStore;
use crate::graph::Graph;
use crate::normalize::{NormalizationReport, Normalizer};
use crate::resolve::resolve;
use crate::schema::SchemaModel;

/// Everything one compilation produced.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub model: SchemaModel,
    pub diagnostics: Diagnostics,
    /// The fact ledger, with every fact retired by the end of resolution.
    pub facts: FactStore,
    pub expansion: ExpansionReport,
    pub normalization: NormalizationReport,
    /// The graph after expansion; coverage is measured against it.
    pub expanded: Graph,
}

impl Compilation {
    /// Expanded-graph triples that were not consumed into the model.
    pub fn remaining_triples(&self) -> Vec<&crate::graph::Triple> {
        self.diagnostics.remaining_triples(&self.expanded)
    }
}

/// Ontology-to-schema compiler.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompilerConfig,
    rules: ExpansionRuleSet,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default(), ExpansionRuleSet::builtin())
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig, rules: ExpansionRuleSet) -> Self {
        Self { config, rules }
    }

    /// Build the rule set the configuration asks for: the built-in rules
    /// (unless disabled) followed by every configured rule file, in order.
    pub fn from_config(config: CompilerConfig) -> ConfigResult<Self> {
        config.validate()?;
        let mut rules = if config.expansion.builtin_rules {
            ExpansionRuleSet::builtin()
        } else {
            ExpansionRuleSet::new("configured", Vec::new())
        };
        for path in &config.expansion.rule_files {
            let file = ExpansionRuleSet::load(path)?;
            tracing::debug!(path = %path.display(), rules = file.len(), "rule file loaded");
            rules.extend(file);
        }
        Ok(Self::new(config, rules))
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn rules(&self) -> &ExpansionRuleSet {
        &self.rules
    }

    /// Run only the expansion engine.
    pub fn expand(&self, graph: &Graph) -> CompileResult<(Graph, ExpansionReport)> {
        ExpansionEngine::from_config(&self.config.expansion, self.rules.clone()).expand(graph)
    }

    /// Expand and classify, without resolving.
    pub fn classify(&self, graph: &Graph) -> CompileResult<(FactStore, Diagnostics)> {
        let (expanded, _) = self.expand(graph)?;
        let mut diagnostics = Diagnostics::new();
        let facts = NodeClassifier::new(self.config.classification.clone())
            .classify(&expanded, &mut diagnostics);
        Ok((facts, diagnostics))
    }

    /// Compile an ontology graph into a schema model.
    pub fn compile(&self, graph: &Graph) -> CompileResult<Compilation> {
        let (expanded, expansion) = self.expand(graph)?;

        let mut diagnostics = Diagnostics::new();
        let mut facts = NodeClassifier::new(self.config.classification.clone())
            .classify(&expanded, &mut diagnostics);
        let mut model = resolve(&mut facts, &mut diagnostics)?;
        let normalization =
            Normalizer::new(self.config.normalization.clone()).normalize(&mut model, &mut diagnostics);

        diagnostics.finish(&expanded);
        let coverage = diagnostics.coverage();
        tracing::info!(
            ontology = %model.uri,
            types = model.len(),
            unresolved = diagnostics.unresolved_count(),
            warnings = diagnostics.warning_count(),
            processed = coverage.processed,
            remaining = coverage.remaining,
            "compilation complete"
        );

        Ok(Compilation {
            model,
            diagnostics,
            facts,
            expansion,
            normalization,
            expanded,
        })
    }
}

/// Compile with the default configuration and the built-in rules.
pub fn compile(graph: &Graph) -> CompileResult<Compilation> {
    Compiler::default().compile(graph)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::ExpansionConfig;
    use crate::error::ConfigError;
    use crate::graph::{parse_graph, InputFormat};

    const ONTOLOGY: &str = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
        @prefix ex: <http://ex.org/> .
        ex:onto a owl:Ontology .
        ex:Animal a owl:Class .
        ex:Dog rdfs:subClassOf ex:Animal .
        ex:name a owl:DatatypeProperty ; rdfs:domain ex:Animal ; rdfs:range xsd:string .
    "#;

    #[test]
    fn compile_reports_full_coverage_for_clean_input() {
        let graph = parse_graph(ONTOLOGY, InputFormat::Turtle).unwrap();
        let compilation = compile(&graph).unwrap();
        assert!(compilation.model.has_type("Dog"));
        assert_eq!(compilation.facts.active_count(), 0);
        assert_eq!(compilation.diagnostics.unresolved_count(), 0);
        // Dog's ancestor marker is derived, then cleaned up.
        assert_eq!(compilation.expansion.cleaned, 1);
        let coverage = compilation.diagnostics.coverage();
        assert_eq!(coverage.original, compilation.expanded.len());
        assert_eq!(coverage.remaining, compilation.remaining_triples().len());
        assert_eq!(coverage.remaining, 0);
    }

    #[test]
    fn from_config_appends_rule_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("extra.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[[rule]]\nname = \"noop\"\nexpand = \"CONSTRUCT {{ ?s ?p ?o }} WHERE {{ ?s ?p ?o }}\""
        )
        .unwrap();

        let config = CompilerConfig {
            expansion: ExpansionConfig {
                rule_files: vec![path],
                ..Default::default()
            },
            ..Default::default()
        };
        let compiler = Compiler::from_config(config).unwrap();
        let names: Vec<&str> = compiler.rules().names().collect();
        assert_eq!(names.len(), ExpansionRuleSet::builtin().len() + 1);
        assert_eq!(names.last(), Some(&"noop"));
    }

    #[test]
    fn from_config_without_builtins_or_files_is_empty() {
        let config = CompilerConfig {
            expansion: ExpansionConfig {
                builtin_rules: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Compiler::from_config(config).unwrap().rules().is_empty());
    }

    #[test]
    fn missing_rule_file_is_a_config_error() {
        let config = CompilerConfig {
            expansion: ExpansionConfig {
                rule_files: vec!["/nonexistent/rules.toml".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Compiler::from_config(config),
            Err(ConfigError::Read { .. })
        ));
    }
}
