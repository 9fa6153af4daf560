//! Named expansion rules: CONSTRUCT templates run to a fixpoint.
//!
//! Rules are data, not code. They come from the built-in set
//! ([`ExpansionRuleSet::builtin`]) or from TOML files:
//!
//! ```toml
//! [[rule]]
//! name = "inverse-of-symmetric"
//! expand = "CONSTRUCT { ?q owl:inverseOf ?p } WHERE { ?p owl:inverseOf ?q }"
//! cleanup = "..."   # optional
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult, ConfigError, ConfigResult};

/// Prefixes available to every built-in template.
const PREFIXES: &str = "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl: <http://www.w3.org/2002/07/owl#>
PREFIX op: <urn:ontoprofile:>
";

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// An expansion rule: an additive `expand` template and an optional `cleanup`
/// template whose matches are removed once the fixpoint is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionRule {
    pub name: String,
    pub expand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
}

impl ExpansionRule {
    pub fn new(name: impl Into<String>, expand: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expand: expand.into(),
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: impl Into<String>) -> Self {
        self.cleanup = Some(cleanup.into());
        self
    }

    /// Structural checks that need no store: a name and a non-empty template.
    pub fn check(&self) -> CompileResult<()> {
        if self.name.trim().is_empty() {
            return Err(CompileError::RuleTemplate {
                rule_name: self.name.clone(),
                message: "rule name is empty".into(),
            });
        }
        if self.expand.trim().is_empty() {
            return Err(CompileError::RuleTemplate {
                rule_name: self.name.clone(),
                message: "expand template is empty".into(),
            });
        }
        if self.cleanup.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(CompileError::RuleTemplate {
                rule_name: self.name.clone(),
                message: "cleanup template is empty".into(),
            });
        }
        Ok(())
    }
}

fn builtin(name: &str, body: &str) -> ExpansionRule {
    ExpansionRule::new(name, format!("{PREFIXES}{body}"))
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// An ordered list of expansion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionRuleSet {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "rule")]
    pub rules: Vec<ExpansionRule>,
}

impl ExpansionRuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<ExpansionRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// The built-in rules. All are additive and never mint blank nodes.
    pub fn builtin() -> Self {
        let rules = vec![
            // 1. (A equivalentClass B) ⟹ (B equivalentClass A), named classes only.
            builtin(
                "equivalent-class-symmetric",
                "CONSTRUCT { ?b owl:equivalentClass ?a }
                 WHERE { ?a owl:equivalentClass ?b . FILTER(isIRI(?a) && isIRI(?b)) }",
            ),
            // 2. (P inverseOf Q) ⟹ (Q inverseOf P).
            builtin(
                "inverse-of-symmetric",
                "CONSTRUCT { ?q owl:inverseOf ?p }
                 WHERE { ?p owl:inverseOf ?q . FILTER(isIRI(?p) && isIRI(?q)) }",
            ),
            // 3. Transitive named superclasses, kept only while expanding.
            builtin(
                "subclass-ancestors",
                "CONSTRUCT { ?c op:ancestor ?s }
                 WHERE {
                   { ?c rdfs:subClassOf ?s }
                   UNION
                   { ?c op:ancestor ?m . ?m rdfs:subClassOf ?s }
                   FILTER(isIRI(?c) && isIRI(?s) && ?c != ?s)
                 }",
            )
            .with_cleanup(format!(
                "{PREFIXES}CONSTRUCT {{ ?c op:ancestor ?s }} WHERE {{ ?c op:ancestor ?s }}"
            )),
            // 4. Named ancestors of a declared class are classes.
            builtin(
                "ancestor-is-class",
                "CONSTRUCT { ?s a owl:Class }
                 WHERE {
                   ?c op:ancestor ?s .
                   ?c a ?marker .
                   FILTER(?marker IN (owl:Class, rdfs:Class))
                   FILTER(?s NOT IN (owl:Thing, rdfs:Resource))
                   FILTER NOT EXISTS { ?s a ?known . FILTER(?known IN (owl:Class, rdfs:Class)) }
                 }",
            ),
            // 5. Named domains are classes.
            builtin(
                "domain-is-class",
                "CONSTRUCT { ?d a rdfs:Class }
                 WHERE {
                   ?p rdfs:domain ?d .
                   FILTER(isIRI(?d) && ?d NOT IN (owl:Thing, rdfs:Resource))
                   FILTER NOT EXISTS { ?d a ?known . FILTER(?known IN (owl:Class, rdfs:Class)) }
                 }",
            ),
        ];
        Self::new("builtin", rules)
    }

    /// Parse a rule set from TOML (`[[rule]]` tables).
    pub fn from_toml_str(text: &str, source: &str) -> ConfigResult<Self> {
        let mut set: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        if set.name.is_empty() {
            set.name = source.to_string();
        }
        Ok(set)
    }

    /// Read a TOML rule file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Append another set's rules after this one's.
    pub fn extend(&mut self, other: ExpansionRuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}
