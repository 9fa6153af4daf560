//! Diagnostics ledger: recoverable findings and coverage accounting.
//!
//! Every construct the compiler could not represent, and every consistency
//! warning, is recorded here under a human-readable reason together with the
//! original triples that produced it. The ledger is returned alongside the
//! (possibly partial) schema model; nothing in it is ever thrown.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, Triple};

/// How serious a ledger entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A construct that could not be represented; the affected fragment is omitted.
    Unresolved,
    /// Informational: a no-op, a dropped rule or a conflicting qualification.
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// All findings recorded under one reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    /// Original triples behind the finding.
    pub triples: BTreeSet<Triple>,
    /// How many times the reason was recorded.
    pub occurrences: usize,
}

/// Aggregate triple counts for coverage auditing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Triples in the expanded graph.
    pub original: usize,
    /// Distinct expanded-graph triples consumed into the schema model.
    pub processed: usize,
    /// `original - processed`.
    pub remaining: usize,
}

impl Coverage {
    /// Fraction of triples consumed, in `[0, 1]`. An empty graph is fully covered.
    pub fn ratio(&self) -> f64 {
        if self.original == 0 {
            1.0
        } else {
            self.processed as f64 / self.original as f64
        }
    }
}

/// The diagnostics ledger of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: BTreeMap<String, DiagnosticEntry>,
    #[serde(skip)]
    processed: BTreeSet<Triple>,
    coverage: Coverage,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unresolved construct.
    pub fn unresolved<I>(&mut self, reason: impl Into<String>, triples: I)
    where
        I: IntoIterator<Item = Triple>,
    {
        self.record(Severity::Unresolved, reason.into(), triples);
    }

    /// Record a consistency warning.
    pub fn warning<I>(&mut self, reason: impl Into<String>, triples: I)
    where
        I: IntoIterator<Item = Triple>,
    {
        self.record(Severity::Warning, reason.into(), triples);
    }

    fn record<I>(&mut self, severity: Severity, reason: String, triples: I)
    where
        I: IntoIterator<Item = Triple>,
    {
        let entry = self
            .entries
            .entry(reason.clone())
            .or_insert_with(|| DiagnosticEntry {
                severity,
                triples: BTreeSet::new(),
                occurrences: 0,
            });
        // An unresolved finding outranks a warning under the same reason.
        entry.severity = entry.severity.min(severity);
        entry.triples.extend(triples);
        entry.occurrences += 1;
        tracing::debug!(%severity, triples = entry.triples.len(), "{reason}");
    }

    /// Mark triples as consumed into the schema model.
    pub fn mark_processed<'a, I>(&mut self, triples: I)
    where
        I: IntoIterator<Item = &'a Triple>,
    {
        self.processed.extend(triples.into_iter().cloned());
    }

    /// Compute coverage against the expanded graph.
    pub fn finish(&mut self, graph: &Graph) {
        let processed = self.processed.iter().filter(|t| graph.contains(t)).count();
        self.coverage = Coverage {
            original: graph.len(),
            processed,
            remaining: graph.len() - processed,
        };
    }

    pub fn coverage(&self) -> Coverage {
        self.coverage
    }

    /// Expanded-graph triples that were not consumed into the model.
    pub fn remaining_triples<'a>(&self, graph: &'a Graph) -> Vec<&'a Triple> {
        graph
            .iter()
            .filter(|t| !self.processed.contains(*t))
            .collect()
    }

    pub fn is_processed(&self, triple: &Triple) -> bool {
        self.processed.contains(triple)
    }

    pub fn by_reason(&self, reason: &str) -> Option<&DiagnosticEntry> {
        self.entries.get(reason)
    }

    /// Entries in reason order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DiagnosticEntry)> {
        self.entries.iter().map(|(r, e)| (r.as_str(), e))
    }

    /// Reasons of the given severity.
    pub fn reasons(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.severity == severity)
            .map(|(r, _)| r.as_str())
    }

    pub fn unresolved_count(&self) -> usize {
        self.reasons(Severity::Unresolved).count()
    }

    pub fn warning_count(&self) -> usize {
        self.reasons(Severity::Warning).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn t(s: &str, o: &str) -> Triple {
        Triple::new(Node::named(s), "http://ex.org/p", Node::named(o))
    }

    #[test]
    fn same_reason_accumulates() {
        let mut diags = Diagnostics::new();
        diags.unresolved("ambiguous domain for name", [t("a", "b")]);
        diags.unresolved("ambiguous domain for name", [t("a", "c")]);
        assert_eq!(diags.len(), 1);
        let entry = diags.by_reason("ambiguous domain for name").unwrap();
        assert_eq!(entry.occurrences, 2);
        assert_eq!(entry.triples.len(), 2);
        assert_eq!(entry.severity, Severity::Unresolved);
    }

    #[test]
    fn unresolved_outranks_warning() {
        let mut diags = Diagnostics::new();
        diags.warning("x", []);
        diags.unresolved("x", []);
        assert_eq!(diags.by_reason("x").unwrap().severity, Severity::Unresolved);
        assert_eq!(diags.unresolved_count(), 1);
        assert_eq!(diags.warning_count(), 0);
    }

    #[test]
    fn coverage_counts_only_graph_triples() {
        let graph: Graph = [t("a", "b"), t("a", "c"), t("b", "c")].into_iter().collect();
        let mut diags = Diagnostics::new();
        let outside = t("z", "z");
        diags.mark_processed([&t("a", "b"), &outside]);
        diags.finish(&graph);
        let coverage = diags.coverage();
        assert_eq!(coverage.original, 3);
        assert_eq!(coverage.processed, 1);
        assert_eq!(coverage.remaining, 2);
        assert_eq!(diags.remaining_triples(&graph).len(), 2);
    }

    #[test]
    fn empty_graph_is_fully_covered() {
        let mut diags = Diagnostics::new();
        diags.finish(&Graph::new());
        assert_eq!(diags.coverage().ratio(), 1.0);
    }
}
