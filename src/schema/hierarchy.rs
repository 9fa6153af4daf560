//! Class hierarchy closure over a schema model, backed by petgraph.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;

use super::rules::TypeRuleKind;
use super::SchemaModel;

/// Directed subclass graph: edges point from a class to its direct superclasses.
///
/// Superclass ids that have no type definition still get a node, so chains
/// through undeclared classes stay connected.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ClassHierarchy {
    /// Build the hierarchy from the `SubClassOf` rules of every type.
    pub fn from_model(model: &SchemaModel) -> Self {
        let mut hierarchy = Self::default();
        for type_def in model.types() {
            let sub = hierarchy.ensure_node(&type_def.class_id);
            if let Some(rule) = type_def.rule(TypeRuleKind::SubClassOf) {
                for super_id in rule.ids() {
                    let sup = hierarchy.ensure_node(super_id);
                    hierarchy.graph.update_edge(sub, sup, ());
                }
            }
        }
        hierarchy
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// All transitive superclass ids of `id`, excluding `id` itself unless it
    /// sits on a cycle.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut out = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        // The start node is yielded first.
        dfs.next(&self.graph);
        while let Some(nx) = dfs.next(&self.graph) {
            out.insert(self.graph[nx].clone());
        }
        if self
            .graph
            .neighbors_directed(start, Direction::Incoming)
            .any(|n| n == start || out.contains(&self.graph[n]))
        {
            out.insert(id.to_string());
        }
        out
    }

    /// Superclasses ordered nearest first (breadth-first), ties broken by id.
    pub fn ancestors_nearest_first(&self, id: &str) -> Vec<String> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(nx) = queue.pop_front() {
            let mut parents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(nx, Direction::Outgoing)
                .filter(|p| !seen.contains(p))
                .collect();
            parents.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            parents.dedup();
            for parent in parents {
                seen.insert(parent);
                out.push(self.graph[parent].clone());
                queue.push_back(parent);
            }
        }
        out
    }

    /// Whether `sup` is a superclass of `sub` and not equivalent to it through
    /// a cycle.
    pub fn is_strict_superclass(&self, sup: &str, sub: &str) -> bool {
        sup != sub && self.ancestors(sub).contains(sup) && !self.ancestors(sup).contains(sub)
    }

    /// Whether `id` equals `target` or has it as an ancestor.
    pub fn conforms_to(&self, id: &str, target: &str) -> bool {
        id == target || self.ancestors(id).contains(target)
    }

    /// Number of ancestors; supertypes sort before their subtypes by depth.
    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }
}
