//! The reconciled dependency graph.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use hoist_core::coordinate::{Exclusion, Module, Scope};

/// A node in the resolved graph: the surviving version of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub module: Module,
    pub version: String,
    pub scope: Scope,
    /// Shortest root distance, used for the output ordering.
    pub depth: usize,
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

/// Edge label: the effective scope of the dependency and the exclusions
/// declared on it.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub scope: Scope,
    pub exclusions: BTreeSet<Exclusion>,
}

/// A resolved dependency graph backed by petgraph, with one node per
/// module key.
#[derive(Debug)]
pub struct ResolutionGraph {
    graph: DiGraph<ResolvedNode, DepEdge>,
    index: HashMap<Module, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl ResolutionGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Add or retrieve a node. An existing module keeps its first node; the
    /// recorded depth shrinks to the smallest seen.
    pub fn add_node(&mut self, node: ResolvedNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.module) {
            let existing = &mut self.graph[idx];
            if node.depth < existing.depth {
                existing.depth = node.depth;
            }
            return idx;
        }
        let module = node.module.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(module, idx);
        idx
    }

    /// Mark a node as a root (a requested coordinate).
    pub fn add_root(&mut self, idx: NodeIndex) {
        if !self.roots.contains(&idx) {
            self.roots.push(idx);
        }
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Add a dependency edge, ignoring duplicates.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn find(&self, module: &Module) -> Option<NodeIndex> {
        self.index.get(module).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ResolvedNode {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All nodes in output order: shortest root distance first, then
    /// module key. This is the order artifact files are produced in.
    pub fn ordered_nodes(&self) -> Vec<&ResolvedNode> {
        let mut nodes: Vec<&ResolvedNode> = self.graph.node_indices().map(|i| &self.graph[i]).collect();
        nodes.sort_by(|a, b| (a.depth, &a.module).cmp(&(b.depth, &b.module)));
        nodes
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// All edges as `(from, to, edge)` triples, for reporting.
    pub fn edges(&self) -> Vec<(&ResolvedNode, &ResolvedNode, &DepEdge)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], e.weight()))
            .collect()
    }

    /// Render the dependency tree, one subtree per root.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let count = self.roots.len();
        for (i, &root) in self.roots.iter().enumerate() {
            let mut visited = HashSet::new();
            self.print_subtree(
                &mut output,
                root,
                "",
                i == count - 1,
                1,
                max_depth,
                &mut visited,
            );
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let mut deps = self.dependencies_of(idx);
        deps.sort_by(|a, b| self.graph[a.0].module.cmp(&self.graph[b.0].module));
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }
}

impl Default for ResolutionGraph {
    fn default() -> Self {
        Self::new()
    }
}
