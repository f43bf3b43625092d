//! Graph substrate: node/edge weights and the traversals the compiler
//! is built from.
//!
//! The dependency graph is a bipartite
//! [`StableDiGraph`](petgraph::stable_graph::StableDiGraph): data nodes
//! and operation nodes, with typed edges ([`EdgeLink`]). Stable indices
//! matter twice over: a clone of the graph keeps the original indices
//! valid after node removals (so pruning works on cheap clones), and
//! the raw index order doubles as the *operation-insertion order* used
//! to break topological-sort ties deterministically.
//!
//! Sub-document ("subdoc") edges chain the prefixes of hierarchical
//! names (`a` → `a/b` → `a/b/c`). [`chained_docs`] walks those chains
//! from a doc to its sub- and super-docs; the traversal never crosses
//! to siblings (descending only continues downward, ascending only
//! upward).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;

pub use petgraph::stable_graph::NodeIndex;

use crate::error::{GraphError, Result};
use crate::op::Operation;

/// The dependency graph shared by networks and pruned plans.
pub type DepGraph = StableDiGraph<NodeKind, EdgeLink>;

/// A graph node: a named data value or an operation record.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A named value produced or consumed by operations.
    Data {
        name: String,
        /// Set for pure side-effect names (no value ever flows).
        sideffect: bool,
    },
    /// An operation; the record is shared, not copied, per node.
    Op(Arc<Operation>),
}

impl NodeKind {
    pub fn is_op(&self) -> bool {
        matches!(self, NodeKind::Op(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, NodeKind::Data { .. })
    }

    /// The data name, if this is a data node.
    pub fn data_name(&self) -> Option<&str> {
        match self {
            NodeKind::Data { name, .. } => Some(name),
            NodeKind::Op(_) => None,
        }
    }

    /// The operation record, if this is an operation node.
    pub fn as_op(&self) -> Option<&Arc<Operation>> {
        match self {
            NodeKind::Op(op) => Some(op),
            NodeKind::Data { .. } => None,
        }
    }

    /// Data name or operation name, for diagnostics.
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Data { name, .. } => name,
            NodeKind::Op(op) => &op.name,
        }
    }
}

/// Attributes of one dependency edge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeLink {
    /// need edge: the operation tolerates the value's absence.
    pub optional: bool,
    /// The dependency is (or is tied to) a side-effect.
    pub sideffect: bool,
    /// Side-effect tokens of a sideffected dependency.
    pub sfx_tokens: Vec<String>,
    /// need edge: deliver the value under this parameter name.
    pub keyword: Option<String>,
    /// provide edge: this name duplicates the named source provide.
    pub alias_of: Option<String>,
    /// data→data edge chaining a hierarchical name to its parent.
    pub subdoc: bool,
}

impl EdgeLink {
    /// A parent→child sub-document chain edge.
    pub fn subdoc() -> Self {
        Self {
            subdoc: true,
            ..Self::default()
        }
    }
}

/// True while `idx` is still present in `g` (pruned clones keep the
/// original indices of surviving nodes).
pub(crate) fn has_node(g: &DepGraph, idx: NodeIndex) -> bool {
    g.node_weight(idx).is_some()
}

fn chain_step(g: &DepGraph, doc: NodeIndex, downward: bool) -> Vec<NodeIndex> {
    let dir = if downward { Outgoing } else { Incoming };
    g.edges_directed(doc, dir)
        .filter(|e| e.weight().subdoc)
        .map(|e| if downward { e.target() } else { e.source() })
        .collect()
}

fn dig_chain(
    g: &DepGraph,
    doc: NodeIndex,
    downward: bool,
    acc: &mut HashSet<NodeIndex>,
    out: &mut Vec<NodeIndex>,
) {
    for next in chain_step(g, doc, downward) {
        if acc.insert(next) {
            out.push(next);
            dig_chain(g, next, downward, acc, out);
        }
    }
}

/// Collect `doc` plus everything linked to it through subdoc edges,
/// descending to sub-docs and ascending to super-docs but never
/// crossing to siblings, skipping (and not recursing into) nodes
/// already in `acc`. Discovered nodes are added to `acc`; the returned
/// list preserves discovery order. Absent nodes yield nothing.
pub(crate) fn chained_docs(
    g: &DepGraph,
    doc: NodeIndex,
    acc: &mut HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    if !has_node(g, doc) || !acc.insert(doc) {
        return out;
    }
    out.push(doc);
    dig_chain(g, doc, true, acc, &mut out);
    dig_chain(g, doc, false, acc, &mut out);
    out
}

/// [`chained_docs`] over many starting docs at once, sharing one
/// accumulator so overlapping chains are reported once.
pub(crate) fn chained_docs_of(
    g: &DepGraph,
    docs: impl IntoIterator<Item = NodeIndex>,
    acc: &mut HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    for doc in docs {
        out.extend(chained_docs(g, doc, acc));
    }
    out
}

/// The topmost super-document of `doc`'s chain (`doc` itself when it
/// is not a sub-document).
pub(crate) fn root_doc(g: &DepGraph, doc: NodeIndex) -> NodeIndex {
    let mut cur = doc;
    loop {
        match g
            .edges_directed(cur, Incoming)
            .find(|e| e.weight().subdoc)
            .map(|e| e.source())
        {
            Some(parent) => cur = parent,
            None => return cur,
        }
    }
}

/// Topologically sort the graph, breaking ties by node-insertion order
/// (the raw stable index), so equal graphs always order equally.
pub(crate) fn topo_sort(g: &DepGraph) -> Result<Vec<NodeIndex>> {
    let mut in_degree: Vec<usize> = Vec::new();
    let mut ready: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
    for idx in g.node_indices() {
        let i = idx.index();
        if in_degree.len() <= i {
            in_degree.resize(i + 1, 0);
        }
        in_degree[i] = g.edges_directed(idx, Incoming).count();
        if in_degree[i] == 0 {
            ready.push(Reverse(i));
        }
    }

    let mut ordered = Vec::with_capacity(g.node_count());
    while let Some(Reverse(i)) = ready.pop() {
        let idx = NodeIndex::new(i);
        ordered.push(idx);
        for succ in g.neighbors_directed(idx, Outgoing) {
            let s = succ.index();
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.push(Reverse(s));
            }
        }
    }

    if ordered.len() != g.node_count() {
        let sorted: HashSet<_> = ordered.into_iter().collect();
        let cyclic = g
            .node_indices()
            .filter(|n| !sorted.contains(n))
            .filter_map(|n| g[n].as_op().map(|op| op.name.clone()))
            .collect();
        return Err(GraphError::CyclicGraph(cyclic));
    }
    Ok(ordered)
}

/// All nodes from which `start` is reachable (excluding `start`).
pub(crate) fn ancestors(g: &DepGraph, start: NodeIndex) -> HashSet<NodeIndex> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(n) = stack.pop() {
        for pred in g.neighbors_directed(n, Incoming) {
            if seen.insert(pred) {
                stack.push(pred);
            }
        }
    }
    seen.remove(&start);
    seen
}

/// Drop data nodes left without any edge (operations are never
/// isolated: they always keep at least their dependency edges).
pub(crate) fn remove_isolates(g: &mut DepGraph) {
    let isolated: Vec<NodeIndex> = g
        .node_indices()
        .filter(|&n| {
            g.edges_directed(n, Incoming).next().is_none()
                && g.edges_directed(n, Outgoing).next().is_none()
        })
        .collect();
    for n in isolated {
        g.remove_node(n);
    }
}

/// Iterate the operation records of a graph in insertion order.
pub(crate) fn iter_ops(g: &DepGraph) -> impl Iterator<Item = (NodeIndex, &Arc<Operation>)> {
    let mut indices: Vec<NodeIndex> = g.node_indices().filter(|&n| g[n].is_op()).collect();
    indices.sort_by_key(|n| n.index());
    indices.into_iter().map(|n| (n, g[n].as_op().expect("op node")))
}
