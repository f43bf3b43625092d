//! The immutable operation network and its plan compiler.
//!
//! A [`Network`] is built once from a list of [`Operation`]s and never
//! mutated afterwards: construction inserts every operation with its
//! dependency edges (including sub-document chains and alias edges),
//! then collects the aggregate [`needs`](Network::needs) /
//! [`provides`](Network::provides) of the whole graph.
//!
//! [`Network::compile`] turns a `(inputs, outputs, predicate)` request
//! into an [`ExecutionPlan`]: the graph is pruned to what is reachable
//! and satisfiable, the survivors are ordered deterministically, and
//! eviction instructions are injected (pruning and sequencing live in
//! their own modules). Compiled plans are memoized per network; equal
//! requests return the same shared plan.
//!
//! # Example
//!
//! ```
//! use flowplan::{Network, Operation};
//!
//! let net = Network::new([
//!     Operation::new("double").needs(["x"]).provides(["2x"]),
//!     Operation::new("add").needs(["x", "2x"]).provides(["3x"]),
//! ])?;
//! let plan = net.compile(Some(&["x"]), Some(&["3x"]), None)?;
//! assert_eq!(plan.operations().count(), 2);
//! # Ok::<(), flowplan::GraphError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexSet;
use log::debug;
use petgraph::Direction::Outgoing;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::config::is_debug;
use crate::dag::{DepGraph, EdgeLink, NodeKind, iter_ops};
use crate::dep::Dep;
use crate::error::{GraphError, Result};
use crate::op::Operation;
use crate::plan::ExecutionPlan;
use crate::prune::prune_graph;
use crate::steps::build_execution_steps;

/// A node predicate filters operations out of a compile request.
///
/// The callback receives the operation and its `node_props`; returning
/// `Ok(false)` drops the operation node before pruning. The `tag`
/// stands in for the closure's identity in the plan-cache key, so give
/// equal tags only to equivalent predicates.
#[derive(Clone)]
pub struct Predicate {
    tag: String,
    f: Arc<
        dyn Fn(&Operation, &serde_json::Map<String, serde_json::Value>) -> anyhow::Result<bool>
            + Send
            + Sync,
    >,
}

impl Predicate {
    pub fn new(
        tag: impl Into<String>,
        f: impl Fn(&Operation, &serde_json::Map<String, serde_json::Value>) -> anyhow::Result<bool>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            f: Arc::new(f),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub(crate) fn eval(&self, op: &Operation) -> anyhow::Result<bool> {
        (self.f)(op, &op.node_props)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("tag", &self.tag).finish()
    }
}

/// Cache key of one compile request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PlanKey {
    inputs: Option<Vec<String>>,
    outputs: Option<Vec<String>>,
    predicate: Option<String>,
}

/// The immutable bipartite dependency graph of a set of operations.
/// See the [module docs](self).
pub struct Network {
    pub(crate) graph: DepGraph,
    /// Data name → node; stays valid for pruned clones of `graph`.
    pub(crate) data_nodes: HashMap<String, NodeIndex>,
    ops: Vec<Arc<Operation>>,
    needs: IndexSet<Dep>,
    provides: IndexSet<Dep>,
    cached_plans: Mutex<HashMap<PlanKey, Arc<ExecutionPlan>>>,
}

impl Network {
    /// Assemble a network from `operations`, in order.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateOperation`] when two operations share a
    /// name; [`GraphError::InvalidOperation`] for empty names, alias
    /// sources missing from the provides, or tombstones that escaped
    /// pipeline merging.
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Result<Self> {
        let mut net = Self {
            graph: DepGraph::default(),
            data_nodes: HashMap::new(),
            ops: Vec::new(),
            needs: IndexSet::new(),
            provides: IndexSet::new(),
            cached_plans: Mutex::new(HashMap::new()),
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut dupes = Vec::new();
        for op in operations {
            validate_operation(&op)?;
            if !seen.insert(op.name.clone()) {
                dupes.push(op.name.clone());
                continue;
            }
            let op = Arc::new(op);
            net.append_operation(&op);
            net.ops.push(op);
        }
        if !dupes.is_empty() {
            return Err(GraphError::DuplicateOperation(dupes));
        }

        let (needs, provides) = collect_requirements(&net.graph);
        net.needs = needs;
        net.provides = provides;
        Ok(net)
    }

    /// Insert `op` with its data nodes and typed edges: needs first,
    /// then the operation node, then provides, so node-insertion order
    /// reflects dependency order for the topological tie-break.
    fn append_operation(&mut self, op: &Arc<Operation>) -> NodeIndex {
        // Needs listing the same name twice (e.g. a value and its
        // sideffected form) collapse to one edge, last one winning.
        let mut need_links: Vec<(NodeIndex, EdgeLink)> = Vec::new();
        for dep in op.op_needs() {
            self.append_subdoc_chain(dep);
            let data = self.ensure_data(dep);
            let link = EdgeLink {
                optional: dep.is_optional(),
                sideffect: dep.is_sfx(),
                sfx_tokens: dep.sfx_tokens().to_vec(),
                keyword: dep.get_keyword().map(str::to_owned),
                ..EdgeLink::default()
            };
            match need_links.iter_mut().find(|(n, _)| *n == data) {
                Some(existing) => existing.1 = link,
                None => need_links.push((data, link)),
            }
        }

        let op_node = self.graph.add_node(NodeKind::Op(Arc::clone(op)));
        for (data, link) in need_links {
            self.graph.add_edge(data, op_node, link);
        }

        // Reverse-alias index, to label edges reaching aliased provides.
        let alias_sources: HashMap<&str, &str> = op
            .aliases
            .iter()
            .map(|(src, alias)| (alias.as_str(), src.as_str()))
            .collect();

        let mut provide_links: Vec<(NodeIndex, EdgeLink)> = Vec::new();
        for dep in op.op_provides() {
            self.append_subdoc_chain(&dep);
            let data = self.ensure_data(&dep);
            let link = EdgeLink {
                sideffect: dep.is_sfx(),
                sfx_tokens: dep.sfx_tokens().to_vec(),
                alias_of: alias_sources.get(dep.name()).map(|s| (*s).to_string()),
                ..EdgeLink::default()
            };
            match provide_links.iter_mut().find(|(n, _)| *n == data) {
                Some(existing) => existing.1 = link,
                None => provide_links.push((data, link)),
            }
        }
        for (data, link) in provide_links {
            self.graph.add_edge(op_node, data, link);
        }

        op_node
    }

    /// Materialize the sub-document chain of a hierarchical dep:
    /// `a/b/c` inserts `a → a/b → a/b/c` subdoc edges. Walks from the
    /// leaf edge and stops at the first one already present, since the
    /// path up to the root is then already inserted.
    fn append_subdoc_chain(&mut self, dep: &Dep) {
        let chain = dep.chain_names();
        if chain.len() < 2 {
            return;
        }
        let nodes: Vec<NodeIndex> = chain
            .iter()
            .map(|name| self.ensure_plain_data(name))
            .collect();
        for pair in nodes.windows(2).rev() {
            let (src, dst) = (pair[0], pair[1]);
            let known = self
                .graph
                .edges_directed(src, Outgoing)
                .any(|e| e.target() == dst && e.weight().subdoc);
            if known {
                break;
            }
            self.graph.add_edge(src, dst, EdgeLink::subdoc());
        }
    }

    fn ensure_plain_data(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.data_nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(NodeKind::Data {
            name: name.to_string(),
            sideffect: false,
        });
        self.data_nodes.insert(name.to_string(), idx);
        idx
    }

    fn ensure_data(&mut self, dep: &Dep) -> NodeIndex {
        let idx = self.ensure_plain_data(&dep.ident());
        if dep.is_sfx() {
            if let NodeKind::Data { sideffect, .. } = &mut self.graph[idx] {
                *sideffect = true;
            }
        }
        idx
    }

    /// All data the graph's operations consume; a name stays optional
    /// only when no operation requires it compulsorily.
    pub fn needs(&self) -> &IndexSet<Dep> {
        &self.needs
    }

    /// All data the graph's operations produce, in insertion order.
    pub fn provides(&self) -> &IndexSet<Dep> {
        &self.provides
    }

    /// The member operations, in insertion order.
    pub fn ops(&self) -> &[Arc<Operation>] {
        &self.ops
    }

    /// The full (unpruned) dependency graph.
    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    /// The graph node of a data name, if present.
    pub(crate) fn data_node(&self, name: &str) -> Option<NodeIndex> {
        self.data_nodes.get(name).copied()
    }

    /// Create or fetch from cache an execution plan for the given
    /// inputs/outputs.
    ///
    /// `inputs` is the collection of value names that will be given;
    /// `None` assumes every input leading to the `outputs`. `outputs`
    /// is the collection of names asked to compute; `None` keeps every
    /// reachable intermediate (and disables evictions). The `predicate`
    /// filters operations out beforehand (its tag participates in the
    /// cache key).
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownOutputs`] when an asked output is not a
    /// data node of the graph; [`GraphError::PredicateFailed`] when the
    /// predicate errors; [`GraphError::CyclicGraph`] when the needs do
    /// not form a DAG.
    pub fn compile(
        &self,
        inputs: Option<&[&str]>,
        outputs: Option<&[&str]>,
        predicate: Option<&Predicate>,
    ) -> Result<Arc<ExecutionPlan>> {
        let key = PlanKey {
            inputs: inputs.map(sorted_names),
            outputs: outputs.map(sorted_names),
            predicate: predicate.map(|p| p.tag().to_string()),
        };

        if let Some(plan) = self.cached_plans.lock().expect("plan cache").get(&key) {
            debug!("... compile cache-hit key: {key:?}");
            return Ok(Arc::clone(plan));
        }

        // Computed outside the cache lock; a racing thread recomputes
        // the identical plan and the first insert wins.
        let (pruned_dag, needs, provides) = prune_graph(self, inputs, outputs, predicate)?;
        let steps = build_execution_steps(
            self,
            &pruned_dag,
            key.outputs.as_deref().unwrap_or_default(),
        )?;
        let plan = Arc::new(ExecutionPlan::new(
            needs,
            provides,
            pruned_dag,
            steps,
            outputs.is_some(),
        ));

        let mut cache = self.cached_plans.lock().expect("plan cache");
        let plan = Arc::clone(cache.entry(key.clone()).or_insert(plan));
        debug!("... compile cache-updated key: {key:?}");
        Ok(plan)
    }
}

fn sorted_names(names: &[&str]) -> Vec<String> {
    let mut v: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
    v.sort();
    v.dedup();
    v
}

fn validate_operation(op: &Operation) -> Result<()> {
    if op.is_null() {
        return Err(GraphError::InvalidOperation {
            name: op.name.clone(),
            reason: "tombstones may only appear while merging pipelines".into(),
        });
    }
    if op.name.trim().is_empty() {
        return Err(GraphError::InvalidOperation {
            name: op.name.clone(),
            reason: "operation name must be non-empty".into(),
        });
    }
    for (src, alias) in &op.aliases {
        if !op.provides.iter().any(|p| p.name() == src) {
            return Err(GraphError::InvalidOperation {
                name: op.name.clone(),
                reason: format!("alias {alias:?} requires missing provide {src:?}"),
            });
        }
    }
    Ok(())
}

/// Retain the optionality of a data node only when every consuming
/// edge tolerates its absence; side-effects pass through unchanged,
/// everything else drops `optional`/`keyword` from the aggregate view.
pub(crate) fn optionalized(graph: &DepGraph, node: Option<NodeIndex>, dep: &Dep) -> Dep {
    let all_optional = match node {
        Some(n) => graph
            .edges_directed(n, Outgoing)
            .all(|e| e.weight().optional),
        None => false,
    };
    if all_optional {
        dep.clone().with_optional(true).with_keyword(None)
    } else if dep.is_sfx() {
        dep.clone()
    } else {
        dep.clone().with_optional(false).with_keyword(None)
    }
}

/// Collect & split the graph's data nodes into (possibly overlapping)
/// `needs` / `provides`.
pub(crate) fn collect_requirements(graph: &DepGraph) -> (IndexSet<Dep>, IndexSet<Dep>) {
    let mut needs = IndexSet::new();
    let mut provides = IndexSet::new();
    let data_index: HashMap<String, NodeIndex> = graph
        .node_indices()
        .filter_map(|n| graph[n].data_name().map(|name| (name.to_string(), n)))
        .collect();

    for (_, op) in iter_ops(graph) {
        provides.extend(op.op_provides());
        for dep in op.op_needs() {
            let node = data_index.get(dep.ident().as_str()).copied();
            needs.insert(optionalized(graph, node, dep));
        }
    }
    (needs, provides)
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_nodes = self.graph.node_count();
        let n_ops = self.ops.len();
        if is_debug() {
            let nodes: Vec<String> = self
                .graph
                .node_indices()
                .map(|n| format!("\n  +--{}", self.graph[n].label()))
                .collect();
            write!(f, "Network(x{n_nodes} nodes, x{n_ops} ops: {})", nodes.join(""))
        } else {
            let names: Vec<&str> = self.ops.iter().map(|op| op.name.as_str()).collect();
            write!(f, "Network(x{n_nodes} nodes, x{n_ops} ops: {})", names.join(", "))
        }
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
