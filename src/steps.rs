//! Step sequencing: order the pruned dag and inject evictions.
//!
//! Operations are emitted in topological order with the
//! operation-insertion index as the tie-break, so equal graphs always
//! produce bit-equal step sequences -- the property the plan cache and
//! any parallel executor rely on.
//!
//! After each operation two eviction rules run, freeing values as soon
//! as no later step and no asked output references them:
//!
//! - **unused upstream needs** -- a need whose whole sub-document chain
//!   is neither asked as output nor consumed by any later step;
//! - **pruned provides** -- provides the operation has in the full
//!   network but that were pruned from this plan.
//!
//! Evictions always target the chain *root* (the topmost sub-document
//! ancestor): a chain is evicted whole, or not at all. An eviction
//! repeating the immediately preceding step is skipped with a warning;
//! non-adjacent repeats are kept.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::config::is_skip_evictions;
use crate::dag::{DepGraph, chained_docs, has_node, root_doc, topo_sort};
use crate::error::Result;
use crate::network::Network;
use crate::op::Operation;

/// One entry of an execution plan: run an operation, or discard a data
/// value from the running solution.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Invoke the operation.
    Op(Arc<Operation>),
    /// Discard the named value (a chain root) to bound memory.
    Evict(String),
}

impl Step {
    pub fn is_evict(&self) -> bool {
        matches!(self, Step::Evict(_))
    }

    /// The operation, for `Step::Op` entries.
    pub fn as_op(&self) -> Option<&Arc<Operation>> {
        match self {
            Step::Op(op) => Some(op),
            Step::Evict(_) => None,
        }
    }

    /// The evicted name, for `Step::Evict` entries.
    pub fn evicted(&self) -> Option<&str> {
        match self {
            Step::Evict(name) => Some(name),
            Step::Op(_) => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Op(op) => write!(f, "{}", op.name),
            Step::Evict(name) => write!(f, "evict({name})"),
        }
    }
}

fn add_eviction(steps: &mut Vec<Step>, name: String) {
    if let Some(Step::Evict(last)) = steps.last() {
        if *last == name {
            warn!("Skipped dupe step {name:?} @ #{}.", steps.len());
            return;
        }
    }
    if steps.iter().any(|s| s.evicted() == Some(&name)) {
        // Happens when multiple ops produce the same pruned output.
        debug!("Re-evicting {name:?} @ #{}.", steps.len());
    }
    steps.push(Step::Evict(name));
}

/// Create the ordered operation & eviction steps of one plan.
///
/// `outputs` are the *asked* output names deciding whether (and which)
/// evict-instructions to add: with no asked outputs, or while the
/// skip-evictions flag is set, only operations are emitted.
pub(crate) fn build_execution_steps(
    net: &Network,
    pruned: &DepGraph,
    outputs: &[String],
) -> Result<Vec<Step>> {
    let ordered = topo_sort(pruned)?;

    if outputs.is_empty() || is_skip_evictions() {
        return Ok(ordered
            .iter()
            .filter_map(|&n| pruned[n].as_op())
            .map(|op| Step::Op(Arc::clone(op)))
            .collect());
    }

    let position: HashMap<NodeIndex, usize> =
        ordered.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    // Asked outputs with their whole chains: never evicted.
    let mut asked: HashSet<NodeIndex> = HashSet::new();
    for name in outputs {
        if let Some(idx) = net.data_node(name) {
            chained_docs(pruned, idx, &mut asked);
        }
    }

    let mut steps: Vec<Step> = Vec::new();
    for (i, &node) in ordered.iter().enumerate() {
        let Some(op) = pruned[node].as_op() else {
            continue;
        };
        steps.push(Step::Op(Arc::clone(op)));

        // Unused upstream needs: scan the predecessors of the
        // operation, in need-insertion order.
        let mut needs: Vec<NodeIndex> = pruned.neighbors_directed(node, Incoming).collect();
        needs.reverse();
        for need in needs {
            let mut acc = HashSet::new();
            let need_chain = chained_docs(pruned, need, &mut acc);

            // Not if any doc of the chain was asked as output.
            if need_chain.iter().any(|n| asked.contains(n)) {
                continue;
            }

            // Not if any doc of the chain is consumed further down.
            let used_later = need_chain.iter().any(|&doc| {
                pruned
                    .edges_directed(doc, Outgoing)
                    .filter(|e| !e.weight().subdoc)
                    .any(|e| position.get(&e.target()).is_some_and(|&p| p > i))
            });
            if !used_later {
                let root = root_doc(pruned, need);
                debug!(
                    "... adding evict-1 for not-to-be-used need-chain of #{i} {}.",
                    op.name
                );
                add_eviction(&mut steps, pruned[root].label().to_string());
            }
        }

        // Provides pruned out of this plan: present in the full
        // network but absent from the pruned dag.
        let mut provides: Vec<NodeIndex> = net.graph.neighbors_directed(node, Outgoing).collect();
        provides.reverse();
        for provide in provides {
            if !has_node(pruned, provide) {
                let name = net.graph[provide].label().to_string();
                debug!("... adding evict-2 for pruned-provide {name:?} of #{i} {}.", op.name);
                add_eviction(&mut steps, name);
            }
        }
    }

    Ok(steps)
}
