//! Pruning: cut a network's graph down to one compile request.
//!
//! Given concrete `inputs`/`outputs` (either may be absent, meaning
//! "infer from the network") and an optional node predicate, the pruner
//! determines which operations must run:
//!
//! 1. predicate-filtered operation nodes are dropped;
//! 2. incoming (non-subdoc) edges of every *given* input are broken --
//!    a supplied value makes its producers unnecessary unless they are
//!    consumed elsewhere;
//! 3. when outputs are asked, the graph is restricted to the ancestors
//!    of those outputs (and their sub-document chains);
//! 4. operations left unsatisfied -- missing a compulsory need, or with
//!    every provide pruned -- are eliminated in one topological pass;
//! 5. the surviving nodes are re-extracted from the *original* graph
//!    (broken edges restored), isolated data nodes dropped, and the
//!    request's needs/provides re-resolved against the survivors.
//!
//! The pass order is intentional: breaking edges first lets the
//! unsatisfied pass discover producers that lost every consumer, while
//! ancestor-restriction works on the unbroken graph so that shared
//! producers survive when some other path still needs them.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use log::info;
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::dag::{
    DepGraph, NodeKind, ancestors, chained_docs, chained_docs_of, has_node, remove_isolates,
    topo_sort,
};
use crate::dep::Dep;
use crate::error::{GraphError, Result};
use crate::network::{Network, Predicate, optionalized};

/// Prune `net.graph` for one compile request; returns the pruned dag
/// plus the resolved needs/provides. See the [module docs](self).
pub(crate) fn prune_graph(
    net: &Network,
    inputs: Option<&[&str]>,
    outputs: Option<&[&str]>,
    predicate: Option<&Predicate>,
) -> Result<(DepGraph, IndexSet<Dep>, IndexSet<Dep>)> {
    // When `inputs` is None every possible input node must be kept:
    // edge-breaking is skipped, while `satisfied` is filled with all
    // candidate inputs so the unsatisfied pass assumes them given.
    let (satisfied, resolved_outputs): (IndexSet<Dep>, Option<IndexSet<Dep>>) =
        match (inputs, outputs) {
            (None, None) => (net.needs().clone(), Some(net.provides().clone())),
            (None, Some(outs)) => {
                check_unknown_outputs(net, outs)?;
                let out_names: HashSet<&str> = outs.iter().copied().collect();
                let satisfied = net
                    .needs()
                    .iter()
                    .filter(|d| !out_names.contains(d.ident().as_str()))
                    .cloned()
                    .collect();
                (satisfied, Some(outs.iter().map(|n| Dep::new(*n)).collect()))
            }
            (Some(ins), outs) => {
                if let Some(outs) = outs {
                    check_unknown_outputs(net, outs)?;
                }
                // Given inputs not in the graph are silently ignored.
                let satisfied = ins
                    .iter()
                    .filter(|n| net.data_node(n).is_some())
                    .map(|n| Dep::new(*n))
                    .collect();
                (
                    satisfied,
                    outs.map(|o| o.iter().map(|n| Dep::new(*n)).collect()),
                )
            }
        };

    let mut broken = net.graph.clone();

    if let Some(predicate) = predicate {
        apply_graph_predicate(&mut broken, predicate)?;
    }

    // Break the incoming edges of all given inputs: nodes producing a
    // given value drop out later unless consumed elsewhere.
    if let Some(ins) = inputs {
        for name in ins {
            let Some(idx) = net.data_node(name) else {
                continue;
            };
            if !has_node(&broken, idx) {
                continue;
            }
            let incoming: Vec<_> = broken
                .edges_directed(idx, Incoming)
                .filter(|e| !e.weight().subdoc)
                .map(|e| e.id())
                .collect();
            for eid in incoming {
                broken.remove_edge(eid);
            }
        }
    }

    // Restrict to nodes that can reach an asked output. Ancestors are
    // collected on the unbroken graph; producers of given inputs fall
    // out in the unsatisfied pass instead.
    if let Some(outs) = &resolved_outputs {
        let mut ending_in_outputs: HashSet<NodeIndex> = HashSet::new();
        for out in outs {
            let Some(idx) = net.data_node(&out.ident()) else {
                continue;
            };
            for doc in chained_docs(&net.graph, idx, &mut ending_in_outputs) {
                ending_in_outputs.extend(ancestors(&net.graph, doc));
            }
        }
        let irrelevant: Vec<&str> = broken
            .node_indices()
            .filter(|n| !ending_in_outputs.contains(n))
            .filter_map(|n| broken[n].as_op().map(|op| op.name.as_str()))
            .collect();
        if !irrelevant.is_empty() {
            info!("... dropping output-irrelevant ops {irrelevant:?}.");
        }
        broken.retain_nodes(|_, n| ending_in_outputs.contains(&n));
    }

    let satisfied_nodes: Vec<NodeIndex> = satisfied
        .iter()
        .filter_map(|d| net.data_node(&d.ident()))
        .collect();
    let unsatisfied = unsatisfied_operations(&broken, &satisfied_nodes)?;
    if !unsatisfied.is_empty() {
        let names: Vec<&str> = unsatisfied
            .iter()
            .filter_map(|n| broken[*n].as_op().map(|op| op.name.as_str()))
            .collect();
        info!("... dropping unsatisfied ops {names:?}.");
    }

    // Re-extract the survivors from the original graph, restoring the
    // broken edges, then clean unlinked data nodes.
    let survivors: HashSet<NodeIndex> = broken
        .node_indices()
        .filter(|n| !unsatisfied.contains(n))
        .collect();
    let mut pruned = net.graph.clone();
    pruned.retain_nodes(|_, n| survivors.contains(&n));
    remove_isolates(&mut pruned);

    let needs: IndexSet<Dep> = satisfied
        .iter()
        .filter_map(|dep| {
            let node = net.data_node(&dep.ident()).filter(|&n| has_node(&pruned, n))?;
            Some(optionalized(&pruned, Some(node), dep))
        })
        .collect();

    let provides: IndexSet<Dep> = match resolved_outputs {
        // Open-ended request: every produced value that is neither an
        // input nor a side-effect.
        None => net
            .provides()
            .iter()
            .filter(|p| {
                !needs.contains(*p)
                    && !p.is_sfx()
                    && net
                        .data_node(&p.ident())
                        .is_some_and(|n| has_node(&pruned, n))
            })
            .cloned()
            .collect(),
        // Filter-out asked outputs that did not survive pruning.
        Some(outs) => outs
            .into_iter()
            .filter(|p| {
                net.data_node(&p.ident())
                    .is_some_and(|n| has_node(&pruned, n))
            })
            .collect(),
    };

    Ok((pruned, needs, provides))
}

fn check_unknown_outputs(net: &Network, outputs: &[&str]) -> Result<()> {
    let unknown: Vec<String> = outputs
        .iter()
        .filter(|n| net.data_node(n).is_none())
        .map(|n| (*n).to_string())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(GraphError::UnknownOutputs(unknown))
    }
}

/// Drop operation nodes the predicate rejects; a predicate error is
/// rethrown naming the predicate and the offending node.
fn apply_graph_predicate(g: &mut DepGraph, predicate: &Predicate) -> Result<()> {
    let mut to_del = Vec::new();
    for n in g.node_indices() {
        if let NodeKind::Op(op) = &g[n] {
            match predicate.eval(op) {
                Ok(true) => {}
                Ok(false) => to_del.push(n),
                Err(source) => {
                    return Err(GraphError::PredicateFailed {
                        predicate: predicate.tag().to_string(),
                        node: op.name.clone(),
                        source,
                    });
                }
            }
        }
    }
    if !to_del.is_empty() {
        let names: Vec<&str> = to_del
            .iter()
            .filter_map(|n| g[*n].as_op().map(|op| op.name.as_str()))
            .collect();
        info!("... predicate filtered out {names:?}.");
    }
    for n in to_del {
        g.remove_node(n);
    }
    Ok(())
}

/// Traverse the topologically sorted dag collecting unsatisfied
/// operations: those missing at least one compulsory need, or whose
/// every provide edge was pruned away (nothing downstream wants them).
///
/// Because the dag is visited in topological order, all of an
/// operation's needs are accounted before the operation itself comes
/// up, so satisfaction is decided in a single pass.
fn unsatisfied_operations(g: &DepGraph, inputs: &[NodeIndex]) -> Result<Vec<NodeIndex>> {
    // Data that will exist: the given inputs and their whole chains.
    let mut ok_data: HashSet<NodeIndex> = HashSet::new();
    chained_docs_of(g, inputs.iter().copied(), &mut ok_data);

    // operation → needs accounted so far.
    let mut op_satisfaction: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
    let mut unsatisfied = Vec::new();

    for node in topo_sort(g)? {
        match &g[node] {
            NodeKind::Op(_) => {
                let provides: Vec<NodeIndex> = g.neighbors_directed(node, Outgoing).collect();
                if provides.is_empty() {
                    // Ended up providing no output.
                    unsatisfied.push(node);
                    continue;
                }
                let real_needs: HashSet<NodeIndex> = g
                    .edges_directed(node, Incoming)
                    .filter(|e| !e.weight().optional)
                    .map(|e| e.source())
                    .collect();
                let accounted = op_satisfaction.get(&node);
                if real_needs
                    .iter()
                    .all(|n| accounted.is_some_and(|s| s.contains(n)))
                {
                    // Satisfied; its outputs (and their chains) will exist.
                    chained_docs_of(g, provides, &mut ok_data);
                } else {
                    // Partial inputs.
                    unsatisfied.push(node);
                }
            }
            NodeKind::Data { .. } => {
                if ok_data.contains(&node) {
                    for succ in g.neighbors_directed(node, Outgoing) {
                        if g[succ].is_op() {
                            op_satisfaction.entry(succ).or_default().insert(node);
                        }
                    }
                }
            }
        }
    }
    Ok(unsatisfied)
}
