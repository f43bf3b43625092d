//! Error taxonomy for network assembly, compilation and plan validation.
//!
//! Every failure surfaced by this crate is synchronous and carries the
//! offending names, so callers can report precisely which operation,
//! output or dependency broke the request.

use thiserror::Error;

/// Errors raised while building networks, composing pipelines,
/// compiling plans, or validating plan arguments.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The same operation name was inserted into a network twice.
    #[error("Operations may only be added once, dupes: {0:?}")]
    DuplicateOperation(Vec<String>),

    /// `compile` was asked for outputs that are not data nodes of the graph.
    #[error("Unknown output nodes: {0:?}")]
    UnknownOutputs(Vec<String>),

    /// The needs of the assembled operations form a cycle.
    #[error("Cyclic graph, operations in cycle: {0:?}")]
    CyclicGraph(Vec<String>),

    /// An operation record failed basic shape checks.
    #[error("Invalid operation {name:?}: {reason}")]
    InvalidOperation { name: String, reason: String },

    /// A renamer produced an empty or otherwise unusable name.
    #[error("Invalid renamer result {renamed:?} for {kind} node {name:?}")]
    InvalidRenamer {
        kind: String,
        name: String,
        renamed: String,
    },

    /// A pipeline was composed from zero surviving operations.
    #[error("Pipeline {0:?} has no operations to compose")]
    EmptyPipeline(String),

    /// The node predicate returned an error for some operation node.
    #[error("Node-predicate({predicate}) failed on node {node:?}: {source}")]
    PredicateFailed {
        predicate: String,
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// A plan without any operation steps cannot run.
    #[error("Unsolvable graph: no operations left for inputs {inputs:?} & outputs {outputs:?}")]
    UnsolvableGraph {
        inputs: Vec<String>,
        outputs: Vec<String>,
    },

    /// Compulsory plan needs are missing from the given inputs.
    #[error("Plan needs more inputs: {0:?}")]
    NeedsMoreInputs(Vec<String>),

    /// The plan cannot produce some of the asked outputs.
    #[error("Unreachable outputs {outputs:?} for given inputs {inputs:?}")]
    UnreachableOutputs {
        inputs: Vec<String>,
        outputs: Vec<String>,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
