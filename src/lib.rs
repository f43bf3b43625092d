//! # Flowplan
//!
//! A **computation-graph compiler and execution planner** for Rust.
//! Declare named operations (each consuming and producing named
//! values), compose them into an immutable dependency network, and
//! compile `(inputs, outputs)` requests into deterministic, cached
//! execution plans -- ordered operation invocations interleaved with
//! memory-eviction instructions.
//!
//! ## Key Features
//!
//! - **Declarative operations** -- fluent records naming `needs` and
//!   `provides`; the graph is derived, never drawn by hand
//! - **Dependency modifiers** -- optional inputs, pure side-effects,
//!   sideffected values, keyword-bound parameters, hierarchical
//!   (`a/b/c`) sub-document names, and aliased provides
//! - **Pruning** -- each compile request cuts the graph to what is
//!   reachable from the asked outputs and satisfiable from the given
//!   inputs
//! - **Deterministic ordering** -- topological sort with
//!   operation-insertion order as the tie-break, bit-equal across runs
//! - **Evictions** -- values are discarded as soon as no later step or
//!   asked output references them, bounding peak memory
//! - **Plan caching** -- equal compile requests return the same shared
//!   plan
//! - **Pipeline composition** -- merge or nest whole pipelines,
//!   first-wins precedence, tombstones, rename policies
//!
//! ## Quick Start
//!
//! ```
//! use flowplan::{Network, Operation};
//!
//! # fn main() -> Result<(), flowplan::GraphError> {
//! let net = Network::new([
//!     Operation::new("op1").needs(["x"]).provides(["a"]),
//!     Operation::new("op2").needs(["x"]).provides(["b"]),
//!     Operation::new("op3").needs(["a", "b"]).provides(["y"]),
//! ])?;
//!
//! let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
//! let order: Vec<&str> = plan.operations().map(|op| op.name.as_str()).collect();
//! assert_eq!(order, ["op1", "op2", "op3"]);
//!
//! // `x` is evicted once nothing downstream needs it.
//! assert!(plan.evictions().any(|name| name == "x"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### `Operation`
//!
//! An [`Operation`] is a named unit of work declaring ordered `needs`
//! and `provides` (see [`Dep`] for the modifier vocabulary), plus
//! opaque policy flags (`endured`, `rescheduled`, `parallel`,
//! `marshalled`) that the planner hands through to whichever execution
//! engine walks the plan.
//!
//! ### `Network`
//!
//! A [`Network`] is the immutable bipartite graph of data and
//! operation nodes built from a list of operations. Once assembled it
//! only answers [`compile`](Network::compile) requests; plans are
//! memoized per network and shared via `Arc`.
//!
//! ### `ExecutionPlan`
//!
//! The compiled artifact: resolved needs/provides, the pruned
//! sub-graph, and the ordered [`Step`] sequence. The plan can
//! [`validate`](ExecutionPlan::validate) runtime arguments and
//! [`explain`](ExecutionPlan::explain) itself for humans.
//!
//! ### `Pipeline`
//!
//! A [`Pipeline`] packages merged operations (possibly from nested
//! pipelines, renamed or nested under their parent with [`Nest`])
//! together with narrowed outputs/predicate for later compilations.
//!
//! ## Execution & configuration
//!
//! Executing plans is deliberately out of scope: flowplan emits the
//! ordered steps, an engine of your choice runs them. The [`config`]
//! module carries the global policy bits such engines consult (abort,
//! parallel, marshal, endure, reschedule) -- the compiler itself reads
//! only the skip-evictions and debug flags.
//!
//! ## Module Overview
//!
//! - [`dep`] - dependency names and modifiers
//! - [`op`] - operation records
//! - [`network`] - graph assembly, requirements, compile + plan cache
//! - [`plan`] - execution plans, validation, explanation
//! - [`compose`] - pipelines, merging, rename/nest policies
//! - [`config`] - global execution flags
//! - [`testing`] - fixtures and assertions for tests

pub mod compose;
pub mod config;
pub mod dag;
pub mod dep;
pub mod error;
pub mod network;
pub mod op;
pub mod plan;
pub mod steps;
pub mod testing;

mod prune;

// General re-exports
pub use compose::{NameAction, Nest, Pipeline, PipelineBuilder, RenArgs, RenKind, compose};
pub use dag::{DepGraph, EdgeLink, NodeIndex, NodeKind};
pub use dep::Dep;
pub use error::GraphError;
pub use network::{Network, Predicate};
pub use op::Operation;
pub use plan::{ExecutionPlan, ExplainStep, PlanExplanation, StepKind};
pub use steps::Step;
