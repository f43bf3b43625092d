//! Execution plans: the compiled, immutable output of [`Network::compile`].
//!
//! A plan owns the pruned dependency dag, the resolved needs/provides
//! of its request, and the ordered [`Step`] sequence the execution
//! engine walks. Plans also carry the runtime-argument checks the
//! engine performs before running ([`ExecutionPlan::validate`]) and a
//! human-readable rendering ([`ExecutionPlan::explain`]).
//!
//! [`Network::compile`]: crate::Network::compile

use std::fmt;
use std::fmt::{Formatter, Result as FormatResult};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexSet;
use serde::Serialize;

use crate::config::is_debug;
use crate::dag::DepGraph;
use crate::dep::Dep;
use crate::error::{GraphError, Result};
use crate::op::Operation;
use crate::steps::Step;

/// A compiled execution plan. See the [module docs](self).
pub struct ExecutionPlan {
    needs: IndexSet<Dep>,
    provides: IndexSet<Dep>,
    dag: DepGraph,
    steps: Vec<Step>,
    asked_outs: bool,
}

impl ExecutionPlan {
    pub(crate) fn new(
        needs: IndexSet<Dep>,
        provides: IndexSet<Dep>,
        dag: DepGraph,
        steps: Vec<Step>,
        asked_outs: bool,
    ) -> Self {
        Self {
            needs,
            provides,
            dag,
            steps,
            asked_outs,
        }
    }

    /// The inputs this plan will consume, optionality resolved.
    pub fn needs(&self) -> &IndexSet<Dep> {
        &self.needs
    }

    /// The outputs this plan may produce.
    pub fn provides(&self) -> &IndexSet<Dep> {
        &self.provides
    }

    /// The pruned sub-graph the steps were derived from.
    pub fn dag(&self) -> &DepGraph {
        &self.dag
    }

    /// The ordered operation & eviction steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether `outputs` were explicitly asked at compile time (the
    /// execution engine uses this to decide result defaults).
    pub fn asked_outs(&self) -> bool {
        self.asked_outs
    }

    /// The operation steps only, in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.steps.iter().filter_map(Step::as_op)
    }

    /// The evicted names only, in execution order.
    pub fn evictions(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(Step::evicted)
    }

    /// Check this plan against the actual runtime arguments.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnsolvableGraph`] when the plan contains no
    ///   operations at all;
    /// - [`GraphError::NeedsMoreInputs`] when a compulsory
    ///   (non-optional, value-carrying) need is missing from `inputs`;
    /// - [`GraphError::UnreachableOutputs`] when an asked output is not
    ///   among the plan's provides.
    pub fn validate(&self, inputs: &[&str], outputs: Option<&[&str]>) -> Result<()> {
        if self.operations().next().is_none() {
            return Err(GraphError::UnsolvableGraph {
                inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
                outputs: outputs
                    .unwrap_or_default()
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            });
        }

        let missing: Vec<String> = self
            .needs
            .iter()
            .filter(|d| !d.is_optional() && !d.is_pure_sfx())
            .map(|d| d.ident())
            .filter(|ident| !inputs.contains(&ident.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::NeedsMoreInputs(missing));
        }

        if let Some(outs) = outputs {
            let unreachable: Vec<String> = outs
                .iter()
                .filter(|o| !self.provides.iter().any(|p| p.ident() == **o))
                .map(|o| (*o).to_string())
                .collect();
            if !unreachable.is_empty() {
                return Err(GraphError::UnreachableOutputs {
                    inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
                    outputs: unreachable,
                });
            }
        }
        Ok(())
    }

    /// Generate a detailed, printable explanation of this plan:
    /// step-by-step sequence, per-operation needs/provides, and
    /// summary counts.
    #[must_use]
    pub fn explain(&self) -> PlanExplanation {
        let mut steps = Vec::with_capacity(self.steps.len());
        let mut op_count = 0;
        let mut evict_count = 0;

        for (idx, step) in self.steps.iter().enumerate() {
            let explained = match step {
                Step::Op(op) => {
                    op_count += 1;
                    ExplainStep {
                        step: idx + 1,
                        kind: StepKind::Operation,
                        name: op.name.clone(),
                        needs: op.needs.iter().map(ToString::to_string).collect(),
                        provides: op.op_provides().iter().map(ToString::to_string).collect(),
                    }
                }
                Step::Evict(name) => {
                    evict_count += 1;
                    ExplainStep {
                        step: idx + 1,
                        kind: StepKind::Evict,
                        name: name.clone(),
                        needs: Vec::new(),
                        provides: Vec::new(),
                    }
                }
            };
            steps.push(explained);
        }

        PlanExplanation {
            steps,
            op_count,
            evict_count,
            needs: self.needs.iter().map(ToString::to_string).collect(),
            provides: self.provides.iter().map(ToString::to_string).collect(),
            asked_outs: self.asked_outs,
        }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let needs: Vec<String> = self.needs.iter().map(ToString::to_string).collect();
        let provides: Vec<String> = self.provides.iter().map(ToString::to_string).collect();
        if is_debug() {
            write!(
                f,
                "ExecutionPlan(needs={needs:?}, provides={provides:?}, x{} steps:",
                self.steps.len()
            )?;
            for step in &self.steps {
                write!(f, "\n  +--{step}")?;
            }
            write!(f, ")")
        } else {
            let names: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
            write!(
                f,
                "ExecutionPlan(needs={needs:?}, provides={provides:?}, x{} steps: {})",
                self.steps.len(),
                names.join(", ")
            )
        }
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        fmt::Display::fmt(self, f)
    }
}

/// What one explained step does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Operation,
    Evict,
}

/// A single step of a plan explanation.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainStep {
    /// Position in the execution sequence (1-based).
    pub step: usize,
    pub kind: StepKind,
    /// Operation name, or the evicted value's name.
    pub name: String,
    /// The operation's declared needs (empty for evictions).
    pub needs: Vec<String>,
    /// The operation's provides, aliases included (empty for evictions).
    pub provides: Vec<String>,
}

/// Detailed explanation of an execution plan.
///
/// Render with `Display`, or persist next to run artifacts with
/// [`PlanExplanation::save_to_file`].
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplanation {
    /// The ordered steps.
    pub steps: Vec<ExplainStep>,
    /// Number of operation steps.
    pub op_count: usize,
    /// Number of eviction steps.
    pub evict_count: usize,
    /// The plan's resolved needs.
    pub needs: Vec<String>,
    /// The plan's resolved provides.
    pub provides: Vec<String>,
    /// Whether outputs were explicitly asked.
    pub asked_outs: bool,
}

impl PlanExplanation {
    /// Write the explanation as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for PlanExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "╔═══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                     EXECUTION PLAN                            ║"
        )?;
        writeln!(
            f,
            "╚═══════════════════════════════════════════════════════════════╝"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ SUMMARY ────────────────────────────────────────────────────┐"
        )?;
        writeln!(f, "│ Operations:        {:>10}", self.op_count)?;
        writeln!(f, "│ Evictions:         {:>10}", self.evict_count)?;
        writeln!(f, "│ Needs:             {}", self.needs.join(", "))?;
        writeln!(f, "│ Provides:          {}", self.provides.join(", "))?;
        writeln!(
            f,
            "│ Asked Outputs:     {:>10}",
            if self.asked_outs { "yes" } else { "no" }
        )?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ EXECUTION STEPS ────────────────────────────────────────────┐"
        )?;
        for step in &self.steps {
            writeln!(f, "│")?;
            match step.kind {
                StepKind::Operation => {
                    writeln!(f, "│ Step {}: {}", step.step, step.name)?;
                    if !step.needs.is_empty() {
                        writeln!(f, "│   needs: [{}]", step.needs.join(", "))?;
                    }
                    if !step.provides.is_empty() {
                        writeln!(f, "│   provides: [{}]", step.provides.join(", "))?;
                    }
                }
                StepKind::Evict => {
                    writeln!(f, "│ Step {}: evict({})", step.step, step.name)?;
                }
            }
        }
        writeln!(f, "│")?;
        write!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )
    }
}
