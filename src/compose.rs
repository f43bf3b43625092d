//! Compose pipelines by merging operations (and other pipelines) into
//! one network.
//!
//! A [`Pipeline`] packages a merged operation set, its [`Network`], and
//! any narrowed `outputs`/`predicate` to apply on future compilations.
//! Build one with [`Pipeline::builder`] (or the [`compose`] shortcut):
//!
//! ```
//! use flowplan::{Operation, Pipeline};
//!
//! let pipe = Pipeline::builder("graph")
//!     .operation(Operation::new("double").needs(["x"]).provides(["2x"]))
//!     .operation(Operation::new("sum").needs(["x", "2x"]).provides(["3x"]))
//!     .build()?;
//! let plan = pipe.compile(Some(&["x"]))?;
//! # Ok::<(), flowplan::GraphError>(())
//! ```
//!
//! # Merging & precedence
//!
//! Members are merged in order into a set keyed by operation **name**;
//! earlier entries take precedence over later same-named duplicates
//! (set behavior, contrary to a mapping overwrite). An explicit
//! tombstone ([`Operation::null`]) claims a name slot and then
//! vanishes, suppressing any later operation of that name.
//!
//! # Nesting & renaming
//!
//! The [`Nest`] policy rewrites member names before merging, so the
//! same sub-pipeline can be embedded twice without collisions.
//! [`Nest::Under`] prefixes every name with `<parent>.` (hierarchical
//! jsonp deps are left untouched); a [`Nest::With`] callback decides
//! per node via [`NameAction`]. Renamers preserve all dependency
//! modifiers.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::IndexSet;
use regex::Regex;
use serde_json::{Map, Value};

use crate::dep::Dep;
use crate::error::{GraphError, Result};
use crate::network::{Network, Predicate};
use crate::op::Operation;
use crate::plan::ExecutionPlan;

/// What a renamer decided for one node name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameAction {
    /// Use this name instead.
    Rename(String),
    /// Apply the default nest-under-parent policy.
    Nest,
    /// Leave the name untouched.
    Keep,
}

/// Which kind of name a renamer is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenKind {
    Op,
    Need,
    Provide,
    Alias,
}

impl fmt::Display for RenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenKind::Op => "op",
            RenKind::Need => "op.needs",
            RenKind::Provide => "op.provides",
            RenKind::Alias => "op.aliases",
        })
    }
}

/// The context handed to a [`Nest::With`] renamer callback.
#[derive(Clone, Copy, Debug)]
pub struct RenArgs<'a> {
    pub kind: RenKind,
    /// The current name (for deps, the bare data name).
    pub name: &'a str,
    /// The enclosing pipeline's name when merging a nested pipeline.
    pub parent: Option<&'a str>,
}

/// The rename/nest policy applied while merging.
#[derive(Clone, Default)]
pub enum Nest {
    /// Plain operation merging; names untouched.
    #[default]
    Merge,
    /// Nest every member under its parent pipeline's name.
    Under,
    /// Rename the listed names; everything else is kept.
    Renames(HashMap<String, String>),
    /// Decide per node with a callback.
    With(Arc<dyn Fn(&RenArgs<'_>) -> NameAction + Send + Sync>),
}

impl Nest {
    /// A [`Nest::With`] policy from a plain closure.
    pub fn with(f: impl Fn(&RenArgs<'_>) -> NameAction + Send + Sync + 'static) -> Self {
        Nest::With(Arc::new(f))
    }
}

impl fmt::Debug for Nest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nest::Merge => f.write_str("Nest::Merge"),
            Nest::Under => f.write_str("Nest::Under"),
            Nest::Renames(map) => f.debug_tuple("Nest::Renames").field(map).finish(),
            Nest::With(_) => f.write_str("Nest::With(..)"),
        }
    }
}

fn resolve_name(
    nest: &Nest,
    kind: RenKind,
    name: &str,
    parent: Option<&str>,
    is_jsonp: bool,
) -> Result<Option<String>> {
    let action = match nest {
        Nest::Merge => NameAction::Keep,
        Nest::Under => NameAction::Nest,
        Nest::Renames(map) => map
            .get(name)
            .map(|n| NameAction::Rename(n.clone()))
            .unwrap_or(NameAction::Keep),
        Nest::With(f) => f(&RenArgs { kind, name, parent }),
    };
    match action {
        NameAction::Keep => Ok(None),
        NameAction::Rename(renamed) => {
            if renamed.trim().is_empty() {
                Err(GraphError::InvalidRenamer {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    renamed,
                })
            } else {
                Ok(Some(renamed))
            }
        }
        // Default nesting prefixes with the parent's name, except
        // hierarchical (jsonp) names, which are left untouched.
        NameAction::Nest => Ok(if is_jsonp {
            None
        } else {
            parent.map(|p| format!("{p}.{name}"))
        }),
    }
}

fn rename_dep(dep: &Dep, nest: &Nest, kind: RenKind, parent: Option<&str>) -> Result<Dep> {
    match resolve_name(nest, kind, dep.name(), parent, dep.is_jsonp())? {
        Some(new) => Ok(dep.renamed(new)),
        None => Ok(dep.clone()),
    }
}

fn rename_operation(op: Operation, nest: &Nest, parent: Option<&str>) -> Result<Operation> {
    if matches!(nest, Nest::Merge) {
        return Ok(op);
    }
    let mut renamed = op.clone();
    if let Some(new) = resolve_name(nest, RenKind::Op, &op.name, parent, false)? {
        renamed.name = new;
    }
    renamed.needs = op
        .needs
        .iter()
        .map(|d| rename_dep(d, nest, RenKind::Need, parent))
        .collect::<Result<_>>()?;
    renamed.provides = op
        .provides
        .iter()
        .map(|d| rename_dep(d, nest, RenKind::Provide, parent))
        .collect::<Result<_>>()?;
    renamed.aliases = op
        .aliases
        .iter()
        .map(|(src, alias)| {
            // The source must track its provide's new name.
            let src_new = resolve_name(nest, RenKind::Provide, src, parent, src.contains('/'))?
                .unwrap_or_else(|| src.clone());
            let alias_new = resolve_name(nest, RenKind::Alias, alias, parent, alias.contains('/'))?
                .unwrap_or_else(|| alias.clone());
            Ok((src_new, alias_new))
        })
        .collect::<Result<_>>()?;
    Ok(renamed)
}

enum Item {
    Op(Operation),
    Pipeline { name: String, ops: Vec<Arc<Operation>> },
}

/// Accumulates operations, nested pipelines and policies, then builds
/// a [`Pipeline`]. See the [module docs](self).
pub struct PipelineBuilder {
    name: String,
    items: Vec<Item>,
    outputs: Option<Vec<String>>,
    predicate: Option<Predicate>,
    endured: Option<bool>,
    rescheduled: Option<bool>,
    parallel: Option<bool>,
    marshalled: Option<bool>,
    node_props: Map<String, Value>,
    nest: Nest,
    auto_name: bool,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            outputs: None,
            predicate: None,
            endured: None,
            rescheduled: None,
            parallel: None,
            marshalled: None,
            node_props: Map::new(),
            nest: Nest::Merge,
            auto_name: false,
        }
    }

    /// Add one member operation.
    pub fn operation(mut self, op: Operation) -> Self {
        self.items.push(Item::Op(op));
        self
    }

    /// Add several member operations.
    pub fn operations(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.items.extend(ops.into_iter().map(Item::Op));
        self
    }

    /// Merge another pipeline's operations (its name becomes the
    /// `parent` the [`Nest`] policy sees for those members).
    pub fn pipeline(mut self, pipeline: &Pipeline) -> Self {
        self.items.push(Item::Pipeline {
            name: pipeline.name.clone(),
            ops: pipeline.ops.clone(),
        });
        self
    }

    /// Narrow future compilations to these outputs.
    pub fn outputs<S: Into<String>>(mut self, outputs: impl IntoIterator<Item = S>) -> Self {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Filter operations of future compilations with this predicate.
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Apply endurance to all member operations.
    pub fn endured(mut self, endured: bool) -> Self {
        self.endured = Some(endured);
        self
    }

    /// Apply rescheduling to all member operations.
    pub fn rescheduled(mut self, rescheduled: bool) -> Self {
        self.rescheduled = Some(rescheduled);
        self
    }

    /// Mark all member operations for parallel execution.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Mark all member operations for marshalling.
    pub fn marshalled(mut self, marshalled: bool) -> Self {
        self.marshalled = Some(marshalled);
        self
    }

    /// Overlay one graph-node attribute onto every member operation.
    pub fn node_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.node_props.insert(key.into(), value.into());
        self
    }

    /// Set the rename/nest policy.
    pub fn nest(mut self, nest: Nest) -> Self {
        self.nest = nest;
        self
    }

    /// Derive a distinct name for the built pipeline: a stable uid of
    /// the narrowed outputs/predicate/flags appended as `<base>-<uid>`
    /// (any previous `-<digits>` suffix is stripped first).
    pub fn auto_name(mut self) -> Self {
        self.auto_name = true;
        self
    }

    fn overlay(&self, mut op: Operation) -> Operation {
        if let Some(v) = self.endured {
            op.endured = Some(v);
        }
        if let Some(v) = self.rescheduled {
            op.rescheduled = Some(v);
        }
        if let Some(v) = self.parallel {
            op.parallel = Some(v);
        }
        if let Some(v) = self.marshalled {
            op.marshalled = Some(v);
        }
        for (k, v) in &self.node_props {
            op.node_props.insert(k.clone(), v.clone());
        }
        op
    }

    fn devise_name(&self) -> String {
        if !self.auto_name {
            return self.name.clone();
        }
        let mut h = DefaultHasher::new();
        self.outputs.hash(&mut h);
        self.predicate.as_ref().map(Predicate::tag).hash(&mut h);
        (self.endured, self.rescheduled, self.parallel, self.marshalled).hash(&mut h);
        let uid = format!("{:x}", h.finish());
        let uid = &uid[..uid.len().min(7)];

        let suffixed = Regex::new(r"^(.*)-(\d+)$").expect("suffix pattern");
        let base = suffixed
            .captures(&self.name)
            .map_or(self.name.as_str(), |c| c.get(1).expect("base group").as_str());
        format!("{base}-{uid}")
    }

    /// Merge the members and assemble the pipeline's network.
    ///
    /// # Errors
    ///
    /// [`GraphError::EmptyPipeline`] when no (non-tombstone) operations
    /// remain; [`GraphError::InvalidRenamer`] when the nest policy
    /// produces an empty name; plus any [`Network::new`] error.
    pub fn build(self) -> Result<Pipeline> {
        if self.name.trim().is_empty() {
            return Err(GraphError::InvalidOperation {
                name: self.name.clone(),
                reason: "pipeline name must be non-empty".into(),
            });
        }

        // Preserve given node order; earlier same-named entries win.
        let mut merged: IndexMap<String, Operation> = IndexMap::new();
        for item in &self.items {
            match item {
                Item::Op(op) => {
                    let op = rename_operation(self.overlay(op.clone()), &self.nest, None)?;
                    merged.entry(op.name.clone()).or_insert(op);
                }
                Item::Pipeline { name, ops } => {
                    for op in ops {
                        let op = rename_operation(
                            self.overlay(op.as_ref().clone()),
                            &self.nest,
                            Some(name.as_str()),
                        )?;
                        merged.entry(op.name.clone()).or_insert(op);
                    }
                }
            }
        }
        merged.retain(|_, op| !op.is_null());

        let name = self.devise_name();
        if merged.is_empty() {
            return Err(GraphError::EmptyPipeline(name));
        }

        let net = Network::new(merged.into_values())?;
        let ops = net.ops().to_vec();
        Ok(Pipeline {
            name,
            ops,
            net: Arc::new(net),
            outputs: self.outputs,
            predicate: self.predicate,
        })
    }
}

/// An operation-like object wrapping a whole network of operations,
/// with optional narrowed outputs/predicate for future compilations.
pub struct Pipeline {
    name: String,
    ops: Vec<Arc<Operation>>,
    net: Arc<Network>,
    outputs: Option<Vec<String>>,
    predicate: Option<Predicate>,
}

impl Pipeline {
    /// Start building a pipeline with the given name.
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The merged member operations, in precedence order.
    pub fn ops(&self) -> &[Arc<Operation>] {
        &self.ops
    }

    /// The assembled network.
    pub fn network(&self) -> &Network {
        &self.net
    }

    /// The pipeline's aggregate needs (delegated to the network).
    pub fn needs(&self) -> &IndexSet<Dep> {
        self.net.needs()
    }

    /// The pipeline's aggregate provides (delegated to the network).
    pub fn provides(&self) -> &IndexSet<Dep> {
        self.net.provides()
    }

    /// Outputs narrowed at build time, if any.
    pub fn outputs(&self) -> Option<&[String]> {
        self.outputs.as_deref()
    }

    /// Compile a plan for the given inputs, using the outputs and
    /// predicate narrowed earlier (see [`Network::compile`]).
    pub fn compile(&self, inputs: Option<&[&str]>) -> Result<Arc<ExecutionPlan>> {
        let outs: Option<Vec<&str>> = self
            .outputs
            .as_ref()
            .map(|v| v.iter().map(String::as_str).collect());
        self.net.compile(inputs, outs.as_deref(), self.predicate.as_ref())
    }

    /// Compile a plan overriding the narrowed outputs/predicate.
    pub fn compile_with(
        &self,
        inputs: Option<&[&str]>,
        outputs: Option<&[&str]>,
        predicate: Option<&Predicate>,
    ) -> Result<Arc<ExecutionPlan>> {
        self.net.compile(inputs, outputs, predicate)
    }

    /// Re-open a builder seeded with this pipeline's operations, name,
    /// outputs and predicate, to narrow or re-flag a clone without
    /// re-listing its members.
    pub fn withset(&self) -> PipelineBuilder {
        let mut builder = PipelineBuilder::new(self.name.clone());
        builder.items = self
            .ops
            .iter()
            .map(|op| Item::Op(op.as_ref().clone()))
            .collect();
        builder.outputs = self.outputs.clone();
        builder.predicate = self.predicate.clone();
        builder
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs: Vec<String> = self.needs().iter().map(ToString::to_string).collect();
        let provides: Vec<String> = self.provides().iter().map(ToString::to_string).collect();
        let ops: Vec<&str> = self.ops.iter().map(|op| op.name.as_str()).collect();
        write!(
            f,
            "Pipeline({:?}, needs={needs:?}, provides={provides:?}, x{} ops: {})",
            self.name,
            ops.len(),
            ops.join(", ")
        )
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Merge operations into a new pipeline, the short way; equivalent to
/// `Pipeline::builder(name).operations(ops).build()`.
pub fn compose(
    name: impl Into<String>,
    operations: impl IntoIterator<Item = Operation>,
) -> Result<Pipeline> {
    Pipeline::builder(name).operations(operations).build()
}
