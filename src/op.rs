//! Operation records: the unit of work a network schedules.
//!
//! An [`Operation`] declares what it consumes ([`needs`](Operation::needs))
//! and what it produces ([`provides`](Operation::provides)), plus:
//!
//! - `aliases` -- extra names re-publishing a provide of the same
//!   operation ([`Operation::op_provides`] expands them, inheriting the
//!   source's modifiers);
//! - opaque policy flags (`endured`, `rescheduled`, `parallel`,
//!   `marshalled`, `returns_dict`) that the compiler propagates to the
//!   execution engine without interpreting;
//! - `node_props` -- an arbitrary JSON map attached to the operation's
//!   graph node, available to node predicates at compile time.
//!
//! Operations are immutable value objects shared by reference once a
//! network is built; identity (equality, hashing) is by `name` alone.
//!
//! # Example
//!
//! ```
//! use flowplan::{Dep, Operation};
//!
//! let op = Operation::new("sum")
//!     .needs(["a", "b"])
//!     .provides(["a+b"])
//!     .alias("a+b", "total");
//! assert_eq!(op.op_provides().len(), 2);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::dep::Dep;

/// A named operation declaring its data dependencies. See the
/// [module docs](self).
#[derive(Clone, Debug, Default)]
pub struct Operation {
    /// Unique name within a network; the operation's identity.
    pub name: String,
    /// Ordered inputs the operation consumes.
    pub needs: Vec<Dep>,
    /// Ordered outputs the operation produces.
    pub provides: Vec<Dep>,
    /// `(source_provide, alias)` pairs re-publishing provides under
    /// extra names.
    pub aliases: Vec<(String, String)>,
    /// Keep executing the plan even if this operation fails.
    pub endured: Option<bool>,
    /// Reschedule downstream operations when this one delivers only
    /// partial outputs.
    pub rescheduled: Option<bool>,
    /// Execute in the engine's parallel pool.
    pub parallel: Option<bool>,
    /// Marshal inputs/outputs when executed in a process pool.
    pub marshalled: Option<bool>,
    /// The underlying function returns a mapping instead of a tuple.
    pub returns_dict: bool,
    /// Arbitrary attributes copied onto the operation's graph node.
    pub node_props: Map<String, Value>,
    tombstone: bool,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A tombstone: merged into a pipeline it suppresses any later
    /// same-named operation, then vanishes before the network is built.
    pub fn null(name: impl Into<String>) -> Self {
        Self {
            tombstone: true,
            ..Self::new(name)
        }
    }

    /// True for tombstones created with [`Operation::null`].
    pub fn is_null(&self) -> bool {
        self.tombstone
    }

    /// Replace the needs list.
    pub fn needs<D: Into<Dep>>(mut self, needs: impl IntoIterator<Item = D>) -> Self {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the provides list.
    pub fn provides<D: Into<Dep>>(mut self, provides: impl IntoIterator<Item = D>) -> Self {
        self.provides = provides.into_iter().map(Into::into).collect();
        self
    }

    /// Re-publish provide `src` under the extra name `alias`.
    pub fn alias(mut self, src: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.push((src.into(), alias.into()));
        self
    }

    pub fn endured(mut self, endured: bool) -> Self {
        self.endured = Some(endured);
        self
    }

    pub fn rescheduled(mut self, rescheduled: bool) -> Self {
        self.rescheduled = Some(rescheduled);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn marshalled(mut self, marshalled: bool) -> Self {
        self.marshalled = Some(marshalled);
        self
    }

    pub fn returns_dict(mut self, returns_dict: bool) -> Self {
        self.returns_dict = returns_dict;
        self
    }

    /// Attach one graph-node attribute.
    pub fn node_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.node_props.insert(key.into(), value.into());
        self
    }

    /// The needs as the network sees them.
    pub fn op_needs(&self) -> &[Dep] {
        &self.needs
    }

    /// The provides as the network sees them: declared provides plus
    /// one dep per alias, inheriting the source provide's modifiers
    /// under the new name.
    pub fn op_provides(&self) -> Vec<Dep> {
        let mut all = self.provides.clone();
        for (src, alias) in &self.aliases {
            let aliased = match self.provides.iter().find(|p| p.name() == src) {
                Some(src_dep) => src_dep.renamed(alias.clone()),
                None => Dep::new(alias.clone()),
            };
            all.push(aliased);
        }
        all
    }

    /// The source provide an aliased name duplicates, if any.
    pub fn alias_source(&self, alias: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, a)| a == alias)
            .map(|(src, _)| src.as_str())
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({:?}", self.name)?;
        if !self.needs.is_empty() {
            let needs: Vec<String> = self.needs.iter().map(ToString::to_string).collect();
            write!(f, ", needs={needs:?}")?;
        }
        if !self.provides.is_empty() {
            let provides: Vec<String> = self.op_provides().iter().map(ToString::to_string).collect();
            write!(f, ", provides={provides:?}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_inherit_modifiers() {
        let op = Operation::new("op")
            .provides([Dep::sfxed("df", ["reset"])])
            .alias("df", "df2");
        let provides = op.op_provides();
        assert_eq!(provides[1].name(), "df2");
        assert_eq!(provides[1].sfx_tokens(), ["reset"]);
    }

    #[test]
    fn identity_is_the_name() {
        let a = Operation::new("x").needs(["n"]);
        let b = Operation::new("x").provides(["p"]);
        assert_eq!(a, b);
    }
}
