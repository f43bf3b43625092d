//! Dependency names and their modifiers.
//!
//! A [`Dep`] is the name of a value an operation consumes or produces,
//! plus a small set of modifiers that change how the compiler treats it:
//!
//! - [`Dep::optional`] -- the consuming operation tolerates its absence.
//! - [`Dep::sfx`] -- a *pure side-effect*: no value flows, the name
//!   only expresses ordering. Pure side-effects live in their own
//!   namespace (`sfx(<name>)`), so they never collide with real data.
//! - [`Dep::sfxed`] -- a *sideffected* dependency: a real data name
//!   tied to one or more side-effect tokens. It acts as a plain value
//!   for the base name, while its edges carry the tokens.
//! - [`Dep::keyword`] -- the value is delivered under a different
//!   parameter name; preserved on edges, ignored by the compiler.
//! - names containing `/` are hierarchical (*jsonp*): every prefix of
//!   the path becomes a data node of the graph, chained by `subdoc`
//!   edges. JSON-pointer escapes (`~1` for `/`, `~0` for `~`) are
//!   honored when splitting into parts.
//!
//! Graph identity is the bare name: two deps with the same
//! [`ident`](Dep::ident) compare equal and hash equally no matter which
//! other modifiers they carry, so insertion-ordered sets of deps
//! de-duplicate by identity, first insertion winning.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

/// A dependency name with modifiers. See the [module docs](self).
#[derive(Clone, Debug, Serialize)]
pub struct Dep {
    name: String,
    optional: bool,
    sideffect: bool,
    sfx_tokens: Vec<String>,
    keyword: Option<String>,
}

impl Dep {
    /// A plain dependency. Hierarchical names (containing `/`) are
    /// recognized automatically.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            sideffect: false,
            sfx_tokens: Vec::new(),
            keyword: None,
        }
    }

    /// A pure side-effect: conveys ordering, carries no value.
    pub fn sfx(name: impl Into<String>) -> Self {
        Self {
            sideffect: true,
            ..Self::new(name)
        }
    }

    /// A sideffected dependency: the real data `base` tied to
    /// side-effect `tokens`.
    pub fn sfxed<T: Into<String>>(base: impl Into<String>, tokens: impl IntoIterator<Item = T>) -> Self {
        Self {
            sfx_tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::new(base)
        }
    }

    /// Mark this dep optional: the consuming operation runs even when
    /// the value is absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Deliver this input under parameter name `keyword`.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Copy with `optional` adjusted.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Copy with the keyword replaced (or stripped with `None`).
    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword;
        self
    }

    /// The bare data name (for sideffected deps, the base name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The graph identity of this dep: the bare name, except pure
    /// side-effects which occupy the `sfx(<name>)` namespace.
    pub fn ident(&self) -> String {
        if self.is_pure_sfx() {
            format!("sfx({})", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// True for pure side-effects *and* sideffected deps.
    pub fn is_sfx(&self) -> bool {
        self.sideffect || !self.sfx_tokens.is_empty()
    }

    /// True only for pure side-effects (no value flows).
    pub fn is_pure_sfx(&self) -> bool {
        self.sideffect
    }

    /// The side-effect tokens of a sideffected dep (empty otherwise).
    pub fn sfx_tokens(&self) -> &[String] {
        &self.sfx_tokens
    }

    pub fn get_keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    /// True when the name is hierarchical (`a/b/c`). Pure side-effects
    /// are never hierarchical.
    pub fn is_jsonp(&self) -> bool {
        !self.sideffect && self.name.contains('/')
    }

    /// The unescaped path parts of a hierarchical name
    /// (`a/b~1c` → `["a", "b/c"]`), or `None` for flat names.
    pub fn jsonp_parts(&self) -> Option<Vec<String>> {
        if !self.is_jsonp() {
            return None;
        }
        Some(self.name.split('/').map(unescape_part).collect())
    }

    /// All prefixes of a hierarchical name, shortest first, as raw node
    /// names (`a/b/c` → `["a", "a/b", "a/b/c"]`). Flat names yield
    /// just themselves.
    pub fn chain_names(&self) -> Vec<String> {
        if !self.is_jsonp() {
            return vec![self.ident()];
        }
        let mut acc = String::new();
        self.name
            .split('/')
            .map(|part| {
                if !acc.is_empty() {
                    acc.push('/');
                }
                acc.push_str(part);
                acc.clone()
            })
            .collect()
    }

    /// Copy under a new name, preserving every modifier. Pure
    /// side-effects rename the inner token.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Unescape one JSON-pointer part: `~1` → `/`, then `~0` → `~`.
fn unescape_part(part: &str) -> String {
    part.replace("~1", "/").replace("~0", "~")
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.ident() == other.ident()
    }
}

impl Eq for Dep {}

impl Hash for Dep {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident().hash(state);
    }
}

impl From<&str> for Dep {
    fn from(name: &str) -> Self {
        Dep::new(name)
    }
}

impl From<String> for Dep {
    fn from(name: String) -> Self {
        Dep::new(name)
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident())?;
        if self.optional {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_modifiers() {
        assert_eq!(Dep::new("a").optional(), Dep::new("a").keyword("kw"));
        assert_ne!(Dep::new("a"), Dep::sfx("a"));
        assert_eq!(Dep::sfxed("a", ["t"]), Dep::new("a"));
    }

    #[test]
    fn jsonp_parts_unescape() {
        let d = Dep::new("root/le~1af/x~0y");
        assert_eq!(
            d.jsonp_parts().unwrap(),
            vec!["root".to_string(), "le/af".into(), "x~y".into()]
        );
        assert_eq!(d.chain_names()[1], "root/le~1af");
    }

    #[test]
    fn chain_of_flat_name_is_itself() {
        assert_eq!(Dep::new("a").chain_names(), vec!["a".to_string()]);
        assert_eq!(Dep::sfx("a").chain_names(), vec!["sfx(a)".to_string()]);
    }
}
