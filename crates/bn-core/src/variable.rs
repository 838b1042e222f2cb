//! Enumerable domains and typed variables.
//!
//! A [`Variable`] is a cheap, `Arc`-backed handle compared and sorted by its
//! globally-unique canonical index — the index is the sort key every factor
//! operation relies on, never a meaningful "handle" beyond that.

use bn_error::{BnResult, bn_err};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An ordered finite set of named values `{v0, ..., vk-1}`.
///
/// Equality is by identity of the `Domain` value itself: two domains with
/// the same labels are still distinct domains unless they are the same
/// `Domain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    name: String,
    values: Vec<String>,
}

impl Domain {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Domain {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Domain over the two boolean states, named `false`/`true`.
    pub fn boolean(name: impl Into<String>) -> Self {
        Domain::new(name, ["false", "true"])
    }

    /// Domain over `0..k`, values named by their index.
    pub fn range(name: impl Into<String>, k: usize) -> Self {
        Domain::new(name, (0..k).map(|i| i.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn index(&self, value: &str) -> BnResult<usize> {
        self.values
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| bn_err!(InvalidDomain: "value '{}' not in domain '{}'", value, self.name))
    }

    pub fn value(&self, index: usize) -> BnResult<&str> {
        self.values
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| bn_err!(InvalidDomain: "index {} out of range for domain '{}' of size {}", index, self.name, self.values.len()))
    }
}

/// Whether a variable ranges over an enumerable [`Domain`] or is continuous
/// (carried only inside a factor's joint density fragment, never as a key
/// variable).
#[derive(Clone, Debug)]
pub enum VarKind {
    Enumerable(Arc<Domain>),
    Continuous,
}

struct VariableInner {
    name: String,
    kind: VarKind,
    canonical_index: u64,
}

static NEXT_CANONICAL_INDEX: AtomicU64 = AtomicU64::new(0);

/// A typed variable with a process-local, monotonically increasing
/// canonical index assigned at creation. Cheap to clone (`Arc` handle);
/// compared and hashed solely by that index.
#[derive(Clone)]
pub struct Variable(Arc<VariableInner>);

impl Variable {
    fn new(name: impl Into<String>, kind: VarKind) -> Self {
        let canonical_index = NEXT_CANONICAL_INDEX.fetch_add(1, Ordering::Relaxed);
        Variable(Arc::new(VariableInner {
            name: name.into(),
            kind,
            canonical_index,
        }))
    }

    pub fn enumerable(name: impl Into<String>, domain: impl Into<Arc<Domain>>) -> Self {
        Variable::new(name, VarKind::Enumerable(domain.into()))
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Variable::new(name, VarKind::Continuous)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &VarKind {
        &self.0.kind
    }

    pub fn is_enumerable(&self) -> bool {
        matches!(self.0.kind, VarKind::Enumerable(_))
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.0.kind, VarKind::Continuous)
    }

    pub fn domain(&self) -> Option<&Domain> {
        match &self.0.kind {
            VarKind::Enumerable(d) => Some(d),
            VarKind::Continuous => None,
        }
    }

    /// Cardinality of the domain, or 1 if continuous (used as the
    /// "stride" contribution of a variable absent from a table).
    pub fn cardinality(&self) -> usize {
        self.domain().map(Domain::size).unwrap_or(1)
    }

    pub fn canonical_index(&self) -> u64 {
        self.0.canonical_index
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.0.name)
            .field("canonical_index", &self.0.canonical_index)
            .field("enumerable", &self.is_enumerable())
            .finish()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.canonical_index == other.0.canonical_index
    }
}

impl Eq for Variable {}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.canonical_index.cmp(&other.0.canonical_index)
    }
}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.canonical_index.hash(state);
    }
}
