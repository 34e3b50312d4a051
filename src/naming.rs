//! Identities of owning objects and of the external resources they manage.

use std::fmt;

/// Prefix of every external resource name derived by [`external_name`].
pub const NAME_PREFIX: &str = "io.triggermesh";

/// Uniquely identifies an object of a known type by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    /// The object namespace, if any
    pub namespace: Option<String>,
    /// The object name
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<Option<String>>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Returns a predictable name for the external resource managed on behalf of
/// the object `owner` of kind `kind` (lowercase plural, e.g.
/// `azureeventgridsources`).
///
/// The name is stable across passes so that lookups are idempotent.
/// Cluster-scoped owners have no namespace segment.
pub fn external_name(kind: &str, owner: &QualifiedName) -> String {
    match &owner.namespace {
        Some(ns) => format!("{NAME_PREFIX}.{kind}.{ns}.{}", owner.name),
        None => format!("{NAME_PREFIX}.{kind}.{}", owner.name),
    }
}

/// Where an external resource lives and what it is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Backend-specific scope, e.g. the ARM ID of the resource emitting events.
    pub scope: String,
    /// Deterministic name of the managed resource.
    pub name: String,
}

/// An object owning exactly one external resource.
pub trait Owner: Send + Sync {
    fn qualified_name(&self) -> QualifiedName;

    fn address(&self) -> Address;
}
