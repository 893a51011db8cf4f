// Namespace registry: named catalogs of external primitive constructors
// Built once, then shared read-only by every Context of a build pass.

use crate::runtime::evaluator::Evaluator;
use crate::runtime::values::{Attributes, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// An external node constructor: positional node inputs plus keyword
/// configuration (including an optional `name`). Its own contract (arity,
/// shapes, types) is entirely its business.
pub type PrimitiveFn = Rc<dyn Fn(&mut Evaluator, Vec<Value>, Attributes) -> anyhow::Result<Value>>;

/// A named catalog of primitives, e.g. `ops` or `nao`.
#[derive(Clone)]
pub struct Namespace {
    name: String,
    exports: IndexMap<String, PrimitiveFn>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Namespace {
    pub fn new<A: AsRef<str>>(name: A) -> Self {
        Namespace {
            name: name.as_ref().to_string(),
            exports: IndexMap::new(),
        }
    }

    /// Add a primitive under `key`, replacing any earlier export of that name.
    pub fn export<F>(mut self, key: &str, func: F) -> Self
    where
        F: Fn(&mut Evaluator, Vec<Value>, Attributes) -> anyhow::Result<Value> + 'static,
    {
        self.exports.insert(key.to_string(), Rc::new(func));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<PrimitiveFn> {
        self.exports.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}

/// Immutable name -> namespace table. Construct with [`NamespaceRegistry::new`]
/// and `register`, then wrap in an `Rc` and hand it to the root Context.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    namespaces: HashMap<String, Rc<Namespace>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the default catalogs: `ops` and `nao`.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(crate::ops::namespace())
            .register(crate::runtime::capture::namespace())
    }

    pub fn register(mut self, namespace: Namespace) -> Self {
        self.namespaces
            .insert(namespace.name().to_string(), Rc::new(namespace));
        self
    }

    /// Make the namespace registered as `target` reachable as `alias` too.
    /// Unknown targets are reported back so configuration mistakes surface.
    pub fn alias(mut self, alias: &str, target: &str) -> Result<Self, String> {
        let namespace = self
            .namespaces
            .get(target)
            .cloned()
            .ok_or_else(|| target.to_string())?;
        self.namespaces.insert(alias.to_string(), namespace);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Namespace>> {
        self.namespaces.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.keys().cloned().collect();
        names.sort();
        names
    }
}
