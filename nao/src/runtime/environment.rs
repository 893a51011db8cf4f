// Lexical scope chain used while compiling a program

use crate::graph::NodeRef;
use crate::runtime::error::{BindingKind, LookupKind, RuntimeError, RuntimeResult};
use crate::runtime::functions::{DeclaredFunction, Function, PrimitiveFunction};
use crate::runtime::namespace::NamespaceRegistry;
use crate::runtime::values::Value;
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// One scope of the lexical scope tree.
///
/// Locals and attributes are write-once per scope and live in separate maps.
/// Locals resolve through the parent chain; attributes never do, they are
/// configuration for the current call only.
pub struct Context {
    parent: Option<Rc<Context>>,
    namespaces: Rc<NamespaceRegistry>,
    locals: RefCell<IndexMap<String, Value>>,
    attrs: RefCell<IndexMap<String, Value>>,
    functions: RefCell<IndexMap<String, Rc<DeclaredFunction>>>,
    leaves: RefCell<IndexSet<NodeRef>>,
    // Private to this instance: sibling scopes count independently.
    name_counters: RefCell<HashMap<String, usize>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("locals", &self.locals.borrow().keys().collect::<Vec<_>>())
            .field("attrs", &self.attrs.borrow().keys().collect::<Vec<_>>())
            .field(
                "functions",
                &self.functions.borrow().keys().collect::<Vec<_>>(),
            )
            .field("leaves", &self.leaves.borrow().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Context {
    /// Creates the program-level scope.
    pub fn root(namespaces: Rc<NamespaceRegistry>) -> Rc<Self> {
        Rc::new(Self::with_parent(namespaces, None))
    }

    fn with_parent(namespaces: Rc<NamespaceRegistry>, parent: Option<Rc<Context>>) -> Self {
        Context {
            parent,
            namespaces,
            locals: RefCell::new(IndexMap::new()),
            attrs: RefCell::new(IndexMap::new()),
            functions: RefCell::new(IndexMap::new()),
            leaves: RefCell::new(IndexSet::new()),
            name_counters: RefCell::new(HashMap::new()),
        }
    }

    /// Creates a child scope sharing this scope's namespace registry.
    pub fn subcontext(self: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self::with_parent(
            self.namespaces.clone(),
            Some(Rc::clone(self)),
        ))
    }

    pub fn namespaces(&self) -> &Rc<NamespaceRegistry> {
        &self.namespaces
    }

    /// Resolve `ns.key` to a wrapped external constructor.
    pub fn namespace_lookup(&self, ns: &str, key: &str) -> RuntimeResult<PrimitiveFunction> {
        if let Some(namespace) = self.namespaces.get(ns) {
            return namespace
                .get(key)
                .map(|func| PrimitiveFunction::new(format!("{}.{}", ns, key), func))
                .ok_or_else(|| RuntimeError::Lookup {
                    kind: LookupKind::NamespaceMember,
                    name: format!("{}.{}", ns, key),
                    visible: namespace.keys().map(str::to_string).collect(),
                });
        }

        match &self.parent {
            Some(parent) => parent.namespace_lookup(ns, key),
            None => Err(RuntimeError::Lookup {
                kind: LookupKind::Namespace,
                name: ns.to_string(),
                visible: self.namespaces.names(),
            }),
        }
    }

    pub fn set_function(&self, function: DeclaredFunction) -> RuntimeResult<()> {
        let mut functions = self.functions.borrow_mut();
        if functions.contains_key(function.name()) {
            return Err(RuntimeError::Redefinition {
                kind: BindingKind::Function,
                name: function.name().to_string(),
            });
        }
        functions.insert(function.name().to_string(), Rc::new(function));
        Ok(())
    }

    pub fn define_local(&self, name: &str, value: Value) -> RuntimeResult<()> {
        let mut locals = self.locals.borrow_mut();
        if locals.contains_key(name) {
            return Err(RuntimeError::Redefinition {
                kind: BindingKind::Local,
                name: name.to_string(),
            });
        }
        locals.insert(name.to_string(), value);
        Ok(())
    }

    /// Bind an attribute in this scope. Fails if the attribute exists, or if a
    /// local of the same name exists here (the reverse is not checked).
    pub fn define_attr(&self, name: &str, value: Value) -> RuntimeResult<()> {
        if self.attrs.borrow().contains_key(name) {
            return Err(RuntimeError::Redefinition {
                kind: BindingKind::Attribute,
                name: name.to_string(),
            });
        }
        if self.locals.borrow().contains_key(name) {
            return Err(RuntimeError::Redefinition {
                kind: BindingKind::AttributeShadowsLocal,
                name: name.to_string(),
            });
        }
        self.attrs.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    /// Resolve locals, then attributes, then functions, then the parent chain.
    pub fn get_local(&self, name: &str) -> RuntimeResult<Value> {
        if let Some(value) = self.lookup_local(name) {
            return Ok(value);
        }
        Err(RuntimeError::Lookup {
            kind: LookupKind::Local,
            name: name.to_string(),
            visible: self.visible_names(),
        })
    }

    fn lookup_local(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(function) = self.functions.borrow().get(name) {
            return Some(Value::Function(Function::Declared(function.clone())));
        }
        self.parent.as_ref().and_then(|p| p.lookup_local(name))
    }

    /// Resolve an attribute of this scope only.
    pub fn get_attr(&self, name: &str) -> RuntimeResult<Value> {
        let attrs = self.attrs.borrow();
        attrs.get(name).cloned().ok_or_else(|| RuntimeError::Lookup {
            kind: LookupKind::Attribute,
            name: name.to_string(),
            visible: attrs.keys().cloned().collect(),
        })
    }

    /// Names visible from this scope, innermost first, without duplicates.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: IndexSet<String> = IndexSet::new();
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            names.extend(ctx.locals.borrow().keys().cloned());
            names.extend(ctx.attrs.borrow().keys().cloned());
            names.extend(ctx.functions.borrow().keys().cloned());
            scope = ctx.parent.as_deref();
        }
        names.into_iter().collect()
    }

    /// Record `value` as possibly unconsumed in this scope. Non-node values
    /// are ignored.
    pub fn possible_leaf(&self, value: &Value) {
        if let Value::Node(node) = value {
            self.leaves.borrow_mut().insert(node.clone());
        }
    }

    /// Mark `value` consumed in this scope and every ancestor.
    pub fn eliminate_leaf(&self, value: &Value) {
        if let Value::Node(node) = value {
            self.leaves.borrow_mut().shift_remove(node);
        }
        if let Some(parent) = &self.parent {
            parent.eliminate_leaf(value);
        }
    }

    /// Union of this scope's leaves with every ancestor's.
    pub fn leaves(&self) -> IndexSet<NodeRef> {
        let mut leaves = self.leaves.borrow().clone();
        if let Some(parent) = &self.parent {
            leaves.extend(parent.leaves());
        }
        leaves
    }

    /// Returns `root_0`, `root_1`, ... Counters are private to this instance,
    /// so callers that need distinct names across sibling scopes must ask a
    /// single shared Context.
    pub fn unique_name(&self, root: &str) -> String {
        let mut counters = self.name_counters.borrow_mut();
        let counter = counters.entry(root.to_string()).or_insert(0);
        let name = format!("{}_{}", root, counter);
        *counter += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn root() -> Rc<Context> {
        Context::root(Rc::new(NamespaceRegistry::with_defaults()))
    }

    #[test]
    fn locals_are_write_once_but_can_be_shadowed() {
        let ctx = root();
        ctx.define_local("n", Value::Integer(1)).unwrap();
        let err = ctx.define_local("n", Value::Integer(2)).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Redefinition {
                kind: BindingKind::Local,
                ..
            }
        ));

        let child = ctx.subcontext();
        child.define_local("n", Value::Integer(3)).unwrap();
        assert_eq!(child.get_local("n").unwrap(), Value::Integer(3));
        assert_eq!(ctx.get_local("n").unwrap(), Value::Integer(1));
    }

    #[test]
    fn attributes_do_not_inherit() {
        let ctx = root();
        ctx.define_attr("rate", Value::Float(0.5)).unwrap();
        ctx.define_local("x", Value::Integer(1)).unwrap();

        let child = ctx.subcontext();
        assert!(matches!(
            child.get_attr("rate"),
            Err(RuntimeError::Lookup {
                kind: LookupKind::Attribute,
                ..
            })
        ));
        assert_eq!(child.get_local("x").unwrap(), Value::Integer(1));
        // get_local falls through to attributes
        assert_eq!(child.get_local("rate").unwrap(), Value::Float(0.5));
    }

    #[test]
    fn attribute_collision_with_local_is_one_directional() {
        let ctx = root();
        ctx.define_local("k", Value::Integer(1)).unwrap();
        let err = ctx.define_attr("k", Value::Integer(2)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Redefinition {
                kind: BindingKind::AttributeShadowsLocal,
                name: "k".to_string(),
            }
        );

        let other = root();
        other.define_attr("k", Value::Integer(2)).unwrap();
        other.define_local("k", Value::Integer(1)).unwrap();
    }

    #[test]
    fn unresolved_local_lists_visible_bindings() {
        let ctx = root();
        ctx.define_local("a", Value::Nil).unwrap();
        let child = ctx.subcontext();
        child.define_local("b", Value::Nil).unwrap();
        match child.get_local("missing").unwrap_err() {
            RuntimeError::Lookup { name, visible, .. } => {
                assert_eq!(name, "missing");
                assert_eq!(visible, vec!["b".to_string(), "a".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn leaf_tracking_propagates_eliminations_upward() {
        let graph = Graph::new();
        let a = Value::Node(graph.op("Const").build().unwrap());
        let b = Value::Node(graph.op("Const").build().unwrap());

        let ctx = root();
        let child = ctx.subcontext();
        ctx.possible_leaf(&a);
        child.possible_leaf(&b);
        child.possible_leaf(&Value::Integer(4));

        assert_eq!(ctx.leaves().len(), 1);
        assert_eq!(child.leaves().len(), 2);

        child.eliminate_leaf(&a);
        assert!(ctx.leaves().is_empty());
        assert_eq!(
            child.leaves().into_iter().collect::<Vec<_>>(),
            vec![b.as_node().unwrap().clone()]
        );
    }

    #[test]
    fn unique_names_count_per_instance() {
        let ctx = root();
        assert_eq!(ctx.unique_name("add"), "add_0");
        assert_eq!(ctx.unique_name("add"), "add_1");
        assert_eq!(ctx.unique_name("mul"), "mul_0");

        // Known caller obligation: siblings do not share counters.
        let left = ctx.subcontext();
        let right = ctx.subcontext();
        assert_eq!(left.unique_name("f"), right.unique_name("f"));
    }

    #[test]
    fn namespace_lookup_reports_unknown_names() {
        let ctx = root().subcontext();
        assert!(ctx.namespace_lookup("ops", "add").is_ok());
        assert!(matches!(
            ctx.namespace_lookup("ops", "nope"),
            Err(RuntimeError::Lookup {
                kind: LookupKind::NamespaceMember,
                ..
            })
        ));
        assert!(matches!(
            ctx.namespace_lookup("missing", "add"),
            Err(RuntimeError::Lookup {
                kind: LookupKind::Namespace,
                ..
            })
        ));
    }
}
