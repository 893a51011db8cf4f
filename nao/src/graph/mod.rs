//! Append-only computation graph
//!
//! The interpreter emits nodes into a [`Graph`] as a side effect of
//! evaluation. Nodes are never removed or rewritten; ordering constraints
//! are recorded as control inputs on the node records, next to the data
//! inputs, and travel with the serialized [`GraphDef`] snapshot.

mod import;
mod types;

pub use types::{AttrValue, DType, Shape};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Errors raised by the graph layer itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node '{node}' belongs to another graph")]
    ForeignNode { node: String },

    #[error("input '{input}' of imported node '{node}' is not defined earlier in the snapshot")]
    DanglingInput { node: String, input: String },

    #[error("import under '{scope}' cannot resolve return element '{name}'")]
    MissingReturnElement { scope: String, name: String },

    #[error("cannot capture a subgraph without input or output nodes")]
    EmptyCapture,

    #[error("captured nodes span more than one graph: '{first}' and '{other}'")]
    MixedGraphs { first: String, other: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

/// Serialized record of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Ordering edges: this node runs only after every node named here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
}

/// Serializable snapshot of a whole graph, in creation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDef {
    pub nodes: Vec<NodeDef>,
}

impl GraphDef {
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug)]
struct GraphState {
    nodes: Vec<NodeDef>,
    by_name: HashMap<String, usize>,
    names_in_use: HashSet<String>,
    scopes: Vec<String>,
    control_frames: Vec<Vec<NodeRef>>,
}

impl GraphState {
    fn scoped(&self, name: &str) -> String {
        match self.scopes.last() {
            Some(scope) => format!("{}/{}", scope, name),
            None => name.to_string(),
        }
    }

    fn unique_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut suffix = 0;
        while self.names_in_use.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", name, suffix);
        }
        self.names_in_use.insert(candidate.clone());
        candidate
    }
}

/// Shared handle to an append-only graph. Cloning the handle does not copy
/// the graph.
#[derive(Clone)]
pub struct Graph {
    id: GraphId,
    state: Rc<RefCell<GraphState>>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id.0)
            .field("nodes", &self.len())
            .finish()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            id: GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)),
            state: Rc::new(RefCell::new(GraphState {
                nodes: Vec::new(),
                by_name: HashMap::new(),
                names_in_use: HashSet::new(),
                scopes: Vec::new(),
                control_frames: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look a node up by its full name.
    pub fn node(&self, name: &str) -> Option<NodeRef> {
        let state = self.state.borrow();
        state.by_name.get(name).map(|&index| NodeRef {
            graph: self.clone(),
            index,
            name: Rc::from(name),
        })
    }

    /// The innermost active naming scope, or the empty string at top level.
    pub fn current_scope(&self) -> String {
        self.state.borrow().scopes.last().cloned().unwrap_or_default()
    }

    /// Open a naming scope nested in the current one. The scope name is made
    /// unique within the graph; the full scope path is returned.
    pub fn push_name_scope(&self, name: &str) -> String {
        let mut state = self.state.borrow_mut();
        let full = state.scoped(name);
        let unique = state.unique_name(&full);
        state.scopes.push(unique.clone());
        unique
    }

    pub fn pop_name_scope(&self) {
        self.state.borrow_mut().scopes.pop();
    }

    /// Open an ordering frame: every node created while it is active gets a
    /// control input on each of `deps`.
    pub fn push_control_dependencies<I>(&self, deps: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let deps: Vec<NodeRef> = deps.into_iter().collect();
        for dep in &deps {
            self.check_owned(dep)?;
        }
        tracing::debug!(
            graph = self.id.0,
            deps = deps.len(),
            "opening control dependency frame"
        );
        self.state.borrow_mut().control_frames.push(deps);
        Ok(())
    }

    pub fn pop_control_dependencies(&self) {
        self.state.borrow_mut().control_frames.pop();
    }

    /// Start building a node of type `op` in the current naming scope.
    pub fn op(&self, op: &str) -> NodeBuilder<'_> {
        NodeBuilder {
            graph: self,
            op: op.to_string(),
            name: None,
            inputs: Vec::new(),
            control_inputs: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn to_graph_def(&self) -> GraphDef {
        GraphDef {
            nodes: self.state.borrow().nodes.clone(),
        }
    }

    fn check_owned(&self, node: &NodeRef) -> Result<(), GraphError> {
        if node.graph.id != self.id {
            return Err(GraphError::ForeignNode {
                node: node.name().to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for a single node; see [`Graph::op`].
pub struct NodeBuilder<'g> {
    graph: &'g Graph,
    op: String,
    name: Option<String>,
    inputs: Vec<NodeRef>,
    control_inputs: Vec<NodeRef>,
    attrs: BTreeMap<String, AttrValue>,
}

impl<'g> NodeBuilder<'g> {
    /// Requested name relative to the current scope; defaults to the op type.
    pub fn name<A: AsRef<str>>(mut self, name: A) -> Self {
        self.name = Some(name.as_ref().to_string());
        self
    }

    pub fn maybe_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    pub fn input(mut self, node: NodeRef) -> Self {
        self.inputs.push(node);
        self
    }

    pub fn inputs<I: IntoIterator<Item = NodeRef>>(mut self, nodes: I) -> Self {
        self.inputs.extend(nodes);
        self
    }

    pub fn control_inputs<I: IntoIterator<Item = NodeRef>>(mut self, nodes: I) -> Self {
        self.control_inputs.extend(nodes);
        self
    }

    pub fn attr<A: AsRef<str>>(mut self, key: A, value: AttrValue) -> Self {
        self.attrs.insert(key.as_ref().to_string(), value);
        self
    }

    pub fn attrs(mut self, attrs: BTreeMap<String, AttrValue>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn build(self) -> Result<NodeRef, GraphError> {
        for node in self.inputs.iter().chain(self.control_inputs.iter()) {
            self.graph.check_owned(node)?;
        }

        let mut state = self.graph.state.borrow_mut();
        let base = self.name.unwrap_or_else(|| self.op.clone());
        let full = state.scoped(&base);
        let name = state.unique_name(&full);

        let mut control: IndexSet<String> = state
            .control_frames
            .iter()
            .flatten()
            .map(|dep| dep.name().to_string())
            .collect();
        control.extend(self.control_inputs.iter().map(|dep| dep.name().to_string()));

        let index = state.nodes.len();
        state.nodes.push(NodeDef {
            name: name.clone(),
            op: self.op,
            inputs: self.inputs.iter().map(|n| n.name().to_string()).collect(),
            control_inputs: control.into_iter().collect(),
            attrs: self.attrs,
        });
        state.by_name.insert(name.clone(), index);

        Ok(NodeRef {
            graph: self.graph.clone(),
            index,
            name: Rc::from(name.as_str()),
        })
    }
}

/// Handle to one node of a graph. Identity is (graph, position); two handles
/// to the same node compare equal.
#[derive(Clone)]
pub struct NodeRef {
    graph: Graph,
    index: usize,
    name: Rc<str>,
}

impl NodeRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph.id
    }

    pub fn op(&self) -> String {
        self.graph.state.borrow().nodes[self.index].op.clone()
    }

    pub fn def(&self) -> NodeDef {
        self.graph.state.borrow().nodes[self.index].clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.graph.state.borrow().nodes[self.index].inputs.clone()
    }

    pub fn control_inputs(&self) -> Vec<String> {
        self.graph.state.borrow().nodes[self.index].control_inputs.clone()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.graph.id == other.graph.id && self.index == other.index
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.graph.id.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.name)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
