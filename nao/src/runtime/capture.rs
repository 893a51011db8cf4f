// Graph capture: turning a finished subgraph back into a callable
//
// `reassemble` snapshots the graph that owns the given boundary nodes; the
// resulting synthetic function splices a fresh copy of that snapshot on every
// application. The `nao` namespace exposes both directions to programs.

use crate::graph::{GraphError, NodeRef};
use crate::runtime::error::RuntimeResult;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::functions::{Function, SyntheticFunction};
use crate::runtime::namespace::Namespace;
use crate::runtime::values::{Attributes, RetvalBag, Value};
use anyhow::{anyhow, bail};
use std::rc::Rc;

pub const NAMESPACE: &str = "nao";

pub fn namespace() -> Namespace {
    Namespace::new(NAMESPACE)
        .export("reasm", reasm_primitive)
        .export("disasm", disasm_primitive)
}

/// Capture the graph owning `inputs` and `outputs` as a synthetic function
/// whose inputs and outputs are those nodes, by name.
pub fn reassemble(inputs: &[NodeRef], outputs: &[NodeRef]) -> RuntimeResult<SyntheticFunction> {
    let mut boundary = inputs.iter().chain(outputs);
    let first = boundary.next().ok_or(GraphError::EmptyCapture)?;
    if let Some(other) = boundary.find(|node| node.graph_id() != first.graph_id()) {
        return Err(GraphError::MixedGraphs {
            first: first.name().to_string(),
            other: other.name().to_string(),
        }
        .into());
    }

    let snapshot = first.graph().to_graph_def();
    tracing::debug!(
        inputs = inputs.len(),
        outputs = outputs.len(),
        nodes = snapshot.len(),
        "captured subgraph"
    );
    Ok(SyntheticFunction::new(
        inputs.iter().map(|n| n.name().to_string()).collect(),
        outputs.iter().map(|n| n.name().to_string()).collect(),
        snapshot,
    ))
}

fn node_list(value: Value, role: &str) -> anyhow::Result<Vec<NodeRef>> {
    let items = match value.unwrap_bag()? {
        Value::List(items) => items,
        node @ Value::Node(_) => vec![node],
        other => bail!("{} must be a list of nodes, got {}", role, other.type_name()),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Node(node) => Ok(node),
            other => Err(anyhow!("{} must be nodes, got {}", role, other.type_name())),
        })
        .collect()
}

fn reasm_primitive(_ev: &mut Evaluator, args: Vec<Value>, _kwargs: Attributes) -> anyhow::Result<Value> {
    let [inputs, outputs]: [Value; 2] = args
        .try_into()
        .map_err(|args: Vec<Value>| anyhow!("reasm takes inputs and outputs, got {} arguments", args.len()))?;
    let inputs = node_list(inputs, "inputs")?;
    let outputs = node_list(outputs, "outputs")?;
    let function = reassemble(&inputs, &outputs)?;
    Ok(Value::Function(Function::Synthetic(Rc::new(function))))
}

fn disasm_primitive(ev: &mut Evaluator, args: Vec<Value>, _kwargs: Attributes) -> anyhow::Result<Value> {
    let [function]: [Value; 1] = args
        .try_into()
        .map_err(|args: Vec<Value>| anyhow!("disasm takes one function, got {} arguments", args.len()))?;
    let function = match function {
        Value::Function(Function::Declared(f)) => f,
        other => bail!("only declared functions can be disassembled, got {}", other),
    };
    let (inputs, outputs) = function.disasm_cached(ev)?;
    let bag = RetvalBag::from_pairs([
        (
            "inputs".to_string(),
            Value::List(inputs.into_iter().map(Value::Node).collect()),
        ),
        ("outputs".to_string(), Value::List(outputs)),
    ])?;
    Ok(Value::Bag(bag))
}
