// Conditional construct
// The evaluator hands both branches over as closures; this module decides how
// their effects are gated so only the selected branch is realized at run time.

use crate::graph::{Graph, NodeRef};
use crate::ops::to_node;
use crate::runtime::error::RuntimeResult;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::values::Value;

/// Build `cond(pred, then, else)`.
///
/// Both closures run now, each inside an ordering frame gated on its own
/// pivot of a `Switch` on `pred`, so every node a branch creates depends on
/// that branch being taken. The two branch results are joined by a `Merge`
/// node, which is returned.
pub fn cond<T, E>(
    evaluator: &mut Evaluator,
    pred: &NodeRef,
    then_branch: T,
    else_branch: E,
) -> RuntimeResult<Value>
where
    T: FnOnce(&mut Evaluator) -> RuntimeResult<Value>,
    E: FnOnce(&mut Evaluator) -> RuntimeResult<Value>,
{
    let graph = evaluator.graph().clone();
    let scope = graph.push_name_scope("cond");
    let result = build(evaluator, &graph, pred, then_branch, else_branch);
    graph.pop_name_scope();
    tracing::debug!(scope = %scope, predicate = %pred, "built conditional");
    result
}

fn build<T, E>(
    evaluator: &mut Evaluator,
    graph: &Graph,
    pred: &NodeRef,
    then_branch: T,
    else_branch: E,
) -> RuntimeResult<Value>
where
    T: FnOnce(&mut Evaluator) -> RuntimeResult<Value>,
    E: FnOnce(&mut Evaluator) -> RuntimeResult<Value>,
{
    let switch = graph.op("Switch").name("switch").input(pred.clone()).build()?;
    let pivot_t = graph.op("Identity").name("switch_t").input(switch.clone()).build()?;
    let pivot_f = graph.op("Identity").name("switch_f").input(switch).build()?;

    let then_out = branch(evaluator, graph, pivot_t, then_branch)?;
    let else_out = branch(evaluator, graph, pivot_f, else_branch)?;

    let merge = graph
        .op("Merge")
        .name("merge")
        .inputs([then_out, else_out])
        .build()?;
    Ok(Value::Node(merge))
}

fn branch<F>(evaluator: &mut Evaluator, graph: &Graph, pivot: NodeRef, body: F) -> RuntimeResult<NodeRef>
where
    F: FnOnce(&mut Evaluator) -> RuntimeResult<Value>,
{
    graph.push_control_dependencies([pivot])?;
    let result = body(evaluator).and_then(|value| to_node(graph, value));
    graph.pop_control_dependencies();
    result
}
