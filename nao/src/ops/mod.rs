//! Default primitive catalog (namespace `ops`)
//!
//! Node constructors that programs reach through `_sf_apply` with a
//! namespace. Each one only records a node; no shape or type checking and
//! no numeric execution happens here.

pub mod control_flow;

use crate::graph::{AttrValue, DType, Graph, GraphError, NodeRef, Shape};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::namespace::Namespace;
use crate::runtime::values::{Attributes, Value};
use anyhow::{anyhow, bail};
use std::collections::BTreeMap;

pub const NAMESPACE: &str = "ops";

pub fn namespace() -> Namespace {
    let mut ns = Namespace::new(NAMESPACE)
        .export("constant", constant_primitive)
        .export("placeholder", placeholder_primitive)
        .export("no_op", |ev, args, kwargs| nary(ev, "NoOp", 0, args, kwargs))
        .export("group", group_primitive);

    for (key, op) in [("identity", "Identity"), ("negative", "Neg"), ("logical_not", "LogicalNot")] {
        ns = ns.export(key, move |ev, args, kwargs| nary(ev, op, 1, args, kwargs));
    }
    for (key, op) in [
        ("add", "Add"),
        ("subtract", "Sub"),
        ("multiply", "Mul"),
        ("divide", "Div"),
        ("matmul", "MatMul"),
        ("equal", "Equal"),
        ("less", "Less"),
        ("greater", "Greater"),
    ] {
        ns = ns.export(key, move |ev, args, kwargs| nary(ev, op, 2, args, kwargs));
    }
    ns
}

/// Pass-through node named `name` in the current scope.
pub fn identity(graph: &Graph, name: &str, input: NodeRef) -> Result<NodeRef, GraphError> {
    graph.op("Identity").name(name).input(input).build()
}

/// Graph boundary input.
pub fn placeholder(
    graph: &Graph,
    name: Option<&str>,
    dtype: DType,
    shape: Shape,
) -> Result<NodeRef, GraphError> {
    graph
        .op("Placeholder")
        .maybe_name(name)
        .attr("dtype", AttrValue::Type(dtype))
        .attr("shape", AttrValue::Shape(shape))
        .build()
}

/// Constant node holding `value`. Type and shape are recorded as given.
pub fn constant(
    graph: &Graph,
    name: Option<&str>,
    value: &Value,
    shape: Option<Shape>,
    dtype: Option<DType>,
) -> RuntimeResult<NodeRef> {
    let literal = value
        .to_attr()
        .ok_or_else(|| RuntimeError::type_mismatch("literal value", value.type_name(), "constant"))?;
    let mut builder = graph.op("Const").maybe_name(name).attr("value", literal);
    if let Some(dtype) = dtype.or_else(|| infer_dtype(value)) {
        builder = builder.attr("dtype", AttrValue::Type(dtype));
    }
    if let Some(shape) = shape {
        builder = builder.attr("shape", AttrValue::Shape(shape));
    }
    Ok(builder.build()?)
}

fn infer_dtype(value: &Value) -> Option<DType> {
    match value {
        Value::Boolean(_) => Some(DType::Bool),
        Value::Integer(_) => Some(DType::Int32),
        Value::Float(_) => Some(DType::Float),
        Value::String(_) => Some(DType::String),
        Value::List(items) => items.first().and_then(infer_dtype),
        _ => None,
    }
}

pub fn to_dtype(value: &Value, operation: &str) -> RuntimeResult<DType> {
    match value {
        Value::Type(dtype) => Ok(*dtype),
        Value::String(name) => DType::from_name(name)
            .ok_or_else(|| RuntimeError::type_mismatch("type name", name, operation)),
        other => Err(RuntimeError::type_mismatch("type", other.type_name(), operation)),
    }
}

/// Nil is an unknown-rank shape; a list gives one dimension per element
/// (nil elements are unknown dimensions).
pub fn to_shape(value: &Value, operation: &str) -> RuntimeResult<Shape> {
    match value {
        Value::Shape(shape) => Ok(shape.clone()),
        Value::Nil => Ok(Shape::unknown()),
        Value::List(dims) => dims
            .iter()
            .map(|dim| match dim {
                Value::Integer(d) => Ok(Some(*d)),
                Value::Nil => Ok(None),
                other => Err(RuntimeError::type_mismatch(
                    "integer dimension",
                    other.type_name(),
                    operation,
                )),
            })
            .collect::<RuntimeResult<Vec<_>>>()
            .map(Shape::from_dims),
        other => Err(RuntimeError::type_mismatch("shape", other.type_name(), operation)),
    }
}

/// Nodes pass through; literal values become constant nodes.
pub fn to_node(graph: &Graph, value: Value) -> RuntimeResult<NodeRef> {
    match value.unwrap_bag()? {
        Value::Node(node) => Ok(node),
        literal @ (Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) | Value::List(_)) => {
            constant(graph, None, &literal, None, None)
        }
        other => Err(RuntimeError::type_mismatch("node", other.type_name(), "node input")),
    }
}

/// Split keyword configuration into the node name and node attributes.
fn node_config(mut kwargs: Attributes) -> anyhow::Result<(Option<String>, BTreeMap<String, AttrValue>)> {
    let name = match kwargs.shift_remove("name") {
        None | Some(Value::Nil) => None,
        Some(Value::String(name)) => Some(name),
        Some(other) => bail!("name must be a string, got {}", other.type_name()),
    };
    let mut attrs = BTreeMap::new();
    for (key, value) in kwargs {
        let attr = value
            .to_attr()
            .ok_or_else(|| anyhow!("attribute '{}' cannot hold a {}", key, value.type_name()))?;
        attrs.insert(key, attr);
    }
    Ok((name, attrs))
}

fn nary(ev: &mut Evaluator, op: &str, arity: usize, args: Vec<Value>, kwargs: Attributes) -> anyhow::Result<Value> {
    if args.len() != arity {
        bail!("{} takes {} inputs, got {}", op, arity, args.len());
    }
    let (name, attrs) = node_config(kwargs)?;
    let graph = ev.graph().clone();
    let inputs = args
        .into_iter()
        .map(|arg| to_node(&graph, arg))
        .collect::<RuntimeResult<Vec<_>>>()?;
    let node = graph
        .op(op)
        .maybe_name(name.as_deref())
        .inputs(inputs)
        .attrs(attrs)
        .build()?;
    Ok(Value::Node(node))
}

fn group_primitive(ev: &mut Evaluator, args: Vec<Value>, kwargs: Attributes) -> anyhow::Result<Value> {
    let (name, attrs) = node_config(kwargs)?;
    let graph = ev.graph().clone();
    let mut deps = Vec::new();
    for arg in args {
        match arg.unwrap_bag()? {
            Value::List(items) => {
                for item in items {
                    deps.push(to_node(&graph, item)?);
                }
            }
            other => deps.push(to_node(&graph, other)?),
        }
    }
    let node = graph
        .op("NoOp")
        .maybe_name(name.as_deref())
        .control_inputs(deps)
        .attrs(attrs)
        .build()?;
    Ok(Value::Node(node))
}

fn constant_primitive(ev: &mut Evaluator, args: Vec<Value>, mut kwargs: Attributes) -> anyhow::Result<Value> {
    let [value]: [Value; 1] = args
        .try_into()
        .map_err(|args: Vec<Value>| anyhow!("constant takes 1 input, got {}", args.len()))?;
    let dtype = kwargs
        .shift_remove("dtype")
        .map(|v| to_dtype(&v, "constant"))
        .transpose()?;
    let shape = kwargs
        .shift_remove("shape")
        .map(|v| to_shape(&v, "constant"))
        .transpose()?;
    let (name, attrs) = node_config(kwargs)?;
    if !attrs.is_empty() {
        bail!("constant does not accept attributes {:?}", attrs.keys().collect::<Vec<_>>());
    }
    let node = constant(ev.graph(), name.as_deref(), &value, shape, dtype)?;
    Ok(Value::Node(node))
}

fn placeholder_primitive(ev: &mut Evaluator, args: Vec<Value>, mut kwargs: Attributes) -> anyhow::Result<Value> {
    if !args.is_empty() {
        bail!("placeholder takes no inputs, got {}", args.len());
    }
    let dtype = kwargs
        .shift_remove("dtype")
        .ok_or_else(|| anyhow!("placeholder requires a dtype"))?;
    let dtype = to_dtype(&dtype, "placeholder")?;
    let shape = match kwargs.shift_remove("shape") {
        Some(v) => to_shape(&v, "placeholder")?,
        None => Shape::unknown(),
    };
    let (name, _) = node_config(kwargs)?;
    let node = placeholder(ev.graph(), name.as_deref(), dtype, shape)?;
    Ok(Value::Node(node))
}
