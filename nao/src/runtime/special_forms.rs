// Special forms: handlers that receive their operands unevaluated

use crate::ast::Expression;
use crate::graph::{Graph, NodeRef};
use crate::ops;
use crate::runtime::environment::Context;
use crate::runtime::error::{LookupKind, RuntimeError, RuntimeResult};
use crate::runtime::evaluator::{Evaluator, FormHandler, FormTable};
use crate::runtime::functions::{DeclaredFunction, Function};
use crate::runtime::values::{Attributes, RetvalBag, Value};
use indexmap::IndexMap;
use std::rc::Rc;

/// Graph-block statement binding a named block output.
pub const RETVAL: &str = "__retval";
/// Graph-block statement ordering its nested statements after the current leaves.
pub const AFTER_LEAVES: &str = "__sf_after_leaves";

pub(crate) fn register(table: &mut FormTable) {
    table.register("_sf_apply", FormHandler::Special(apply));
    table.register("_sf_cond", FormHandler::Special(cond));
    table.register("_sf_local", FormHandler::Special(local));
    table.register("_sf_attr", FormHandler::Special(attr));
    table.register("_sf_list", FormHandler::Special(list));
    table.register("_sf_graph", FormHandler::Special(graph_block));
    table.register("_sf_index", FormHandler::Special(index));
    table.register("_sf_def_function", FormHandler::Special(def_function));
    table.register("_sf_function", FormHandler::Special(function));
    table.register("_sf_attrs", FormHandler::Special(attrs));
}

fn malformed(form: &Expression, message: impl Into<String>) -> RuntimeError {
    RuntimeError::MalformedForm {
        form: form.tag().unwrap_or("statement").to_string(),
        message: message.into(),
        expression: form.to_string(),
    }
}

pub(crate) fn expect_operands(form: &Expression, operands: &[Expression], count: usize) -> RuntimeResult<()> {
    if operands.len() == count {
        Ok(())
    } else {
        Err(malformed(
            form,
            format!("expected {} operands, got {}", count, operands.len()),
        ))
    }
}

fn expect_at_least(form: &Expression, operands: &[Expression], count: usize) -> RuntimeResult<()> {
    if operands.len() >= count {
        Ok(())
    } else {
        Err(malformed(
            form,
            format!("expected at least {} operands, got {}", count, operands.len()),
        ))
    }
}

/// A literal name operand, or nil.
pub(crate) fn optional_name<'e>(form: &Expression, expr: &'e Expression) -> RuntimeResult<Option<&'e str>> {
    match expr {
        Expression::Nil => Ok(None),
        Expression::String(name) => Ok(Some(name)),
        other => Err(malformed(
            form,
            format!("expected a name, got {} {}", other.type_name(), other),
        )),
    }
}

pub(crate) fn required_name<'e>(form: &Expression, expr: &'e Expression) -> RuntimeResult<&'e str> {
    optional_name(form, expr)?.ok_or_else(|| malformed(form, "missing name"))
}

/// `[_sf_apply, name?, ns?, fn-name, attrs-expr, args...]`
fn apply(ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_at_least(form, operands, 4)?;
    let name = optional_name(form, &operands[0])?;
    let ns = optional_name(form, &operands[1])?;
    let fn_name = required_name(form, &operands[2])?;

    let attrs = match ev.eval(ctx, &operands[3])?.unwrap_bag()? {
        Value::Nil => None,
        Value::Attributes(attrs) => Some(attrs),
        other => {
            return Err(RuntimeError::type_mismatch(
                "attributes",
                other.type_name(),
                &format!("call of {}", fn_name),
            ))
        }
    };

    let mut args = Vec::with_capacity(operands.len() - 4);
    for expr in &operands[4..] {
        let arg = ev.eval(ctx, expr)?.unwrap_bag()?;
        ctx.eliminate_leaf(&arg);
        args.push(arg);
    }

    let callee = match ns {
        Some(ns) => Function::Primitive(Rc::new(ctx.namespace_lookup(ns, fn_name)?)),
        None => match ctx.get_local(fn_name)?.unwrap_bag()? {
            Value::Function(f) => f,
            other => {
                return Err(RuntimeError::type_mismatch(
                    "function",
                    other.type_name(),
                    &format!("call of {}", fn_name),
                ))
            }
        },
    };

    let scope_name = match name {
        Some(name) => name.to_string(),
        None => ctx.unique_name(fn_name),
    };

    let result = callee.apply(ev, Some(&scope_name), attrs, args)?;
    ctx.possible_leaf(&result);
    if let Some(name) = name {
        ctx.define_local(name, result.clone())?;
    }
    Ok(result)
}

/// `[_sf_cond, pred, then, else]`
fn cond(ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_operands(form, operands, 3)?;
    let pred = ev.eval(ctx, &operands[0])?;
    let pred = ops::to_node(ev.graph(), pred)?;

    let then_ctx = ctx.subcontext();
    let else_ctx = ctx.subcontext();
    ops::control_flow::cond(
        ev,
        &pred,
        |ev: &mut Evaluator| branch(ev, &then_ctx, &operands[1]),
        |ev: &mut Evaluator| branch(ev, &else_ctx, &operands[2]),
    )
}

// A branch whose head is itself a list is a statement sequence.
fn branch(ev: &mut Evaluator, ctx: &Rc<Context>, expr: &Expression) -> RuntimeResult<Value> {
    match expr {
        Expression::List(items) if matches!(items.first(), Some(Expression::List(_))) => {
            let mut last = Value::Nil;
            for item in items {
                last = ev.eval(ctx, item)?;
            }
            Ok(last)
        }
        _ => ev.eval(ctx, expr),
    }
}

fn local(_ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_operands(form, operands, 1)?;
    ctx.get_local(required_name(form, &operands[0])?)
}

fn attr(_ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_operands(form, operands, 1)?;
    ctx.get_attr(required_name(form, &operands[0])?)
}

fn list(ev: &mut Evaluator, ctx: &Rc<Context>, _form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    let mut items = Vec::with_capacity(operands.len());
    for expr in operands {
        items.push(ev.eval(ctx, expr)?.unwrap_bag()?);
    }
    Ok(Value::List(items))
}

/// `[_sf_graph, name, statements...]`
///
/// Statements run in a fresh child scope under naming scope `name/_`. Each
/// `__retval` output is then exposed as an identity node named after it,
/// directly under `name`, and the block evaluates to a bag of those nodes.
fn graph_block(ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_at_least(form, operands, 1)?;
    let name = required_name(form, &operands[0])?;

    let graph = ev.graph().clone();
    let scope = graph.push_name_scope(name);
    let block_ctx = ctx.subcontext();
    let result = graph_body(ev, &block_ctx, &graph, &operands[1..]);
    graph.pop_name_scope();

    if let Ok(Value::Bag(bag)) = &result {
        tracing::debug!(scope = %scope, outputs = bag.length(), "built graph block");
    }
    result
}

fn graph_body(ev: &mut Evaluator, ctx: &Rc<Context>, graph: &Graph, statements: &[Expression]) -> RuntimeResult<Value> {
    let mut retval_names = Vec::new();
    graph.push_name_scope("_");
    let walked = graph_statements(ev, ctx, graph, &mut retval_names, statements);
    graph.pop_name_scope();
    walked?;

    let mut outputs = IndexMap::new();
    for name in retval_names {
        let value = ctx.get_local(&name)?;
        let node = ops::to_node(graph, value)?;
        outputs.insert(name.clone(), Value::Node(ops::identity(graph, &name, node)?));
    }
    RetvalBag::new(outputs).map(Value::Bag)
}

fn graph_statements(
    ev: &mut Evaluator,
    ctx: &Rc<Context>,
    graph: &Graph,
    retval_names: &mut Vec<String>,
    statements: &[Expression],
) -> RuntimeResult<()> {
    for statement in statements {
        match statement.tag() {
            Some(RETVAL) => {
                let operands = &statement.as_list().unwrap_or_default()[1..];
                expect_operands(statement, operands, 2)?;
                let name = required_name(statement, &operands[0])?;
                let value = ev.eval(ctx, &operands[1])?;
                ctx.define_local(name, value)?;
                retval_names.push(name.to_string());
            }
            Some(AFTER_LEAVES) => {
                let leaves = ctx.leaves();
                tracing::debug!(
                    leaves = leaves.len(),
                    scope = %graph.current_scope(),
                    "ordering statements after leaves"
                );
                graph.push_control_dependencies(leaves.iter().cloned().collect::<Vec<NodeRef>>())?;
                let nested = &statement.as_list().unwrap_or_default()[1..];
                let walked = graph_statements(ev, ctx, graph, retval_names, nested);
                graph.pop_control_dependencies();
                walked?;
            }
            _ => {
                ev.eval(ctx, statement)?;
            }
        }
    }
    Ok(())
}

/// `[_sf_index, expr, key]`
fn index(ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_operands(form, operands, 2)?;
    let target = ev.eval(ctx, &operands[0])?;
    let key = &operands[1];

    match target {
        Value::Bag(bag) => {
            let key = optional_name(form, key)?;
            bag.get(key).cloned()
        }
        Value::Function(Function::Declared(function)) => match key.as_str() {
            Some("inputs") => {
                let (inputs, _) = function.disasm_cached(ev)?;
                Ok(Value::List(inputs.into_iter().map(Value::Node).collect()))
            }
            Some("outputs") => Ok(Value::List(function.disasm_cached(ev)?.1)),
            _ => Err(index_miss(key, vec!["inputs".to_string(), "outputs".to_string()])),
        },
        Value::List(items) => {
            let len = items.len();
            match key {
                Expression::Integer(i) => usize::try_from(*i)
                    .ok()
                    .and_then(|i| items.into_iter().nth(i))
                    .ok_or_else(|| index_miss(key, (0..len).map(|i| i.to_string()).collect())),
                other => Err(RuntimeError::type_mismatch("integer index", other.type_name(), "index")),
            }
        }
        Value::Attributes(mut attrs) => {
            let name = required_name(form, key)?;
            let visible = attrs.keys().cloned().collect();
            attrs.shift_remove(name).ok_or_else(|| index_miss(key, visible))
        }
        other => Err(RuntimeError::type_mismatch(
            "bag, declared function, list or attributes",
            other.type_name(),
            "index",
        )),
    }
}

fn index_miss(key: &Expression, visible: Vec<String>) -> RuntimeError {
    RuntimeError::Lookup {
        kind: LookupKind::IndexKey,
        name: key.to_string(),
        visible,
    }
}

/// `[_sf_def_function, name, attr-specs, arg-specs, retval-specs, body...]`
fn def_function(_ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_at_least(form, operands, 1)?;
    let name = required_name(form, &operands[0])?;
    let function = DeclaredFunction::from_form(ctx.clone(), name, &operands[1..], form)?;
    ctx.set_function(function)?;
    tracing::debug!(function = name, "defined function");
    Ok(Value::Nil)
}

/// `[_sf_function, name?, attr-specs, arg-specs, retval-specs, body...]`
fn function(_ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    expect_at_least(form, operands, 1)?;
    let name = optional_name(form, &operands[0])?.unwrap_or("function");
    let function = DeclaredFunction::from_form(ctx.clone(), name, &operands[1..], form)?;
    Ok(Value::Function(Function::Declared(Rc::new(function))))
}

/// `[_sf_attrs, [name, value-expr]...]`
fn attrs(ev: &mut Evaluator, ctx: &Rc<Context>, form: &Expression, operands: &[Expression]) -> RuntimeResult<Value> {
    let mut attrs = Attributes::new();
    for pair in operands {
        match pair.as_list() {
            Some([name, value]) => {
                let name = required_name(form, name)?;
                let value = ev.eval(ctx, value)?;
                attrs.insert(name.to_string(), value);
            }
            _ => return Err(malformed(form, format!("attribute entry must be [name, value], got {}", pair))),
        }
    }
    Ok(Value::Attributes(attrs))
}
