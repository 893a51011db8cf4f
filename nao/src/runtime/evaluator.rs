// Nao Evaluator - walks expression trees and emits graph nodes

use crate::ast::Expression;
use crate::config::{ConfigError, InterpreterConfig};
use crate::graph::{DType, Graph};
use crate::ops;
use crate::runtime::environment::Context;
use crate::runtime::error::{LookupKind, RuntimeError, RuntimeResult};
use crate::runtime::namespace::NamespaceRegistry;
use crate::runtime::special_forms::{self, optional_name};
use crate::runtime::values::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Receives the raw operand expressions and controls their evaluation.
pub type SpecialHandler =
    fn(&mut Evaluator, &Rc<Context>, &Expression, &[Expression]) -> RuntimeResult<Value>;

/// Receives the literal name operand plus the eagerly evaluated rest.
pub type NamedHandler =
    fn(&mut Evaluator, &Rc<Context>, &Expression, Option<&str>, Vec<Value>) -> RuntimeResult<Value>;

/// Receives every operand evaluated eagerly, left to right.
pub type ApplicationHandler =
    fn(&mut Evaluator, &Rc<Context>, &Expression, Vec<Value>) -> RuntimeResult<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormClass {
    Special,
    NamedConstructor,
    Application,
}

/// A registered form: its dispatch class and handler.
#[derive(Clone, Copy)]
pub enum FormHandler {
    Special(SpecialHandler),
    NamedConstructor(NamedHandler),
    Application(ApplicationHandler),
}

impl FormHandler {
    pub fn class(&self) -> FormClass {
        match self {
            FormHandler::Special(_) => FormClass::Special,
            FormHandler::NamedConstructor(_) => FormClass::NamedConstructor,
            FormHandler::Application(_) => FormClass::Application,
        }
    }
}

/// Explicit tag -> (class, handler) table.
#[derive(Clone, Default)]
pub struct FormTable {
    forms: HashMap<String, FormHandler>,
}

impl fmt::Debug for FormTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.forms.keys().collect();
        tags.sort();
        f.debug_struct("FormTable").field("tags", &tags).finish()
    }
}

impl FormTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every form of the language.
    pub fn standard() -> Self {
        let mut table = Self::new();
        special_forms::register(&mut table);

        table.register("_named_tensor", FormHandler::NamedConstructor(named_tensor));
        table.register("_named_placeholder", FormHandler::NamedConstructor(named_placeholder));

        table.register("_sf_type", FormHandler::Application(type_tag));
        table.register("_sf_shape", FormHandler::Application(shape));
        table.register("_sf_whole", FormHandler::Application(whole));
        table.register("_sf_fraction", FormHandler::Application(fraction));
        table
    }

    pub fn register(&mut self, tag: &str, handler: FormHandler) {
        self.forms.insert(tag.to_string(), handler);
    }

    pub fn get(&self, tag: &str) -> Option<FormHandler> {
        self.forms.get(tag).copied()
    }

    pub fn class_of(&self, tag: &str) -> Option<FormClass> {
        self.get(tag).map(|h| h.class())
    }
}

/// Recursive-descent evaluator. Stateless apart from the graph it emits into
/// and a nesting counter bounded by the configured `max_depth`.
pub struct Evaluator {
    config: Rc<InterpreterConfig>,
    namespaces: Rc<NamespaceRegistry>,
    forms: Rc<FormTable>,
    graph: Graph,
    nesting_level: usize,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("graph", &self.graph)
            .field("nesting_level", &self.nesting_level)
            .field("max_depth", &self.config.max_depth)
            .finish()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_registry(
            Rc::new(NamespaceRegistry::with_defaults()),
            Rc::new(InterpreterConfig::default()),
        )
    }
}

impl Evaluator {
    /// Evaluator over the default namespaces with `config`'s aliases applied.
    pub fn new(config: InterpreterConfig) -> Result<Self, ConfigError> {
        let namespaces = config.apply_aliases(NamespaceRegistry::with_defaults())?;
        Ok(Self::with_registry(Rc::new(namespaces), Rc::new(config)))
    }

    pub fn with_registry(namespaces: Rc<NamespaceRegistry>, config: Rc<InterpreterConfig>) -> Self {
        Evaluator {
            config,
            namespaces,
            forms: Rc::new(FormTable::standard()),
            graph: Graph::new(),
            nesting_level: 0,
        }
    }

    /// Same configuration, namespaces and forms, emitting into a fresh graph.
    /// The nesting level carries over so work done in the fork still counts
    /// against `max_depth`.
    pub fn fork(&self) -> Self {
        Evaluator {
            config: self.config.clone(),
            namespaces: self.namespaces.clone(),
            forms: self.forms.clone(),
            graph: Graph::new(),
            nesting_level: self.nesting_level,
        }
    }

    /// A fresh program-level scope over this evaluator's namespaces.
    pub fn root_context(&self) -> Rc<Context> {
        Context::root(self.namespaces.clone())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn forms(&self) -> &FormTable {
        &self.forms
    }

    pub fn nesting_level(&self) -> usize {
        self.nesting_level
    }

    /// Evaluate `expr` in `ctx`. Atoms evaluate to themselves; lists are
    /// dispatched on their head tag.
    pub fn eval(&mut self, ctx: &Rc<Context>, expr: &Expression) -> RuntimeResult<Value> {
        self.nesting_level += 1;
        let result = if self.nesting_level > self.config.max_depth {
            Err(RuntimeError::RecursionLimit {
                limit: self.config.max_depth,
                expression: expr.to_string(),
            })
        } else {
            match expr {
                Expression::List(items) => self.eval_form(ctx, expr, items),
                Expression::Nil => Ok(Value::Nil),
                Expression::Boolean(b) => Ok(Value::Boolean(*b)),
                Expression::Integer(i) => Ok(Value::Integer(*i)),
                Expression::Float(x) => Ok(Value::Float(*x)),
                Expression::String(s) => Ok(Value::String(s.clone())),
            }
        };
        self.nesting_level -= 1;
        result
    }

    /// Evaluate each expression in order, returning every result.
    pub fn eval_all(&mut self, ctx: &Rc<Context>, exprs: &[Expression]) -> RuntimeResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(ctx, expr)).collect()
    }

    fn eval_form(
        &mut self,
        ctx: &Rc<Context>,
        expr: &Expression,
        items: &[Expression],
    ) -> RuntimeResult<Value> {
        let Some(head) = items.first() else {
            return Err(RuntimeError::MalformedForm {
                form: "list".to_string(),
                message: "a form needs a head tag".to_string(),
                expression: expr.to_string(),
            });
        };
        let unknown = || RuntimeError::UnknownForm {
            tag: head.as_str().map_or_else(|| head.to_string(), str::to_string),
            expression: expr.to_string(),
        };
        let tag = head.as_str().ok_or_else(unknown)?;
        let handler = self.forms.get(tag).ok_or_else(unknown)?;
        let operands = &items[1..];

        tracing::trace!(
            depth = self.nesting_level,
            tag,
            class = ?handler.class(),
            "{}{}",
            "  ".repeat(self.nesting_level.saturating_sub(1)),
            expr
        );

        match handler {
            FormHandler::Special(handle) => handle(self, ctx, expr, operands),
            FormHandler::NamedConstructor(handle) => {
                let (name_expr, rest) = operands.split_first().ok_or_else(|| {
                    RuntimeError::MalformedForm {
                        form: tag.to_string(),
                        message: "missing name operand".to_string(),
                        expression: expr.to_string(),
                    }
                })?;
                let name = optional_name(expr, name_expr)?;
                let values = self.eval_all(ctx, rest)?;
                handle(self, ctx, expr, name, values)
            }
            FormHandler::Application(handle) => {
                let values = self.eval_all(ctx, operands)?;
                handle(self, ctx, expr, values)
            }
        }
    }
}

fn take<const N: usize>(form: &Expression, values: Vec<Value>) -> RuntimeResult<[Value; N]> {
    values.try_into().map_err(|values: Vec<Value>| RuntimeError::MalformedForm {
        form: form.tag().unwrap_or_default().to_string(),
        message: format!("expected {} operands, got {}", N, values.len()),
        expression: form.to_string(),
    })
}

fn named_tensor(
    ev: &mut Evaluator,
    ctx: &Rc<Context>,
    form: &Expression,
    name: Option<&str>,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    let [shape, dtype, value] = take::<3>(form, values)?;
    let shape = ops::to_shape(&shape.unwrap_bag()?, "named tensor")?;
    let dtype = match dtype.unwrap_bag()? {
        Value::Nil => None,
        other => Some(ops::to_dtype(&other, "named tensor")?),
    };
    let node = Value::Node(ops::constant(
        ev.graph(),
        name,
        &value.unwrap_bag()?,
        Some(shape),
        dtype,
    )?);
    ctx.possible_leaf(&node);
    if let Some(name) = name {
        ctx.define_local(name, node.clone())?;
    }
    Ok(node)
}

fn named_placeholder(
    ev: &mut Evaluator,
    ctx: &Rc<Context>,
    form: &Expression,
    name: Option<&str>,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    let name = name.ok_or_else(|| RuntimeError::MalformedForm {
        form: "_named_placeholder".to_string(),
        message: "a placeholder must be named".to_string(),
        expression: form.to_string(),
    })?;
    let [shape, dtype] = take::<2>(form, values)?;
    let node = ops::placeholder(
        ev.graph(),
        Some(name),
        ops::to_dtype(&dtype.unwrap_bag()?, "placeholder")?,
        ops::to_shape(&shape.unwrap_bag()?, "placeholder")?,
    )?;
    let node = Value::Node(node);
    ctx.define_local(name, node.clone())?;
    Ok(node)
}

fn type_tag(
    _ev: &mut Evaluator,
    _ctx: &Rc<Context>,
    form: &Expression,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    let [name] = take::<1>(form, values)?;
    let name = name
        .as_str()
        .ok_or_else(|| RuntimeError::type_mismatch("type name", name.type_name(), "type"))?;
    DType::from_name(name)
        .map(Value::Type)
        .ok_or_else(|| RuntimeError::Lookup {
            kind: LookupKind::Type,
            name: name.to_string(),
            visible: DType::names().iter().map(|n| n.to_string()).collect(),
        })
}

fn shape(
    _ev: &mut Evaluator,
    _ctx: &Rc<Context>,
    _form: &Expression,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    // A single list operand is the dimension list itself.
    let dims = match <[Value; 1]>::try_from(values) {
        Ok([Value::List(dims)]) => dims,
        Ok([single]) => vec![single],
        Err(values) => values,
    };
    let dims = dims
        .into_iter()
        .map(Value::unwrap_bag)
        .collect::<RuntimeResult<Vec<_>>>()?;
    ops::to_shape(&Value::List(dims), "shape").map(Value::Shape)
}

fn whole(
    _ev: &mut Evaluator,
    _ctx: &Rc<Context>,
    form: &Expression,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    match take::<1>(form, values)? {
        [Value::Integer(i)] => Ok(Value::Integer(i)),
        [Value::String(digits)] => digits
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| RuntimeError::type_mismatch("integer literal", &format!("{:?} ({})", digits, e), "whole")),
        [other] => Err(RuntimeError::type_mismatch("integer literal", other.type_name(), "whole")),
    }
}

fn fraction(
    _ev: &mut Evaluator,
    _ctx: &Rc<Context>,
    form: &Expression,
    values: Vec<Value>,
) -> RuntimeResult<Value> {
    match take::<1>(form, values)? {
        [Value::Float(x)] => Ok(Value::Float(x)),
        [Value::Integer(i)] => Ok(Value::Float(i as f64)),
        [Value::String(decimal)] => decimal
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| RuntimeError::type_mismatch("decimal literal", &format!("{:?} ({})", decimal, e), "fraction")),
        [other] => Err(RuntimeError::type_mismatch("decimal literal", other.type_name(), "fraction")),
    }
}
