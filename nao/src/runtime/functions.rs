// Callable values: external primitives, declared functions and synthetic
// (captured subgraph) functions

use crate::ast::Expression;
use crate::graph::{GraphDef, NodeRef};
use crate::ops;
use crate::runtime::environment::Context;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::namespace::PrimitiveFn;
use crate::runtime::values::{render_attributes, render_values, Attributes, RetvalBag, Value};
use indexmap::IndexMap;
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Function {
    Primitive(Rc<PrimitiveFunction>),
    Declared(Rc<DeclaredFunction>),
    Synthetic(Rc<SyntheticFunction>),
}

impl Function {
    /// Apply the function under naming scope `scope_name` with call-site
    /// attributes `attrs` and positional `args`.
    pub fn apply(
        &self,
        evaluator: &mut Evaluator,
        scope_name: Option<&str>,
        attrs: Option<Attributes>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        match self {
            Function::Primitive(f) => f.apply(evaluator, scope_name, attrs, args),
            Function::Declared(f) => f.apply(evaluator, scope_name, attrs, args),
            Function::Synthetic(f) => f.apply(evaluator, scope_name, attrs, args),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Primitive(f) => &f.name,
            Function::Declared(f) => &f.name,
            Function::Synthetic(_) => "synthetic",
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Primitive(p) => write!(f, "PrimitiveFunction({})", p.name),
            Function::Declared(d) => write!(f, "DeclaredFunction({})", d.name),
            Function::Synthetic(s) => write!(
                f,
                "SyntheticFunction({:?} -> {:?})",
                s.input_names, s.output_names
            ),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<function {}>", self.name())
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Primitive(a), Function::Primitive(b)) => Rc::ptr_eq(a, b),
            (Function::Declared(a), Function::Declared(b)) => Rc::ptr_eq(a, b),
            (Function::Synthetic(a), Function::Synthetic(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Wraps an external node constructor looked up in a namespace.
pub struct PrimitiveFunction {
    name: String,
    func: PrimitiveFn,
}

impl PrimitiveFunction {
    pub fn new(name: String, func: PrimitiveFn) -> Self {
        PrimitiveFunction { name, func }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(
        &self,
        evaluator: &mut Evaluator,
        scope_name: Option<&str>,
        attrs: Option<Attributes>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        let mut kwargs = attrs.unwrap_or_default();
        if let Some(name) = scope_name {
            kwargs.insert("name".to_string(), Value::String(name.to_string()));
        }

        tracing::debug!(function = %self.name, args = args.len(), "applying primitive");
        (self.func)(evaluator, args.clone(), kwargs.clone()).map_err(|cause| {
            RuntimeError::Apply {
                function: self.name.clone(),
                args: render_values(&args),
                attrs: render_attributes(&kwargs),
                cause: format!("{:#}", cause),
            }
        })
    }
}

/// One declared positional argument: `[name, shape-expr, type-expr]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub shape: Expression,
    pub dtype: Expression,
}

/// One declared return: `[output-name, internal-local-name]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetvalSpec {
    pub output: String,
    pub local: String,
}

/// A function written in the language itself. The body is re-walked on
/// every application, in a child of the scope the function was defined in.
pub struct DeclaredFunction {
    name: String,
    arg_specs: Vec<ArgSpec>,
    retval_specs: Vec<RetvalSpec>,
    body: Vec<Expression>,
    ctx: Rc<Context>,
    disassembly: RefCell<DisasmState>,
}

type Disassembly = (Vec<NodeRef>, Vec<Value>);

enum DisasmState {
    Idle,
    Running,
    Done(Disassembly),
}

impl DeclaredFunction {
    /// Build from the operands of a definition form:
    /// `[attr-specs, arg-specs, retval-specs, body...]`.
    pub fn from_form(
        ctx: Rc<Context>,
        name: &str,
        operands: &[Expression],
        form: &Expression,
    ) -> RuntimeResult<Self> {
        let malformed = |message: String| RuntimeError::MalformedForm {
            form: "function definition".to_string(),
            message,
            expression: form.to_string(),
        };

        if operands.len() < 3 {
            return Err(malformed(format!(
                "expected attribute, argument and return specs after the name, got {} operands",
                operands.len()
            )));
        }

        // Attribute specs are only checked for shape; call-site attributes
        // are bound whether or not they were declared.
        spec_list(&operands[0])
            .ok_or_else(|| malformed("attribute specs must be a list".to_string()))?
            .iter()
            .map(|spec| match spec {
                Expression::String(name) => Some(name.clone()),
                Expression::List(items) => items.first().and_then(Expression::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("attribute spec without a name".to_string()))?;

        let arg_specs = spec_list(&operands[1])
            .ok_or_else(|| malformed("argument specs must be a list".to_string()))?
            .iter()
            .map(|spec| match spec.as_list() {
                Some([Expression::String(name), shape, dtype]) => Some(ArgSpec {
                    name: name.clone(),
                    shape: shape.clone(),
                    dtype: dtype.clone(),
                }),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("argument spec must be [name, shape, type]".to_string()))?;

        let retval_specs = spec_list(&operands[2])
            .ok_or_else(|| malformed("return specs must be a list".to_string()))?
            .iter()
            .map(|spec| match spec.as_list() {
                Some([Expression::String(output), Expression::String(local)]) => Some(RetvalSpec {
                    output: output.clone(),
                    local: local.clone(),
                }),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("return spec must be [output, local]".to_string()))?;

        Ok(DeclaredFunction {
            name: name.to_string(),
            arg_specs,
            retval_specs,
            body: operands[3..].to_vec(),
            ctx,
            disassembly: RefCell::new(DisasmState::Idle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_specs(&self) -> &[ArgSpec] {
        &self.arg_specs
    }

    pub fn arg_names(&self) -> Vec<&str> {
        self.arg_specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn retval_specs(&self) -> &[RetvalSpec] {
        &self.retval_specs
    }

    /// Binds attributes and positional arguments in a child of the defining
    /// scope, walks the body, and returns the declared outputs as a bag keyed
    /// by output name. Node outputs are passed through an identity node named
    /// after the output, inside the call's naming scope.
    pub fn apply(
        &self,
        evaluator: &mut Evaluator,
        scope_name: Option<&str>,
        attrs: Option<Attributes>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        let ctx = self.ctx.subcontext();
        if let Some(attrs) = &attrs {
            for (name, value) in attrs {
                ctx.define_attr(name, value.clone())?;
            }
        }

        if args.len() != self.arg_specs.len() {
            return Err(RuntimeError::Apply {
                function: self.name.clone(),
                args: render_values(&args),
                attrs: attrs.as_ref().map(render_attributes).unwrap_or_default(),
                cause: format!(
                    "expected {} arguments ({}), got {}",
                    self.arg_specs.len(),
                    self.arg_names().join(", "),
                    args.len()
                ),
            });
        }

        tracing::debug!(
            function = %self.name,
            scope = scope_name.unwrap_or(&self.name),
            "applying declared function"
        );

        let graph = evaluator.graph().clone();
        graph.push_name_scope(scope_name.unwrap_or(&self.name));
        let result = self.run_body(evaluator, &ctx, args);
        graph.pop_name_scope();
        result.map(Value::Bag)
    }

    fn run_body(
        &self,
        evaluator: &mut Evaluator,
        ctx: &Rc<Context>,
        args: Vec<Value>,
    ) -> RuntimeResult<RetvalBag> {
        for (spec, arg) in self.arg_specs.iter().zip(args) {
            ctx.define_local(&spec.name, arg)?;
        }

        for expr in &self.body {
            evaluator.eval(ctx, expr)?;
        }

        let mut returned = IndexMap::new();
        for spec in &self.retval_specs {
            let value = match ctx.get_local(&spec.local)? {
                Value::Node(node) => Value::Node(ops::identity(evaluator.graph(), &spec.output, node)?),
                other => other,
            };
            returned.insert(spec.output.clone(), value);
        }
        RetvalBag::new(returned)
    }

    /// First disassembly, computed on demand and reused afterwards so inputs
    /// and outputs always come from the same isolated graph. A body that
    /// disassembles its own function fails instead of re-entering.
    pub fn disasm_cached(&self, evaluator: &Evaluator) -> RuntimeResult<Disassembly> {
        match &*self.disassembly.borrow() {
            DisasmState::Done(cached) => return Ok(cached.clone()),
            DisasmState::Running => {
                return Err(RuntimeError::Apply {
                    function: self.name.clone(),
                    args: String::new(),
                    attrs: String::new(),
                    cause: "disassembly is already in progress; the body introspects its own function"
                        .to_string(),
                })
            }
            DisasmState::Idle => {}
        }

        *self.disassembly.borrow_mut() = DisasmState::Running;
        let result = self.disasm(evaluator);
        *self.disassembly.borrow_mut() = match &result {
            Ok(disassembled) => DisasmState::Done(disassembled.clone()),
            Err(_) => DisasmState::Idle,
        };
        result
    }

    /// Walk the body once in a fresh, isolated graph with a placeholder per
    /// argument spec. Returns the placeholders and the declared outputs; the
    /// caller's graph is untouched.
    pub fn disasm(&self, evaluator: &Evaluator) -> RuntimeResult<Disassembly> {
        let mut isolated = evaluator.fork();
        let ctx = self.ctx.subcontext();

        let mut inputs = Vec::with_capacity(self.arg_specs.len());
        for spec in &self.arg_specs {
            let dtype = isolated.eval(&ctx, &spec.dtype)?.unwrap_bag()?;
            let shape = isolated.eval(&ctx, &spec.shape)?.unwrap_bag()?;
            let node = ops::placeholder(
                isolated.graph(),
                Some(&spec.name),
                ops::to_dtype(&dtype, "disasm")?,
                ops::to_shape(&shape, "disasm")?,
            )?;
            ctx.define_local(&spec.name, Value::Node(node.clone()))?;
            inputs.push(node);
        }

        for expr in &self.body {
            isolated.eval(&ctx, expr)?;
        }

        let outputs = self
            .retval_specs
            .iter()
            .map(|spec| ctx.get_local(&spec.local))
            .collect::<RuntimeResult<Vec<_>>>()?;

        tracing::debug!(
            function = %self.name,
            nodes = isolated.graph().len(),
            "disassembled declared function"
        );
        Ok((inputs, outputs))
    }
}

fn spec_list(expr: &Expression) -> Option<&[Expression]> {
    match expr {
        Expression::Nil => Some(&[]),
        Expression::List(items) => Some(items),
        _ => None,
    }
}

/// A function backed by a graph snapshot captured at reassembly time. Each
/// application splices a fresh, renamed copy of the snapshot.
#[derive(Debug, Clone)]
pub struct SyntheticFunction {
    input_names: Vec<String>,
    output_names: Vec<String>,
    snapshot: GraphDef,
}

impl SyntheticFunction {
    pub fn new(input_names: Vec<String>, output_names: Vec<String>, snapshot: GraphDef) -> Self {
        SyntheticFunction {
            input_names,
            output_names,
            snapshot,
        }
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn snapshot(&self) -> &GraphDef {
        &self.snapshot
    }

    pub fn apply(
        &self,
        evaluator: &mut Evaluator,
        scope_name: Option<&str>,
        _attrs: Option<Attributes>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        let failure = |cause: String| RuntimeError::Apply {
            function: format!("synthetic({})", self.output_names.iter().join(", ")),
            args: render_values(&args),
            attrs: String::new(),
            cause,
        };

        if args.len() != self.input_names.len() {
            return Err(failure(format!(
                "expected {} inputs ({}), got {}",
                self.input_names.len(),
                self.input_names.join(", "),
                args.len()
            )));
        }

        let mut input_map = HashMap::new();
        for (name, arg) in self.input_names.iter().zip(&args) {
            let node = arg
                .as_node()
                .ok_or_else(|| failure(format!("input '{}' bound to a {}", name, arg.type_name())))?;
            input_map.insert(name.clone(), node.clone());
        }

        let outputs = evaluator.graph().import_graph_def(
            &self.snapshot,
            scope_name.unwrap_or("synthetic"),
            &input_map,
            &self.output_names,
        )?;

        RetvalBag::from_pairs(
            self.output_names
                .iter()
                .cloned()
                .zip(outputs.into_iter().map(Value::Node)),
        )
        .map(Value::Bag)
    }
}
