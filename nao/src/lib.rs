//! Nao: compiles nested-list expression programs into computation graphs.
//!
//! Programs are trees of literals and tagged lists (usually loaded from
//! JSON). Evaluating them never computes numbers; it records graph nodes,
//! their naming scopes and their ordering constraints.

pub mod ast;
pub mod config;
pub mod graph;
pub mod ops;
pub mod runtime;

pub use ast::{parse_expression, parse_program, Expression};
pub use config::{ConfigError, InterpreterConfig};
pub use graph::{Graph, GraphDef, GraphError, NodeDef, NodeRef};
pub use runtime::{Compiled, Compiler, Context, Evaluator, RuntimeError, RuntimeResult, Value};

/// Compile `program` with the default configuration.
pub fn compile_program(program: &[Expression]) -> RuntimeResult<GraphDef> {
    Compiler::default().compile(program)
}
