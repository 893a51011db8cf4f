//! Nao Runtime System
//!
//! Scope chain, callable values and the evaluator that walks a program and
//! records the computation graph it describes.

pub mod capture;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod namespace;
pub mod special_forms;
pub mod values;

pub use capture::reassemble;
pub use environment::Context;
pub use error::{BindingKind, LookupKind, RuntimeError, RuntimeResult};
pub use evaluator::{Evaluator, FormClass, FormHandler, FormTable};
pub use functions::{ArgSpec, DeclaredFunction, Function, PrimitiveFunction, RetvalSpec, SyntheticFunction};
pub use namespace::{Namespace, NamespaceRegistry, PrimitiveFn};
pub use values::{Attributes, RetvalBag, Value};

use crate::ast::Expression;
use crate::config::{ConfigError, InterpreterConfig};
use crate::graph::{Graph, GraphDef};
use std::rc::Rc;

/// Result of one build pass: the graph, the program-level scope and the
/// value of each top-level expression.
#[derive(Debug)]
pub struct Compiled {
    pub graph: Graph,
    pub context: Rc<Context>,
    pub values: Vec<Value>,
}

/// Entry point for build passes. Holds the configuration and namespace
/// registry; every pass gets its own evaluator and graph.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: Rc<InterpreterConfig>,
    namespaces: Rc<NamespaceRegistry>,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler {
            config: Rc::new(InterpreterConfig::default()),
            namespaces: Rc::new(NamespaceRegistry::with_defaults()),
        }
    }
}

impl Compiler {
    pub fn new(config: InterpreterConfig) -> Result<Self, ConfigError> {
        let namespaces = config.apply_aliases(NamespaceRegistry::with_defaults())?;
        Ok(Compiler {
            config: Rc::new(config),
            namespaces: Rc::new(namespaces),
        })
    }

    pub fn with_registry(config: InterpreterConfig, namespaces: NamespaceRegistry) -> Self {
        Compiler {
            config: Rc::new(config),
            namespaces: Rc::new(namespaces),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    /// A fresh evaluator sharing this compiler's configuration.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::with_registry(self.namespaces.clone(), self.config.clone())
    }

    /// Evaluate every top-level expression in one root scope.
    pub fn run(&self, program: &[Expression]) -> RuntimeResult<Compiled> {
        let mut evaluator = self.evaluator();
        let context = evaluator.root_context();
        let values = evaluator.eval_all(&context, program)?;
        tracing::info!(
            expressions = program.len(),
            nodes = evaluator.graph().len(),
            "compiled program"
        );
        Ok(Compiled {
            graph: evaluator.graph().clone(),
            context,
            values,
        })
    }

    /// Evaluate `program` and return the resulting graph description.
    pub fn compile(&self, program: &[Expression]) -> RuntimeResult<GraphDef> {
        self.run(program).map(|compiled| compiled.graph.to_graph_def())
    }
}
