// Error handling for the Nao interpreter

use crate::graph::GraphError;
use std::fmt;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// What kind of name a failed lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Local,
    Attribute,
    Namespace,
    NamespaceMember,
    BagKey,
    Type,
    IndexKey,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            LookupKind::Local => "local or function",
            LookupKind::Attribute => "attribute",
            LookupKind::Namespace => "namespace",
            LookupKind::NamespaceMember => "namespace member",
            LookupKind::BagKey => "retval",
            LookupKind::Type => "type",
            LookupKind::IndexKey => "index key",
        };
        write!(f, "{}", kind)
    }
}

/// Which write-once binding a redefinition collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Local,
    Attribute,
    /// An attribute whose name is already bound as a local.
    AttributeShadowsLocal,
    Function,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            BindingKind::Local => "local already defined",
            BindingKind::Attribute => "attribute already defined",
            BindingKind::AttributeShadowsLocal => "can't define attribute, local exists with name",
            BindingKind::Function => "function already defined",
        };
        write!(f, "{}", kind)
    }
}

/// Failures of a build pass. None of them is recovered inside the
/// interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("no such {kind}: {name}; have: [{}]", .visible.join(", "))]
    Lookup {
        kind: LookupKind,
        name: String,
        visible: Vec<String>,
    },

    #[error("{kind}: {name}")]
    Redefinition { kind: BindingKind, name: String },

    #[error("tried to call {function} with args [{args}] and attrs {{{attrs}}}: {cause}")]
    Apply {
        function: String,
        args: String,
        attrs: String,
        cause: String,
    },

    #[error("malformed retval bag: {0}")]
    MalformedBag(String),

    #[error("unknown form '{tag}' in {expression}")]
    UnknownForm { tag: String, expression: String },

    #[error("malformed {form} form: {message} in {expression}")]
    MalformedForm {
        form: String,
        message: String,
        expression: String,
    },

    #[error("type mismatch in {operation}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        operation: String,
    },

    #[error("nesting limit of {limit} exceeded while evaluating {expression}")]
    RecursionLimit { limit: usize, expression: String },

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl RuntimeError {
    pub fn type_mismatch(expected: &str, actual: &str, operation: &str) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
            operation: operation.to_string(),
        }
    }
}
