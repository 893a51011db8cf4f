// Expression model for Nao programs
// Trees arrive already parsed: atoms, or lists headed by a form tag.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a parsed program.
///
/// Lists whose head is a string are forms; the evaluator resolves the head
/// through its form table. Lists used as raw data (argument specs, attribute
/// pairs, shape dimensions) are only ever read structurally by the special
/// form that receives them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Expression>),
}

impl Expression {
    pub fn string<A: AsRef<str>>(s: A) -> Self {
        Expression::String(s.as_ref().to_owned())
    }

    pub fn list<I: IntoIterator<Item = Expression>>(items: I) -> Self {
        Expression::List(items.into_iter().collect())
    }

    /// Build a form `[tag, args...]`.
    pub fn form<I: IntoIterator<Item = Expression>>(tag: &str, args: I) -> Self {
        let mut items = vec![Expression::string(tag)];
        items.extend(args);
        Expression::List(items)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expression::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expression]> {
        match self {
            Expression::List(items) => Some(items),
            _ => None,
        }
    }

    /// The head tag of a form, if this expression is one.
    pub fn tag(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(Expression::as_str)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Expression::Nil => "nil",
            Expression::Boolean(_) => "boolean",
            Expression::Integer(_) => "integer",
            Expression::Float(_) => "float",
            Expression::String(_) => "string",
            Expression::List(_) => "list",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Nil => write!(f, "nil"),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Integer(i) => write!(f, "{}", i),
            Expression::Float(x) => write!(f, "{}", x),
            Expression::String(s) => write!(f, "{:?}", s),
            Expression::List(items) => write!(f, "[{}]", items.iter().join(" ")),
        }
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::string(s)
    }
}

impl From<i64> for Expression {
    fn from(i: i64) -> Self {
        Expression::Integer(i)
    }
}

/// Load a parser-produced program (a JSON array of top-level expressions).
pub fn parse_program(json: &str) -> Result<Vec<Expression>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Load a single parser-produced expression from JSON.
pub fn parse_expression(json: &str) -> Result<Expression, serde_json::Error> {
    serde_json::from_str(json)
}
