// Runtime value system for Nao
// Values produced while walking a program (distinct from the input Expression tree)

use crate::graph::{AttrValue, DType, NodeRef, Shape};
use crate::runtime::error::{LookupKind, RuntimeError, RuntimeResult};
use crate::runtime::functions::Function;
use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt;

/// Call-site attributes (keyword configuration), in insertion order.
pub type Attributes = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Type(DType),
    Shape(Shape),
    Node(NodeRef),
    List(Vec<Value>),
    Attributes(Attributes),
    Function(Function),
    Bag(RetvalBag),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Type(_) => "type",
            Value::Shape(_) => "shape",
            Value::Node(_) => "node",
            Value::List(_) => "list",
            Value::Attributes(_) => "attributes",
            Value::Function(_) => "function",
            Value::Bag(_) => "retval-bag",
        }
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Replace a bag by its sole entry; every other value is returned as is.
    pub fn unwrap_bag(self) -> RuntimeResult<Value> {
        match self {
            Value::Bag(bag) => bag.get(None).cloned(),
            other => Ok(other),
        }
    }

    /// Convert to a node attribute, if this kind of value can be stored on a
    /// node record.
    pub fn to_attr(&self) -> Option<AttrValue> {
        match self {
            Value::Boolean(b) => Some(AttrValue::Bool(*b)),
            Value::Integer(i) => Some(AttrValue::Int(*i)),
            Value::Float(x) => Some(AttrValue::Float(*x)),
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            Value::Type(t) => Some(AttrValue::Type(*t)),
            Value::Shape(s) => Some(AttrValue::Shape(s.clone())),
            Value::List(items) => items
                .iter()
                .map(Value::to_attr)
                .collect::<Option<Vec<_>>>()
                .map(AttrValue::List),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Type(t) => write!(f, "#type({})", t),
            Value::Shape(s) => write!(f, "#shape{}", s),
            Value::Node(n) => write!(f, "#node({})", n.name()),
            Value::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Value::Attributes(attrs) => write!(f, "{{{}}}", render_attributes(attrs)),
            Value::Function(func) => write!(f, "{}", func),
            Value::Bag(bag) => write!(f, "{}", bag),
        }
    }
}

pub(crate) fn render_values(values: &[Value]) -> String {
    values.iter().join(", ")
}

pub(crate) fn render_attributes(attrs: &Attributes) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .join(", ")
}

/// Ordered name -> value bundle holding the outputs of a function call.
///
/// A bag never contains another bag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetvalBag {
    entries: IndexMap<String, Value>,
}

impl RetvalBag {
    pub fn new(entries: IndexMap<String, Value>) -> RuntimeResult<Self> {
        if let Some((key, _)) = entries.iter().find(|(_, v)| matches!(v, Value::Bag(_))) {
            return Err(RuntimeError::MalformedBag(format!(
                "can't put a retval bag into another (under key '{}')",
                key
            )));
        }
        Ok(RetvalBag { entries })
    }

    pub fn from_pairs<I>(pairs: I) -> RuntimeResult<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self::new(pairs.into_iter().collect())
    }

    /// Fetch the entry for `key`; `None` selects the sole entry and fails
    /// unless the bag holds exactly one.
    pub fn get(&self, key: Option<&str>) -> RuntimeResult<&Value> {
        match key {
            None => match self.entries.len() {
                1 => Ok(&self.entries[0]),
                0 => Err(RuntimeError::MalformedBag(
                    "can't get default retval of an empty bag".to_string(),
                )),
                _ => Err(RuntimeError::MalformedBag(format!(
                    "can't get default retval of a bag with more than one entry: {}",
                    self
                ))),
            },
            Some(key) => self.entries.get(key).ok_or_else(|| RuntimeError::Lookup {
                kind: LookupKind::BagKey,
                name: key.to_string(),
                visible: self.keys().map(str::to_string).collect(),
            }),
        }
    }

    pub fn length(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for RetvalBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#bag{{{}}}",
            self.entries
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, i64)]) -> RetvalBag {
        RetvalBag::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Integer(*v))),
        )
        .unwrap()
    }

    #[test]
    fn sole_entry_matches_keyed_access() {
        let one = bag(&[("out", 7)]);
        assert_eq!(one.get(None).unwrap(), one.get(Some("out")).unwrap());
        assert_eq!(one.length(), 1);
    }

    #[test]
    fn sole_entry_requires_exactly_one() {
        assert!(matches!(
            bag(&[]).get(None),
            Err(RuntimeError::MalformedBag(_))
        ));
        assert!(matches!(
            bag(&[("a", 1), ("b", 2)]).get(None),
            Err(RuntimeError::MalformedBag(_))
        ));
    }

    #[test]
    fn nested_bags_are_rejected() {
        let inner = Value::Bag(bag(&[("x", 1)]));
        let err = RetvalBag::from_pairs(vec![("outer".to_string(), inner)]).unwrap_err();
        assert!(matches!(err, RuntimeError::MalformedBag(_)));
    }

    #[test]
    fn missing_key_reports_available_keys() {
        let err = bag(&[("a", 1)]).get(Some("b")).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Lookup {
                kind: LookupKind::BagKey,
                name: "b".to_string(),
                visible: vec!["a".to_string()],
            }
        );
    }

    #[test]
    fn unwrap_bag_passes_plain_values_through() {
        assert_eq!(Value::Integer(3).unwrap_bag().unwrap(), Value::Integer(3));
        assert_eq!(
            Value::Bag(bag(&[("x", 4)])).unwrap_bag().unwrap(),
            Value::Integer(4)
        );
    }
}
