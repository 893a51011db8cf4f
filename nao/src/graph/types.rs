// Element types, shapes and node attribute values

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a graph node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Half,
    Float,
    Double,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    String,
    Bool,
    Complex64,
    Complex128,
    Qint8,
    Qint32,
    Quint8,
}

impl DType {
    /// Resolve a type tag as written in programs.
    pub fn from_name(name: &str) -> Option<DType> {
        let dtype = match name {
            "half" => DType::Half,
            "float" => DType::Float,
            "double" => DType::Double,
            "int8" => DType::Int8,
            "int16" => DType::Int16,
            "int32" => DType::Int32,
            "int64" => DType::Int64,
            "uint8" => DType::Uint8,
            "uint16" => DType::Uint16,
            "string" => DType::String,
            "bool" => DType::Bool,
            "complex64" => DType::Complex64,
            "complex128" => DType::Complex128,
            "qint8" => DType::Qint8,
            "qint32" => DType::Qint32,
            "quint" => DType::Quint8,
            _ => return None,
        };
        Some(dtype)
    }

    pub fn names() -> &'static [&'static str] {
        &[
            "half", "float", "double", "int8", "int16", "int32", "int64", "uint8", "uint16",
            "string", "bool", "complex64", "complex128", "qint8", "qint32", "quint",
        ]
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Half => "half",
            DType::Float => "float",
            DType::Double => "double",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::String => "string",
            DType::Bool => "bool",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::Qint8 => "qint8",
            DType::Qint32 => "qint32",
            DType::Quint8 => "quint8",
        };
        write!(f, "{}", name)
    }
}

/// Static shape of a node's output. `dims == None` means unknown rank;
/// a `None` dimension is unknown size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Option<Vec<Option<i64>>>,
}

impl Shape {
    pub fn unknown() -> Self {
        Shape { dims: None }
    }

    pub fn scalar() -> Self {
        Shape { dims: Some(vec![]) }
    }

    pub fn from_dims<I: IntoIterator<Item = Option<i64>>>(dims: I) -> Self {
        Shape {
            dims: Some(dims.into_iter().collect()),
        }
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dims {
            None => write!(f, "<unknown>"),
            Some(dims) => write!(
                f,
                "({})",
                dims.iter()
                    .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
                    .join(", ")
            ),
        }
    }
}

/// Typed attribute stored on a node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Type(DType),
    Shape(Shape),
    List(Vec<AttrValue>),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::Type(t) => write!(f, "{}", t),
            AttrValue::Shape(s) => write!(f, "{}", s),
            AttrValue::List(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}
