//! Argument trees passed through the dispatch entry point.

use indexmap::IndexMap;

use crate::proxy::CompositeTensor;

/// Keyword arguments, kept in call order.
pub type Kwargs<T> = IndexMap<String, Value<T>>;

/// A node in an operation's argument or result tree.
#[derive(Debug, Clone)]
pub enum Value<T> {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tensor(T),
    Composite(CompositeTensor<T>),
    List(Vec<Value<T>>),
    Dict(IndexMap<String, Value<T>>),
}

impl<T> Value<T> {
    pub fn tensor(tensor: T) -> Self {
        Value::Tensor(tensor)
    }

    pub fn as_tensor(&self) -> Option<&T> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<T> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeTensor<T>> {
        match self {
            Value::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    pub fn into_composite(self) -> Option<CompositeTensor<T>> {
        match self {
            Value::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Composite(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value<T>]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tensor(_) => "tensor",
            Value::Composite(_) => "composite",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }
}

impl<T> From<CompositeTensor<T>> for Value<T> {
    fn from(composite: CompositeTensor<T>) -> Self {
        Value::Composite(composite)
    }
}

impl<T> From<bool> for Value<T> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T> From<i64> for Value<T> {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl<T> From<f64> for Value<T> {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T> From<&str> for Value<T> {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl<T> From<String> for Value<T> {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T> From<Vec<Value<T>>> for Value<T> {
    fn from(items: Vec<Value<T>>) -> Self {
        Value::List(items)
    }
}
