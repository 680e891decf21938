//! Engine values and their generic inspection.

pub mod model;
pub mod object;

pub use model::Inspector;
pub use object::{
    object, Array, FrozenMap, List, Map, Mapping, Object, ReadOnlyMapping, Record, Seq, Sequence,
    Serialized,
};

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A value observed in dialog memory.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Object(Arc<dyn Object>),
}

impl Value {
    /// Convert parsed JSON into mutable engine values.
    pub fn from_json(json: &serde_json::Value) -> Self {
        Self::convert(json, false)
    }

    /// Convert parsed JSON into read-only engine values.
    pub fn from_json_frozen(json: &serde_json::Value) -> Self {
        Self::convert(json, true)
    }

    fn convert(json: &serde_json::Value, frozen: bool) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|item| Self::convert(item, frozen));
                if frozen {
                    object(Seq::from_items(items))
                } else {
                    object(Array::from_items(items))
                }
            }
            serde_json::Value::Object(entries) => {
                let entries = entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::convert(value, frozen)));
                if frozen {
                    object(FrozenMap::from_entries(entries))
                } else {
                    object(Map::from_entries(entries))
                }
            }
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => write!(f, "Object({})", o.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Arc<dyn Object>> for Value {
    fn from(value: Arc<dyn Object>) -> Self {
        Value::Object(value)
    }
}
