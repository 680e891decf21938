//! Runtime objects and the capability views they expose to the inspector.

use crate::debugger::utils::{read, write};
use crate::debugger::variable::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::any::Any;
use std::sync::{Arc, RwLock};

/// Object living in the engine memory.
///
/// An object advertises what it can do through capability views, the inspector picks
/// the richest one available for the concrete type.
pub trait Object: Any + Send + Sync {
    fn type_name(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    fn as_mapping(&self) -> Option<&dyn Mapping> {
        None
    }

    fn as_read_only_mapping(&self) -> Option<&dyn ReadOnlyMapping> {
        None
    }

    fn as_list(&self) -> Option<&dyn List> {
        None
    }

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        None
    }

    fn as_record(&self) -> Option<&dyn Record> {
        None
    }
}

pub trait ReadOnlyMapping {
    fn keys(&self) -> Vec<String>;

    fn value(&self, key: &str) -> Option<Value>;
}

pub trait Mapping: ReadOnlyMapping {
    fn insert(&self, key: &str, value: Value);
}

pub trait Sequence {
    fn items(&self) -> Vec<Value>;
}

pub trait List: Sequence {
    fn len(&self) -> usize;

    fn item(&self, index: usize) -> Option<Value>;

    /// Replace an existing element, return `false` if `index` is out of bounds.
    fn replace(&self, index: usize, value: Value) -> bool;
}

/// Plain data observed through its serialized form.
pub trait Record {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// Mutable string keyed map, keys keep insertion order.
#[derive(Default)]
pub struct Map {
    entries: RwLock<IndexMap<String, Value>>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Object for Map {
    fn type_name(&self) -> String {
        "Map".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_mapping(&self) -> Option<&dyn Mapping> {
        Some(self)
    }

    fn as_read_only_mapping(&self) -> Option<&dyn ReadOnlyMapping> {
        Some(self)
    }
}

impl ReadOnlyMapping for Map {
    fn keys(&self) -> Vec<String> {
        read(&self.entries).keys().cloned().collect()
    }

    fn value(&self, key: &str) -> Option<Value> {
        read(&self.entries).get(key).cloned()
    }
}

impl Mapping for Map {
    fn insert(&self, key: &str, value: Value) {
        write(&self.entries).insert(key.to_string(), value);
    }
}

/// Immutable string keyed map.
pub struct FrozenMap {
    entries: IndexMap<String, Value>,
}

impl FrozenMap {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl Object for FrozenMap {
    fn type_name(&self) -> String {
        "FrozenMap".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_read_only_mapping(&self) -> Option<&dyn ReadOnlyMapping> {
        Some(self)
    }
}

impl ReadOnlyMapping for FrozenMap {
    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }
}

/// Mutable indexed list.
#[derive(Default)]
pub struct Array {
    items: RwLock<Vec<Value>>,
}

impl Array {
    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().collect()),
        }
    }
}

impl Object for Array {
    fn type_name(&self) -> String {
        "Array".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_list(&self) -> Option<&dyn List> {
        Some(self)
    }

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }
}

impl Sequence for Array {
    fn items(&self) -> Vec<Value> {
        read(&self.items).clone()
    }
}

impl List for Array {
    fn len(&self) -> usize {
        read(&self.items).len()
    }

    fn item(&self, index: usize) -> Option<Value> {
        read(&self.items).get(index).cloned()
    }

    fn replace(&self, index: usize, value: Value) -> bool {
        match write(&self.items).get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Immutable sequence without random access.
pub struct Seq {
    items: Vec<Value>,
}

impl Seq {
    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl Object for Seq {
    fn type_name(&self) -> String {
        "Seq".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }
}

impl Sequence for Seq {
    fn items(&self) -> Vec<Value> {
        self.items.clone()
    }
}

/// Wrap any serializable engine type, its fields become read-only children.
pub struct Serialized<T> {
    inner: T,
}

impl<T> Serialized<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T> Object for Serialized<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn type_name(&self) -> String {
        let full = std::any::type_name::<T>();
        // strip module path, keep generic arguments as is
        let base = full.split('<').next().unwrap_or(full);
        match base.rfind("::") {
            Some(pos) => full[pos + 2..].to_string(),
            None => full.to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_record(&self) -> Option<&dyn Record> {
        Some(self)
    }
}

impl<T: Serialize> Record for Serialized<T> {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.inner)
    }
}

/// Shorthand for wrapping an object into a [`Value`].
pub fn object(object: impl Object) -> Value {
    Value::Object(Arc::new(object))
}
