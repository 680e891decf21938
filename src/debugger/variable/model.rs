//! Inspection strategies and the per type strategy registry.

use crate::debugger::utils::lock;
use crate::debugger::variable::{Object, Value};
use crate::debugger::Error;
use crate::muted_error;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Mutex;

/// One way of looking into an object.
pub trait DataModel: Send + Sync {
    /// Preference among the strategies accepting the same object, higher wins.
    fn rank(&self) -> u8;

    fn accepts(&self, object: &dyn Object) -> bool;

    fn is_scalar(&self) -> bool {
        false
    }

    fn names(&self, object: &dyn Object) -> Vec<String>;

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error>;

    fn set(&self, object: &dyn Object, name: &str, value: Value) -> Result<(), Error>;

    fn describe(&self, object: &dyn Object) -> String;
}

fn not_found(object: &dyn Object, name: &str) -> Error {
    Error::NameNotFound {
        type_name: object.type_name(),
        name: name.to_string(),
    }
}

fn count(n: usize) -> String {
    format!("Count = {n}")
}

fn index_of(object: &dyn Object, name: &str) -> Result<usize, Error> {
    name.parse::<usize>().map_err(|_| not_found(object, name))
}

struct MappingModel;

impl DataModel for MappingModel {
    fn rank(&self) -> u8 {
        6
    }

    fn accepts(&self, object: &dyn Object) -> bool {
        object.as_mapping().is_some()
    }

    fn names(&self, object: &dyn Object) -> Vec<String> {
        object.as_mapping().map(|m| m.keys()).unwrap_or_default()
    }

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error> {
        object
            .as_mapping()
            .and_then(|m| m.value(name))
            .ok_or_else(|| not_found(object, name))
    }

    fn set(&self, object: &dyn Object, name: &str, value: Value) -> Result<(), Error> {
        let mapping = object
            .as_mapping()
            .ok_or_else(|| Error::ReadOnly(object.type_name()))?;
        mapping.insert(name, value);
        Ok(())
    }

    fn describe(&self, object: &dyn Object) -> String {
        count(self.names(object).len())
    }
}

struct ReadOnlyMappingModel;

impl DataModel for ReadOnlyMappingModel {
    fn rank(&self) -> u8 {
        5
    }

    fn accepts(&self, object: &dyn Object) -> bool {
        object.as_read_only_mapping().is_some()
    }

    fn names(&self, object: &dyn Object) -> Vec<String> {
        object
            .as_read_only_mapping()
            .map(|m| m.keys())
            .unwrap_or_default()
    }

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error> {
        object
            .as_read_only_mapping()
            .and_then(|m| m.value(name))
            .ok_or_else(|| not_found(object, name))
    }

    fn set(&self, object: &dyn Object, _: &str, _: Value) -> Result<(), Error> {
        Err(Error::ReadOnly(object.type_name()))
    }

    fn describe(&self, object: &dyn Object) -> String {
        count(self.names(object).len())
    }
}

struct ListModel;

impl DataModel for ListModel {
    fn rank(&self) -> u8 {
        4
    }

    fn accepts(&self, object: &dyn Object) -> bool {
        object.as_list().is_some()
    }

    fn names(&self, object: &dyn Object) -> Vec<String> {
        let len = object.as_list().map(|l| l.len()).unwrap_or_default();
        (0..len).map(|i| i.to_string()).collect()
    }

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error> {
        let index = index_of(object, name)?;
        object
            .as_list()
            .and_then(|l| l.item(index))
            .ok_or_else(|| not_found(object, name))
    }

    fn set(&self, object: &dyn Object, name: &str, value: Value) -> Result<(), Error> {
        let index = index_of(object, name)?;
        let list = object
            .as_list()
            .ok_or_else(|| Error::ReadOnly(object.type_name()))?;
        if !list.replace(index, value) {
            return Err(not_found(object, name));
        }
        Ok(())
    }

    fn describe(&self, object: &dyn Object) -> String {
        count(object.as_list().map(|l| l.len()).unwrap_or_default())
    }
}

struct SequenceModel;

impl DataModel for SequenceModel {
    fn rank(&self) -> u8 {
        3
    }

    fn accepts(&self, object: &dyn Object) -> bool {
        object.as_sequence().is_some()
    }

    fn names(&self, object: &dyn Object) -> Vec<String> {
        let len = object.as_sequence().map(|s| s.items().len()).unwrap_or_default();
        (0..len).map(|i| i.to_string()).collect()
    }

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error> {
        let index = index_of(object, name)?;
        object
            .as_sequence()
            .and_then(|s| s.items().into_iter().nth(index))
            .ok_or_else(|| not_found(object, name))
    }

    fn set(&self, object: &dyn Object, _: &str, _: Value) -> Result<(), Error> {
        Err(Error::ReadOnly(object.type_name()))
    }

    fn describe(&self, object: &dyn Object) -> String {
        count(self.names(object).len())
    }
}

struct RecordModel;

impl RecordModel {
    fn json(object: &dyn Object) -> serde_json::Value {
        object
            .as_record()
            .and_then(|r| muted_error!(r.to_json(), "record serialization:"))
            .unwrap_or_default()
    }
}

impl DataModel for RecordModel {
    fn rank(&self) -> u8 {
        2
    }

    fn accepts(&self, object: &dyn Object) -> bool {
        object.as_record().is_some()
    }

    fn names(&self, object: &dyn Object) -> Vec<String> {
        match Self::json(object) {
            serde_json::Value::Object(fields) => fields.keys().cloned().collect(),
            serde_json::Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => vec![],
        }
    }

    fn get(&self, object: &dyn Object, name: &str) -> Result<Value, Error> {
        let field = match Self::json(object) {
            serde_json::Value::Object(mut fields) => fields.remove(name),
            serde_json::Value::Array(mut items) => {
                let index = index_of(object, name)?;
                (index < items.len()).then(|| items.swap_remove(index))
            }
            _ => None,
        };
        field
            .map(|json| Value::from_json_frozen(&json))
            .ok_or_else(|| not_found(object, name))
    }

    fn set(&self, object: &dyn Object, _: &str, _: Value) -> Result<(), Error> {
        Err(Error::ReadOnly(object.type_name()))
    }

    fn describe(&self, object: &dyn Object) -> String {
        object.type_name()
    }
}

/// Objects without any capability, shown by type name only.
struct OpaqueModel;

impl DataModel for OpaqueModel {
    fn rank(&self) -> u8 {
        1
    }

    fn accepts(&self, _: &dyn Object) -> bool {
        true
    }

    fn is_scalar(&self) -> bool {
        true
    }

    fn names(&self, _: &dyn Object) -> Vec<String> {
        vec![]
    }

    fn get(&self, object: &dyn Object, _: &str) -> Result<Value, Error> {
        Err(Error::ScalarValue(object.type_name()))
    }

    fn set(&self, object: &dyn Object, _: &str, _: Value) -> Result<(), Error> {
        Err(Error::ReadOnly(object.type_name()))
    }

    fn describe(&self, object: &dyn Object) -> String {
        object.type_name()
    }
}

static MODELS: [&dyn DataModel; 6] = [
    &MappingModel,
    &ReadOnlyMappingModel,
    &ListModel,
    &SequenceModel,
    &RecordModel,
    &OpaqueModel,
];

static INSPECTOR: Lazy<Inspector> = Lazy::new(Inspector::default);

/// Generic view over [`Value`]s: enumerate, read and write children, render.
#[derive(Default)]
pub struct Inspector {
    models: Mutex<HashMap<TypeId, &'static dyn DataModel>>,
}

impl Inspector {
    pub fn global() -> &'static Inspector {
        &INSPECTOR
    }

    fn model(&self, object: &dyn Object) -> &'static dyn DataModel {
        let type_id = object.as_any().type_id();
        let mut models = lock(&self.models);
        *models.entry(type_id).or_insert_with(|| {
            MODELS
                .iter()
                .copied()
                .filter(|model| model.accepts(object))
                .max_by_key(|model| model.rank())
                .unwrap_or(&OpaqueModel)
        })
    }

    /// Number of strategies selected so far.
    pub fn cached_types(&self) -> usize {
        lock(&self.models).len()
    }

    pub fn is_scalar(&self, value: &Value) -> bool {
        match value {
            Value::Object(object) => self.model(object.as_ref()).is_scalar(),
            _ => true,
        }
    }

    pub fn names(&self, value: &Value) -> Vec<String> {
        match value {
            Value::Object(object) => self.model(object.as_ref()).names(object.as_ref()),
            _ => vec![],
        }
    }

    pub fn get(&self, value: &Value, name: &str) -> Result<Value, Error> {
        match value {
            Value::Object(object) => self.model(object.as_ref()).get(object.as_ref(), name),
            scalar => Err(Error::ScalarValue(self.display(scalar))),
        }
    }

    pub fn set(&self, value: &Value, name: &str, new_value: Value) -> Result<(), Error> {
        match value {
            Value::Object(object) => {
                self.model(object.as_ref())
                    .set(object.as_ref(), name, new_value)
            }
            scalar => Err(Error::ScalarValue(self.display(scalar))),
        }
    }

    /// All `(name, value)` children, unreadable ones are skipped.
    pub fn children(&self, value: &Value) -> Vec<(String, Value)> {
        self.names(value)
            .into_iter()
            .filter_map(|name| {
                let child = muted_error!(self.get(value, &name))?;
                Some((name, child))
            })
            .collect()
    }

    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(object) => self.model(object.as_ref()).describe(object.as_ref()),
        }
    }

    /// Follow a path like `user.orders[0].id` (or `user.orders.0.id`) from `root`.
    pub fn resolve(&self, root: &Value, path: &str) -> Result<Value, Error> {
        let mut current = root.clone();
        for segment in segments(path)? {
            current = self.get(&current, &segment)?;
        }
        Ok(current)
    }
}

fn segments(path: &str) -> Result<Vec<String>, Error> {
    let path = path.trim();
    let mut result = vec![];
    if path.is_empty() {
        return Ok(result);
    }

    let malformed = || Error::Evaluate(format!("malformed path `{path}`"));
    let mut current = String::new();
    let mut chars = path.chars();
    // true right after a closing bracket, the following `.` then ends nothing
    let mut after_bracket = false;
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if current.is_empty() && !after_bracket {
                    return Err(malformed());
                }
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                after_bracket = false;
            }
            '[' => {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => index.push(c),
                        None => return Err(malformed()),
                    }
                }
                let index = index.trim().trim_matches(|c| c == '"' || c == '\'');
                if index.is_empty() {
                    return Err(malformed());
                }
                result.push(index.to_string());
                after_bracket = true;
            }
            c => {
                current.push(c);
                after_bracket = false;
            }
        }
    }

    if !current.is_empty() {
        result.push(current);
    } else if !after_bracket {
        return Err(malformed());
    }
    Ok(result)
}
