//! Named text variables
//!
//! Variables are plain string values referenced from condition and action
//! settings as `${name}`. Actions queued with resolve-on-add snapshot the
//! referenced values at enqueue time; everything else resolves live.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Thread-safe store of named string variables.
#[derive(Debug, Default)]
pub struct VariableStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.lock().unwrap().insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        self.values.lock().unwrap().remove(name);
    }

    /// Snapshot of all variables, used by persistence.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.lock().unwrap().clone()
    }

    pub fn replace_all(&self, values: BTreeMap<String, String>) {
        *self.values.lock().unwrap() = values;
    }

    /// Substitute `${name}` references in a text. Unknown names are left
    /// in place so a missing variable is visible rather than silently
    /// collapsing to an empty string.
    pub fn resolve(&self, text: &str) -> String {
        if !text.contains("${") {
            return text.to_string();
        }
        let values = self.values.lock().unwrap();
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match values.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Recursively substitute variable references in every string of a
    /// JSON document. Used to snapshot variable values into an action's
    /// saved settings at enqueue time.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
