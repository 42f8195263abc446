//! Persistent key-value context owned by one accessory.

use serde::{Deserialize, Serialize};

/// A value stored in a context. Scalars, text and numeric arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<f64>),
}

/// String-keyed store surviving across invocations of the control script.
///
/// Typed getters read with a default and never fail: a missing key or a value
/// of another shape yields the default, the way the host context behaves.
pub trait Context {
    fn get(&self, key: &str) -> Option<ContextValue>;
    fn put(&mut self, key: &str, value: ContextValue);
    fn remove(&mut self, key: &str);
    fn clear(&mut self);

    fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(ContextValue::Float(v)) => v,
            Some(ContextValue::Int(v)) => v as f64,
            Some(ContextValue::Bool(b)) => f64::from(u8::from(b)),
            _ => default,
        }
    }

    fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(ContextValue::Int(v)) => v,
            Some(ContextValue::Float(v)) if v.is_finite() => v as i64,
            Some(ContextValue::Bool(b)) => i64::from(b),
            _ => default,
        }
    }

    /// Booleans are also accepted in the host's 0/1 integer encoding.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(ContextValue::Bool(b)) => b,
            Some(ContextValue::Int(v)) => v != 0,
            Some(ContextValue::Float(v)) => v != 0.0,
            _ => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(ContextValue::Text(s)) => s,
            _ => default.to_string(),
        }
    }

    fn get_list(&self, key: &str) -> Vec<f64> {
        match self.get(key) {
            Some(ContextValue::List(v)) => v,
            Some(ContextValue::Float(v)) => vec![v],
            _ => Vec::new(),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ContextValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for ContextValue {
    fn from(v: Vec<f64>) -> Self {
        Self::List(v)
    }
}

/// In-memory context, serializable so a host can persist it between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryContext {
    entries: std::collections::BTreeMap<String, ContextValue>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Context for MemoryContext {
    fn get(&self, key: &str) -> Option<ContextValue> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: ContextValue) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
