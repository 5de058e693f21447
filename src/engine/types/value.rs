use super::FastMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(SmolStr),
    Array(Vec<FlowValue>),
    Object(FastMap<SmolStr, FlowValue>),
}

impl Default for FlowValue {
    fn default() -> Self {
        FlowValue::Null
    }
}

impl FlowValue {
    /// Get value as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlowValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlowValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get value as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlowValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get value as object reference
    pub fn as_object(&self) -> Option<&FastMap<SmolStr, FlowValue>> {
        match self {
            FlowValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Get value as array reference
    pub fn as_array(&self) -> Option<&Vec<FlowValue>> {
        match self {
            FlowValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get nested value by key (for objects)
    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.as_object()?.get(key)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FlowValue::Null)
    }

    /// Human-readable type name, used in accessor diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            FlowValue::Null => "null",
            FlowValue::Bool(_) => "bool",
            FlowValue::Number(_) => "number",
            FlowValue::Str(_) => "string",
            FlowValue::Array(_) => "array",
            FlowValue::Object(_) => "object",
        }
    }

    /// Build an object value from (key, value) pairs
    pub fn object(fields: impl IntoIterator<Item = (SmolStr, FlowValue)>) -> Self {
        FlowValue::Object(fields.into_iter().collect())
    }
}

impl From<Value> for FlowValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => FlowValue::Null,
            Value::Bool(b) => FlowValue::Bool(b),
            Value::Number(n) => FlowValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => FlowValue::Str(SmolStr::from(s)),
            Value::Array(arr) => FlowValue::Array(arr.into_iter().map(FlowValue::from).collect()),
            Value::Object(obj) => FlowValue::Object(
                obj.into_iter()
                    .map(|(k, v)| (SmolStr::from(k), FlowValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<FlowValue> for Value {
    fn from(val: FlowValue) -> Self {
        match val {
            FlowValue::Null => Value::Null,
            FlowValue::Bool(b) => Value::Bool(b),
            FlowValue::Number(n) => json!(n),
            FlowValue::Str(s) => Value::String(s.to_string()),
            FlowValue::Array(arr) => Value::Array(arr.into_iter().map(|v| v.into()).collect()),
            FlowValue::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for FlowValue {
    fn from(n: f64) -> Self {
        FlowValue::Number(n)
    }
}

impl From<&str> for FlowValue {
    fn from(s: &str) -> Self {
        FlowValue::Str(SmolStr::new(s))
    }
}
