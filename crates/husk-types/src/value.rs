//! Value types for husk's pipeline runtime.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::record::Record;

/// A pipeline value.
///
/// Supports primitives (null, bool, int, float, string), structured JSON
/// data, and the uniform [`Record`] wrapper that consumers attach metadata to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Structured JSON data (arrays, objects, nested structures).
    Json(serde_json::Value),
    /// An already-wrapped record flowing back through a pipeline stage.
    Record(Box<Record>),
}

impl Value {
    /// True for `Value::Null` and for records wrapping a null value.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Record(r) => r.is_null(),
            _ => false,
        }
    }

    /// Short type name for diagnostics and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Json(_) => "json",
            Value::Record(_) => "record",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Box::new(r))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Delegate to value_to_json for a consistent JSON representation.
        // Float NaN → null, Record → {_type: "record", ...}, Json → inline.
        value_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(json_to_value(json))
    }
}

/// Project a [`Value`] into plain JSON.
///
/// Records become tagged objects (`{"_type": "record", ...}`) so they survive
/// a round trip through [`json_to_value`].
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Json(j) => j.clone(),
        Value::Record(r) => {
            let notes: serde_json::Map<String, serde_json::Value> = r
                .notes()
                .map(|(name, v)| (name.to_string(), value_to_json(v)))
                .collect();
            serde_json::json!({
                "_type": "record",
                "value": value_to_json(r.value()),
                "notes": notes,
            })
        }
    }
}

/// Rebuild a [`Value`] from its JSON projection.
///
/// Scalars map to scalar variants; arrays and untagged objects stay as
/// `Value::Json`; `{"_type": "record"}` objects become records again.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Object(map)
            if map.get("_type").and_then(|t| t.as_str()) == Some("record") =>
        {
            let value = map
                .get("value")
                .cloned()
                .map(json_to_value)
                .unwrap_or(Value::Null);
            let mut record = Record::new(value);
            if let Some(serde_json::Value::Object(notes)) = map.get("notes") {
                for (name, v) in notes {
                    record.set_note(name.clone(), json_to_value(v.clone()));
                }
            }
            Value::Record(Box::new(record))
        }
        other => Value::Json(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_project_to_plain_json() {
        assert_eq!(value_to_json(&Value::Int(7)), serde_json::json!(7));
        assert_eq!(
            value_to_json(&Value::String("hi".into())),
            serde_json::json!("hi")
        );
        assert_eq!(value_to_json(&Value::Null), serde_json::Value::Null);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = Record::new(Value::Int(42));
        record.set_note("source", Value::String("stage-1".into()));
        let value = Value::from(record.clone());

        let json = value_to_json(&value);
        assert_eq!(json["_type"], "record");

        match json_to_value(json) {
            Value::Record(r) => assert_eq!(*r, record),
            other => panic!("expected record, got {}", other.type_name()),
        }
    }

    #[test]
    fn untagged_objects_stay_json() {
        let json = serde_json::json!({"a": 1});
        assert_eq!(json_to_value(json.clone()), Value::Json(json));
    }

    #[test]
    fn null_detection_sees_through_records() {
        assert!(Value::Null.is_null());
        assert!(Value::from(Record::new(Value::Null)).is_null());
        assert!(!Value::Int(0).is_null());
    }
}
