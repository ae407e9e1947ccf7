//! Record — the uniform wrapper around pipeline values.
//!
//! Every consumer-facing view of a pipeline can ask for records instead of
//! raw values: a record carries the original value plus named note values
//! that downstream stages (formatters, aggregators) attach without touching
//! the payload itself.

use std::collections::BTreeMap;

use crate::value::Value;

/// A pipeline value wrapped in a uniform envelope.
///
/// Wrapping is idempotent: coercing a value that is already a record yields
/// that record unchanged, never a record-in-a-record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    value: Value,
    notes: BTreeMap<String, Value>,
}

impl Record {
    /// Create a record around a value with no notes.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            notes: BTreeMap::new(),
        }
    }

    /// Coerce any pipeline value into a record.
    ///
    /// This is the single conversion entry point used by record-producing
    /// readers. `Value::Record` unwraps to the existing record; anything
    /// else (including `Value::Null`) becomes a fresh record around it.
    pub fn wrap(value: Value) -> Record {
        match value {
            Value::Record(r) => *r,
            other => Record::new(other),
        }
    }

    /// The wrapped value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Unwrap, discarding notes.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// True when the wrapped value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    /// Look up a note by name.
    pub fn note(&self, name: &str) -> Option<&Value> {
        self.notes.get(name)
    }

    /// Attach or replace a note.
    pub fn set_note(&mut self, name: impl Into<String>, value: Value) {
        self.notes.insert(name.into(), value);
    }

    /// Iterate notes in name order.
    pub fn notes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.notes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_is_idempotent() {
        let mut record = Record::new(Value::String("payload".into()));
        record.set_note("origin", Value::String("stage-2".into()));

        let rewrapped = Record::wrap(Value::from(record.clone()));
        assert_eq!(rewrapped, record);
        // The inner value is still the payload, not a nested record.
        assert_eq!(rewrapped.value(), &Value::String("payload".into()));
    }

    #[test]
    fn wrap_is_null_safe() {
        let record = Record::wrap(Value::Null);
        assert!(record.is_null());
        assert_eq!(record.into_value(), Value::Null);
    }

    #[test]
    fn notes_are_ordered_and_replaceable() {
        let mut record = Record::new(Value::Int(1));
        record.set_note("b", Value::Int(2));
        record.set_note("a", Value::Int(1));
        record.set_note("b", Value::Int(3));

        let names: Vec<&str> = record.notes().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(record.note("b"), Some(&Value::Int(3)));
    }
}
