//! Feature rows consumed by the predictor
//!
//! A [`FeatureRow`] is an ordered set of named scalar values. Rows are built
//! either from a JSON request body or from one record of the reference table;
//! the predictor decides how names map onto model inputs.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while assembling a feature row
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("feature '{0}' must be a scalar value, got {1}")]
    NonScalar(String, &'static str),

    #[error("number for feature '{0}' is out of range")]
    InvalidNumber(String),
}

/// A single scalar cell of a feature row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl FeatureValue {
    /// Convert a JSON scalar; arrays and objects are rejected
    pub fn from_json(name: &str, value: &Value) -> Result<Self, RowError> {
        match value {
            Value::Null => Ok(FeatureValue::Missing),
            Value::Bool(b) => Ok(FeatureValue::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(FeatureValue::Number)
                .ok_or_else(|| RowError::InvalidNumber(name.to_string())),
            Value::String(s) => Ok(FeatureValue::Text(s.clone())),
            Value::Array(_) => Err(RowError::NonScalar(name.to_string(), "array")),
            Value::Object(_) => Err(RowError::NonScalar(name.to_string(), "object")),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    /// Short type label used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureValue::Number(_) => "number",
            FeatureValue::Bool(_) => "bool",
            FeatureValue::Text(_) => "text",
            FeatureValue::Missing => "missing",
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Ordered mapping from feature name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from a JSON object, keeping the object's key order
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, RowError> {
        let mut row = Self::new();
        for (name, value) in object {
            row.insert(name.clone(), FeatureValue::from_json(name, value)?);
        }
        Ok(row)
    }

    /// Insert or replace a value; replacing keeps the original position
    pub fn insert<S: Into<String>>(&mut self, name: S, value: FeatureValue) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Builder-style insert
    pub fn with<S: Into<String>, V: Into<FeatureValue>>(mut self, name: S, value: V) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &FeatureValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this row with the named columns removed
    pub fn without(&self, names: &[&str]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(n, _)| !names.contains(&n.as_str()))
                .cloned()
                .collect(),
        }
    }
}

impl Serialize for FeatureRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_from_json_maps_scalars() {
        let body = json!({"Glucose": 110, "Smoker": true, "Group": "a", "Insulin": null});
        let row = FeatureRow::from_json_object(body.as_object().unwrap()).unwrap();

        assert_eq!(row.len(), 4);
        assert_eq!(row.get("Glucose"), Some(&FeatureValue::Number(110.0)));
        assert_eq!(row.get("Smoker"), Some(&FeatureValue::Bool(true)));
        assert_eq!(row.get("Group"), Some(&FeatureValue::Text("a".into())));
        assert!(row.get("Insulin").unwrap().is_missing());
    }

    #[test]
    fn nested_values_are_rejected() {
        let body = json!({"Glucose": [1, 2]});
        let err = FeatureRow::from_json_object(body.as_object().unwrap()).unwrap_err();
        assert_eq!(err, RowError::NonScalar("Glucose".into(), "array"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut row = FeatureRow::new().with("a", 1i64).with("b", 2i64);
        row.insert("a", FeatureValue::Number(5.0));

        let names: Vec<_> = row.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&FeatureValue::Number(5.0)));
    }

    #[test]
    fn without_drops_columns_and_keeps_order() {
        let row = FeatureRow::new()
            .with("id", 1i64)
            .with("Glucose", 110i64)
            .with("BloodPressure", 70i64)
            .with("Outcome", 1i64);

        let features = row.without(&["id", "Outcome"]);
        let names: Vec<_> = features.names().collect();
        assert_eq!(names, vec!["Glucose", "BloodPressure"]);
    }

    #[test]
    fn row_serializes_as_object() {
        let row = FeatureRow::new().with("b", 2i64).with("a", FeatureValue::Missing);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"b":2.0,"a":null}"#);
    }
}
