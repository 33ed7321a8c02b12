//! Hyperparameter points: named parameter assignments evaluated by the search.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete parameter value.
///
/// `Int` is listed before `Float` so that integers read back from a persisted
/// run compare equal to the points that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Convert a JSON value, keeping numbers as typed variants.
    pub fn from_json(value: serde_json::Value) -> Self {
        if let Some(i) = value.as_i64() {
            return Self::Int(i);
        }
        if value.is_f64() {
            if let Some(f) = value.as_f64() {
                return Self::Float(f);
            }
        }
        Self::Json(value)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

/// One candidate assignment of hyperparameter values.
///
/// Points compare structurally and are never hashed: values may be floats or
/// arbitrary JSON, so deduplication is a linear scan with `==`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterPoint(BTreeMap<String, ParameterValue>);

impl HyperparameterPoint {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) -> Option<ParameterValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, ParameterValue)> for HyperparameterPoint {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for HyperparameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Whether `point` is structurally equal to any point in `seen`.
pub fn contains_point(seen: &[HyperparameterPoint], point: &HyperparameterPoint) -> bool {
    seen.iter().any(|p| p == point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structural_equality_ignores_insertion_order() {
        let a = HyperparameterPoint::new().with("a", 1).with("b", 0.5);
        let b = HyperparameterPoint::new().with("b", 0.5).with("a", 1);
        assert_eq!(a, b);
        assert_ne!(a, HyperparameterPoint::new().with("a", 2).with("b", 0.5));
    }

    #[test]
    fn integers_survive_json_round_trip_as_ints() {
        let point = HyperparameterPoint::new()
            .with("max_depth", 6)
            .with("eta", 0.3)
            .with("booster", "gbtree");
        let text = serde_json::to_string(&point).unwrap();
        let back: HyperparameterPoint = serde_json::from_str(&text).unwrap();
        assert_eq!(point, back);
        assert_eq!(back.get("max_depth"), Some(&ParameterValue::Int(6)));
    }

    #[test]
    fn from_json_keeps_numbers_typed() {
        assert_eq!(ParameterValue::from_json(json!(3)), ParameterValue::Int(3));
        assert_eq!(ParameterValue::from_json(json!(2.5)), ParameterValue::Float(2.5));
        assert_eq!(
            ParameterValue::from_json(json!([1, 2])),
            ParameterValue::Json(json!([1, 2]))
        );
    }

    #[test]
    fn display_lists_parameters_in_key_order() {
        let point = HyperparameterPoint::new().with("b", 10).with("a", 1);
        assert_eq!(point.to_string(), "a=1, b=10");
    }

    #[test]
    fn contains_point_uses_structural_equality() {
        let seen = vec![HyperparameterPoint::new().with("a", 1)];
        assert!(contains_point(&seen, &HyperparameterPoint::new().with("a", 1)));
        assert!(!contains_point(&seen, &HyperparameterPoint::new().with("a", 2)));
    }
}
