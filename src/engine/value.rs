// SPDX-License-Identifier: MIT

//! Values held by a state store
//!
//! `StateValue` mirrors the JSON data model with one addition: numbers may
//! carry NaN (a failed numeric parse is stored, not rejected). Non-finite
//! numbers serialize as JSON `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Largest integer a double represents exactly (2^53)
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A typed store value
#[derive(Debug, Clone, Default)]
pub enum StateValue {
    /// Unset; the empty value of every data type before initialization
    #[default]
    Null,
    Bool(bool),
    /// May be NaN
    Number(f64),
    String(String),
    /// Arbitrary JSON (objects, arrays, or whatever a structured store was given)
    Structured(Value),
}

impl StateValue {
    /// Build a value from plain JSON
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            other => Self::Structured(other),
        }
    }

    /// Convert to plain JSON; non-finite numbers become `null`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    /// Serialized form used for change detection
    pub fn fingerprint(&self) -> String {
        // Serializing a serde_json::Value cannot fail
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    /// Structural equality: identical serialized forms
    pub fn same_as(&self, other: &StateValue) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Render a number the way a JSON-native runtime prints it (`2` not `2.0`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{}", s),
            Self::Structured(v) => write!(f, "{}", v),
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<f64> for StateValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nan_serializes_as_null() {
        let v = StateValue::Number(f64::NAN);
        assert_eq!(serde_json::to_string(&v).unwrap(), "null");
        assert_eq!(v.to_string(), "NaN");
    }

    #[test]
    fn test_integral_numbers_serialize_without_fraction() {
        assert_eq!(StateValue::Number(5.0).fingerprint(), "5");
        assert_eq!(StateValue::Number(2.5).fingerprint(), "2.5");
    }

    #[test]
    fn test_same_as_ignores_key_order() {
        let a = StateValue::from_json(json!({"a": 1, "b": [1, 2]}));
        let b = StateValue::from_json(json!({"b": [1, 2], "a": 1}));
        assert!(a.same_as(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_json_variants() {
        assert_eq!(StateValue::from_json(json!(null)), StateValue::Null);
        assert_eq!(StateValue::from_json(json!(true)), StateValue::Bool(true));
        assert_eq!(StateValue::from_json(json!(3)), StateValue::Number(3.0));
        assert_eq!(StateValue::from_json(json!("x")), StateValue::from("x"));
        assert!(matches!(
            StateValue::from_json(json!([1])),
            StateValue::Structured(_)
        ));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_roundtrip_through_document() {
        let v: StateValue = serde_json::from_str(r#"{"x":1}"#).unwrap();
        assert_eq!(v.to_json(), json!({"x": 1}));
    }
}
