// SPDX-License-Identifier: MIT

//! Store configuration
//!
//! The declared data type is a closed tagged union: each variant carries its
//! own typed options, tagged by `dataType` (`str`, `bool`, `num`, `obj`).

use serde::{Deserialize, Serialize};

use super::error::{StateError, StateResult};

/// Configuration for a single named store
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Cache key and file name
    pub name: String,
    /// Declared data type and its options
    #[serde(flatten)]
    pub data_type: TypeConfig,
    /// Maximum retained history samples (0 disables history and file writes)
    #[serde(default)]
    pub history_count: usize,
    /// Minimum milliseconds between two history samples
    #[serde(default)]
    pub save_interval: u64,
}

/// Declared data type with type-specific options
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "dataType", rename_all = "lowercase")]
pub enum TypeConfig {
    Str,
    Bool(BoolConfig),
    Num(NumConfig),
    Obj,
}

/// How a boolean store renders its value
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoolRepr {
    /// Native `true` / `false`
    #[default]
    Bool,
    /// `1` / `0`
    Num,
    /// The configured string pair
    Str,
}

/// Options for boolean stores
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoolConfig {
    #[serde(default)]
    pub bool_type: BoolRepr,
    #[serde(default = "default_true_label")]
    pub bool_str_true: String,
    #[serde(default = "default_false_label")]
    pub bool_str_false: String,
}

fn default_true_label() -> String {
    "true".to_string()
}

fn default_false_label() -> String {
    "false".to_string()
}

impl Default for BoolConfig {
    fn default() -> Self {
        Self {
            bool_type: BoolRepr::default(),
            bool_str_true: default_true_label(),
            bool_str_false: default_false_label(),
        }
    }
}

impl BoolConfig {
    /// String-pair representation with the given labels
    pub fn labels(on: impl Into<String>, off: impl Into<String>) -> Self {
        Self {
            bool_type: BoolRepr::Str,
            bool_str_true: on.into(),
            bool_str_false: off.into(),
        }
    }
}

/// Options for numeric stores
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NumConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Fractional digits to round to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_max: Option<f64>,
}

impl NumConfig {
    pub fn with_unit(unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::default()
        }
    }

    /// Configured unit, ignoring blank values
    pub fn unit(&self) -> Option<&str> {
        self.unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

impl TypeConfig {
    /// Short tag as written in configuration files
    pub fn tag(&self) -> &'static str {
        match self {
            TypeConfig::Str => "str",
            TypeConfig::Bool(_) => "bool",
            TypeConfig::Num(_) => "num",
            TypeConfig::Obj => "obj",
        }
    }

    /// Parse a bare tag into a type with default options
    pub fn from_tag(tag: &str) -> StateResult<Self> {
        match tag {
            "str" | "string" => Ok(TypeConfig::Str),
            "bool" | "boolean" => Ok(TypeConfig::Bool(BoolConfig::default())),
            "num" | "number" => Ok(TypeConfig::Num(NumConfig::default())),
            "obj" | "object" => Ok(TypeConfig::Obj),
            other => Err(StateError::config(format!("Unknown data type: {}", other))),
        }
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, data_type: TypeConfig) -> Self {
        Self {
            name: name.into(),
            data_type,
            history_count: 0,
            save_interval: 0,
        }
    }

    /// Enable history with the given bound and sampling interval (ms)
    pub fn with_history(mut self, count: usize, save_interval: u64) -> Self {
        self.history_count = count;
        self.save_interval = save_interval;
        self
    }

    /// Reject names that are not safe as a file name
    pub fn validate(&self) -> StateResult<()> {
        if is_valid_name(&self.name) {
            Ok(())
        } else {
            Err(StateError::InvalidName(self.name.clone()))
        }
    }
}

/// Letters, digits, `_`, `-` and `.`, not starting with a dot
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_bool_store() {
        let config: StoreConfig = serde_json::from_value(json!({
            "name": "porch",
            "dataType": "bool",
            "boolType": "str",
            "boolStrTrue": "on",
            "boolStrFalse": "off",
            "historyCount": 5
        }))
        .unwrap();

        assert_eq!(config.name, "porch");
        assert_eq!(config.history_count, 5);
        assert_eq!(config.save_interval, 0);
        assert_eq!(config.data_type, TypeConfig::Bool(BoolConfig::labels("on", "off")));
    }

    #[test]
    fn test_deserialize_num_store_from_yaml() {
        let yaml = r#"
            name: temp
            dataType: num
            unit: C
            precision: 1
            numMin: -40
            numMax: 60
            saveInterval: 1000
        "#;
        let config: StoreConfig = serde_yaml::from_str(yaml).unwrap();

        match &config.data_type {
            TypeConfig::Num(num) => {
                assert_eq!(num.unit(), Some("C"));
                assert_eq!(num.precision, Some(1));
                assert_eq!(num.num_min, Some(-40.0));
                assert_eq!(num.num_max, Some(60.0));
            }
            other => panic!("Expected num config, got {:?}", other),
        }
        assert_eq!(config.save_interval, 1000);
    }

    #[test]
    fn test_bool_defaults() {
        let config: StoreConfig =
            serde_json::from_value(json!({"name": "flag", "dataType": "bool"})).unwrap();
        assert_eq!(config.data_type, TypeConfig::Bool(BoolConfig::default()));
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let result: Result<StoreConfig, _> =
            serde_json::from_value(json!({"name": "x", "dataType": "date"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_carries_tag() {
        let config = StoreConfig::new("doc", TypeConfig::Obj);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["dataType"], "obj");
        assert_eq!(value["name"], "doc");
    }

    #[test]
    fn test_blank_unit_is_ignored() {
        assert_eq!(NumConfig::with_unit("  ").unit(), None);
        assert_eq!(NumConfig::with_unit("cm").unit(), Some("cm"));
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("temp"));
        assert!(is_valid_name("living-room.temp_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("a/b"));
        assert!(StoreConfig::new("a b", TypeConfig::Str).validate().is_err());
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(TypeConfig::from_tag("num").unwrap().tag(), "num");
        assert_eq!(TypeConfig::from_tag("boolean").unwrap().tag(), "bool");
        assert!(TypeConfig::from_tag("date").is_err());
    }
}
