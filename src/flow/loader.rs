// SPDX-License-Identifier: MIT

//! Deployment loader - YAML file loading and parsing
//!
//! A deployment file lists the stores of a session and the read consumers
//! attached to them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::error::StateResult;
use crate::engine::persistence::DEFAULT_STATE_DIR;
use crate::engine::StoreConfig;
use crate::flow::getter::GetterConfig;

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "SHARED_STATE_DIR";

/// Top-level deployment definition
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Directory holding one state file per store
    pub state_dir: Option<PathBuf>,
    /// Buffered notifications per subscriber
    pub notify_capacity: Option<usize>,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub getters: Vec<GetterConfig>,
}

impl DeploymentConfig {
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// CLI flag, then environment, then this file, then the default
    pub fn resolve_state_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(STATE_DIR_ENV).map(PathBuf::from))
            .or_else(|| self.state_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }
}

/// Loads deployment definitions from YAML files
pub struct DeploymentLoader;

impl DeploymentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a deployment definition from a YAML file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> StateResult<DeploymentConfig> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a deployment definition from a YAML string
    pub fn parse_yaml(content: &str) -> StateResult<DeploymentConfig> {
        let def: DeploymentConfig = serde_yaml::from_str(content)?;
        for store in &def.stores {
            store.validate()?;
        }
        Ok(def)
    }
}

impl Default for DeploymentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{StateError, TypeConfig};

    #[test]
    fn test_parse_deployment() {
        let yaml = r#"
stateDir: /var/lib/shared-state
stores:
  - name: porch
    dataType: bool
    boolType: str
    boolStrTrue: "on"
    boolStrFalse: "off"
  - name: temp
    dataType: num
    unit: C
    historyCount: 24
    saveInterval: 60000
getters:
  - state: temp
    triggerOnInit: false
"#;
        let def = DeploymentLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.state_dir, Some(PathBuf::from("/var/lib/shared-state")));
        assert_eq!(def.stores.len(), 2);
        assert_eq!(def.store("temp").unwrap().history_count, 24);
        assert!(matches!(
            def.store("porch").unwrap().data_type,
            TypeConfig::Bool(_)
        ));
        assert_eq!(def.getters.len(), 1);
        assert!(!def.getters[0].trigger_on_init);
        assert!(def.getters[0].trigger_on_change);
    }

    #[test]
    fn test_empty_deployment() {
        let def = DeploymentLoader::parse_yaml("{}").unwrap();
        assert!(def.stores.is_empty());
        assert!(def.state_dir.is_none());
    }

    #[test]
    fn test_invalid_store_name_rejected() {
        let yaml = r#"
stores:
  - name: "../up"
    dataType: str
"#;
        let result = DeploymentLoader::parse_yaml(yaml);
        assert!(matches!(result, Err(StateError::InvalidName(_))));
    }

    #[test]
    fn test_state_dir_precedence() {
        let def = DeploymentConfig {
            state_dir: Some(PathBuf::from("/from/file")),
            ..DeploymentConfig::default()
        };
        assert_eq!(
            def.resolve_state_dir(Some(PathBuf::from("/from/flag"))),
            PathBuf::from("/from/flag")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.yaml");
        std::fs::write(&path, "stores:\n  - name: doc\n    dataType: obj\n").unwrap();

        let def = DeploymentLoader::new().load(&path).unwrap();
        assert_eq!(def.stores[0].name, "doc");
        assert!(DeploymentLoader::new().load(dir.path().join("missing")).is_err());
    }
}
