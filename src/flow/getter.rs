// SPDX-License-Identifier: MIT

//! Read-only consumer of a store
//!
//! A getter renders a short status line for the store's value and forwards
//! `{topic, state, payload}` downstream on init, change and input, each of
//! which can be switched off independently.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;

use crate::engine::value::format_number;
use crate::engine::{
    EventKind, ExposedState, StateError, StateEvent, StateRegistry, StateResult, StateStore,
    StateValue, TypeConfig, UnitCatalog,
};

/// Longest status text before it is cut and suffixed with "..."
const STATUS_MAX_CHARS: usize = 20;

fn default_true() -> bool {
    true
}

/// Getter configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GetterConfig {
    /// Name of the store to read
    pub state: String,
    #[serde(default = "default_true")]
    pub trigger_on_init: bool,
    #[serde(default = "default_true")]
    pub trigger_on_change: bool,
    #[serde(default = "default_true")]
    pub trigger_on_input: bool,
}

impl GetterConfig {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            trigger_on_init: true,
            trigger_on_change: true,
            trigger_on_input: true,
        }
    }
}

/// What caused a getter to re-read its store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Init,
    Change,
    Input,
}

/// Message forwarded downstream
#[derive(Debug, Clone, Serialize)]
pub struct GetterOutput {
    /// Store name
    pub topic: String,
    pub state: ExposedState,
    pub payload: StateValue,
}

struct GetterInner {
    config: GetterConfig,
    registry: StateRegistry,
    target: AsyncRwLock<Arc<StateStore>>,
    status: RwLock<String>,
    out: mpsc::Sender<GetterOutput>,
}

/// A running read consumer
pub struct Getter {
    inner: Arc<GetterInner>,
    task: JoinHandle<()>,
}

impl Getter {
    /// Attach to the registered store named in `config`.
    ///
    /// If the store is already initialized the current value is rendered
    /// (and forwarded as `init`) right away.
    pub async fn attach(
        config: GetterConfig,
        registry: &StateRegistry,
        out: mpsc::Sender<GetterOutput>,
    ) -> StateResult<Self> {
        let store = registry
            .get(&config.state)
            .await
            .ok_or_else(|| StateError::unknown_store(&config.state))?;
        let (current, rx) = store.watch().await;

        let inner = Arc::new(GetterInner {
            config,
            registry: registry.clone(),
            target: AsyncRwLock::new(store),
            status: RwLock::new(String::new()),
            out,
        });
        if current.is_some() {
            inner.refresh(Trigger::Init).await;
        }
        let task = tokio::spawn(listen(inner.clone(), rx));

        Ok(Self { inner, task })
    }

    /// Re-read on request. A non-empty topic naming another registered
    /// store switches the getter to that store first.
    pub async fn input(&self, topic: Option<&str>) {
        if let Some(topic) = topic.filter(|t| !t.is_empty()) {
            match self.inner.registry.get(topic).await {
                Some(store) => *self.inner.target.write().await = store,
                None => log::debug!("Getter input topic '{}' is not a state", topic),
            }
        }
        self.inner.refresh(Trigger::Input).await;
    }

    /// Last rendered status text
    pub fn status(&self) -> String {
        self.inner
            .status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Name of the store currently read
    pub async fn target(&self) -> String {
        self.inner.target.read().await.name().to_string()
    }
}

impl Drop for Getter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn listen(inner: Arc<GetterInner>, mut rx: broadcast::Receiver<StateEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let trigger = match event.kind {
                    EventKind::Init => Trigger::Init,
                    EventKind::Change => Trigger::Change,
                };
                inner.refresh(trigger).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    "Getter for '{}' skipped {} notifications",
                    inner.config.state,
                    skipped
                );
                inner.refresh(Trigger::Change).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}

impl GetterInner {
    fn enabled(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Init => self.config.trigger_on_init,
            Trigger::Change => self.config.trigger_on_change,
            Trigger::Input => self.config.trigger_on_input,
        }
    }

    async fn refresh(&self, trigger: Trigger) {
        let store = self.target.read().await.clone();
        let state = store.exposed_state().await;

        let text = status_text(&state.value, store.data_type(), store.units());
        if let Ok(mut status) = self.status.write() {
            *status = text;
        }

        if !self.enabled(trigger) {
            return;
        }
        let output = GetterOutput {
            topic: store.name().to_string(),
            payload: state.value.clone(),
            state,
        };
        if self.out.send(output).await.is_err() {
            log::debug!("Getter output for '{}' has no receiver", store.name());
        }
    }
}

/// Short display text for a value
pub fn status_text(
    value: &StateValue,
    data_type: &TypeConfig,
    units: &dyn UnitCatalog,
) -> String {
    let text = match (data_type, value) {
        (TypeConfig::Obj, v) => v.to_json().to_string(),
        (TypeConfig::Num(config), StateValue::Number(n)) => match config.unit() {
            Some(unit) => match units.describe(unit, *n) {
                Some(label) => format!("{} {}", format_number(*n), label),
                None => value.to_string(),
            },
            None => value.to_string(),
        },
        _ => value.to_string(),
    };
    truncate(&text)
}

fn truncate(text: &str) -> String {
    if text.chars().count() > STATUS_MAX_CHARS {
        let head: String = text.chars().take(STATUS_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NumConfig, StandardUnits, StoreConfig};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(rx: &mut mpsc::Receiver<GetterOutput>) -> GetterOutput {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("getter output timed out")
            .expect("getter output closed")
    }

    #[test]
    fn test_status_text_rendering() {
        let units = StandardUnits;
        let num = TypeConfig::Num(NumConfig::with_unit("ft"));

        assert_eq!(status_text(&StateValue::Number(1.0), &num, &units), "1 Foot");
        assert_eq!(status_text(&StateValue::Number(3.0), &num, &units), "3 Feet");
        assert_eq!(
            status_text(&StateValue::from_json(json!({"a": 1})), &TypeConfig::Obj, &units),
            r#"{"a":1}"#
        );
        assert_eq!(
            status_text(&StateValue::from("x"), &TypeConfig::Obj, &units),
            r#""x""#
        );
        assert_eq!(
            status_text(
                &StateValue::from("abcdefghijklmnopqrstuvwxyz"),
                &TypeConfig::Str,
                &units
            ),
            "abcdefghijklmnopqrst..."
        );
    }

    #[tokio::test]
    async fn test_getter_forwards_changes() {
        let registry = StateRegistry::in_memory();
        let store = registry
            .acquire(StoreConfig::new("temp", TypeConfig::Num(NumConfig::default())))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let getter = Getter::attach(GetterConfig::new("temp"), &registry, tx)
            .await
            .unwrap();

        store.update(&json!(12), None).await;
        let output = next(&mut rx).await;
        assert_eq!(output.topic, "temp");
        assert_eq!(output.payload, StateValue::Number(12.0));
        assert_eq!(getter.status(), "12");
    }

    #[tokio::test]
    async fn test_getter_eager_init_when_initialized() {
        let registry = StateRegistry::in_memory();
        let store = registry
            .acquire(StoreConfig::new("label", TypeConfig::Str))
            .await
            .unwrap();
        store.update(&json!("ready"), None).await;

        let (tx, mut rx) = mpsc::channel(8);
        let _getter = Getter::attach(GetterConfig::new("label"), &registry, tx)
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await.payload, StateValue::from("ready"));
    }

    #[tokio::test]
    async fn test_trigger_suppression() {
        let registry = StateRegistry::in_memory();
        let store = registry
            .acquire(StoreConfig::new("label", TypeConfig::Str))
            .await
            .unwrap();
        store.update(&json!("a"), None).await;

        let config = GetterConfig {
            trigger_on_init: false,
            trigger_on_change: false,
            ..GetterConfig::new("label")
        };
        let (tx, mut rx) = mpsc::channel(8);
        let getter = Getter::attach(config, &registry, tx).await.unwrap();

        store.update(&json!("b"), None).await;
        getter.input(None).await;

        // Only the input-triggered read is forwarded
        let output = next(&mut rx).await;
        assert_eq!(output.payload, StateValue::from("b"));
        assert!(rx.try_recv().is_err());
        assert_eq!(getter.status(), "b");
    }

    #[tokio::test]
    async fn test_input_topic_retargets() {
        let registry = StateRegistry::in_memory();
        registry
            .acquire(StoreConfig::new("first", TypeConfig::Str))
            .await
            .unwrap();
        let second = registry
            .acquire(StoreConfig::new("second", TypeConfig::Str))
            .await
            .unwrap();
        second.update(&json!("two"), None).await;

        let (tx, mut rx) = mpsc::channel(8);
        let getter = Getter::attach(GetterConfig::new("first"), &registry, tx)
            .await
            .unwrap();

        getter.input(Some("second")).await;
        let output = next(&mut rx).await;
        assert_eq!(output.topic, "second");
        assert_eq!(getter.target().await, "second");

        getter.input(Some("missing")).await;
        assert_eq!(getter.target().await, "second");
    }

    #[tokio::test]
    async fn test_attach_unknown_store() {
        let registry = StateRegistry::in_memory();
        let (tx, _rx) = mpsc::channel(1);
        let result = Getter::attach(GetterConfig::new("nope"), &registry, tx).await;
        assert!(matches!(result, Err(StateError::UnknownStore(_))));
    }
}
