// SPDX-License-Identifier: MIT

//! Session registry of live stores
//!
//! Created at process start and passed down to every consumer. Holds one
//! reference-counted handle per store name plus the session cache of
//! exposed states.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::cache::StateCache;
use super::clock::Clock;
use super::config::StoreConfig;
use super::error::{StateError, StateResult};
use super::persistence::{open_persistence, PersistenceAdapter};
use super::store::{ExposedState, StateStore, StoreContext};
use super::units::UnitCatalog;

struct RegisteredStore {
    store: Arc<StateStore>,
    refs: usize,
}

/// Name -> store handle map with explicit lifecycle
#[derive(Clone)]
pub struct StateRegistry {
    stores: Arc<RwLock<HashMap<String, RegisteredStore>>>,
    context: StoreContext,
}

impl StateRegistry {
    pub fn new(persistence: Arc<dyn PersistenceAdapter>) -> Self {
        Self::with_context(StoreContext::new(persistence))
    }

    pub fn with_context(context: StoreContext) -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
            context,
        }
    }

    /// File persistence under `dir` (memory-only if it cannot be created)
    pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(open_persistence(dir))
    }

    /// No durable storage
    pub fn in_memory() -> Self {
        Self::with_context(StoreContext::in_memory())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.context = self.context.with_clock(clock);
        self
    }

    pub fn with_units(mut self, units: Arc<dyn UnitCatalog>) -> Self {
        self.context = self.context.with_units(units);
        self
    }

    pub fn with_notify_capacity(mut self, capacity: usize) -> Self {
        self.context = self.context.with_notify_capacity(capacity);
        self
    }

    pub fn cache(&self) -> &StateCache {
        &self.context.cache
    }

    pub fn units(&self) -> &dyn UnitCatalog {
        self.context.units.as_ref()
    }

    /// Get the live store for `config.name`, or create and hydrate it
    pub async fn acquire(&self, config: StoreConfig) -> StateResult<Arc<StateStore>> {
        config.validate()?;
        let mut stores = self.stores.write().await;

        if let Some(entry) = stores.get_mut(&config.name) {
            if entry.store.config() != &config {
                log::warn!(
                    "State '{}' is already open with a different configuration; keeping the first",
                    config.name
                );
            }
            entry.refs += 1;
            return Ok(entry.store.clone());
        }

        let name = config.name.clone();
        let store = Arc::new(StateStore::open(config, self.context.clone()).await?);
        log::debug!("Opened state '{}'", name);
        stores.insert(
            name,
            RegisteredStore {
                store: store.clone(),
                refs: 1,
            },
        );
        Ok(store)
    }

    /// Drop one reference; the handle closes when none remain.
    /// Returns true when the store was closed.
    ///
    /// The last handle stays registered until its queued writes have
    /// settled, so a store reopened meanwhile reuses the same writer.
    pub async fn release(&self, name: &str) -> StateResult<bool> {
        let closing = {
            let mut stores = self.stores.write().await;
            let entry = stores
                .get_mut(name)
                .ok_or_else(|| StateError::unknown_store(name))?;
            if entry.refs == 0 {
                return Err(StateError::unknown_store(name));
            }
            entry.refs -= 1;
            if entry.refs > 0 {
                return Ok(false);
            }
            entry.store.clone()
        };

        closing.flush().await;

        let mut stores = self.stores.write().await;
        let idle = stores
            .get(name)
            .is_some_and(|e| e.refs == 0 && Arc::ptr_eq(&e.store, &closing));
        if !idle {
            log::debug!("State '{}' reopened while closing", name);
            return Ok(false);
        }
        stores.remove(name);
        log::debug!("Closed state '{}'", name);
        Ok(true)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<StateStore>> {
        self.stores.read().await.get(name).map(|e| e.store.clone())
    }

    /// Open handles for `name`
    pub async fn ref_count(&self, name: &str) -> usize {
        self.stores.read().await.get(name).map_or(0, |e| e.refs)
    }

    /// Registered store names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Last published state for `name`, live or not
    pub async fn cached(&self, name: &str) -> Option<ExposedState> {
        self.context.cache.get(name).await
    }

    /// Seed the cache; stores opened later under `name` hydrate from it
    pub async fn publish(&self, name: &str, state: ExposedState) {
        self.context.cache.publish(name, state).await;
    }

    /// Flush and close every store and forget the session cache
    pub async fn shutdown(&self) {
        let stores: Vec<Arc<StateStore>> = {
            let mut stores = self.stores.write().await;
            stores.drain().map(|(_, e)| e.store).collect()
        };
        for store in &stores {
            store.flush().await;
        }
        self.context.cache.clear().await;
        log::info!("State registry shut down ({} stores)", stores.len());
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{NumConfig, TypeConfig};
    use crate::engine::persistence::MemoryStore;
    use crate::engine::value::StateValue;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Memory documents whose first save is slow
    #[derive(Default)]
    struct SlowFirstSave {
        docs: MemoryStore,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl PersistenceAdapter for SlowFirstSave {
        async fn load(&self, name: &str) -> StateResult<Option<ExposedState>> {
            self.docs.load(name).await
        }

        async fn save(&self, name: &str, state: &ExposedState) -> StateResult<()> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.docs.save(name, state).await
        }

        fn location(&self, name: &str) -> String {
            self.docs.location(name)
        }
    }

    fn temp_config() -> StoreConfig {
        StoreConfig::new("temp", TypeConfig::Num(NumConfig::default())).with_history(5, 0)
    }

    #[tokio::test]
    async fn test_acquire_shares_handle() {
        let registry = StateRegistry::in_memory();
        let a = registry.acquire(temp_config()).await.unwrap();
        let b = registry.acquire(temp_config()).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.ref_count("temp").await, 2);

        a.update(&json!(3), None).await;
        assert_eq!(b.value().await, StateValue::Number(3.0));
    }

    #[tokio::test]
    async fn test_release_closes_at_zero() {
        let registry = StateRegistry::in_memory();
        registry.acquire(temp_config()).await.unwrap();
        registry.acquire(temp_config()).await.unwrap();

        assert!(!registry.release("temp").await.unwrap());
        assert!(registry.release("temp").await.unwrap());
        assert!(registry.get("temp").await.is_none());
        assert!(registry.release("temp").await.is_err());
    }

    #[tokio::test]
    async fn test_reopen_while_closing_keeps_write_order() {
        let disk = Arc::new(SlowFirstSave::default());
        let registry = StateRegistry::new(disk.clone());

        let store = registry.acquire(temp_config()).await.unwrap();
        store.update(&json!(1), None).await;
        drop(store);

        let closing = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.release("temp").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let reopened = registry.acquire(temp_config()).await.unwrap();
        reopened.update(&json!(2), None).await;
        reopened.flush().await;

        assert!(!closing.await.unwrap().unwrap());
        assert_eq!(registry.ref_count("temp").await, 1);
        let doc = disk.docs.get("temp").await.unwrap();
        assert_eq!(doc.value, StateValue::Number(2.0));
        assert_eq!(doc.prev, StateValue::Number(1.0));
    }

    #[tokio::test]
    async fn test_reopen_hydrates_from_cache() {
        let memory = MemoryStore::new();
        let registry = StateRegistry::new(Arc::new(memory.clone()));

        let store = registry.acquire(temp_config()).await.unwrap();
        store.update(&json!(7), None).await;
        registry.release("temp").await.unwrap();

        // File says otherwise; the session cache reflects the live value
        memory
            .insert(
                "temp",
                ExposedState {
                    value: StateValue::Number(1.0),
                    ..ExposedState::default()
                },
            )
            .await;

        let reopened = registry.acquire(temp_config()).await.unwrap();
        assert!(reopened.is_initialized());
        assert_eq!(reopened.value().await, StateValue::Number(7.0));
    }

    #[tokio::test]
    async fn test_invalid_name() {
        let registry = StateRegistry::in_memory();
        let result = registry
            .acquire(StoreConfig::new("a/b", TypeConfig::Str))
            .await;
        assert!(matches!(result, Err(StateError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_names_and_shutdown() {
        let registry = StateRegistry::in_memory();
        registry
            .acquire(StoreConfig::new("b", TypeConfig::Str))
            .await
            .unwrap();
        registry
            .acquire(StoreConfig::new("a", TypeConfig::Obj))
            .await
            .unwrap();
        assert_eq!(registry.names().await, vec!["a", "b"]);

        registry.shutdown().await;
        assert!(registry.names().await.is_empty());
        assert!(registry.cached("a").await.is_none());
    }
}
