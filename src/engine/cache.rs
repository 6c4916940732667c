// SPDX-License-Identifier: MIT

//! Session cache of exposed states, keyed by store name
//!
//! Entries outlive individual store handles so a store re-created in the
//! same session picks up the live state instead of the file. Any store may
//! publish; the last writer wins.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::store::ExposedState;

#[derive(Clone, Default)]
pub struct StateCache {
    entries: Arc<RwLock<HashMap<String, ExposedState>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<ExposedState> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn publish(&self, name: &str, state: ExposedState) {
        self.entries.write().await.insert(name.to_string(), state);
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::StateValue;

    #[tokio::test]
    async fn test_publish_last_writer_wins() {
        let cache = StateCache::new();
        let mut state = ExposedState::default();
        state.value = StateValue::Number(1.0);
        cache.publish("temp", state.clone()).await;
        state.value = StateValue::Number(2.0);
        cache.publish("temp", state).await;

        assert_eq!(
            cache.get("temp").await.unwrap().value,
            StateValue::Number(2.0)
        );
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = StateCache::new();
        let other = cache.clone();
        other.publish("a", ExposedState::default()).await;
        assert!(cache.contains("a").await);

        cache.clear().await;
        assert!(!other.contains("a").await);
    }
}
