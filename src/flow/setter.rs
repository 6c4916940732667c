// SPDX-License-Identifier: MIT

//! Write consumer: applies incoming messages to a store

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::engine::{StateStore, TypeConfig};

/// An incoming write
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SetMessage {
    pub payload: Value,
    /// Type configuration of whatever produced the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<TypeConfig>,
}

impl SetMessage {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: TypeConfig) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Writes into one store
#[derive(Debug, Clone)]
pub struct Setter {
    store: Arc<StateStore>,
}

impl Setter {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub async fn apply(&self, message: &SetMessage) {
        self.store
            .update(&message.payload, message.origin.as_ref())
            .await;
    }

    /// Copy another store's current value, converting from its type
    pub async fn forward_from(&self, source: &StateStore) {
        let value = source.value().await.to_json();
        self.store.update(&value, Some(source.data_type())).await;
    }
}
