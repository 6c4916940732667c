// SPDX-License-Identifier: MIT

//! Broker mirroring of state
//!
//! A broker collaborator reports its connection as an explicit
//! `ConnectionState` stream. Stores are mirrored to retained topics:
//!
//! - `state/value/<name>`   - raw value
//! - `state/current/<name>` - `{value, prev, timestamp}`
//! - `state/history/<name>` - history array

pub mod memory;
pub mod mirror;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::engine::error::StateResult;
use crate::engine::value::StateValue;

pub use memory::InMemoryBroker;
pub use mirror::mirror_store;
pub use remote::{RemoteEvent, RemoteState, RemoteStates};

const BASE_TOPIC: &str = "state";

pub fn value_topic(name: &str) -> String {
    format!("{}/value/{}", BASE_TOPIC, name)
}

pub fn current_topic(name: &str) -> String {
    format!("{}/current/{}", BASE_TOPIC, name)
}

pub fn history_topic(name: &str) -> String {
    format!("{}/history/{}", BASE_TOPIC, name)
}

/// Broker connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
}

impl ConnectionState {
    /// Status text shown by consumers
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The `{value, prev, timestamp}` document on the current topic
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CurrentState {
    #[serde(default)]
    pub value: StateValue,
    #[serde(default)]
    pub prev: StateValue,
    #[serde(default)]
    pub timestamp: i64,
}

/// Publish/subscribe collaborator
#[async_trait]
pub trait Broker: Send + Sync {
    /// Identifier used to key shared followers
    fn id(&self) -> &str;

    /// Publish a payload; retained payloads are replayed to late subscribers
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> StateResult<()>;

    /// Subscribe to an exact topic
    async fn subscribe(&self, topic: &str) -> StateResult<mpsc::UnboundedReceiver<BrokerMessage>>;

    /// Connection state transitions
    fn connection(&self) -> watch::Receiver<ConnectionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(value_topic("temp"), "state/value/temp");
        assert_eq!(current_topic("temp"), "state/current/temp");
        assert_eq!(history_topic("temp"), "state/history/temp");
    }

    #[test]
    fn test_connection_labels() {
        assert_eq!(ConnectionState::Connecting.label(), "reconnecting");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            r#""disconnected""#
        );
    }
}
