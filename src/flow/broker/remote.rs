// SPDX-License-Identifier: MIT

//! Followers of state mirrored on a broker
//!
//! `RemoteStates` hands out one shared `RemoteState` per `<name>:<broker>`
//! and tears it down when the last consumer releases it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;

use super::{current_topic, history_topic, Broker, ConnectionState, CurrentState};
use crate::engine::error::{StateError, StateResult};
use crate::engine::store::DEFAULT_NOTIFY_CAPACITY;
use crate::engine::{HistoryBuffer, StateValue};

/// Notification from a remote follower
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Connection(ConnectionState),
    Update(CurrentState),
    History(HistoryBuffer),
}

/// Local view of a state published on a broker
pub struct RemoteState {
    name: String,
    broker_id: String,
    current: RwLock<CurrentState>,
    history: RwLock<HistoryBuffer>,
    connection: RwLock<ConnectionState>,
    events: broadcast::Sender<RemoteEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteState {
    /// Subscribe to the current and history topics of `name`
    pub async fn connect(name: &str, broker: Arc<dyn Broker>) -> StateResult<Arc<Self>> {
        let mut current_rx = broker.subscribe(&current_topic(name)).await?;
        let mut history_rx = broker.subscribe(&history_topic(name)).await?;
        let mut connection = broker.connection();
        let (events, _) = broadcast::channel(DEFAULT_NOTIFY_CAPACITY);

        let state = Arc::new(Self {
            name: name.to_string(),
            broker_id: broker.id().to_string(),
            current: RwLock::new(CurrentState::default()),
            history: RwLock::new(HistoryBuffer::new()),
            connection: RwLock::new(*connection.borrow_and_update()),
            events,
            task: Mutex::new(None),
        });

        let weak = Arc::downgrade(&state);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(message) = current_rx.recv() => {
                        let Some(state) = weak.upgrade() else { break };
                        state.on_current(&message.payload);
                    }
                    Some(message) = history_rx.recv() => {
                        let Some(state) = weak.upgrade() else { break };
                        state.on_history(&message.payload);
                    }
                    changed = connection.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *connection.borrow_and_update();
                        let Some(state) = weak.upgrade() else { break };
                        state.on_connection(status);
                    }
                    else => break,
                }
            }
        });
        if let Ok(mut slot) = state.task.lock() {
            *slot = Some(task);
        }
        Ok(state)
    }

    fn on_current(&self, payload: &[u8]) {
        match serde_json::from_slice::<CurrentState>(payload) {
            Ok(current) => {
                if let Ok(mut slot) = self.current.write() {
                    *slot = current.clone();
                }
                let _ = self.events.send(RemoteEvent::Update(current));
            }
            Err(e) => log::warn!("Ignoring malformed current state for '{}': {}", self.name, e),
        }
    }

    fn on_history(&self, payload: &[u8]) {
        match serde_json::from_slice::<HistoryBuffer>(payload) {
            Ok(history) => {
                if let Ok(mut slot) = self.history.write() {
                    *slot = history.clone();
                }
                let _ = self.events.send(RemoteEvent::History(history));
            }
            Err(e) => log::warn!("Ignoring malformed history for '{}': {}", self.name, e),
        }
    }

    fn on_connection(&self, status: ConnectionState) {
        if let Ok(mut slot) = self.connection.write() {
            *slot = status;
        }
        let _ = self.events.send(RemoteEvent::Connection(status));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    pub fn value(&self) -> StateValue {
        self.current().value
    }

    pub fn current(&self) -> CurrentState {
        self.current.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn history(&self) -> HistoryBuffer {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .read()
            .map(|c| *c)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// The value while connected, otherwise the connection label
    pub fn status(&self) -> String {
        match self.connection_state() {
            ConnectionState::Connected => self.value().to_string(),
            other => other.label().to_string(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}

impl Drop for RemoteState {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Reference-counted followers keyed by `<name>:<broker>`
#[derive(Clone, Default)]
pub struct RemoteStates {
    entries: Arc<AsyncRwLock<HashMap<String, (Arc<RemoteState>, usize)>>>,
}

fn key(name: &str, broker_id: &str) -> String {
    format!("{}:{}", name, broker_id)
}

impl RemoteStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        name: &str,
        broker: Arc<dyn Broker>,
    ) -> StateResult<Arc<RemoteState>> {
        let key = key(name, broker.id());
        let mut entries = self.entries.write().await;
        if let Some((state, refs)) = entries.get_mut(&key) {
            *refs += 1;
            return Ok(state.clone());
        }
        let state = RemoteState::connect(name, broker).await?;
        entries.insert(key, (state.clone(), 1));
        Ok(state)
    }

    /// Returns true when the follower was torn down
    pub async fn release(&self, name: &str, broker_id: &str) -> StateResult<bool> {
        let key = key(name, broker_id);
        let mut entries = self.entries.write().await;
        let (_, refs) = entries
            .get_mut(&key)
            .ok_or_else(|| StateError::unknown_store(key.clone()))?;
        *refs -= 1;
        if *refs == 0 {
            entries.remove(&key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExposedState;
    use crate::flow::broker::mirror::publish_state;
    use crate::flow::broker::InMemoryBroker;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(rx: &mut broadcast::Receiver<RemoteEvent>) -> RemoteEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("remote event timed out")
            .expect("remote events closed")
    }

    #[tokio::test]
    async fn test_follows_published_state() {
        let broker = Arc::new(InMemoryBroker::new("local"));
        let remote = RemoteState::connect("temp", broker.clone()).await.unwrap();
        let mut rx = remote.subscribe();

        let mut state = ExposedState::default();
        state.value = StateValue::Number(20.0);
        state.timestamp = 7;
        state.history.record(StateValue::Number(20.0), 7, 5);
        publish_state("temp", &state, broker.as_ref()).await.unwrap();

        let events = [next(&mut rx).await, next(&mut rx).await];
        assert!(events.iter().any(|e| matches!(e, RemoteEvent::Update(_))));
        assert!(events.iter().any(|e| matches!(e, RemoteEvent::History(_))));
        assert_eq!(remote.value(), StateValue::Number(20.0));
        assert_eq!(remote.current().timestamp, 7);
        assert_eq!(remote.history().len(), 1);
        assert_eq!(remote.status(), "20");
    }

    #[tokio::test]
    async fn test_connection_transitions() {
        let broker = Arc::new(InMemoryBroker::new("local"));
        let remote = RemoteState::connect("temp", broker.clone()).await.unwrap();
        let mut rx = remote.subscribe();

        broker.set_connection(ConnectionState::Connecting);
        assert_eq!(
            next(&mut rx).await,
            RemoteEvent::Connection(ConnectionState::Connecting)
        );
        assert_eq!(remote.status(), "reconnecting");

        broker.set_connection(ConnectionState::Disconnected);
        assert_eq!(
            next(&mut rx).await,
            RemoteEvent::Connection(ConnectionState::Disconnected)
        );
        assert_eq!(remote.status(), "disconnected");
    }

    #[tokio::test]
    async fn test_shared_followers_are_refcounted() {
        let broker = Arc::new(InMemoryBroker::new("local"));
        let states = RemoteStates::new();

        let a = states.acquire("temp", broker.clone()).await.unwrap();
        let b = states.acquire("temp", broker.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(states.len().await, 1);

        assert!(!states.release("temp", "local").await.unwrap());
        assert!(states.release("temp", "local").await.unwrap());
        assert!(states.is_empty().await);
        assert!(states.release("temp", "local").await.is_err());
    }
}
