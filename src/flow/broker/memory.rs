// SPDX-License-Identifier: MIT

//! In-process broker, used for local mirroring and tests

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, watch, Mutex};

use super::{Broker, BrokerMessage, ConnectionState};
use crate::engine::error::{StateError, StateResult};

#[derive(Default)]
struct Topics {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BrokerMessage>>>,
    retained: HashMap<String, Vec<u8>>,
}

pub struct InMemoryBroker {
    id: String,
    topics: Mutex<Topics>,
    connection: watch::Sender<ConnectionState>,
}

impl InMemoryBroker {
    /// A connected broker
    pub fn new(id: impl Into<String>) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Connected);
        Self {
            id: id.into(),
            topics: Mutex::new(Topics::default()),
            connection,
        }
    }

    /// Simulate a connection transition
    pub fn set_connection(&self, state: ConnectionState) {
        log::info!("Broker '{}' {}", self.id, state.label());
        self.connection.send_replace(state);
    }

    pub async fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.topics.lock().await.retained.get(topic).cloned()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> StateResult<()> {
        if *self.connection.borrow() != ConnectionState::Connected {
            return Err(StateError::broker(format!(
                "'{}' is not connected, dropping publish to {}",
                self.id, topic
            )));
        }

        let mut topics = self.topics.lock().await;
        if retain {
            topics.retained.insert(topic.to_string(), payload.clone());
        }
        if let Some(subscribers) = topics.subscribers.get_mut(topic) {
            subscribers.retain(|tx| {
                tx.send(BrokerMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> StateResult<mpsc::UnboundedReceiver<BrokerMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.lock().await;
        if let Some(payload) = topics.retained.get(topic) {
            let _ = tx.send(BrokerMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
        }
        topics
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker = InMemoryBroker::new("local");
        let mut rx = broker.subscribe("a/b").await.unwrap();

        broker.publish("a/b", b"1".to_vec(), false).await.unwrap();
        broker.publish("a/c", b"2".to_vec(), false).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.payload, b"1".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retained_replayed_to_late_subscriber() {
        let broker = InMemoryBroker::new("local");
        broker.publish("t", b"kept".to_vec(), true).await.unwrap();

        let mut rx = broker.subscribe("t").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, b"kept".to_vec());
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails() {
        let broker = InMemoryBroker::new("local");
        let mut connection = broker.connection();

        broker.set_connection(ConnectionState::Disconnected);
        assert!(connection.has_changed().unwrap());
        assert_eq!(*connection.borrow_and_update(), ConnectionState::Disconnected);
        assert!(broker.publish("t", vec![], false).await.is_err());
    }
}
