// SPDX-License-Identifier: MIT

//! Publishes a store's state to broker topics

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::{current_topic, history_topic, value_topic, Broker, ConnectionState, CurrentState};
use crate::engine::error::StateResult;
use crate::engine::{ExposedState, StateStore};

/// Mirror `store` to `broker` until the store is dropped or the handle aborted.
///
/// The current state is published right away if the store is initialized,
/// after every change, and again whenever the broker reconnects.
pub fn mirror_store(store: Arc<StateStore>, broker: Arc<dyn Broker>) -> JoinHandle<()> {
    let name = store.name().to_string();
    let weak = Arc::downgrade(&store);

    tokio::spawn(async move {
        let (current, mut rx) = store.watch().await;
        drop(store);
        let mut connection = broker.connection();

        if let Some(state) = current {
            publish_logged(&name, &state, broker.as_ref()).await;
        }

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => publish_logged(&name, &event.state, broker.as_ref()).await,
                    Err(RecvError::Lagged(_)) => {
                        let Some(store) = weak.upgrade() else { break };
                        let state = store.exposed_state().await;
                        publish_logged(&name, &state, broker.as_ref()).await;
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *connection.borrow_and_update();
                    log::info!("Mirror of '{}': broker {}", name, status.label());
                    if status != ConnectionState::Connected {
                        continue;
                    }
                    let Some(store) = weak.upgrade() else { break };
                    if store.is_initialized() {
                        let state = store.exposed_state().await;
                        publish_logged(&name, &state, broker.as_ref()).await;
                    }
                }
            }
        }
        log::debug!("Mirror of '{}' stopped", name);
    })
}

async fn publish_logged(name: &str, state: &ExposedState, broker: &dyn Broker) {
    if let Err(e) = publish_state(name, state, broker).await {
        log::warn!("Mirror of '{}' failed: {}", name, e);
    }
}

/// Publish value, current and history documents (all retained)
pub async fn publish_state(
    name: &str,
    state: &ExposedState,
    broker: &dyn Broker,
) -> StateResult<()> {
    let current = CurrentState {
        value: state.value.clone(),
        prev: state.prev.clone(),
        timestamp: state.timestamp,
    };
    broker
        .publish(&value_topic(name), serde_json::to_vec(&state.value)?, true)
        .await?;
    broker
        .publish(&current_topic(name), serde_json::to_vec(&current)?, true)
        .await?;
    broker
        .publish(&history_topic(name), serde_json::to_vec(&state.history)?, true)
        .await
}
