// SPDX-License-Identifier: MIT

//! The state store: one named, typed value with history and persistence
//!
//! `update()` runs coercion, structural change detection, history sampling,
//! durable write submission, cache publication and change notification.
//! Calls are serialized per store by an internal mutex; the durable write is
//! handed to the store's writer task so it never delays acceptance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use super::cache::StateCache;
use super::clock::{Clock, SystemClock};
use super::coerce::coerce;
use super::config::{StoreConfig, TypeConfig};
use super::error::StateResult;
use super::history::HistoryBuffer;
use super::persistence::{NullStore, PersistenceAdapter, PersistenceWriter};
use super::units::{StandardUnits, UnitCatalog};
use super::value::StateValue;

/// Buffered notifications per subscriber before it starts lagging
pub const DEFAULT_NOTIFY_CAPACITY: usize = 64;

/// Serializable snapshot shared by the cache, the state file and notifications
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ExposedState {
    #[serde(default)]
    pub value: StateValue,
    #[serde(default)]
    pub prev: StateValue,
    /// Milliseconds since the Unix epoch of the last accepted change
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub history: HistoryBuffer,
    #[serde(default)]
    pub config: Value,
}

/// Kind of store notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// First hydration from the cache or the state file
    Init,
    /// Accepted value-changing update
    Change,
}

/// Notification published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEvent {
    pub kind: EventKind,
    pub state: ExposedState,
}

/// Collaborators shared by every store in a session
#[derive(Clone)]
pub struct StoreContext {
    pub cache: StateCache,
    pub persistence: Arc<dyn PersistenceAdapter>,
    pub units: Arc<dyn UnitCatalog>,
    pub clock: Arc<dyn Clock>,
    pub notify_capacity: usize,
}

impl StoreContext {
    pub fn new(persistence: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            cache: StateCache::new(),
            persistence,
            units: Arc::new(StandardUnits),
            clock: Arc::new(SystemClock),
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }

    /// No durable storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(NullStore))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_units(mut self, units: Arc<dyn UnitCatalog>) -> Self {
        self.units = units;
        self
    }

    pub fn with_cache(mut self, cache: StateCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    value: StateValue,
    prev: StateValue,
    timestamp: i64,
    history: HistoryBuffer,
}

/// A named, typed shared value
pub struct StateStore {
    config: StoreConfig,
    config_json: Value,
    inner: Mutex<StoreInner>,
    initialized: AtomicBool,
    events: broadcast::Sender<StateEvent>,
    writer: PersistenceWriter,
    context: StoreContext,
}

impl StateStore {
    /// Create an uninitialized store. Must run inside a tokio runtime.
    pub fn new(config: StoreConfig, context: StoreContext) -> StateResult<Self> {
        config.validate()?;
        let config_json = serde_json::to_value(&config)?;
        let (events, _) = broadcast::channel(context.notify_capacity.max(1));
        let writer = PersistenceWriter::spawn(config.name.clone(), context.persistence.clone());

        Ok(Self {
            config,
            config_json,
            inner: Mutex::new(StoreInner::default()),
            initialized: AtomicBool::new(false),
            events,
            writer,
            context,
        })
    }

    /// Create and hydrate a store
    pub async fn open(config: StoreConfig, context: StoreContext) -> StateResult<Self> {
        let store = Self::new(config, context)?;
        store.hydrate().await;
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_type(&self) -> &TypeConfig {
        &self.config.data_type
    }

    /// Units used by this store for conversion and display
    pub fn units(&self) -> &dyn UnitCatalog {
        self.context.units.as_ref()
    }

    /// Whether a value has ever been assigned. Never reverts.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Populate from the session cache, else from the state file.
    ///
    /// When neither source has the store, its empty state is published to
    /// the cache so stores of the same name opened later find it there.
    pub async fn hydrate(&self) {
        let mut inner = self.inner.lock().await;
        if self.is_initialized() {
            return;
        }
        let name = self.config.name.as_str();

        if let Some(cached) = self.context.cache.get(name).await {
            log::debug!("State '{}' hydrated from session cache", name);
            self.assign_external(&mut inner, cached).await;
            return;
        }

        match self.context.persistence.load(name).await {
            Ok(Some(doc)) => {
                log::info!(
                    "State '{}' restored from {}",
                    name,
                    self.context.persistence.location(name)
                );
                self.assign_external(&mut inner, doc).await;
                return;
            }
            Ok(None) => {}
            Err(e) => log::debug!("State '{}' not restored: {}", name, e),
        }

        self.context.cache.publish(name, self.snapshot(&inner)).await;
    }

    async fn assign_external(&self, inner: &mut StoreInner, external: ExposedState) {
        inner.value = external.value;
        inner.prev = external.prev;
        inner.timestamp = external.timestamp;
        inner.history = external.history;
        inner.history.trim(self.config.history_count);

        let state = self.snapshot(inner);
        self.context.cache.publish(&self.config.name, state.clone()).await;
        self.initialized.store(true, Ordering::SeqCst);
        self.notify(EventKind::Init, state);
    }

    /// Apply a raw incoming value.
    ///
    /// `origin` is the type configuration of the sender, used for unit and
    /// boolean label conversion. Nothing is reported back: an update whose
    /// coerced value serializes identically to the current one is a silent
    /// no-op, and persistence failures are logged by the writer.
    pub async fn update(&self, raw: &Value, origin: Option<&TypeConfig>) {
        let typed = coerce(
            raw,
            &self.config.data_type,
            origin,
            self.context.units.as_ref(),
        );

        let mut inner = self.inner.lock().await;
        if typed.same_as(&inner.value) {
            return;
        }

        let now = self.context.clock.now_ms().max(inner.timestamp);
        inner.prev = std::mem::replace(&mut inner.value, typed);
        inner.timestamp = now;
        self.initialized.store(true, Ordering::SeqCst);

        if self.config.history_count > 0 && inner.history.is_due(now, self.config.save_interval)
        {
            let sample = inner.value.clone();
            inner.history.record(sample, now, self.config.history_count);
            self.writer.submit(self.snapshot(&inner));
        }

        let state = self.snapshot(&inner);
        self.context.cache.publish(&self.config.name, state.clone()).await;
        self.notify(EventKind::Change, state);
    }

    fn notify(&self, kind: EventKind, state: ExposedState) {
        // No receivers is not an error
        let _ = self.events.send(StateEvent { kind, state });
    }

    fn snapshot(&self, inner: &StoreInner) -> ExposedState {
        ExposedState {
            value: inner.value.clone(),
            prev: inner.prev.clone(),
            timestamp: inner.timestamp,
            history: inner.history.clone(),
            config: self.config_json.clone(),
        }
    }

    /// Current snapshot; no side effects
    pub async fn exposed_state(&self) -> ExposedState {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    pub async fn value(&self) -> StateValue {
        self.inner.lock().await.value.clone()
    }

    pub async fn prev(&self) -> StateValue {
        self.inner.lock().await.prev.clone()
    }

    pub async fn timestamp(&self) -> i64 {
        self.inner.lock().await.timestamp
    }

    pub async fn history(&self) -> HistoryBuffer {
        self.inner.lock().await.history.clone()
    }

    /// Receive future `init` and `change` events
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Subscribe and read the current state atomically.
    ///
    /// Returns the snapshot when the store is already initialized so a
    /// consumer can render it without missing or repeating an event.
    pub async fn watch(&self) -> (Option<ExposedState>, broadcast::Receiver<StateEvent>) {
        let inner = self.inner.lock().await;
        let rx = self.events.subscribe();
        let current = self.is_initialized().then(|| self.snapshot(&inner));
        (current, rx)
    }

    /// Wait for queued durable writes to settle
    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("name", &self.config.name)
            .field("data_type", &self.config.data_type.tag())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
