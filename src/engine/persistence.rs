// SPDX-License-Identifier: MIT

//! Durable storage of exposed state documents
//!
//! One JSON document per store, written as a whole-file overwrite. Writes
//! for a store go through a single `PersistenceWriter` task so they land in
//! the order the updates were accepted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

use super::error::{StateError, StateResult};
use super::store::ExposedState;

/// Default directory for state files
pub const DEFAULT_STATE_DIR: &str = "./shared-state";

/// Scoped read/write of one document per store name
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Load the document for `name`; `Ok(None)` when there is none yet
    async fn load(&self, name: &str) -> StateResult<Option<ExposedState>>;

    /// Replace the document for `name`
    async fn save(&self, name: &str, state: &ExposedState) -> StateResult<()>;

    /// Human readable location, used in log lines
    fn location(&self, name: &str) -> String;
}

/// Documents stored as `<dir>/<name>`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it when absent
    pub fn open(dir: impl Into<PathBuf>) -> StateResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            StateError::config(format!(
                "Unable to create storage directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl PersistenceAdapter for FileStore {
    async fn load(&self, name: &str) -> StateResult<Option<ExposedState>> {
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::persistence(path.display().to_string(), e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateError::persistence(path.display().to_string(), e))
    }

    async fn save(&self, name: &str, state: &ExposedState) -> StateResult<()> {
        let path = self.path_for(name);
        let location = path.display().to_string();
        let body =
            serde_json::to_vec(state).map_err(|e| StateError::persistence(&location, e))?;

        // Names never start with '.', so the temp file cannot shadow a store
        let tmp = self.dir.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| StateError::persistence(&location, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StateError::persistence(&location, e))
    }

    fn location(&self, name: &str) -> String {
        self.path_for(name).display().to_string()
    }
}

/// In-memory documents, for tests and embedded use
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<String, ExposedState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document as if it had been written by an earlier process
    pub async fn insert(&self, name: &str, state: ExposedState) {
        self.docs.write().await.insert(name.to_string(), state);
    }

    pub async fn get(&self, name: &str) -> Option<ExposedState> {
        self.docs.read().await.get(name).cloned()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn load(&self, name: &str) -> StateResult<Option<ExposedState>> {
        Ok(self.get(name).await)
    }

    async fn save(&self, name: &str, state: &ExposedState) -> StateResult<()> {
        self.insert(name, state.clone()).await;
        Ok(())
    }

    fn location(&self, name: &str) -> String {
        format!("memory:{}", name)
    }
}

/// Memory-only mode: nothing is loaded, writes are discarded
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl PersistenceAdapter for NullStore {
    async fn load(&self, _name: &str) -> StateResult<Option<ExposedState>> {
        Ok(None)
    }

    async fn save(&self, _name: &str, _state: &ExposedState) -> StateResult<()> {
        Ok(())
    }

    fn location(&self, name: &str) -> String {
        format!("null:{}", name)
    }
}

/// File persistence under `dir`, or memory-only mode if the directory is unusable
pub fn open_persistence(dir: impl Into<PathBuf>) -> Arc<dyn PersistenceAdapter> {
    match FileStore::open(dir) {
        Ok(store) => {
            log::info!("Persisting state to {}", store.dir().display());
            Arc::new(store)
        }
        Err(e) => {
            log::error!("{}; continuing without persistence", e);
            Arc::new(NullStore)
        }
    }
}

enum WriteCmd {
    Save(ExposedState),
    Flush(oneshot::Sender<()>),
}

/// Ordered, non-blocking durable writes for one store
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<WriteCmd>,
}

impl PersistenceWriter {
    /// Spawn the writer task; it stops when the handle is dropped
    pub fn spawn(name: String, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(name, adapter, rx));
        Self { tx }
    }

    /// Queue a write of `state`
    pub fn submit(&self, state: ExposedState) {
        if self.tx.send(WriteCmd::Save(state)).is_err() {
            log::error!("State writer stopped; dropping write");
        }
    }

    /// Wait until every write queued before this call has settled
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCmd::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_writer(
    name: String,
    adapter: Arc<dyn PersistenceAdapter>,
    mut rx: mpsc::UnboundedReceiver<WriteCmd>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriteCmd::Save(mut state) => {
                // Only the newest of a burst of queued writes needs to land
                let mut acks = Vec::new();
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WriteCmd::Save(newer) => state = newer,
                        WriteCmd::Flush(ack) => {
                            acks.push(ack);
                            break;
                        }
                    }
                }

                if let Err(e) = adapter.save(&name, &state).await {
                    log::error!(
                        "Error writing state file {}: {}",
                        adapter.location(&name),
                        e
                    );
                }
                for ack in acks {
                    let _ = ack.send(());
                }
            }
            WriteCmd::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
