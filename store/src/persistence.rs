//! Snapshot save/load with a status that never throws.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use stratum_core::engine::LayerEngine;
use stratum_core::scene::SceneGraph;
use stratum_core::snapshot::Snapshot;

use crate::error::{StoreError, validate_key};
use crate::provider::SnapshotStore;

/// Outcome of the most recent save, for a small status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error(String),
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStatus::Idle => f.write_str("idle"),
            SaveStatus::Saving => f.write_str("saving"),
            SaveStatus::Saved => f.write_str("saved"),
            SaveStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Saves and loads the snapshot stored under one key.
///
/// Failures are logged and reflected in [`status`](Self::status); no method
/// returns an error.
pub struct SnapshotPersistence {
    store: Arc<dyn SnapshotStore>,
    key: String,
    status: watch::Sender<SaveStatus>,
    last_saved: Mutex<Option<DateTime<Utc>>>,
}

impl SnapshotPersistence {
    /// Fails only if `key` is not a valid storage key.
    pub fn new(store: Arc<dyn SnapshotStore>, key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        validate_key(&key)?;
        let (status, _) = watch::channel(SaveStatus::Idle);
        Ok(Self {
            store,
            key,
            status,
            last_saved: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Receives every status change.
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Time of the last successful save.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        *self.last_saved.lock()
    }

    /// Writes a snapshot. Returns the resulting status.
    pub async fn save(&self, snapshot: &Snapshot) -> SaveStatus {
        self.status.send_replace(SaveStatus::Saving);
        let result = match snapshot.to_vec() {
            Ok(bytes) => self.store.write(&self.key, bytes).await,
            Err(e) => Err(StoreError::Io(std::io::Error::other(e))),
        };
        let status = match result {
            Ok(()) => {
                *self.last_saved.lock() = Some(Utc::now());
                log::debug!(
                    "Saved snapshot '{}' ({} layers)",
                    self.key,
                    snapshot.layers.len()
                );
                SaveStatus::Saved
            }
            Err(e) => {
                log::warn!("Failed to save snapshot '{}': {e}", self.key);
                SaveStatus::Error(e.to_string())
            }
        };
        self.status.send_replace(status.clone());
        status
    }

    /// Snapshots the engine, saves it and, on success, marks the engine's
    /// history as saved.
    pub async fn save_engine<S: SceneGraph>(&self, engine: &mut LayerEngine<S>) -> SaveStatus {
        let status = self.save(&engine.create_snapshot()).await;
        if status == SaveStatus::Saved {
            engine.mark_saved();
        }
        status
    }

    /// Reads the stored snapshot.
    ///
    /// Missing, unreadable, malformed and wrong-version data all yield
    /// `None`.
    pub async fn load(&self) -> Option<Snapshot> {
        let bytes = match self.store.read(&self.key).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                log::debug!("No snapshot stored under '{}'", self.key);
                return None;
            }
            Err(e) => {
                log::warn!("Failed to read snapshot '{}': {e}", self.key);
                return None;
            }
        };
        match Snapshot::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::warn!("Ignoring stored snapshot '{}': {e}", self.key);
                None
            }
        }
    }

    /// Loads the stored snapshot into `engine`. Returns `false` and leaves
    /// the engine untouched if there is nothing usable to restore.
    pub async fn restore_into<S: SceneGraph>(&self, engine: &mut LayerEngine<S>) -> bool {
        match self.load().await {
            Some(snapshot) => {
                engine.restore(&snapshot).await;
                true
            }
            None => false,
        }
    }

    /// Deletes the stored snapshot. A missing snapshot is not an error.
    pub async fn clear(&self) {
        match self.store.delete(&self.key).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                self.status.send_replace(SaveStatus::Idle);
            }
            Err(e) => log::warn!("Failed to delete snapshot '{}': {e}", self.key),
        }
    }
}

impl fmt::Debug for SnapshotPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotPersistence")
            .field("key", &self.key)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
