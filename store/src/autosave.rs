//! Debounced autosave driven by engine events.
//!
//! Bursts of edits coalesce into one write: each qualifying event restarts a
//! timer, and the snapshot is written when the timer fires. A manual save
//! cancels the pending timer instead of racing it.
//!
//! ```ignore
//! let autosave = Autosave::new(persistence, &config.autosave);
//! let mut events = engine.subscribe();
//! // after each batch of commands:
//! autosave.observe(&mut events, &engine);
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use stratum_core::config::AutosaveConfig;
use stratum_core::engine::{EngineChange, EngineEvent, LayerEngine};
use stratum_core::scene::SceneGraph;
use stratum_core::snapshot::Snapshot;

use crate::persistence::{SaveStatus, SnapshotPersistence};

/// Schedules debounced snapshot saves.
///
/// Timers run on the ambient tokio runtime.
pub struct Autosave {
    persistence: Arc<SnapshotPersistence>,
    debounce: Duration,
    enabled: bool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Autosave {
    pub fn new(persistence: Arc<SnapshotPersistence>, config: &AutosaveConfig) -> Self {
        Self {
            persistence,
            debounce: config.debounce(),
            enabled: config.enabled,
            pending: Mutex::new(None),
        }
    }

    pub fn persistence(&self) -> &Arc<SnapshotPersistence> {
        &self.persistence
    }

    /// Whether an event should lead to a save.
    ///
    /// Activity during history replay is ignored, as are events that are
    /// part of a larger change (staged operations, per-layer syncs) and
    /// restores, which load what is already stored.
    pub fn should_save(event: &EngineEvent) -> bool {
        if event.replaying {
            return false;
        }
        match event.change {
            EngineChange::Executed(_)
            | EngineChange::Undone(_)
            | EngineChange::Redone(_)
            | EngineChange::Committed(_)
            | EngineChange::RolledBack(_) => true,
            EngineChange::Staged(_) | EngineChange::LayerSynced(_) | EngineChange::Restored => {
                false
            }
        }
    }

    /// Drains `events` and schedules one save if any of them qualifies.
    ///
    /// A lagged receiver is treated as a qualifying change.
    pub fn observe<S: SceneGraph>(
        &self,
        events: &mut broadcast::Receiver<EngineEvent>,
        engine: &LayerEngine<S>,
    ) -> bool {
        let mut dirty = false;
        loop {
            match events.try_recv() {
                Ok(event) => dirty |= Self::should_save(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::debug!("Autosave skipped {skipped} engine events");
                    dirty = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if dirty {
            self.schedule(engine.create_snapshot());
        }
        dirty
    }

    /// Restarts the debounce timer with a new snapshot to write.
    pub fn schedule(&self, snapshot: Snapshot) {
        if !self.enabled {
            return;
        }
        let persistence = self.persistence.clone();
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            persistence.save(&snapshot).await;
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Cancels any pending save. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(task) if !task.is_finished() => {
                task.abort();
                true
            }
            _ => false,
        }
    }

    /// `true` while a debounced save is waiting or writing.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Saves immediately, cancelling any pending debounced save.
    pub async fn save_now<S: SceneGraph>(&self, engine: &mut LayerEngine<S>) -> SaveStatus {
        if self.cancel() {
            log::debug!("Manual save replaced a pending autosave");
        }
        self.persistence.save_engine(engine).await
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Autosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autosave")
            .field("key", &self.persistence.key())
            .field("debounce", &self.debounce)
            .field("enabled", &self.enabled)
            .field("pending", &self.is_pending())
            .finish()
    }
}
