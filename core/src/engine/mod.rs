//! The layer engine.
//!
//! [`LayerEngine`] owns the layer model, the injected scene graph and the
//! node index, and is the only place they change. Every edit enters as an
//! [`Operation`]: the engine applies its forward effect, re-derives the
//! cached object list of each touched layer from the scene graph, enforces
//! the Sectional-layer lifecycle, and records the result in the history.
//!
//! Commands take `&mut self` and run to completion before the next one
//! starts. Producers that only hold shared references push
//! [`Command`]s into a [`CommandQueue`] instead; the owner drains it.
//!
//! No command returns an error. Recoverable problems are skipped and kept
//! in [`diagnostics`](LayerEngine::diagnostics).

mod apply;
mod restore;
mod sync;

use std::sync::Arc;

use kurbo::Point;
use tokio::sync::broadcast;

use crate::config::{CanvasConfig, EngineConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{OperationError, OperationResult};
use crate::history::OperationHistory;
use crate::id::{LayerId, ObjectId, TransactionId};
use crate::image::{DataUrlDecoder, ImageDecoder};
use crate::layer::{Layer, LayerAttributes, LayerKind, LayerModel, LayerTreeNode};
use crate::object::SerializedObject;
use crate::operation::{Direction, Operation, OperationKind, build};
use crate::queue::{Command, CommandQueue};
use crate::scene::{SceneGraph, SceneIndex};
use crate::snapshot::{Snapshot, create_snapshot};
use crate::transaction::{Transaction, TransactionCoordinator};

const EVENT_CAPACITY: usize = 64;

/// A state change observed by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineChange {
    /// An operation was applied and recorded.
    Executed(OperationKind),
    /// An operation was applied and staged in the open transaction.
    Staged(OperationKind),
    Undone(OperationKind),
    Redone(OperationKind),
    Committed(TransactionId),
    RolledBack(TransactionId),
    /// A layer's cached object list was rewritten from the scene graph.
    LayerSynced(LayerId),
    /// The model was replaced from a snapshot.
    Restored,
}

/// Broadcast to subscribers after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub change: EngineChange,
    /// Set while undo or redo is replaying history.
    pub replaying: bool,
}

/// Layer model, scene graph and history, kept consistent with each other.
pub struct LayerEngine<S: SceneGraph> {
    model: LayerModel,
    canvas: CanvasConfig,
    scene: S,
    index: SceneIndex,
    decoder: Arc<dyn ImageDecoder>,
    history: OperationHistory,
    transactions: TransactionCoordinator,
    diagnostics: Diagnostics,
    events: broadcast::Sender<EngineEvent>,
    replaying: bool,
    /// Sectional layers that lost their last mask stroke, awaiting cleanup.
    cleanup_candidates: Vec<LayerId>,
}

impl<S: SceneGraph> LayerEngine<S> {
    pub fn new(scene: S, config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut scene = scene;
        scene.set_canvas(&config.canvas);
        Self {
            model: LayerModel::new(),
            canvas: config.canvas.clone(),
            scene,
            index: SceneIndex::new(),
            decoder: Arc::new(DataUrlDecoder),
            history: OperationHistory::new(config.history.max_depth),
            transactions: TransactionCoordinator::new(),
            diagnostics: Diagnostics::new(config.diagnostics.capacity),
            events,
            replaying: false,
            cleanup_candidates: Vec::new(),
        }
    }

    /// Replaces the image decoder used when mounting image objects.
    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    // ---- Queries ----

    pub fn model(&self) -> &LayerModel {
        &self.model
    }

    pub fn canvas(&self) -> &CanvasConfig {
        &self.canvas
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Direct access to the scene graph. Changes made here bypass the
    /// history; call [`sweep_orphans`](Self::sweep_orphans) afterwards if
    /// untagged nodes may have been added.
    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn scene_index(&self) -> &SceneIndex {
        &self.index
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.model.get(id)
    }

    pub fn active_global_layer(&self) -> Option<&Layer> {
        self.model.active_global()
    }

    pub fn active_sectional_layer(&self) -> Option<&Layer> {
        self.model.active_sectional()
    }

    pub fn layer_tree(&self) -> Vec<LayerTreeNode<'_>> {
        self.model.tree()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    /// Undo descriptions, most recent first.
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.history.undo_descriptions()
    }

    /// Redo descriptions, most recent first.
    pub fn redo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.history.redo_descriptions()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes()
    }

    /// Marks the current state as saved.
    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// `true` while undo or redo is replaying history.
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.is_open()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Projects the current model into a persistable snapshot.
    pub fn create_snapshot(&self) -> Snapshot {
        create_snapshot(&self.model, &self.canvas)
    }

    // ---- Operation log ----

    /// Applies an operation and records it.
    ///
    /// While a transaction is open the operation is staged in it instead.
    /// Sectional layers left without mask strokes are removed afterwards and
    /// the removal is recorded together with `op`, so one undo brings both
    /// back. An operation that only re-adds objects that are already live
    /// changes nothing and is not recorded.
    pub async fn execute_operation(&mut self, op: Operation) {
        if self.transactions.is_open() {
            self.add_operation_to_transaction(op).await;
            return;
        }
        let kind = op.kind;
        log::debug!("Executing '{}'", op.description);
        if !self.apply_operation(&op, Direction::Forward).await {
            self.not_recorded(&op);
            return;
        }
        let cleanup = self.run_lifecycle().await;
        self.history.record(with_cleanup(op, cleanup));
        self.emit(EngineChange::Executed(kind));
    }

    /// Reverts the most recent operation. No-op when there is nothing to undo.
    pub async fn undo(&mut self) {
        if self.transactions.is_open() {
            self.caller_error("undo is not available while a transaction is open");
            return;
        }
        let Some(op) = self.history.undo() else {
            return;
        };
        log::debug!("Undo '{}'", op.description);
        self.replay(&op, Direction::Backward).await;
        self.emit(EngineChange::Undone(op.kind));
    }

    /// Reapplies the most recently undone operation.
    pub async fn redo(&mut self) {
        if self.transactions.is_open() {
            self.caller_error("redo is not available while a transaction is open");
            return;
        }
        let Some(op) = self.history.redo() else {
            return;
        };
        log::debug!("Redo '{}'", op.description);
        self.replay(&op, Direction::Forward).await;
        self.emit(EngineChange::Redone(op.kind));
    }

    async fn replay(&mut self, op: &Operation, direction: Direction) {
        self.replaying = true;
        self.apply_operation(op, direction).await;
        // Recorded operations already carry their cleanup.
        self.cleanup_candidates.clear();
        self.replaying = false;
    }

    // ---- Transactions ----

    /// Opens a transaction. Returns `None` if one is already open.
    pub fn start_transaction(&mut self, name: impl Into<String>) -> Option<TransactionId> {
        match self.transactions.start(name) {
            Ok(id) => Some(id),
            Err(e) => {
                self.caller_error(e.to_string());
                None
            }
        }
    }

    /// Applies an operation and stages it in the open transaction.
    pub async fn add_operation_to_transaction(&mut self, op: Operation) {
        if !self.transactions.is_open() {
            self.caller_error(format!("cannot stage '{}': no transaction is open", op.description));
            return;
        }
        let kind = op.kind;
        if !self.apply_operation(&op, Direction::Forward).await {
            self.not_recorded(&op);
            return;
        }
        if let Err(e) = self.transactions.stage(op) {
            self.caller_error(e.to_string());
            return;
        }
        self.emit(EngineChange::Staged(kind));
    }

    /// Records the staged operations as one undo step.
    ///
    /// Lifecycle cleanup deferred during the transaction runs here and is
    /// recorded as part of it. An empty transaction records nothing.
    pub async fn commit_transaction(&mut self) {
        let mut txn = match self.transactions.finish() {
            Ok(txn) => txn,
            Err(e) => {
                self.caller_error(format!("commit failed: {e}"));
                return;
            }
        };
        for op in self.run_lifecycle().await {
            txn.push(op);
        }
        let id = txn.id;
        if txn.is_empty() {
            log::debug!("Transaction '{}' committed with no operations", txn.name);
        } else {
            log::debug!(
                "Committed transaction '{}' ({} operations)",
                txn.name,
                txn.operations.len()
            );
            self.history.record(txn.into_operation());
        }
        self.emit(EngineChange::Committed(id));
    }

    /// Discards the open transaction, reverting its staged effects in
    /// reverse order.
    pub async fn rollback_transaction(&mut self) {
        let txn = match self.transactions.finish() {
            Ok(txn) => txn,
            Err(e) => {
                self.caller_error(format!("rollback failed: {e}"));
                return;
            }
        };
        let id = txn.id;
        log::debug!("Rolling back transaction '{}'", txn.name);
        let op = txn.into_operation();
        self.apply_operation(&op, Direction::Backward).await;
        self.cleanup_candidates.clear();
        self.emit(EngineChange::RolledBack(id));
    }

    // ---- Intents ----

    /// Adds a layer on top and selects it.
    pub async fn add_layer(&mut self, layer: Layer) -> Option<LayerId> {
        let id = layer.id;
        let built = build::add_layer(&self.model, layer);
        self.submit(built).await.then_some(id)
    }

    pub async fn delete_layer(&mut self, id: LayerId) {
        let built = build::remove_layer(&self.model, id);
        self.submit(built).await;
    }

    pub async fn set_active_layer(&mut self, id: LayerId) {
        let built = build::set_active_layer(&self.model, id);
        self.submit(built).await;
    }

    pub async fn toggle_visibility(&mut self, id: LayerId) {
        let built = build::toggle_visibility(&self.model, id);
        self.submit(built).await;
    }

    /// Edits a layer's name, prompt text, reference images or background.
    pub async fn update_layer(&mut self, id: LayerId, edit: impl FnOnce(&mut LayerAttributes)) {
        let built = build::update_layer(&self.model, id, edit);
        self.submit(built).await;
    }

    /// Reorders layers bottom to top. Unknown ids are reported and ignored;
    /// layers not mentioned keep their relative order on top.
    pub async fn reorder_layers(&mut self, order: &[LayerId]) {
        let (_, unknown) = self.model.normalize_order(order);
        for id in &unknown {
            self.skip(OperationError::LayerNotFound(*id));
        }
        let known: Vec<_> = order.iter().filter(|id| !unknown.contains(*id)).copied().collect();
        let built = build::reorder_layers(&self.model, &known);
        self.submit(built).await;
    }

    pub async fn add_object(&mut self, object: SerializedObject) -> ObjectId {
        let id = object.object_id;
        let built = build::add_object(&self.model, object, None);
        self.submit(built).await;
        id
    }

    pub async fn remove_object(&mut self, id: ObjectId) {
        let built = build::remove_object(&self.model, id);
        self.submit(built).await;
    }

    pub async fn modify_object(&mut self, object: SerializedObject) {
        let built = build::modify_object(&self.model, object);
        self.submit(built).await;
    }

    pub async fn move_object(&mut self, id: ObjectId, to_layer: LayerId) {
        let built = build::move_object(&self.model, id, to_layer, None);
        self.submit(built).await;
    }

    /// Draws a mask stroke on the active Sectional layer.
    ///
    /// Without an active Sectional layer, a new one is created under the
    /// active Global layer, in the same transaction as the stroke, so one
    /// undo removes both.
    pub async fn draw_mask_stroke(&mut self, points: Vec<Point>, width: f64) -> Option<ObjectId> {
        if points.is_empty() {
            self.caller_error("mask stroke has no points");
            return None;
        }
        if let Some(sectional) = self.model.active_sectional().map(|l| l.id) {
            let stroke = SerializedObject::mask_stroke(sectional, points, width);
            return Some(self.add_object(stroke).await);
        }
        let Some(global) = self.model.active_global() else {
            self.caller_error("cannot draw a mask stroke without an active global layer");
            return None;
        };
        let number = global.children().len() + 1;
        let layer = Layer::sectional(format!("Mask {number}"), global.id);
        let stroke = SerializedObject::mask_stroke(layer.id, points, width);
        let stroke_id = stroke.object_id;

        let own_transaction = !self.transactions.is_open();
        if own_transaction {
            self.start_transaction("Draw mask stroke");
        }
        let added = self.add_layer(layer).await.is_some();
        if added {
            self.add_object(stroke).await;
        }
        if own_transaction {
            self.commit_transaction().await;
        }
        added.then_some(stroke_id)
    }

    // ---- Command queue ----

    /// Runs a single queued command.
    pub async fn run(&mut self, command: Command) {
        match command {
            Command::Execute(op) => self.execute_operation(op).await,
            Command::Undo => self.undo().await,
            Command::Redo => self.redo().await,
            Command::StartTransaction(name) => {
                self.start_transaction(name);
            }
            Command::Stage(op) => self.add_operation_to_transaction(op).await,
            Command::Commit => self.commit_transaction().await,
            Command::Rollback => self.rollback_transaction().await,
            Command::ToggleVisibility(id) => self.toggle_visibility(id).await,
            Command::DeleteLayer(id) => self.delete_layer(id).await,
            Command::SetActiveLayer(id) => self.set_active_layer(id).await,
            Command::ReorderLayers(order) => self.reorder_layers(&order).await,
            Command::DrawMaskStroke { points, width } => {
                self.draw_mask_stroke(points, width).await;
            }
        }
    }

    /// Runs queued commands one at a time, in submission order, until the
    /// queue is empty. Returns the number of commands run.
    pub async fn drain(&mut self, queue: &CommandQueue) -> usize {
        let mut count = 0;
        loop {
            let batch = queue.drain();
            if batch.is_empty() {
                return count;
            }
            for command in batch {
                self.run(command).await;
                count += 1;
            }
        }
    }

    // ---- Helpers ----

    /// Executes a built operation, or reports why it could not be built.
    /// Returns `true` if the operation was executed.
    async fn submit(&mut self, built: OperationResult<Operation>) -> bool {
        match built {
            Ok(op) => {
                self.execute_operation(op).await;
                true
            }
            Err(e) => {
                self.skip(e);
                false
            }
        }
    }

    fn emit(&self, change: EngineChange) {
        // No subscribers is fine.
        let _ = self.events.send(EngineEvent {
            change,
            replaying: self.replaying,
        });
    }

    fn skip(&mut self, error: OperationError) {
        self.diagnostics
            .warn(error.kind(), format!("skipped effect: {error}"));
    }

    fn not_recorded(&mut self, op: &Operation) {
        self.diagnostics.warn(
            DiagnosticKind::InvariantViolation,
            format!("'{}' changed nothing and was not recorded", op.description),
        );
    }

    fn caller_error(&mut self, message: impl Into<String>) {
        self.diagnostics.warn(DiagnosticKind::CallerError, message);
    }

    fn is_sectional(&self, id: LayerId) -> bool {
        self.model
            .get(id)
            .is_some_and(|l| l.kind == LayerKind::Sectional)
    }
}

impl<S: SceneGraph + std::fmt::Debug> std::fmt::Debug for LayerEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerEngine")
            .field("layers", &self.model.len())
            .field("nodes", &self.index.len())
            .field("history", &self.history)
            .field("in_transaction", &self.transactions.is_open())
            .field("scene", &self.scene)
            .finish()
    }
}

/// Folds lifecycle cleanup into the operation that caused it.
fn with_cleanup(op: Operation, cleanup: Vec<Operation>) -> Operation {
    if cleanup.is_empty() {
        return op;
    }
    let name = op.description.clone();
    let mut operations = Vec::with_capacity(cleanup.len() + 1);
    operations.push(op);
    operations.extend(cleanup);
    Transaction::new(name, operations).into_operation()
}
