use super::{EngineChange, LayerEngine};
use crate::diagnostics::DiagnosticKind;
use crate::layer::LayerModel;
use crate::scene::SceneGraph;
use crate::snapshot::Snapshot;
use crate::transaction::TransactionCoordinator;

impl<S: SceneGraph> LayerEngine<S> {
    /// Replaces the model and scene with the contents of a snapshot.
    ///
    /// History is cleared and the restored state counts as saved. Structural
    /// problems in the snapshot are repaired and reported as diagnostics;
    /// objects that fail to mount are dropped.
    pub async fn restore(&mut self, snapshot: &Snapshot) {
        log::info!("Restoring {} layers from snapshot", snapshot.layers.len());

        if self.transactions.is_open() {
            self.caller_error("open transaction discarded by restore");
        }
        self.transactions = TransactionCoordinator::new();
        self.cleanup_candidates.clear();

        self.canvas = snapshot.canvas.clone();
        self.scene.clear();
        self.scene.set_canvas(&self.canvas);
        self.index.clear();

        let active = snapshot.active.unwrap_or_default();
        let (model, repairs) = LayerModel::from_parts(snapshot.to_layers(), active);
        for repair in repairs {
            self.diagnostics
                .warn(DiagnosticKind::MalformedInput, repair);
        }
        self.model = model;

        let objects: Vec<_> = self
            .model
            .layers()
            .iter()
            .flat_map(|layer| layer.objects().iter().cloned())
            .collect();
        for object in &objects {
            if let Err(e) = self.mount_object(object, None).await {
                self.skip(e);
            }
        }
        for id in self.model.order() {
            self.sync_layer(id);
        }
        self.sweep_orphans();
        self.cleanup_candidates.clear();

        self.history.clear();
        self.history.mark_saved();
        self.emit(EngineChange::Restored);
    }
}
