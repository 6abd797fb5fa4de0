//! Scene-to-model synchronization and layer lifecycle.

use super::{EngineChange, LayerEngine};
use crate::diagnostics::DiagnosticKind;
use crate::id::LayerId;
use crate::object::SerializedObject;
use crate::operation::{Direction, Operation, build};
use crate::scene::SceneGraph;

impl<S: SceneGraph> LayerEngine<S> {
    /// Rewrites a layer's cached object list from the nodes tagged with it,
    /// in stacking order.
    ///
    /// For callers that edited the scene directly. A Sectional layer found
    /// to have lost its last mask stroke is removed on the spot; the removal
    /// is a repair outside the history and is reported as an invariant
    /// violation.
    pub fn sync_layer_objects_from_canvas(&mut self, layer_id: LayerId) {
        if !self.model.contains(layer_id) {
            self.diagnostics.warn(
                DiagnosticKind::MissingTarget,
                format!("cannot sync missing layer {layer_id}"),
            );
            return;
        }
        if self.sync_layer(layer_id) && self.is_sectional(layer_id) {
            self.diagnostics.warn(
                DiagnosticKind::InvariantViolation,
                format!("removed sectional layer {layer_id}: no mask strokes left"),
            );
            if let Err(e) = self.remove_layer(layer_id) {
                self.skip(e);
            }
        }
    }

    pub(crate) fn sync_touched(&mut self, touched: &[LayerId]) {
        for id in touched {
            if self.sync_layer(*id)
                && self.is_sectional(*id)
                && !self.cleanup_candidates.contains(id)
            {
                self.cleanup_candidates.push(*id);
            }
        }
    }

    /// Returns `true` if the layer just lost its last mask stroke.
    pub(super) fn sync_layer(&mut self, layer_id: LayerId) -> bool {
        let Some(layer) = self.model.get(layer_id) else {
            return false;
        };
        let masks_before = layer.mask_stroke_count();

        let order = self.scene.node_order();
        let mut objects = Vec::new();
        for node in self.index.layer_nodes(&order, layer_id) {
            let Some(tag) = self.index.tag_of(node) else {
                continue;
            };
            match self.scene.read_node(node) {
                Some(content) => objects.push(SerializedObject {
                    object_id: tag.object_id,
                    layer_id,
                    content,
                }),
                None => {
                    self.index.untag(node);
                    self.diagnostics.warn(
                        DiagnosticKind::InvariantViolation,
                        format!("dropped stale tag of object {} on {node}", tag.object_id),
                    );
                }
            }
        }

        let masks_after = objects.iter().filter(|o| o.is_mask_stroke()).count();
        self.model.set_objects(layer_id, objects);
        self.emit(EngineChange::LayerSynced(layer_id));
        masks_before > 0 && masks_after == 0
    }

    /// Deletes Sectional layers that lost their last mask stroke.
    ///
    /// Returns the removal operations, already applied, so the caller can
    /// record them alongside the operation that emptied the layers.
    pub(crate) async fn run_lifecycle(&mut self) -> Vec<Operation> {
        let candidates = std::mem::take(&mut self.cleanup_candidates);
        let mut cleanup = Vec::new();
        for id in candidates {
            let Some(layer) = self.model.get(id) else {
                continue;
            };
            if layer.is_global() || layer.mask_stroke_count() > 0 {
                continue;
            }
            log::info!("Removing sectional layer '{}': no mask strokes left", layer.name);
            match build::remove_layer(&self.model, id) {
                Ok(op) => {
                    self.apply_operation(&op, Direction::Forward).await;
                    cleanup.push(op);
                }
                Err(e) => self.skip(e),
            }
        }
        cleanup
    }

    /// Removes nodes that have no resolvable owning layer.
    ///
    /// Covers untagged nodes, nodes tagged with a layer that no longer
    /// exists, and index entries whose node is gone. Each repair is logged.
    /// Returns the number of nodes removed.
    pub fn sweep_orphans(&mut self) -> usize {
        let stale: Vec<_> = self
            .index
            .iter()
            .filter(|(node, _)| !self.scene.contains(*node))
            .map(|(node, _)| node)
            .collect();
        for node in stale {
            if let Some(tag) = self.index.untag(node) {
                self.diagnostics.warn(
                    DiagnosticKind::InvariantViolation,
                    format!("dropped index entry of object {} for missing {node}", tag.object_id),
                );
            }
        }

        let mut removed = 0;
        for node in self.scene.node_order() {
            let problem = match self.index.tag_of(node) {
                Some(tag) if self.model.contains(tag.layer_id) => continue,
                Some(tag) => format!(
                    "object {} on {node} belongs to missing layer {}",
                    tag.object_id, tag.layer_id
                ),
                None => format!("{node} has no owning layer"),
            };
            self.diagnostics.warn(
                DiagnosticKind::InvariantViolation,
                format!("removed orphaned object: {problem}"),
            );
            self.index.untag(node);
            if let Err(e) = self.scene.remove_node(node) {
                self.skip(e.into());
            }
            removed += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::diagnostics::DiagnosticKind;
    use crate::engine::LayerEngine;
    use crate::layer::Layer;
    use crate::object::{Geometry, ObjectContent, Payload, SerializedObject, ShapeKind};
    use crate::scene::{MemoryScene, SceneGraph};
    use kurbo::Point;

    fn engine() -> LayerEngine<MemoryScene> {
        LayerEngine::new(MemoryScene::default(), &EngineConfig::default())
    }

    #[tokio::test]
    async fn sync_reads_back_scene_edits() {
        let mut engine = engine();
        let layer = engine.add_layer(Layer::global("L")).await.unwrap();
        let id = engine
            .add_object(SerializedObject::shape(
                layer,
                ShapeKind::Ellipse,
                Geometry::new(0.0, 0.0, 5.0, 5.0),
            ))
            .await;

        // Edit the live node behind the engine's back, as a canvas drag would.
        let node = engine.scene_index().node_of(id).unwrap();
        let mut content = engine.scene().read_node(node).unwrap();
        content.geometry.x = 40.0;
        engine.scene_mut().update_node(node, &content).unwrap();

        engine.sync_layer_objects_from_canvas(layer);
        assert_eq!(engine.layer(layer).unwrap().objects()[0].content.geometry.x, 40.0);
    }

    #[tokio::test]
    async fn sweep_removes_untagged_nodes() {
        let mut engine = engine();
        let layer = engine.add_layer(Layer::global("L")).await.unwrap();
        engine
            .add_object(SerializedObject::text(layer, "kept", Geometry::default()))
            .await;
        let stray = ObjectContent::new(
            Geometry::default(),
            Payload::Shape {
                shape: ShapeKind::Rectangle,
                corner_radius: 0.0,
            },
        );
        engine.scene_mut().create_node(&stray, None, 0).unwrap();

        assert_eq!(engine.sweep_orphans(), 1);
        assert_eq!(engine.scene().len(), 1);
        assert_eq!(
            engine.diagnostics().count(DiagnosticKind::InvariantViolation),
            1
        );
        assert_eq!(engine.sweep_orphans(), 0);
    }

    #[tokio::test]
    async fn sync_removes_sectional_emptied_behind_engine() {
        let mut engine = engine();
        let g = engine.add_layer(Layer::global("G")).await.unwrap();
        let stroke = engine
            .draw_mask_stroke(vec![Point::new(0.0, 0.0), Point::new(4.0, 4.0)], 2.0)
            .await
            .unwrap();
        let s = engine.active_sectional_layer().unwrap().id;

        let node = engine.scene_index().node_of(stroke).unwrap();
        engine.scene_mut().remove_node(node).unwrap();
        engine.sweep_orphans();
        engine.sync_layer_objects_from_canvas(s);

        assert!(engine.layer(s).is_none());
        assert!(engine.layer(g).unwrap().children().is_empty());
        assert!(engine.active_sectional_layer().is_none());
        assert!(engine.scene().is_empty());
    }

    #[tokio::test]
    async fn syncing_missing_layer_is_reported() {
        let mut engine = engine();
        engine.sync_layer_objects_from_canvas(crate::id::LayerId::new());
        assert_eq!(engine.diagnostics().count(DiagnosticKind::MissingTarget), 1);
    }
}
