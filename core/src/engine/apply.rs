//! Effect application.
//!
//! Every primitive effect touches the scene graph and the model, then marks
//! the layers it touched. Each touched layer is re-synchronized once, after
//! all steps of the operation have run.

use std::collections::HashSet;

use super::LayerEngine;
use crate::diagnostics::DiagnosticKind;
use crate::error::{OperationError, OperationResult};
use crate::id::{LayerId, ObjectId};
use crate::layer::{ActiveLayers, LayerAttributes};
use crate::object::SerializedObject;
use crate::operation::{Direction, LayerEntry, Operation, OperationData};
use crate::scene::{NodeHandle, NodeTag, SceneGraph};

fn touch(touched: &mut Vec<LayerId>, id: LayerId) {
    if !touched.contains(&id) {
        touched.push(id);
    }
}

impl<S: SceneGraph> LayerEngine<S> {
    /// Applies one side of an operation, then syncs every touched layer.
    ///
    /// A failing step is skipped with a diagnostic; the remaining steps
    /// still run. Returns `false` when every step was an insert of objects
    /// that were already mounted, i.e. the operation changed nothing.
    pub(crate) async fn apply_operation(&mut self, op: &Operation, direction: Direction) -> bool {
        let mut touched = Vec::new();
        let mut effective = false;
        for step in op.steps(direction) {
            effective |= self.apply_step(step, &mut touched).await;
        }
        self.sync_touched(&touched);
        effective
    }

    async fn apply_step(&mut self, step: &OperationData, touched: &mut Vec<LayerId>) -> bool {
        match step {
            OperationData::InsertLayers { layers, active } => {
                // Parents first, then every layer back to its recorded slot.
                let mut entries: Vec<&LayerEntry> = layers.iter().collect();
                entries.sort_by_key(|e| !e.layer.is_global());
                let mut inserted = Vec::with_capacity(entries.len());
                for entry in entries {
                    match self.insert_layer(entry, touched).await {
                        Ok(()) => inserted.push(entry),
                        Err(e) => self.skip(e),
                    }
                }
                if inserted.len() > 1 {
                    self.restore_positions(inserted);
                }
                self.select(*active);
            }
            OperationData::RemoveLayers { layer_ids, active } => {
                for id in layer_ids {
                    if let Err(e) = self.remove_layer(*id) {
                        self.skip(e);
                    }
                }
                self.select(*active);
                self.sweep_orphans();
            }
            OperationData::SetActive(active) => self.select(*active),
            OperationData::UpdateLayer {
                layer_id,
                attributes,
            } => {
                if let Err(e) = self.update_layer_attributes(*layer_id, attributes, touched) {
                    self.skip(e);
                }
            }
            OperationData::ReorderLayers(order) => {
                for id in self.model.reorder(order) {
                    self.skip(OperationError::LayerNotFound(id));
                }
                if let Err(e) = self.restack() {
                    self.skip(e);
                }
            }
            OperationData::InsertObjects(objects) => {
                let mut effective = objects.is_empty();
                for placed in objects {
                    match self.mount_object(&placed.object, placed.index_in_layer).await {
                        Ok(true) => {
                            touch(touched, placed.object.layer_id);
                            effective = true;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            self.skip(e);
                            effective = true;
                        }
                    }
                }
                return effective;
            }
            OperationData::RemoveObjects(ids) => {
                for id in ids {
                    match self.unmount_object(*id) {
                        Ok(layer_id) => touch(touched, layer_id),
                        Err(e) => self.skip(e),
                    }
                }
            }
            OperationData::UpdateObjects(objects) => {
                for object in objects {
                    match self.update_object(object) {
                        Ok(layer_id) => touch(touched, layer_id),
                        Err(e) => self.skip(e),
                    }
                }
            }
            OperationData::MoveObject {
                object_id,
                layer_id,
                index_in_layer,
            } => match self.move_node(*object_id, *layer_id, *index_in_layer) {
                Ok(from) => {
                    touch(touched, from);
                    touch(touched, *layer_id);
                }
                Err(e) => self.skip(e),
            },
            // Flattened away by `Operation::steps`.
            OperationData::Transaction(_) => {}
        }
        true
    }

    /// Moves reinserted layers to their recorded z-order slots and restacks
    /// their nodes.
    fn restore_positions(&mut self, mut entries: Vec<&LayerEntry>) {
        entries.sort_by_key(|e| e.index);
        let ids: HashSet<LayerId> = entries.iter().map(|e| e.layer.id).collect();
        let current = self.model.order();
        let mut order: Vec<LayerId> = current
            .iter()
            .filter(|id| !ids.contains(id))
            .copied()
            .collect();
        for entry in entries {
            let index = entry.index.min(order.len());
            order.insert(index, entry.layer.id);
        }
        if order == current {
            return;
        }
        self.model.reorder(&order);
        if let Err(e) = self.restack() {
            self.skip(e);
        }
    }

    fn select(&mut self, active: ActiveLayers) {
        for repair in self.model.restore_active(active) {
            self.diagnostics
                .warn(DiagnosticKind::InvariantViolation, repair);
        }
    }

    async fn insert_layer(
        &mut self,
        entry: &LayerEntry,
        touched: &mut Vec<LayerId>,
    ) -> OperationResult {
        let mut layer = entry.layer.clone();
        let objects = std::mem::take(&mut layer.objects);
        let id = layer.id;
        self.model.insert_layer(layer, entry.index)?;
        touch(touched, id);

        for mut object in objects {
            object.layer_id = id;
            if let Err(e) = self.mount_object(&object, None).await {
                self.skip(e);
            }
        }
        Ok(())
    }

    pub(super) fn remove_layer(&mut self, id: LayerId) -> OperationResult {
        let removed = self.model.remove_layer(id)?;
        let order = self.scene.node_order();
        for layer in &removed {
            log::debug!("Removing layer '{}' ({})", layer.name, layer.id);
            for node in self.index.layer_nodes(&order, layer.id) {
                self.index.untag(node);
                if let Err(e) = self.scene.remove_node(node) {
                    self.skip(e.into());
                }
            }
            self.cleanup_candidates.retain(|c| *c != layer.id);
        }
        Ok(())
    }

    fn update_layer_attributes(
        &mut self,
        id: LayerId,
        attributes: &LayerAttributes,
        touched: &mut Vec<LayerId>,
    ) -> OperationResult {
        let previous = self.model.update_attributes(id, attributes.clone())?;
        if previous.visible != attributes.visible {
            let order = self.scene.node_order();
            for node in self.index.layer_nodes(&order, id) {
                self.scene.set_node_visible(node, attributes.visible)?;
            }
            touch(touched, id);
        }
        Ok(())
    }

    /// Mounts an object as a node of its layer. Returns `false` if the
    /// object was already live.
    ///
    /// The live check runs both before and after the image decode so a late
    /// completion cannot create a duplicate.
    pub(crate) async fn mount_object(
        &mut self,
        object: &SerializedObject,
        index_in_layer: Option<usize>,
    ) -> OperationResult<bool> {
        let layer_id = object.layer_id;
        if !self.model.contains(layer_id) {
            return Err(OperationError::LayerNotFound(layer_id));
        }
        if self.index.contains_object(object.object_id) {
            log::debug!("Object {} is already mounted", object.object_id);
            return Ok(false);
        }

        let decoded = match object.image_src() {
            Some(src) => match self.decoder.decode(src).await {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    self.diagnostics.warn(
                        DiagnosticKind::MalformedInput,
                        format!("image of object {}: {e}", object.object_id),
                    );
                    None
                }
            },
            None => None,
        };

        if self.index.contains_object(object.object_id) {
            log::debug!("Object {} was mounted during decode", object.object_id);
            return Ok(false);
        }
        let Some(layer) = self.model.get(layer_id) else {
            return Err(OperationError::LayerNotFound(layer_id));
        };
        let hidden = !layer.visible;

        let order = self.scene.node_order();
        let position = self.placement(&order, layer_id, index_in_layer);
        let node = self
            .scene
            .create_node(&object.content, decoded.as_ref(), position)?;
        self.index.tag(
            node,
            NodeTag {
                layer_id,
                object_id: object.object_id,
            },
        );
        if hidden {
            self.scene.set_node_visible(node, false)?;
        }
        Ok(true)
    }

    /// Removes an object's node. Returns the layer it belonged to.
    fn unmount_object(&mut self, id: ObjectId) -> OperationResult<LayerId> {
        let node = self
            .index
            .node_of(id)
            .ok_or(OperationError::ObjectNotFound(id))?;
        let tag = self
            .index
            .untag(node)
            .ok_or(OperationError::ObjectNotFound(id))?;
        self.scene.remove_node(node)?;
        Ok(tag.layer_id)
    }

    fn update_object(&mut self, object: &SerializedObject) -> OperationResult<LayerId> {
        let node = self
            .index
            .node_of(object.object_id)
            .ok_or(OperationError::ObjectNotFound(object.object_id))?;
        let tag = self
            .index
            .tag_of(node)
            .ok_or(OperationError::ObjectNotFound(object.object_id))?;
        if tag.layer_id != object.layer_id {
            self.diagnostics.warn(
                DiagnosticKind::InvariantViolation,
                format!(
                    "object {} updated with layer {} but lives on {}",
                    object.object_id, object.layer_id, tag.layer_id
                ),
            );
        }
        self.scene.update_node(node, &object.content)?;
        Ok(tag.layer_id)
    }

    /// Moves an object's node to another layer. Returns the source layer.
    fn move_node(
        &mut self,
        id: ObjectId,
        layer_id: LayerId,
        index_in_layer: Option<usize>,
    ) -> OperationResult<LayerId> {
        let node = self
            .index
            .node_of(id)
            .ok_or(OperationError::ObjectNotFound(id))?;
        let from = self
            .index
            .tag_of(node)
            .ok_or(OperationError::ObjectNotFound(id))?
            .layer_id;
        let target = self
            .model
            .get(layer_id)
            .ok_or(OperationError::LayerNotFound(layer_id))?;
        let visible = target.visible;

        self.index.retag_layer(node, layer_id);
        let mut order = self.scene.node_order();
        order.retain(|n| *n != node);
        let position = self.placement(&order, layer_id, index_in_layer);
        order.insert(position, node);
        self.scene.set_node_order(&order)?;
        if !visible && self.scene.read_node(node).is_some_and(|c| c.visible) {
            self.scene.set_node_visible(node, false)?;
        }
        Ok(from)
    }

    /// Stacking position for a node of `layer_id`.
    ///
    /// Nodes stay grouped by layer in z-order. `index_in_layer` picks a slot
    /// inside the layer's group; `None` or an index past the end goes on top
    /// of the group. An empty layer's group starts right above the nodes of
    /// the layers below it.
    pub(crate) fn placement(
        &self,
        order: &[NodeHandle],
        layer_id: LayerId,
        index_in_layer: Option<usize>,
    ) -> usize {
        let group: Vec<usize> = order
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                self.index
                    .tag_of(**n)
                    .is_some_and(|t| t.layer_id == layer_id)
            })
            .map(|(i, _)| i)
            .collect();
        if let Some(i) = index_in_layer
            && let Some(&position) = group.get(i)
        {
            return position;
        }
        if let Some(&last) = group.last() {
            return last + 1;
        }

        let z = self.model.index_of(layer_id).unwrap_or(self.model.len());
        let below: HashSet<LayerId> = self.model.layers()[..z].iter().map(|l| l.id).collect();
        order
            .iter()
            .rposition(|n| {
                self.index
                    .tag_of(*n)
                    .is_some_and(|t| below.contains(&t.layer_id))
            })
            .map_or(0, |p| p + 1)
    }

    /// Restacks nodes to follow layer z-order, keeping the relative order
    /// inside each layer. Untagged nodes end up on top.
    pub(crate) fn restack(&mut self) -> OperationResult {
        let order = self.scene.node_order();
        let mut restacked = Vec::with_capacity(order.len());
        for layer in self.model.layers() {
            restacked.extend(self.index.layer_nodes(&order, layer.id));
        }
        let placed: HashSet<NodeHandle> = restacked.iter().copied().collect();
        restacked.extend(order.iter().filter(|n| !placed.contains(*n)));
        if restacked != order {
            self.scene.set_node_order(&restacked)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::LayerEngine;
    use crate::layer::Layer;
    use crate::object::{Geometry, SerializedObject};
    use crate::scene::{MemoryScene, SceneGraph};

    fn engine() -> LayerEngine<MemoryScene> {
        LayerEngine::new(MemoryScene::default(), &EngineConfig::default())
    }

    fn text(layer: crate::id::LayerId, x: f64) -> SerializedObject {
        SerializedObject::text(layer, "t", Geometry::new(x, 0.0, 10.0, 10.0))
    }

    fn node_layers(engine: &LayerEngine<MemoryScene>) -> Vec<crate::id::LayerId> {
        engine
            .scene()
            .node_order()
            .into_iter()
            .map(|n| engine.scene_index().tag_of(n).unwrap().layer_id)
            .collect()
    }

    #[tokio::test]
    async fn nodes_stay_grouped_by_layer() {
        let mut engine = engine();
        let bottom = engine.add_layer(Layer::global("Bottom")).await.unwrap();
        let top = engine.add_layer(Layer::global("Top")).await.unwrap();

        engine.add_object(text(top, 0.0)).await;
        engine.add_object(text(bottom, 1.0)).await;
        engine.add_object(text(top, 2.0)).await;
        engine.add_object(text(bottom, 3.0)).await;

        assert_eq!(node_layers(&engine), vec![bottom, bottom, top, top]);
    }

    #[tokio::test]
    async fn reorder_restacks_nodes() {
        let mut engine = engine();
        let a = engine.add_layer(Layer::global("A")).await.unwrap();
        let b = engine.add_layer(Layer::global("B")).await.unwrap();
        let a1 = engine.add_object(text(a, 1.0)).await;
        let a2 = engine.add_object(text(a, 2.0)).await;
        engine.add_object(text(b, 3.0)).await;

        engine.reorder_layers(&[b, a]).await;
        assert_eq!(node_layers(&engine), vec![b, a, a]);

        let xs: Vec<_> = engine
            .layer(a)
            .unwrap()
            .objects()
            .iter()
            .map(|o| o.object_id)
            .collect();
        assert_eq!(xs, vec![a1, a2]);
    }

    #[tokio::test]
    async fn hidden_layer_hides_new_nodes() {
        let mut engine = engine();
        let layer = engine.add_layer(Layer::global("L")).await.unwrap();
        engine.toggle_visibility(layer).await;
        let id = engine.add_object(text(layer, 0.0)).await;

        let node = engine.scene_index().node_of(id).unwrap();
        assert!(!engine.scene().read_node(node).unwrap().visible);
    }
}
