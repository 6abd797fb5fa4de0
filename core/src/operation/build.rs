//! Operation constructors.
//!
//! Each constructor reads the current [`LayerModel`] and captures whatever
//! the backward effect needs to restore it exactly. Nothing here mutates
//! state; the returned operation still has to be executed.

use super::{LayerEntry, Operation, OperationData, OperationKind, PlacedObject};
use crate::error::{OperationError, OperationResult};
use crate::id::{LayerId, ObjectId};
use crate::layer::{ActiveLayers, Layer, LayerAttributes, LayerKind, LayerModel};
use crate::object::SerializedObject;

/// Adds a layer on top and makes it active.
pub fn add_layer(model: &LayerModel, layer: Layer) -> OperationResult<Operation> {
    let index = model.len();
    add_layer_at(model, layer, index)
}

/// Adds a layer at a z-order position and makes it active.
pub fn add_layer_at(model: &LayerModel, layer: Layer, index: usize) -> OperationResult<Operation> {
    if model.contains(layer.id) {
        return Err(OperationError::InvalidState(format!(
            "layer {} already exists",
            layer.id
        )));
    }
    let active = match layer.kind {
        LayerKind::Global => ActiveLayers {
            global: Some(layer.id),
            sectional: None,
        },
        LayerKind::Sectional => {
            let parent_id = layer.parent_id.ok_or_else(|| {
                OperationError::InvalidState(format!("sectional layer {} has no parent", layer.id))
            })?;
            let parent = model
                .get(parent_id)
                .ok_or(OperationError::LayerNotFound(parent_id))?;
            if !parent.is_global() {
                return Err(OperationError::InvalidState(format!(
                    "parent {parent_id} is not a global layer"
                )));
            }
            ActiveLayers {
                global: Some(parent_id),
                sectional: Some(layer.id),
            }
        }
    };

    let description = format!("Add layer '{}'", layer.name);
    let id = layer.id;
    Ok(Operation::new(
        OperationKind::AddLayer,
        OperationData::InsertLayers {
            layers: vec![LayerEntry {
                layer,
                index: index.min(model.len()),
            }],
            active,
        },
        OperationData::RemoveLayers {
            layer_ids: vec![id],
            active: model.active(),
        },
        None,
    )
    .with_description(description))
}

/// Removes a layer. A Global layer takes its Sectional children with it.
///
/// The backward effect reinserts every removed layer at its old position,
/// with its objects, and restores the selection.
pub fn remove_layer(model: &LayerModel, id: LayerId) -> OperationResult<Operation> {
    let layer = model.get(id).ok_or(OperationError::LayerNotFound(id))?;

    let mut removed = vec![id];
    if layer.is_global() {
        removed.extend(layer.children().iter().copied());
    }
    let mut entries: Vec<LayerEntry> = removed
        .iter()
        .filter_map(|lid| {
            Some(LayerEntry {
                layer: model.get(*lid)?.clone(),
                index: model.index_of(*lid)?,
            })
        })
        .collect();
    entries.sort_by_key(|e| e.index);

    Ok(Operation::new(
        OperationKind::RemoveLayer,
        OperationData::RemoveLayers {
            layer_ids: vec![id],
            active: model.active_after_removal(&removed),
        },
        OperationData::InsertLayers {
            layers: entries,
            active: model.active(),
        },
        None,
    )
    .with_description(format!("Remove layer '{}'", layer.name)))
}

/// Selects a layer, following the tier rules of [`LayerModel::set_active`].
pub fn set_active_layer(model: &LayerModel, id: LayerId) -> OperationResult<Operation> {
    let active = model
        .activation(id)
        .ok_or(OperationError::LayerNotFound(id))?;
    Ok(Operation::new(
        OperationKind::SetActiveLayer,
        OperationData::SetActive(active),
        OperationData::SetActive(model.active()),
        None,
    ))
}

/// Replaces a layer's editable attributes via `edit`.
pub fn update_layer(
    model: &LayerModel,
    id: LayerId,
    edit: impl FnOnce(&mut LayerAttributes),
) -> OperationResult<Operation> {
    let layer = model.get(id).ok_or(OperationError::LayerNotFound(id))?;
    let before = layer.attributes();
    let mut after = before.clone();
    edit(&mut after);
    Ok(Operation::new(
        OperationKind::UpdateLayer,
        OperationData::UpdateLayer {
            layer_id: id,
            attributes: after,
        },
        OperationData::UpdateLayer {
            layer_id: id,
            attributes: before,
        },
        None,
    )
    .with_description(format!("Edit layer '{}'", layer.name)))
}

/// Flips a layer's visibility.
pub fn toggle_visibility(model: &LayerModel, id: LayerId) -> OperationResult<Operation> {
    let layer = model.get(id).ok_or(OperationError::LayerNotFound(id))?;
    let visible = layer.visible;
    let label = if visible { "Hide" } else { "Show" };
    let description = format!("{label} layer '{}'", layer.name);
    Ok(update_layer(model, id, |a| a.visible = !visible)?.with_description(description))
}

/// Reorders layers bottom to top. See [`LayerModel::normalize_order`].
pub fn reorder_layers(model: &LayerModel, order: &[LayerId]) -> OperationResult<Operation> {
    let (normalized, unknown) = model.normalize_order(order);
    if let Some(id) = unknown.first() {
        return Err(OperationError::LayerNotFound(*id));
    }
    Ok(Operation::new(
        OperationKind::ReorderLayers,
        OperationData::ReorderLayers(normalized),
        OperationData::ReorderLayers(model.order()),
        None,
    ))
}

/// Adds an object to its layer. `index_in_layer` of `None` puts it on top.
pub fn add_object(
    model: &LayerModel,
    object: SerializedObject,
    index_in_layer: Option<usize>,
) -> OperationResult<Operation> {
    let layer = model
        .get(object.layer_id)
        .ok_or(OperationError::LayerNotFound(object.layer_id))?;
    if model.find_object(object.object_id).is_some() {
        return Err(OperationError::InvalidState(format!(
            "object {} already exists",
            object.object_id
        )));
    }
    let kind = format!("{:?}", object.kind()).to_lowercase();
    let description = format!("Add {kind} to '{}'", layer.name);
    let id = object.object_id;
    Ok(Operation::new(
        OperationKind::AddObject,
        OperationData::InsertObjects(vec![PlacedObject {
            object,
            index_in_layer,
        }]),
        OperationData::RemoveObjects(vec![id]),
        None,
    )
    .with_description(description))
}

/// Removes an object; undo puts it back at the same position in its layer.
pub fn remove_object(model: &LayerModel, id: ObjectId) -> OperationResult<Operation> {
    let (layer, index) = model
        .find_object(id)
        .ok_or(OperationError::ObjectNotFound(id))?;
    let object = layer.objects()[index].clone();
    Ok(Operation::new(
        OperationKind::RemoveObject,
        OperationData::RemoveObjects(vec![id]),
        OperationData::InsertObjects(vec![PlacedObject {
            object,
            index_in_layer: Some(index),
        }]),
        None,
    ))
}

/// Replaces an object's content. The object must stay on its layer; use
/// [`move_object`] to change layers.
pub fn modify_object(model: &LayerModel, after: SerializedObject) -> OperationResult<Operation> {
    let (layer, index) = model
        .find_object(after.object_id)
        .ok_or(OperationError::ObjectNotFound(after.object_id))?;
    if layer.id != after.layer_id {
        return Err(OperationError::InvalidState(format!(
            "object {} belongs to layer {}, not {}",
            after.object_id, layer.id, after.layer_id
        )));
    }
    let before = layer.objects()[index].clone();
    Ok(Operation::new(
        OperationKind::ModifyObject,
        OperationData::UpdateObjects(vec![after]),
        OperationData::UpdateObjects(vec![before]),
        None,
    ))
}

/// Moves an object to another layer (or another position in its own).
pub fn move_object(
    model: &LayerModel,
    id: ObjectId,
    to_layer: LayerId,
    index_in_layer: Option<usize>,
) -> OperationResult<Operation> {
    let (from, index) = model
        .find_object(id)
        .ok_or(OperationError::ObjectNotFound(id))?;
    let target = model
        .get(to_layer)
        .ok_or(OperationError::LayerNotFound(to_layer))?;
    let description = format!("Move object to '{}'", target.name);
    Ok(Operation::new(
        OperationKind::MoveObject,
        OperationData::MoveObject {
            object_id: id,
            layer_id: to_layer,
            index_in_layer,
        },
        OperationData::MoveObject {
            object_id: id,
            layer_id: from.id,
            index_in_layer: Some(index),
        },
        None,
    )
    .with_description(description))
}
