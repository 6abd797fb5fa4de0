//! The declarative layer model.
//!
//! [`LayerModel`] owns every [`Layer`] in z-order (bottom to top) together
//! with the active-layer selection. Mutators only touch the model; scene
//! graph side effects are the engine's job.
//!
//! Two tiers of layers exist. **Global** layers are top-level; **Sectional**
//! layers hang off exactly one Global parent and carry mask strokes. At most
//! one layer per tier is active, and an active Sectional layer always belongs
//! to the active Global layer.

use serde::{Deserialize, Serialize};

use crate::error::{OperationError, OperationResult};
use crate::id::{LayerId, ObjectId};
use crate::image::ImageRef;
use crate::object::SerializedObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Global,
    Sectional,
}

/// A layer and the serialized objects it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    /// Owning Global layer. Present iff `kind` is [`LayerKind::Sectional`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<LayerId>,
    pub visible: bool,
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub reference_images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<ImageRef>,
    /// Cached content, rewritten only by scene synchronization.
    #[serde(default)]
    pub(crate) objects: Vec<SerializedObject>,
    /// Sectional layers parented to this layer, in z-order.
    #[serde(default)]
    pub(crate) children: Vec<LayerId>,
}

impl Layer {
    pub fn global(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), LayerKind::Global, None)
    }

    pub fn sectional(name: impl Into<String>, parent: LayerId) -> Self {
        Self::with_kind(name.into(), LayerKind::Sectional, Some(parent))
    }

    fn with_kind(name: String, kind: LayerKind, parent_id: Option<LayerId>) -> Self {
        Self {
            id: LayerId::new(),
            name,
            kind,
            parent_id,
            visible: true,
            prompt_text: String::new(),
            reference_images: Vec::new(),
            background_image: None,
            objects: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attaches initial objects, retagging them to this layer.
    pub fn with_objects(mut self, objects: Vec<SerializedObject>) -> Self {
        self.objects = objects;
        for object in &mut self.objects {
            object.layer_id = self.id;
        }
        self
    }

    pub fn objects(&self) -> &[SerializedObject] {
        &self.objects
    }

    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    pub fn is_global(&self) -> bool {
        self.kind == LayerKind::Global
    }

    pub fn mask_stroke_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_mask_stroke()).count()
    }

    pub fn attributes(&self) -> LayerAttributes {
        LayerAttributes {
            name: self.name.clone(),
            visible: self.visible,
            prompt_text: self.prompt_text.clone(),
            reference_images: self.reference_images.clone(),
            background_image: self.background_image.clone(),
        }
    }

    fn set_attributes(&mut self, attributes: LayerAttributes) {
        self.name = attributes.name;
        self.visible = attributes.visible;
        self.prompt_text = attributes.prompt_text;
        self.reference_images = attributes.reference_images;
        self.background_image = attributes.background_image;
    }
}

/// The user-editable attributes of a layer, swapped as a unit by undoable
/// layer updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAttributes {
    pub name: String,
    pub visible: bool,
    pub prompt_text: String,
    pub reference_images: Vec<ImageRef>,
    pub background_image: Option<ImageRef>,
}

/// Active layer per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLayers {
    pub global: Option<LayerId>,
    pub sectional: Option<LayerId>,
}

/// One entry of [`LayerModel::tree`]: a Global layer and its Sectional children.
#[derive(Debug, Clone, Copy)]
pub struct LayerTreeNode<'a> {
    pub layer: &'a Layer,
    pub children: &'a [LayerId],
}

/// All layers in z-order plus the active selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerModel {
    layers: Vec<Layer>,
    active: ActiveLayers,
}

impl LayerModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model from restored parts, repairing structural problems.
    ///
    /// Returns the repaired model and one message per repair.
    pub fn from_parts(layers: Vec<Layer>, active: ActiveLayers) -> (Self, Vec<String>) {
        let mut model = Self {
            layers: Vec::with_capacity(layers.len()),
            active: ActiveLayers::default(),
        };
        let mut repairs = Vec::new();

        // Globals go in first so every sectional finds its parent.
        let mut indexed: Vec<(usize, Layer)> = layers.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, l)| !l.is_global());

        let mut z_order = Vec::with_capacity(indexed.len());
        for (z, mut layer) in indexed {
            let id = layer.id;
            layer.children.clear();
            for object in &mut layer.objects {
                object.layer_id = id;
            }
            let index = model.layers.len();
            match model.insert_layer(layer, index) {
                Ok(()) => z_order.push((z, id)),
                Err(e) => repairs.push(format!("dropped layer {id}: {e}")),
            }
        }
        z_order.sort_by_key(|(z, _)| *z);
        let order: Vec<_> = z_order.into_iter().map(|(_, id)| id).collect();
        model.reorder(&order);

        repairs.extend(model.restore_active(active));
        (model, repairs)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.get(id).is_some()
    }

    /// Z-order position of a layer (0 is the bottom).
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn active(&self) -> ActiveLayers {
        self.active
    }

    pub fn active_global(&self) -> Option<&Layer> {
        self.active.global.and_then(|id| self.get(id))
    }

    pub fn active_sectional(&self) -> Option<&Layer> {
        self.active.sectional.and_then(|id| self.get(id))
    }

    /// Global layers in z-order, each with its Sectional children.
    pub fn tree(&self) -> Vec<LayerTreeNode<'_>> {
        self.layers
            .iter()
            .filter(|l| l.is_global())
            .map(|layer| LayerTreeNode {
                layer,
                children: &layer.children,
            })
            .collect()
    }

    /// Finds an object by id, returning its layer and position in that layer.
    pub fn find_object(&self, id: ObjectId) -> Option<(&Layer, usize)> {
        self.layers.iter().find_map(|layer| {
            layer
                .objects
                .iter()
                .position(|o| o.object_id == id)
                .map(|i| (layer, i))
        })
    }

    /// The selection that results from activating `id`.
    ///
    /// Returns `None` if the layer does not exist.
    pub fn activation(&self, id: LayerId) -> Option<ActiveLayers> {
        let layer = self.get(id)?;
        Some(match layer.kind {
            LayerKind::Global => {
                let sectional = self
                    .active_sectional()
                    .filter(|s| s.parent_id == Some(id))
                    .map(|s| s.id);
                ActiveLayers {
                    global: Some(id),
                    sectional,
                }
            }
            LayerKind::Sectional => ActiveLayers {
                global: layer.parent_id,
                sectional: Some(id),
            },
        })
    }

    /// Makes a layer active. Selecting a missing layer is a no-op.
    ///
    /// Returns `true` if the layer exists.
    pub fn set_active(&mut self, id: LayerId) -> bool {
        match self.activation(id) {
            Some(active) => {
                self.active = active;
                true
            }
            None => false,
        }
    }

    /// The selection left behind once `removed` layers are gone.
    ///
    /// A removed active Global layer falls back to the topmost surviving
    /// Global layer.
    pub fn active_after_removal(&self, removed: &[LayerId]) -> ActiveLayers {
        let gone = |id: &LayerId| removed.contains(id);
        let global = match self.active.global {
            Some(g) if !gone(&g) => Some(g),
            _ => self
                .layers
                .iter()
                .rev()
                .find(|l| l.is_global() && !gone(&l.id))
                .map(|l| l.id),
        };
        let sectional = self
            .active_sectional()
            .filter(|s| !gone(&s.id) && s.parent_id.is_some() && s.parent_id == global)
            .map(|s| s.id);
        ActiveLayers { global, sectional }
    }

    /// Replaces the selection, repairing it if it breaks the tier rules.
    ///
    /// Returns one message per repair.
    pub fn restore_active(&mut self, active: ActiveLayers) -> Vec<String> {
        let mut repairs = Vec::new();
        let mut global = active.global;
        let mut sectional = active.sectional;

        if let Some(id) = global
            && !self.get(id).is_some_and(Layer::is_global)
        {
            repairs.push(format!("active global layer {id} is not a global layer"));
            global = None;
        }
        if let Some(id) = sectional {
            match self.get(id) {
                Some(layer) if layer.kind == LayerKind::Sectional => {
                    if global.is_none() {
                        global = layer.parent_id;
                    }
                    if layer.parent_id != global {
                        repairs.push(format!(
                            "active sectional layer {id} does not belong to the active global layer"
                        ));
                        sectional = None;
                    }
                }
                _ => {
                    repairs.push(format!("active sectional layer {id} does not exist"));
                    sectional = None;
                }
            }
        }
        if global.is_none() {
            global = self.layers.iter().rev().find(|l| l.is_global()).map(|l| l.id);
        }

        self.active = ActiveLayers { global, sectional };
        repairs
    }

    /// Inserts a layer at a z-order position (clamped to the top).
    ///
    /// A Sectional layer must name an existing Global parent. The first
    /// Global layer inserted into a model without an active Global layer
    /// becomes active.
    pub fn insert_layer(&mut self, mut layer: Layer, index: usize) -> OperationResult {
        if self.contains(layer.id) {
            return Err(OperationError::InvalidState(format!(
                "layer {} already exists",
                layer.id
            )));
        }
        match layer.kind {
            LayerKind::Global => {
                layer.parent_id = None;
                let id = layer.id;
                layer.children.retain(|c| {
                    self.layers
                        .iter()
                        .any(|l| l.id == *c && l.parent_id == Some(id))
                });
            }
            LayerKind::Sectional => {
                layer.children.clear();
                let parent_id = layer.parent_id.ok_or_else(|| {
                    OperationError::InvalidState(format!(
                        "sectional layer {} has no parent",
                        layer.id
                    ))
                })?;
                let parent = self
                    .get_mut(parent_id)
                    .ok_or(OperationError::LayerNotFound(parent_id))?;
                if !parent.is_global() {
                    return Err(OperationError::InvalidState(format!(
                        "parent {parent_id} of layer {} is not a global layer",
                        layer.id
                    )));
                }
                if !parent.children.contains(&layer.id) {
                    parent.children.push(layer.id);
                }
            }
        }

        if layer.is_global() && self.active.global.is_none() {
            self.active.global = Some(layer.id);
        }
        let index = index.min(self.layers.len());
        let sectional = !layer.is_global();
        self.layers.insert(index, layer);
        if sectional {
            self.sort_children();
        }
        Ok(())
    }

    /// Removes a layer. Removing a Global layer cascades to its children.
    ///
    /// Returns the removed layers, the requested one first.
    /// The removed layers keep their `children` lists for reinsertion.
    pub fn remove_layer(&mut self, id: LayerId) -> OperationResult<Vec<Layer>> {
        let index = self.index_of(id).ok_or(OperationError::LayerNotFound(id))?;
        let layer = self.layers.remove(index);

        let mut removed_ids = vec![id];
        let mut removed = Vec::new();
        if layer.is_global() {
            for child in &layer.children {
                if let Some(i) = self.index_of(*child) {
                    removed_ids.push(*child);
                    removed.push(self.layers.remove(i));
                }
            }
        } else if let Some(parent) = layer.parent_id.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        removed.insert(0, layer);

        self.active = self.active_after_removal(&removed_ids);
        Ok(removed)
    }

    /// Replaces the editable attributes of a layer, returning the old ones.
    pub fn update_attributes(
        &mut self,
        id: LayerId,
        attributes: LayerAttributes,
    ) -> OperationResult<LayerAttributes> {
        let layer = self.get_mut(id).ok_or(OperationError::LayerNotFound(id))?;
        let previous = layer.attributes();
        layer.set_attributes(attributes);
        Ok(previous)
    }

    /// Normalizes a requested z-order into a full permutation of the layers.
    ///
    /// Known ids are taken in the requested order; layers not mentioned keep
    /// their relative order and go on top. Returns the normalized order and
    /// any unknown ids.
    pub fn normalize_order(&self, order: &[LayerId]) -> (Vec<LayerId>, Vec<LayerId>) {
        let mut normalized = Vec::with_capacity(self.layers.len());
        let mut unknown = Vec::new();
        for id in order {
            if !self.contains(*id) {
                unknown.push(*id);
            } else if !normalized.contains(id) {
                normalized.push(*id);
            }
        }
        for layer in &self.layers {
            if !normalized.contains(&layer.id) {
                normalized.push(layer.id);
            }
        }
        (normalized, unknown)
    }

    /// Reorders layers bottom to top. Returns ids that were not found.
    pub fn reorder(&mut self, order: &[LayerId]) -> Vec<LayerId> {
        let (normalized, unknown) = self.normalize_order(order);
        let mut remaining = std::mem::take(&mut self.layers);
        for id in normalized {
            if let Some(i) = remaining.iter().position(|l| l.id == id) {
                self.layers.push(remaining.swap_remove(i));
            }
        }
        self.sort_children();
        unknown
    }

    /// Keeps every `children` list in z-order.
    fn sort_children(&mut self) {
        let order = self.order();
        for layer in &mut self.layers {
            layer
                .children
                .sort_by_key(|c| order.iter().position(|id| id == c));
        }
    }

    /// Current z-order as ids.
    pub fn order(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub(crate) fn set_objects(&mut self, id: LayerId, objects: Vec<SerializedObject>) -> bool {
        match self.get_mut(id) {
            Some(layer) => {
                layer.objects = objects;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Geometry;
    use kurbo::Point;

    fn model_with_global() -> (LayerModel, LayerId) {
        let mut model = LayerModel::new();
        let global = Layer::global("Background");
        let id = global.id;
        model.insert_layer(global, 0).unwrap();
        (model, id)
    }

    #[test]
    fn first_global_becomes_active() {
        let (model, g) = model_with_global();
        assert_eq!(model.active().global, Some(g));
        assert_eq!(model.active_global().unwrap().name, "Background");
        assert!(model.active_sectional().is_none());
    }

    #[test]
    fn sectional_requires_global_parent() {
        let (mut model, g) = model_with_global();
        let s = Layer::sectional("Mask", g);
        let s_id = s.id;
        model.insert_layer(s, 1).unwrap();
        assert_eq!(model.get(g).unwrap().children(), &[s_id]);

        let orphan = Layer::sectional("Orphan", LayerId::new());
        assert!(matches!(
            model.insert_layer(orphan, 2),
            Err(OperationError::LayerNotFound(_))
        ));

        let nested = Layer::sectional("Nested", s_id);
        assert!(matches!(
            model.insert_layer(nested, 2),
            Err(OperationError::InvalidState(_))
        ));
    }

    #[test]
    fn activating_sectional_activates_parent() {
        let (mut model, g1) = model_with_global();
        let g2 = Layer::global("Second");
        let g2_id = g2.id;
        model.insert_layer(g2, 1).unwrap();
        let s = Layer::sectional("Mask", g2_id);
        let s_id = s.id;
        model.insert_layer(s, 2).unwrap();

        assert!(model.set_active(s_id));
        assert_eq!(
            model.active(),
            ActiveLayers {
                global: Some(g2_id),
                sectional: Some(s_id)
            }
        );

        // Switching global clears a sectional that belongs elsewhere.
        assert!(model.set_active(g1));
        assert_eq!(model.active().sectional, None);
    }

    #[test]
    fn selecting_missing_layer_is_noop() {
        let (mut model, g) = model_with_global();
        let before = model.active();
        assert!(!model.set_active(LayerId::new()));
        assert_eq!(model.active(), before);
        assert_eq!(model.active().global, Some(g));
    }

    #[test]
    fn removing_global_cascades_and_falls_back() {
        let (mut model, g1) = model_with_global();
        let g2 = Layer::global("Top");
        let g2_id = g2.id;
        model.insert_layer(g2, 1).unwrap();
        let s = Layer::sectional("Mask", g2_id);
        let s_id = s.id;
        model.insert_layer(s, 2).unwrap();
        model.set_active(s_id);

        let removed = model.remove_layer(g2_id).unwrap();
        let ids: Vec<_> = removed.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![g2_id, s_id]);
        assert_eq!(model.len(), 1);
        assert_eq!(
            model.active(),
            ActiveLayers {
                global: Some(g1),
                sectional: None
            }
        );
    }

    #[test]
    fn removing_sectional_detaches_from_parent() {
        let (mut model, g) = model_with_global();
        let s = Layer::sectional("Mask", g);
        let s_id = s.id;
        model.insert_layer(s, 1).unwrap();
        model.remove_layer(s_id).unwrap();
        assert!(model.get(g).unwrap().children().is_empty());
    }

    #[test]
    fn reorder_appends_unmentioned_and_reports_unknown() {
        let (mut model, a) = model_with_global();
        let b = Layer::global("B");
        let c = Layer::global("C");
        let (b_id, c_id) = (b.id, c.id);
        model.insert_layer(b, 1).unwrap();
        model.insert_layer(c, 2).unwrap();

        let stranger = LayerId::new();
        let unknown = model.reorder(&[c_id, stranger, a]);
        assert_eq!(unknown, vec![stranger]);
        assert_eq!(model.order(), vec![c_id, a, b_id]);
    }

    #[test]
    fn restore_active_repairs_mismatched_sectional() {
        let (mut model, g1) = model_with_global();
        let g2 = Layer::global("Other");
        let g2_id = g2.id;
        model.insert_layer(g2, 1).unwrap();
        let s = Layer::sectional("Mask", g2_id);
        let s_id = s.id;
        model.insert_layer(s, 2).unwrap();

        let repairs = model.restore_active(ActiveLayers {
            global: Some(g1),
            sectional: Some(s_id),
        });
        assert_eq!(repairs.len(), 1);
        assert_eq!(model.active().sectional, None);
        assert_eq!(model.active().global, Some(g1));
    }

    #[test]
    fn from_parts_drops_orphan_sectionals() {
        let g = Layer::global("G");
        let g_id = g.id;
        let s = Layer::sectional("S", g_id);
        let lost = Layer::sectional("Lost", LayerId::new());
        let (model, repairs) =
            LayerModel::from_parts(vec![s.clone(), g, lost], ActiveLayers::default());

        assert_eq!(repairs.len(), 1);
        assert_eq!(model.order(), vec![s.id, g_id]);
        assert_eq!(model.get(g_id).unwrap().children(), &[s.id]);
        assert_eq!(model.active().global, Some(g_id));
    }

    #[test]
    fn find_object_and_mask_count() {
        let (mut model, g) = model_with_global();
        let s = Layer::sectional("Mask", g);
        let s_id = s.id;
        let stroke = SerializedObject::mask_stroke(s_id, vec![Point::ZERO], 3.0);
        let text = SerializedObject::text(s_id, "note", Geometry::default());
        let s = s.with_objects(vec![text, stroke.clone()]);
        model.insert_layer(s, 1).unwrap();

        let (layer, index) = model.find_object(stroke.object_id).unwrap();
        assert_eq!((layer.id, index), (s_id, 1));
        assert_eq!(layer.mask_stroke_count(), 1);
    }

    #[test]
    fn update_attributes_returns_previous() {
        let (mut model, g) = model_with_global();
        let mut attributes = model.get(g).unwrap().attributes();
        attributes.name = "Sky".into();
        attributes.visible = false;

        let previous = model.update_attributes(g, attributes).unwrap();
        assert_eq!(previous.name, "Background");
        assert!(previous.visible);
        assert!(!model.get(g).unwrap().visible);
    }
}
