//! Headless in-memory scene graph.

use super::{NodeHandle, SceneError, SceneGraph};
use crate::config::CanvasConfig;
use crate::image::DecodedImage;
use crate::object::{Geometry, ObjectContent, Payload, ShapeKind, Style};

#[derive(Debug)]
struct Slot {
    generation: u32,
    content: Option<ObjectContent>,
}

/// Arena-backed [`SceneGraph`] that keeps node content in memory.
///
/// Freed slots are reused with a bumped generation. The background is a
/// canvas-sized rectangle in slot 0.
#[derive(Debug)]
pub struct MemoryScene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<NodeHandle>,
    background: NodeHandle,
}

impl MemoryScene {
    pub fn new(canvas: &CanvasConfig) -> Self {
        let mut background = ObjectContent::new(
            Geometry::new(0.0, 0.0, canvas.width as f64, canvas.height as f64),
            Payload::Shape {
                shape: ShapeKind::Rectangle,
                corner_radius: 0.0,
            },
        );
        background.style = Style {
            fill: Some(canvas.background_color.clone()),
            ..Style::default()
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                content: Some(background),
            }],
            free: Vec::new(),
            order: Vec::new(),
            background: NodeHandle::new(0, 0),
        }
    }

    /// Number of live nodes, background excluded.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn slot(&self, node: NodeHandle) -> Option<&ObjectContent> {
        self.slots
            .get(node.index() as usize)
            .filter(|s| s.generation == node.generation())
            .and_then(|s| s.content.as_ref())
    }

    fn slot_mut(&mut self, node: NodeHandle) -> Result<&mut ObjectContent, SceneError> {
        self.slots
            .get_mut(node.index() as usize)
            .filter(|s| s.generation == node.generation())
            .and_then(|s| s.content.as_mut())
            .ok_or(SceneError::NodeNotFound(node))
    }

    fn allocate(&mut self, content: ObjectContent) -> NodeHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.content = Some(content);
            NodeHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                content: Some(content),
            });
            NodeHandle::new(index, 0)
        }
    }
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new(&CanvasConfig::default())
    }
}

impl SceneGraph for MemoryScene {
    fn background(&self) -> Option<NodeHandle> {
        Some(self.background)
    }

    fn create_node(
        &mut self,
        content: &ObjectContent,
        image: Option<&DecodedImage>,
        position: usize,
    ) -> Result<NodeHandle, SceneError> {
        let mut content = content.clone();
        // Images without an explicit size take their natural size.
        let unsized_image = matches!(content.payload, Payload::Image { .. })
            && content.geometry.width == 0.0
            && content.geometry.height == 0.0;
        if unsized_image && let Some(image) = image {
            content.geometry.width = image.width as f64;
            content.geometry.height = image.height as f64;
        }
        let node = self.allocate(content);
        let position = position.min(self.order.len());
        self.order.insert(position, node);
        Ok(node)
    }

    fn update_node(&mut self, node: NodeHandle, content: &ObjectContent) -> Result<(), SceneError> {
        if node == self.background {
            return Err(SceneError::BackgroundPinned);
        }
        *self.slot_mut(node)? = content.clone();
        Ok(())
    }

    fn read_node(&self, node: NodeHandle) -> Option<ObjectContent> {
        self.slot(node).cloned()
    }

    fn remove_node(&mut self, node: NodeHandle) -> Result<(), SceneError> {
        if node == self.background {
            return Err(SceneError::BackgroundPinned);
        }
        self.slot_mut(node)?;
        self.slots[node.index() as usize].content = None;
        self.free.push(node.index());
        self.order.retain(|n| *n != node);
        Ok(())
    }

    fn set_node_visible(&mut self, node: NodeHandle, visible: bool) -> Result<(), SceneError> {
        self.slot_mut(node)?.visible = visible;
        Ok(())
    }

    fn contains(&self, node: NodeHandle) -> bool {
        self.slot(node).is_some()
    }

    fn node_order(&self) -> Vec<NodeHandle> {
        self.order.clone()
    }

    fn set_node_order(&mut self, order: &[NodeHandle]) -> Result<(), SceneError> {
        if order.contains(&self.background) {
            return Err(SceneError::BackgroundPinned);
        }
        let mut requested = order.to_vec();
        let mut current = self.order.clone();
        requested.sort();
        current.sort();
        if requested != current {
            return Err(SceneError::InvalidOrder(format!(
                "expected {} nodes, got {}",
                self.order.len(),
                order.len()
            )));
        }
        self.order = order.to_vec();
        Ok(())
    }

    fn set_canvas(&mut self, canvas: &CanvasConfig) {
        if let Some(content) = self.slots[0].content.as_mut() {
            content.geometry.width = canvas.width as f64;
            content.geometry.height = canvas.height as f64;
            content.style.fill = Some(canvas.background_color.clone());
        }
    }

    fn clear(&mut self) {
        for node in std::mem::take(&mut self.order) {
            self.slots[node.index() as usize].content = None;
            self.free.push(node.index());
        }
    }
}
