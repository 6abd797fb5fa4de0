//! Scene graph adapter.
//!
//! The live scene graph belongs to a rendering library the engine does not
//! know about. [`SceneGraph`] is the thin codec the engine talks to: it
//! mounts an [`ObjectContent`] as a node, reads a node back, and orders
//! nodes. It carries no business logic and no layer knowledge; ownership of
//! nodes by layers lives in the engine's [`SceneIndex`].
//!
//! [`MemoryScene`] is a headless implementation used by tests and the CLI.

mod index;
mod memory;

pub use index::{NodeTag, SceneIndex};
pub use memory::MemoryScene;

use std::fmt;

use crate::config::CanvasConfig;
use crate::image::DecodedImage;
use crate::object::ObjectContent;

/// Handle to a live node.
///
/// Slots are recycled; the generation distinguishes a node from a later node
/// that reused its slot, so a stale handle never resolves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors reported by a scene graph adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeHandle),
    /// The background node cannot be removed or restacked.
    #[error("the background node is pinned")]
    BackgroundPinned,
    /// A requested stacking order was not a permutation of the live nodes.
    #[error("invalid node order: {0}")]
    InvalidOrder(String),
    /// The adapter refused the content.
    #[error("scene rejected node: {0}")]
    Rejected(String),
}

/// Bidirectional codec between serialized objects and live scene nodes.
///
/// Node order is bottom to top and never includes the background node, which
/// is pinned below everything else.
pub trait SceneGraph {
    /// The pinned background node, if the scene has one.
    fn background(&self) -> Option<NodeHandle>;

    /// Mounts a node at `position` in the stacking order (clamped to the top).
    ///
    /// For image content, `image` carries the decoded size when available.
    fn create_node(
        &mut self,
        content: &ObjectContent,
        image: Option<&DecodedImage>,
        position: usize,
    ) -> Result<NodeHandle, SceneError>;

    /// Replaces the content of a live node.
    fn update_node(&mut self, node: NodeHandle, content: &ObjectContent) -> Result<(), SceneError>;

    /// Reads a live node back into its serialized content.
    fn read_node(&self, node: NodeHandle) -> Option<ObjectContent>;

    fn remove_node(&mut self, node: NodeHandle) -> Result<(), SceneError>;

    fn set_node_visible(&mut self, node: NodeHandle, visible: bool) -> Result<(), SceneError>;

    fn contains(&self, node: NodeHandle) -> bool;

    /// Live nodes bottom to top, background excluded.
    fn node_order(&self) -> Vec<NodeHandle>;

    /// Restacks the live nodes. `order` must be a permutation of
    /// [`node_order`](Self::node_order).
    fn set_node_order(&mut self, order: &[NodeHandle]) -> Result<(), SceneError>;

    /// Resizes and repaints the background for a canvas configuration.
    fn set_canvas(&mut self, canvas: &CanvasConfig);

    /// Removes every node except the background.
    fn clear(&mut self);
}
