//! Side table mapping live nodes to their owning layer and object.

use std::collections::HashMap;

use super::NodeHandle;
use crate::id::{LayerId, ObjectId};

/// Ownership tag of a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeTag {
    pub layer_id: LayerId,
    pub object_id: ObjectId,
}

/// Two-way index between nodes and [`NodeTag`]s.
///
/// An object id maps to at most one node. Tagging a second node with an
/// object id already in use detaches the first node, which becomes untagged
/// (an orphan) until it is swept.
#[derive(Debug, Default, Clone)]
pub struct SceneIndex {
    tags: HashMap<NodeHandle, NodeTag>,
    objects: HashMap<ObjectId, NodeHandle>,
}

impl SceneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags a node. Returns the node previously holding this object id, if
    /// it was a different node.
    pub fn tag(&mut self, node: NodeHandle, tag: NodeTag) -> Option<NodeHandle> {
        if let Some(old) = self.tags.insert(node, tag)
            && old.object_id != tag.object_id
        {
            self.objects.remove(&old.object_id);
        }
        let displaced = self
            .objects
            .insert(tag.object_id, node)
            .filter(|n| *n != node);
        if let Some(displaced) = displaced {
            self.tags.remove(&displaced);
        }
        displaced
    }

    pub fn untag(&mut self, node: NodeHandle) -> Option<NodeTag> {
        let tag = self.tags.remove(&node)?;
        self.objects.remove(&tag.object_id);
        Some(tag)
    }

    /// Moves a node to another layer, keeping its object id.
    pub fn retag_layer(&mut self, node: NodeHandle, layer_id: LayerId) -> bool {
        match self.tags.get_mut(&node) {
            Some(tag) => {
                tag.layer_id = layer_id;
                true
            }
            None => false,
        }
    }

    pub fn tag_of(&self, node: NodeHandle) -> Option<NodeTag> {
        self.tags.get(&node).copied()
    }

    pub fn node_of(&self, object_id: ObjectId) -> Option<NodeHandle> {
        self.objects.get(&object_id).copied()
    }

    pub fn contains_object(&self, object_id: ObjectId) -> bool {
        self.objects.contains_key(&object_id)
    }

    /// Nodes of `layer_id`, in the order they appear in `order`.
    pub fn layer_nodes(&self, order: &[NodeHandle], layer_id: LayerId) -> Vec<NodeHandle> {
        order
            .iter()
            .copied()
            .filter(|n| self.tags.get(n).is_some_and(|t| t.layer_id == layer_id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, NodeTag)> + '_ {
        self.tags.iter().map(|(n, t)| (*n, *t))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(layer_id: LayerId) -> NodeTag {
        NodeTag {
            layer_id,
            object_id: ObjectId::new(),
        }
    }

    #[test]
    fn tag_and_lookup_both_ways() {
        let mut index = SceneIndex::new();
        let layer = LayerId::new();
        let t = tag(layer);
        let node = NodeHandle::new(1, 0);

        assert_eq!(index.tag(node, t), None);
        assert_eq!(index.tag_of(node), Some(t));
        assert_eq!(index.node_of(t.object_id), Some(node));

        assert_eq!(index.untag(node), Some(t));
        assert!(index.is_empty());
        assert!(!index.contains_object(t.object_id));
    }

    #[test]
    fn duplicate_object_id_displaces_old_node() {
        let mut index = SceneIndex::new();
        let t = tag(LayerId::new());
        let first = NodeHandle::new(1, 0);
        let second = NodeHandle::new(2, 0);

        index.tag(first, t);
        assert_eq!(index.tag(second, t), Some(first));
        assert_eq!(index.tag_of(first), None);
        assert_eq!(index.node_of(t.object_id), Some(second));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn layer_nodes_follow_given_order() {
        let mut index = SceneIndex::new();
        let (a, b) = (LayerId::new(), LayerId::new());
        let nodes: Vec<_> = (0..4).map(|i| NodeHandle::new(i, 0)).collect();
        index.tag(nodes[0], tag(a));
        index.tag(nodes[1], tag(b));
        index.tag(nodes[2], tag(a));

        let order = vec![nodes[2], nodes[3], nodes[1], nodes[0]];
        assert_eq!(index.layer_nodes(&order, a), vec![nodes[2], nodes[0]]);
    }

    #[test]
    fn retag_moves_layer() {
        let mut index = SceneIndex::new();
        let (a, b) = (LayerId::new(), LayerId::new());
        let node = NodeHandle::new(0, 3);
        index.tag(node, tag(a));
        assert!(index.retag_layer(node, b));
        assert_eq!(index.tag_of(node).unwrap().layer_id, b);
        assert!(!index.retag_layer(NodeHandle::new(9, 0), b));
    }
}
