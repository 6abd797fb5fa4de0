//! Reversible operations.
//!
//! An [`Operation`] records one edit as a pair of effects: `forward` applies
//! it and `backward` reverts it. Effects are plain data ([`OperationData`]);
//! the engine interprets them against the layer model and the scene graph.
//! Applying `forward` then `backward` (or the reverse) leaves both in an
//! observably identical state.
//!
//! Use the constructors in [`build`] to derive both effects from the current
//! model instead of assembling them by hand.

pub mod build;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::{LayerId, ObjectId, OperationId, TransactionId};
use crate::layer::{ActiveLayers, Layer, LayerAttributes};
use crate::object::SerializedObject;
use crate::transaction::Transaction;

/// What an operation does, for history display and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    AddLayer,
    RemoveLayer,
    SetActiveLayer,
    UpdateLayer,
    ReorderLayers,
    AddObject,
    RemoveObject,
    ModifyObject,
    MoveObject,
    Transaction,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddLayer => "Add layer",
            Self::RemoveLayer => "Remove layer",
            Self::SetActiveLayer => "Select layer",
            Self::UpdateLayer => "Edit layer",
            Self::ReorderLayers => "Reorder layers",
            Self::AddObject => "Add object",
            Self::RemoveObject => "Remove object",
            Self::ModifyObject => "Modify object",
            Self::MoveObject => "Move object",
            Self::Transaction => "Transaction",
        };
        f.write_str(name)
    }
}

/// A layer together with the z-order position it occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub layer: Layer,
    pub index: usize,
}

/// An object together with its position inside its layer.
///
/// `None` places the object on top of its layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedObject {
    pub object: SerializedObject,
    pub index_in_layer: Option<usize>,
}

/// One effect on the layer model and scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum OperationData {
    /// Inserts layers (ascending z-order) and mounts their objects, then
    /// selects `active`.
    #[serde(rename_all = "camelCase")]
    InsertLayers {
        layers: Vec<LayerEntry>,
        active: ActiveLayers,
    },
    /// Removes layers (cascading to children) and unmounts their nodes, then
    /// selects `active`.
    #[serde(rename_all = "camelCase")]
    RemoveLayers {
        layer_ids: Vec<LayerId>,
        active: ActiveLayers,
    },
    SetActive(ActiveLayers),
    #[serde(rename_all = "camelCase")]
    UpdateLayer {
        layer_id: LayerId,
        attributes: LayerAttributes,
    },
    /// Full bottom-to-top layer order.
    ReorderLayers(Vec<LayerId>),
    InsertObjects(Vec<PlacedObject>),
    RemoveObjects(Vec<ObjectId>),
    /// Replaces node content; each object keeps its layer.
    UpdateObjects(Vec<SerializedObject>),
    #[serde(rename_all = "camelCase")]
    MoveObject {
        object_id: ObjectId,
        layer_id: LayerId,
        index_in_layer: Option<usize>,
    },
    /// A group of operations. Forward applies them in order, backward
    /// reverts them in reverse order.
    Transaction(Arc<Transaction>),
}

/// Which side of an operation to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A reversible edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub description: String,
    pub forward: OperationData,
    pub backward: OperationData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<TransactionId>,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        forward: OperationData,
        backward: OperationData,
        batch_id: Option<TransactionId>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            timestamp: now_millis(),
            description: kind.to_string(),
            forward,
            backward,
            batch_id,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn data(&self, direction: Direction) -> &OperationData {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    /// Flattens the operation into primitive effects in application order.
    ///
    /// Nested transactions are expanded; going backward, the steps of a
    /// transaction come out last-to-first, each with its backward effect.
    pub fn steps(&self, direction: Direction) -> Vec<&OperationData> {
        let mut steps = Vec::new();
        let mut stack = vec![self];
        while let Some(op) = stack.pop() {
            match op.data(direction) {
                OperationData::Transaction(txn) => match direction {
                    Direction::Forward => stack.extend(txn.operations.iter().rev()),
                    Direction::Backward => stack.extend(txn.operations.iter()),
                },
                data => steps.push(data),
            }
        }
        steps
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(global: LayerId) -> Operation {
        Operation::new(
            OperationKind::SetActiveLayer,
            OperationData::SetActive(ActiveLayers {
                global: Some(global),
                sectional: None,
            }),
            OperationData::SetActive(ActiveLayers::default()),
            None,
        )
    }

    fn global_of(data: &OperationData) -> Option<LayerId> {
        match data {
            OperationData::SetActive(active) => active.global,
            _ => None,
        }
    }

    #[test]
    fn new_operation_defaults() {
        let op = select(LayerId::new());
        assert_eq!(op.description, "Select layer");
        assert!(op.timestamp > 0);
        assert!(op.batch_id.is_none());
    }

    #[test]
    fn steps_expand_nested_transactions() {
        let ids: Vec<_> = (0..3).map(|_| LayerId::new()).collect();
        let inner = Transaction::new("inner", vec![select(ids[1]), select(ids[2])]);
        let outer = Transaction::new("outer", vec![select(ids[0]), inner.into_operation()]);
        let op = outer.into_operation();

        let forward: Vec<_> = op
            .steps(Direction::Forward)
            .into_iter()
            .map(global_of)
            .collect();
        assert_eq!(forward, vec![Some(ids[0]), Some(ids[1]), Some(ids[2])]);

        // Backward effects are all "clear", but there must be three of them.
        assert_eq!(op.steps(Direction::Backward).len(), 3);
    }

    #[test]
    fn backward_steps_reverse_order() {
        let a = LayerId::new();
        let b = LayerId::new();
        let mut first = select(a);
        first.backward = first.forward.clone();
        let mut second = select(b);
        second.backward = second.forward.clone();
        let op = Transaction::new("pair", vec![first, second]).into_operation();

        let backward: Vec<_> = op
            .steps(Direction::Backward)
            .into_iter()
            .map(global_of)
            .collect();
        assert_eq!(backward, vec![Some(b), Some(a)]);
    }

    #[test]
    fn serde_shape() {
        let op = select(LayerId::new());
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["kind"], "SetActiveLayer");
        assert_eq!(value["forward"]["type"], "setActive");
        let back: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }
}
