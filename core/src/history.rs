//! Bounded, linear undo/redo history.
//!
//! [`OperationHistory`] keeps applied operations in `past` and undone ones in
//! `future`. Recording a new operation clears `future`, so history never
//! branches. `past` is capped; the oldest entry is evicted when it overflows.
//!
//! The history only stores operations. Applying their effects is the
//! engine's job: [`undo`](OperationHistory::undo) moves an entry to `future`
//! and hands it back for the caller to apply backward.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;

/// Default maximum number of undo steps.
pub const DEFAULT_MAX_HISTORY: usize = 20;

pub struct OperationHistory {
    past: VecDeque<Arc<Operation>>,
    future: Vec<Arc<Operation>>,
    max_depth: usize,
    /// Distance from the saved state.
    ///
    /// - `Some(0)`: the current state matches the last save.
    /// - `Some(n)`, `n > 0`: `n` undos reach the saved state.
    /// - `Some(n)`, `n < 0`: `|n|` redos reach the saved state.
    /// - `None`: the save point is unreachable (evicted, or its redo branch
    ///   was discarded).
    save_distance: Option<i64>,
}

impl OperationHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            max_depth: max_depth.max(1),
            save_distance: Some(0),
        }
    }

    /// Records an applied operation. Clears the redo stack.
    pub fn record(&mut self, op: Operation) {
        self.future.clear();
        if let Some(d) = self.save_distance
            && d < 0
        {
            self.save_distance = None;
        }
        if let Some(d) = &mut self.save_distance {
            *d += 1;
        }
        self.push_past(Arc::new(op));
    }

    /// Moves the most recent operation to the redo stack and returns it.
    pub fn undo(&mut self) -> Option<Arc<Operation>> {
        let op = self.past.pop_back()?;
        self.future.push(op.clone());
        if let Some(d) = &mut self.save_distance {
            *d -= 1;
        }
        Some(op)
    }

    /// Moves the most recently undone operation back to `past` and returns it.
    pub fn redo(&mut self) -> Option<Arc<Operation>> {
        let op = self.future.pop()?;
        if let Some(d) = &mut self.save_distance {
            *d += 1;
        }
        self.push_past(op.clone());
        Some(op)
    }

    fn push_past(&mut self, op: Arc<Operation>) {
        self.past.push_back(op);
        if self.past.len() > self.max_depth {
            self.past.pop_front();
            if let Some(d) = self.save_distance
                && d > self.past.len() as i64
            {
                self.save_distance = None;
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Undo descriptions, most recent first.
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.past.iter().rev().map(|op| op.description.as_str())
    }

    /// Redo descriptions, most recent first.
    pub fn redo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.future.iter().rev().map(|op| op.description.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Records the current state as saved.
    pub fn mark_saved(&mut self) {
        self.save_distance = Some(0);
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.save_distance != Some(0)
    }

    /// Drops both stacks. The save point survives only if it is the current state.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        if self.save_distance != Some(0) {
            self.save_distance = None;
        }
    }
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl fmt::Debug for OperationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHistory")
            .field("undo_count", &self.past.len())
            .field("redo_count", &self.future.len())
            .field("max_depth", &self.max_depth)
            .field("save_distance", &self.save_distance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ActiveLayers;
    use crate::operation::{OperationData, OperationKind};

    fn op(name: &str) -> Operation {
        Operation::new(
            OperationKind::SetActiveLayer,
            OperationData::SetActive(ActiveLayers::default()),
            OperationData::SetActive(ActiveLayers::default()),
            None,
        )
        .with_description(name)
    }

    #[test]
    fn undo_redo_moves_between_stacks() {
        let mut history = OperationHistory::default();
        history.record(op("a"));
        history.record(op("b"));

        assert_eq!(history.undo().unwrap().description, "b");
        assert!(history.can_redo());
        assert_eq!(history.redo().unwrap().description, "b");
        assert!(!history.can_redo());
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn recording_discards_future() {
        let mut history = OperationHistory::default();
        history.record(op("a"));
        history.record(op("b"));
        history.undo();
        history.record(op("c"));

        assert!(history.redo().is_none());
        let descriptions: Vec<_> = history.undo_descriptions().collect();
        assert_eq!(descriptions, vec!["c", "a"]);
    }

    #[test]
    fn depth_is_bounded() {
        let mut history = OperationHistory::new(3);
        for i in 0..10 {
            history.record(op(&i.to_string()));
            assert!(history.undo_count() <= 3);
        }
        let descriptions: Vec<_> = history.undo_descriptions().collect();
        assert_eq!(descriptions, vec!["9", "8", "7"]);
    }

    #[test]
    fn empty_history_is_noop() {
        let mut history = OperationHistory::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn save_point_tracking() {
        let mut history = OperationHistory::default();
        history.record(op("a"));
        assert!(history.has_unsaved_changes());
        history.mark_saved();
        assert!(!history.has_unsaved_changes());

        history.record(op("b"));
        assert!(history.has_unsaved_changes());
        history.undo();
        assert!(!history.has_unsaved_changes());
        history.undo();
        assert!(history.has_unsaved_changes());
        history.redo();
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn discarded_redo_branch_loses_save_point() {
        let mut history = OperationHistory::default();
        history.record(op("a"));
        history.mark_saved();
        history.undo();
        history.record(op("b"));
        history.undo();
        assert!(history.has_unsaved_changes());
    }

    #[test]
    fn eviction_loses_save_point() {
        let mut history = OperationHistory::new(2);
        history.mark_saved();
        for name in ["a", "b", "c"] {
            history.record(op(name));
        }
        history.undo();
        history.undo();
        assert!(history.has_unsaved_changes());
    }

    #[test]
    fn clear_keeps_current_save_point() {
        let mut history = OperationHistory::default();
        history.record(op("a"));
        history.mark_saved();
        history.clear();
        assert!(!history.has_unsaved_changes());
        assert!(!history.can_undo());
    }
}
