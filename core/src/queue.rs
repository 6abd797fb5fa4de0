//! Command queue for producers that cannot borrow the engine mutably.
//!
//! [`CommandQueue`] only needs `&self` to push, so UI callbacks, background
//! tasks and other shared holders can submit work. The engine owner drains
//! it with [`LayerEngine::drain`](crate::engine::LayerEngine::drain), which
//! runs commands one at a time in submission order.

use std::collections::VecDeque;
use std::fmt;

use kurbo::Point;
use parking_lot::Mutex;

use crate::id::LayerId;
use crate::operation::Operation;

/// A unit of work for the engine.
#[derive(Debug, Clone)]
pub enum Command {
    Execute(Operation),
    Undo,
    Redo,
    StartTransaction(String),
    Stage(Operation),
    Commit,
    Rollback,
    ToggleVisibility(LayerId),
    DeleteLayer(LayerId),
    SetActiveLayer(LayerId),
    ReorderLayers(Vec<LayerId>),
    DrawMaskStroke { points: Vec<Point>, width: f64 },
}

/// FIFO of pending [`Command`]s.
#[derive(Default)]
pub struct CommandQueue {
    queue: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a command.
    pub fn push(&self, command: Command) {
        self.queue.lock().push_back(command);
    }

    /// Takes all queued commands, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.len())
            .finish()
    }
}
