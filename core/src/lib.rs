//! # Stratum Core
//!
//! Layer model, reversible operation log and scene synchronization for a
//! layered canvas editor.
//!
//! The [`LayerEngine`] is the entry point. It owns a [`LayerModel`] of
//! Global and Sectional layers, a [`SceneGraph`] supplied by the host, and
//! the [`OperationHistory`]. Every user-visible change enters as an
//! [`Operation`] carrying both its forward and backward effect, so any
//! sequence of edits can be undone and redone.
//!
//! ```ignore
//! let mut engine = LayerEngine::new(MemoryScene::default(), &EngineConfig::default());
//! let base = engine.add_layer(Layer::global("Base")).await.unwrap();
//! engine.draw_mask_stroke(vec![Point::new(0.0, 0.0), Point::new(8.0, 8.0)], 4.0).await;
//! engine.undo().await; // removes the stroke and its mask layer
//! ```

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod history;
pub mod id;
pub mod image;
pub mod layer;
pub mod object;
pub mod operation;
pub mod queue;
pub mod scene;
pub mod snapshot;
pub mod transaction;

pub use config::{CanvasConfig, EngineConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use engine::{EngineChange, EngineEvent, LayerEngine};
pub use error::{OperationError, OperationResult};
pub use history::OperationHistory;
pub use id::{LayerId, ObjectId, OperationId, TransactionId};
pub use crate::image::{DataUrlDecoder, ImageDecoder, ImageRef};
pub use layer::{ActiveLayers, Layer, LayerKind, LayerModel};
pub use object::SerializedObject;
pub use operation::{Operation, OperationData, OperationKind};
pub use queue::{Command, CommandQueue};
pub use scene::{MemoryScene, NodeHandle, SceneGraph};
pub use snapshot::{SNAPSHOT_VERSION, Snapshot, SnapshotError};
pub use transaction::Transaction;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
