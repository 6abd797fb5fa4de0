//! Edit scripts: a JSON list of steps replayed against an engine.
//!
//! ```json
//! { "steps": [
//!     { "op": "addLayer", "name": "Sky", "label": "sky" },
//!     { "op": "addObjects", "layer": "sky", "objects": [
//!         { "label": "sun",
//!           "geometry": { "x": 10, "y": 10, "width": 40, "height": 40 },
//!           "payload": { "type": "shape", "shape": "ellipse" } } ] },
//!     { "op": "drawMask", "points": [[0, 0], [20, 20]], "width": 8 },
//!     { "op": "undo" }
//! ] }
//! ```
//!
//! Layers and objects are referred to by the `label` given when they were
//! created, or by their id. Steps that cannot be resolved are skipped and
//! reported; they never abort the script.

use std::collections::HashMap;
use std::path::Path;

use kurbo::Point;
use serde::Deserialize;
use serde_json::Value;

use stratum_core::engine::LayerEngine;
use stratum_core::id::{LayerId, ObjectId};
use stratum_core::image::ImageRef;
use stratum_core::layer::{Layer, LayerKind};
use stratum_core::object::decode_objects;
use stratum_core::scene::SceneGraph;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    AddLayer {
        name: String,
        #[serde(default = "global_kind")]
        kind: LayerKind,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        label: Option<String>,
    },
    DeleteLayer {
        layer: String,
    },
    SelectLayer {
        layer: String,
    },
    ToggleVisibility {
        layer: String,
    },
    RenameLayer {
        layer: String,
        name: String,
    },
    SetPrompt {
        layer: String,
        text: String,
    },
    AddReferenceImage {
        layer: String,
        src: String,
    },
    Reorder {
        order: Vec<String>,
    },
    AddObjects {
        layer: String,
        objects: Vec<Value>,
    },
    RemoveObject {
        object: String,
    },
    MoveObject {
        object: String,
        layer: String,
    },
    DrawMask {
        points: Vec<[f64; 2]>,
        #[serde(default = "default_brush")]
        width: f64,
        #[serde(default)]
        label: Option<String>,
    },
    Begin {
        name: String,
    },
    Commit,
    Rollback,
    Undo,
    Redo,
}

fn global_kind() -> LayerKind {
    LayerKind::Global
}

fn default_brush() -> f64 {
    16.0
}

impl Script {
    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// What happened while running a script.
#[derive(Debug, Default)]
pub struct ScriptReport {
    pub steps_run: usize,
    /// One message per skipped step or object.
    pub skipped: Vec<String>,
}

/// Runs scripts, remembering labels across steps.
#[derive(Debug, Default)]
pub struct ScriptRunner {
    layers: HashMap<String, LayerId>,
    objects: HashMap<String, ObjectId>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, reference: &str) -> Option<LayerId> {
        self.layers
            .get(reference)
            .copied()
            .or_else(|| reference.parse().ok())
    }

    pub fn object(&self, reference: &str) -> Option<ObjectId> {
        self.objects
            .get(reference)
            .copied()
            .or_else(|| reference.parse().ok())
    }

    pub async fn run<S: SceneGraph>(
        &mut self,
        engine: &mut LayerEngine<S>,
        script: &Script,
    ) -> ScriptReport {
        let mut report = ScriptReport::default();
        if let Some(name) = &script.name {
            log::info!("Running script '{name}' ({} steps)", script.steps.len());
        }
        for (i, step) in script.steps.iter().enumerate() {
            if let Err(reason) = self.step(engine, step, &mut report).await {
                log::warn!("Step {i} skipped: {reason}");
                report.skipped.push(format!("step {i}: {reason}"));
            } else {
                report.steps_run += 1;
            }
        }
        report
    }

    async fn step<S: SceneGraph>(
        &mut self,
        engine: &mut LayerEngine<S>,
        step: &Step,
        report: &mut ScriptReport,
    ) -> Result<(), String> {
        match step {
            Step::AddLayer {
                name,
                kind,
                parent,
                label,
            } => {
                let layer = match kind {
                    LayerKind::Global => Layer::global(name.clone()),
                    LayerKind::Sectional => {
                        let parent = match parent {
                            Some(parent) => self.resolve_layer(parent)?,
                            None => engine
                                .active_global_layer()
                                .map(|l| l.id)
                                .ok_or("sectional layer needs a parent")?,
                        };
                        Layer::sectional(name.clone(), parent)
                    }
                };
                let id = engine
                    .add_layer(layer)
                    .await
                    .ok_or_else(|| format!("layer '{name}' was not added"))?;
                self.remember_layer(label.as_deref(), name, id);
            }
            Step::DeleteLayer { layer } => {
                let id = self.resolve_layer(layer)?;
                engine.delete_layer(id).await;
            }
            Step::SelectLayer { layer } => {
                let id = self.resolve_layer(layer)?;
                engine.set_active_layer(id).await;
            }
            Step::ToggleVisibility { layer } => {
                let id = self.resolve_layer(layer)?;
                engine.toggle_visibility(id).await;
            }
            Step::RenameLayer { layer, name } => {
                let id = self.resolve_layer(layer)?;
                let name = name.clone();
                engine.update_layer(id, |a| a.name = name).await;
            }
            Step::SetPrompt { layer, text } => {
                let id = self.resolve_layer(layer)?;
                let text = text.clone();
                engine.update_layer(id, |a| a.prompt_text = text).await;
            }
            Step::AddReferenceImage { layer, src } => {
                let id = self.resolve_layer(layer)?;
                let image = ImageRef::new(src.as_str());
                engine
                    .update_layer(id, |a| a.reference_images.push(image))
                    .await;
            }
            Step::Reorder { order } => {
                let ids = order
                    .iter()
                    .map(|r| self.resolve_layer(r))
                    .collect::<Result<Vec<_>, _>>()?;
                engine.reorder_layers(&ids).await;
            }
            Step::AddObjects { layer, objects } => {
                let id = self.resolve_layer(layer)?;
                self.add_objects(engine, id, objects, report).await;
            }
            Step::RemoveObject { object } => {
                let id = self.resolve_object(object)?;
                engine.remove_object(id).await;
            }
            Step::MoveObject { object, layer } => {
                let object = self.resolve_object(object)?;
                let layer = self.resolve_layer(layer)?;
                engine.move_object(object, layer).await;
            }
            Step::DrawMask {
                points,
                width,
                label,
            } => {
                let points = points.iter().map(|[x, y]| Point::new(*x, *y)).collect();
                let id = engine
                    .draw_mask_stroke(points, *width)
                    .await
                    .ok_or("mask stroke was not drawn")?;
                if let Some(label) = label {
                    self.objects.insert(label.clone(), id);
                }
            }
            Step::Begin { name } => {
                engine
                    .start_transaction(name.clone())
                    .ok_or("a transaction is already open")?;
            }
            Step::Commit => engine.commit_transaction().await,
            Step::Rollback => engine.rollback_transaction().await,
            Step::Undo => engine.undo().await,
            Step::Redo => engine.redo().await,
        }
        Ok(())
    }

    /// Adds objects given as JSON, filling in the owning layer and a fresh
    /// object id where missing. Malformed entries are skipped.
    async fn add_objects<S: SceneGraph>(
        &mut self,
        engine: &mut LayerEngine<S>,
        layer: LayerId,
        values: &[Value],
        report: &mut ScriptReport,
    ) {
        let mut labels = HashMap::new();
        let prepared: Vec<Value> = values
            .iter()
            .cloned()
            .map(|mut value| {
                if let Value::Object(map) = &mut value {
                    map.insert("layerId".into(), Value::String(layer.to_string()));
                    let id = map
                        .entry("objectId")
                        .or_insert_with(|| Value::String(ObjectId::new().to_string()))
                        .clone();
                    if let (Some(label), Some(id)) = (
                        map.get("label").and_then(Value::as_str),
                        id.as_str().and_then(|s| s.parse::<ObjectId>().ok()),
                    ) {
                        labels.insert(id, label.to_owned());
                    }
                }
                value
            })
            .collect();

        let (objects, errors) = decode_objects(prepared);
        for error in errors {
            log::warn!("Skipping object: {error}");
            report.skipped.push(error.to_string());
        }
        for object in objects {
            if let Some(label) = labels.remove(&object.object_id) {
                self.objects.insert(label, object.object_id);
            }
            engine.add_object(object).await;
        }
    }

    fn remember_layer(&mut self, label: Option<&str>, name: &str, id: LayerId) {
        self.layers.insert(label.unwrap_or(name).to_owned(), id);
    }

    fn resolve_layer(&self, reference: &str) -> Result<LayerId, String> {
        self.layer(reference)
            .ok_or_else(|| format!("unknown layer '{reference}'"))
    }

    fn resolve_object(&self, reference: &str) -> Result<ObjectId, String> {
        self.object(reference)
            .ok_or_else(|| format!("unknown object '{reference}'"))
    }
}
