//! Versioned snapshot of the layer model for local persistence.
//!
//! A snapshot is a flat, JSON-friendly projection of the model: canvas
//! configuration plus one summary record per layer (primary image, bounding
//! geometry, visibility, z-order). Records also carry the layer's full
//! object list and hierarchy so a restore is lossless; readers that only
//! understand the summary fields can ignore them.
//!
//! ```json
//! { "version": 1, "lastModified": 1700000000000,
//!   "canvas": { "width": 1024, "height": 1024, "backgroundColor": "#ffffff" },
//!   "layers": [ { "id": "…", "name": "Sky", "type": "global", "src": "data:…",
//!                 "x": 0, "y": 0, "width": 512, "height": 512, "rotation": 0,
//!                 "visible": true, "zIndex": 0 } ] }
//! ```
//!
//! Snapshots have no undo semantics.

use std::collections::HashSet;

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::id::{LayerId, ObjectId};
use crate::image::ImageRef;
use crate::layer::{ActiveLayers, Layer, LayerKind, LayerModel};
use crate::object::{Geometry, SerializedObject};
use crate::operation::now_millis;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no version tag")]
    MissingVersion,
    #[error("unsupported snapshot version {0} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion(u64),
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// Summary record of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLayer {
    pub id: LayerId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    /// Primary image of the layer, if it has one.
    pub src: Option<ImageRef>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub visible: bool,
    pub z_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<LayerId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<ImageRef>,
    /// Full object list. Absent in summary-only snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<SerializedObject>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub canvas: CanvasConfig,
    pub layers: Vec<SnapshotLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveLayers>,
}

/// Projects a model into a snapshot. Pure apart from the timestamp.
pub fn create_snapshot(model: &LayerModel, canvas: &CanvasConfig) -> Snapshot {
    let layers = model
        .layers()
        .iter()
        .enumerate()
        .map(|(z_index, layer)| summarize(layer, z_index))
        .collect();
    Snapshot {
        version: SNAPSHOT_VERSION,
        last_modified: now_millis(),
        canvas: canvas.clone(),
        layers,
        active: Some(model.active()),
    }
}

fn summarize(layer: &Layer, z_index: usize) -> SnapshotLayer {
    let image = layer.objects().iter().find(|o| o.image_src().is_some());
    let src = image
        .and_then(|o| o.image_src().cloned())
        .or_else(|| layer.background_image.clone());

    let (x, y, width, height, rotation) = match image {
        Some(object) => {
            let g = &object.content.geometry;
            let (width, height) = g.scaled_size();
            (g.x, g.y, width, height, g.rotation)
        }
        None => {
            let bounds = layer
                .objects()
                .iter()
                .map(SerializedObject::bounds)
                .reduce(|a, b| a.union(b))
                .unwrap_or(Rect::ZERO);
            (bounds.x0, bounds.y0, bounds.width(), bounds.height(), 0.0)
        }
    };

    SnapshotLayer {
        id: layer.id,
        name: layer.name.clone(),
        kind: layer.kind,
        src,
        x,
        y,
        width,
        height,
        rotation,
        visible: layer.visible,
        z_index,
        parent_id: layer.parent_id,
        prompt_text: layer.prompt_text.clone(),
        reference_images: layer.reference_images.clone(),
        background_image: layer.background_image.clone(),
        objects: Some(layer.objects().to_vec()),
    }
}

impl Snapshot {
    /// Parses and validates a snapshot.
    ///
    /// The version tag is checked before anything else, so data written by a
    /// different format version is rejected even if it happens to parse.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or(SnapshotError::MissingVersion)?;
        if version != SNAPSHOT_VERSION as u64 {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let snapshot: Snapshot = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Self::from_slice(text.as_bytes())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Checks structural constraints serde cannot express.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version as u64));
        }
        let mut ids = HashSet::new();
        for layer in &self.layers {
            if !ids.insert(layer.id) {
                return Err(SnapshotError::Invalid(format!(
                    "duplicate layer id {}",
                    layer.id
                )));
            }
        }
        for layer in &self.layers {
            match (layer.kind, layer.parent_id) {
                (LayerKind::Sectional, None) => {
                    return Err(SnapshotError::Invalid(format!(
                        "sectional layer {} has no parent",
                        layer.id
                    )));
                }
                (LayerKind::Sectional, Some(parent)) if !ids.contains(&parent) => {
                    return Err(SnapshotError::Invalid(format!(
                        "parent {parent} of layer {} is missing",
                        layer.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Rebuilds the layers described by the snapshot, bottom to top.
    ///
    /// Summary-only records become a layer holding a single image object
    /// built from `src` and the recorded geometry. Its object id is derived
    /// from the layer id, so it is stable across restores.
    pub fn to_layers(&self) -> Vec<Layer> {
        let mut records: Vec<&SnapshotLayer> = self.layers.iter().collect();
        records.sort_by_key(|l| l.z_index);
        records.into_iter().map(restore_layer).collect()
    }
}

fn restore_layer(record: &SnapshotLayer) -> Layer {
    let mut layer = match record.kind {
        LayerKind::Global => Layer::global(record.name.clone()),
        LayerKind::Sectional => {
            Layer::sectional(record.name.clone(), record.parent_id.unwrap_or_default())
        }
    };
    layer.id = record.id;
    layer.visible = record.visible;
    layer.prompt_text = record.prompt_text.clone();
    layer.reference_images = record.reference_images.clone();
    layer.background_image = record.background_image.clone();

    let objects = match (&record.objects, &record.src) {
        (Some(objects), _) => objects.clone(),
        (None, Some(src)) => {
            let mut geometry = Geometry::new(record.x, record.y, record.width, record.height);
            geometry.rotation = record.rotation;
            let mut object = SerializedObject::image(record.id, src.clone(), geometry);
            object.object_id = ObjectId::from_uuid(record.id.as_uuid());
            vec![object]
        }
        (None, None) => Vec::new(),
    };
    layer.with_objects(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use serde_json::json;

    fn model() -> (LayerModel, LayerId, LayerId) {
        let mut model = LayerModel::new();
        let g = Layer::global("Sky");
        let g_id = g.id;
        let mut photo = SerializedObject::image(
            g_id,
            ImageRef::new("data:image/png;base64,AAAA"),
            Geometry::new(10.0, 20.0, 100.0, 50.0),
        );
        photo.content.geometry.scale_x = 2.0;
        let g = g.with_objects(vec![
            SerializedObject::text(g_id, "title", Geometry::new(0.0, 0.0, 5.0, 5.0)),
            photo,
        ]);
        model.insert_layer(g, 0).unwrap();

        let s = Layer::sectional("Mask 1", g_id);
        let s_id = s.id;
        let s = s.with_objects(vec![
            SerializedObject::mask_stroke(s_id, vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)], 2.0),
            SerializedObject::mask_stroke(s_id, vec![Point::new(20.0, 20.0), Point::new(30.0, 25.0)], 2.0),
        ]);
        model.insert_layer(s, 1).unwrap();
        model.set_active(s_id);
        (model, g_id, s_id)
    }

    #[test]
    fn summary_uses_first_image() {
        let (model, g, _) = model();
        let snapshot = create_snapshot(&model, &CanvasConfig::default());
        let layer = snapshot.layers.iter().find(|l| l.id == g).unwrap();

        assert_eq!(layer.src.as_ref().unwrap().as_str(), "data:image/png;base64,AAAA");
        assert_eq!((layer.x, layer.y, layer.width, layer.height), (10.0, 20.0, 200.0, 50.0));
        assert_eq!(layer.z_index, 0);
    }

    #[test]
    fn summary_without_image_uses_union_bounds() {
        let (model, _, s) = model();
        let snapshot = create_snapshot(&model, &CanvasConfig::default());
        let layer = snapshot.layers.iter().find(|l| l.id == s).unwrap();

        assert!(layer.src.is_none());
        assert_eq!((layer.x, layer.y), (-1.0, -1.0));
        assert_eq!((layer.width, layer.height), (32.0, 27.0));
    }

    #[test]
    fn json_round_trip_keeps_layers() {
        let (model, _, _) = model();
        let snapshot = create_snapshot(&model, &CanvasConfig::default());
        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json).unwrap();

        assert_eq!(parsed, snapshot);
        let (rebuilt, repairs) =
            LayerModel::from_parts(parsed.to_layers(), parsed.active.unwrap_or_default());
        assert!(repairs.is_empty());
        assert_eq!(rebuilt.order(), model.order());
        assert_eq!(rebuilt.active(), model.active());
    }

    #[test]
    fn schema_field_names() {
        let (model, _, _) = model();
        let value = serde_json::to_value(create_snapshot(&model, &CanvasConfig::default())).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["lastModified"].is_i64());
        assert_eq!(value["canvas"]["backgroundColor"], "#ffffff");
        assert_eq!(value["layers"][0]["type"], "global");
        assert_eq!(value["layers"][1]["zIndex"], 1);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let text = json!({ "version": 2, "lastModified": 0, "canvas": {}, "layers": [] }).to_string();
        assert!(matches!(
            Snapshot::from_json(&text),
            Err(SnapshotError::UnsupportedVersion(2))
        ));
        assert!(matches!(
            Snapshot::from_json("{\"layers\": []}"),
            Err(SnapshotError::MissingVersion)
        ));
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let text = json!({
            "version": 1,
            "lastModified": 0,
            "canvas": { "width": 10, "height": 10, "backgroundColor": "#000" },
            "layers": [ { "id": LayerId::new(), "name": "no geometry" } ]
        })
        .to_string();
        assert!(matches!(Snapshot::from_json(&text), Err(SnapshotError::Json(_))));
        assert!(matches!(Snapshot::from_slice(b"not json"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn dangling_parent_is_invalid() {
        let (model, _, s) = model();
        let mut snapshot = create_snapshot(&model, &CanvasConfig::default());
        snapshot.layers.retain(|l| l.id == s);
        assert!(matches!(snapshot.validate(), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn summary_only_record_becomes_image_object() {
        let id = LayerId::new();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            last_modified: 0,
            canvas: CanvasConfig::default(),
            layers: vec![SnapshotLayer {
                id,
                name: "Legacy".into(),
                kind: LayerKind::Global,
                src: Some(ImageRef::new("data:image/png;base64,AAAA")),
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                rotation: 90.0,
                visible: false,
                z_index: 0,
                parent_id: None,
                prompt_text: String::new(),
                reference_images: Vec::new(),
                background_image: None,
                objects: None,
            }],
            active: None,
        };

        let layers = snapshot.to_layers();
        let objects = layers[0].objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].object_id.as_uuid(), id.as_uuid());
        assert_eq!(objects[0].content.geometry.rotation, 90.0);
        assert!(!layers[0].visible);
        assert_eq!(snapshot.to_layers()[0].objects()[0].object_id, objects[0].object_id);
    }
}
