//! Render-engine independent description of scene objects.
//!
//! A [`SerializedObject`] is what a layer stores for each element it owns:
//! identity (`object_id`, `layer_id`) plus an [`ObjectContent`] body that the
//! scene graph adapter knows how to mount and read back. The identity is
//! never stored on the live node itself; the engine keeps it in a side table
//! (see [`SceneIndex`](crate::scene::SceneIndex)).

use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{OperationError, OperationResult};
use crate::id::{LayerId, ObjectId};
use crate::image::ImageRef;

/// Broad category of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Image,
    Text,
    Path,
    Shape,
}

/// Position, size, scale and rotation of an object.
///
/// `x`/`y` are the top-left corner in canvas coordinates, `rotation` is in
/// degrees around that corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    #[serde(default)]
    pub rotation: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Geometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }

    /// Local-to-canvas transform.
    pub fn transform(&self) -> Affine {
        Affine::translate((self.x, self.y))
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }

    /// Axis-aligned bounding box in canvas coordinates.
    pub fn bounds(&self) -> Rect {
        self.transform()
            .transform_rect_bbox(Rect::new(0.0, 0.0, self.width, self.height))
    }

    /// Rendered width and height after scaling.
    pub fn scaled_size(&self) -> (f64, f64) {
        (self.width * self.scale_x, self.height * self.scale_y)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// Paint attributes shared by all object kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Style {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub opacity: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            stroke_width: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Triangle,
    Polygon,
}

/// Type-specific object data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Payload {
    Image {
        src: ImageRef,
    },
    Text {
        content: String,
        font_family: String,
        font_size: f64,
    },
    /// A vector path in canvas coordinates. Paths flagged as `mask` are mask
    /// strokes: they carry the inpainting region of a sectional layer.
    Path {
        points: Vec<Point>,
        #[serde(default)]
        closed: bool,
        #[serde(default)]
        mask: bool,
    },
    Shape {
        shape: ShapeKind,
        #[serde(default)]
        corner_radius: f64,
    },
}

impl Payload {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Image { .. } => ObjectKind::Image,
            Self::Text { .. } => ObjectKind::Text,
            Self::Path { .. } => ObjectKind::Path,
            Self::Shape { .. } => ObjectKind::Shape,
        }
    }
}

/// Everything about an object except its identity.
///
/// This is the part the scene graph adapter mounts and reads back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectContent {
    pub geometry: Geometry,
    #[serde(default)]
    pub style: Style,
    #[serde(default = "default_visible")]
    pub visible: bool,
    pub payload: Payload,
}

fn default_visible() -> bool {
    true
}

impl ObjectContent {
    pub fn new(geometry: Geometry, payload: Payload) -> Self {
        Self {
            geometry,
            style: Style::default(),
            visible: true,
            payload,
        }
    }
}

/// A scene object as stored on its owning layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedObject {
    pub object_id: ObjectId,
    pub layer_id: LayerId,
    #[serde(flatten)]
    pub content: ObjectContent,
}

impl SerializedObject {
    /// Creates an object with a fresh id.
    pub fn new(layer_id: LayerId, content: ObjectContent) -> Self {
        Self {
            object_id: ObjectId::new(),
            layer_id,
            content,
        }
    }

    /// Creates an image object.
    pub fn image(layer_id: LayerId, src: ImageRef, geometry: Geometry) -> Self {
        Self::new(layer_id, ObjectContent::new(geometry, Payload::Image { src }))
    }

    /// Creates a text object.
    pub fn text(layer_id: LayerId, content: impl Into<String>, geometry: Geometry) -> Self {
        Self::new(
            layer_id,
            ObjectContent::new(
                geometry,
                Payload::Text {
                    content: content.into(),
                    font_family: "sans-serif".into(),
                    font_size: 24.0,
                },
            ),
        )
    }

    /// Creates a shape object.
    pub fn shape(layer_id: LayerId, shape: ShapeKind, geometry: Geometry) -> Self {
        Self::new(
            layer_id,
            ObjectContent::new(
                geometry,
                Payload::Shape {
                    shape,
                    corner_radius: 0.0,
                },
            ),
        )
    }

    /// Creates a mask stroke from canvas-space points.
    ///
    /// The geometry is the bounding box of the points, padded by half the
    /// stroke width.
    pub fn mask_stroke(layer_id: LayerId, points: Vec<Point>, stroke_width: f64) -> Self {
        let geometry = points_geometry(&points, stroke_width / 2.0);
        let mut content = ObjectContent::new(
            geometry,
            Payload::Path {
                points,
                closed: false,
                mask: true,
            },
        );
        content.style = Style {
            fill: None,
            stroke: Some("#ffffff".into()),
            stroke_width,
            opacity: 1.0,
        };
        Self::new(layer_id, content)
    }

    pub fn kind(&self) -> ObjectKind {
        self.content.payload.kind()
    }

    /// Returns `true` for path objects that carry a mask region.
    pub fn is_mask_stroke(&self) -> bool {
        matches!(self.content.payload, Payload::Path { mask: true, .. })
    }

    /// Image source, for image objects.
    pub fn image_src(&self) -> Option<&ImageRef> {
        match &self.content.payload {
            Payload::Image { src } => Some(src),
            _ => None,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.content.geometry.bounds()
    }

    /// Decodes an object from a JSON value.
    pub fn from_value(value: serde_json::Value) -> OperationResult<Self> {
        serde_json::from_value(value).map_err(|e| OperationError::MalformedObject(e.to_string()))
    }
}

/// Decodes a batch of JSON values, skipping malformed entries.
///
/// Returns the decoded objects in input order, plus one error per skipped
/// entry. A bad entry never fails the whole batch.
pub fn decode_objects(
    values: impl IntoIterator<Item = serde_json::Value>,
) -> (Vec<SerializedObject>, Vec<OperationError>) {
    let mut objects = Vec::new();
    let mut errors = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        match SerializedObject::from_value(value) {
            Ok(object) => objects.push(object),
            Err(OperationError::MalformedObject(msg)) => {
                errors.push(OperationError::MalformedObject(format!("entry {i}: {msg}")));
            }
            Err(e) => errors.push(e),
        }
    }
    (objects, errors)
}

fn points_geometry(points: &[Point], pad: f64) -> Geometry {
    let Some(first) = points.first() else {
        return Geometry::default();
    };
    let mut rect = Rect::from_points(*first, *first);
    for p in &points[1..] {
        rect = rect.union_pt(*p);
    }
    let rect = rect.inflate(pad, pad);
    Geometry::new(rect.x0, rect.y0, rect.width(), rect.height())
}
