use std::sync::Arc;

use kurbo::Point;
use stratum_core::config::EngineConfig;
use stratum_core::engine::LayerEngine;
use stratum_core::image::{DecodedImage, ImageDecoder, ImageFuture, ImageRef};
use stratum_core::layer::Layer;
use stratum_core::object::{Geometry, SerializedObject};
use stratum_core::scene::{MemoryScene, SceneGraph};
use stratum_core::snapshot::{Snapshot, SnapshotError};

/// Reports every image as 64x32 without looking at it.
struct FixedSizeDecoder;

impl ImageDecoder for FixedSizeDecoder {
    fn decode(&self, source: &ImageRef) -> ImageFuture {
        let source = source.clone();
        Box::pin(async move {
            Ok(DecodedImage {
                source,
                width: 64,
                height: 32,
            })
        })
    }
}

fn engine() -> LayerEngine<MemoryScene> {
    LayerEngine::new(MemoryScene::default(), &EngineConfig::default())
        .with_decoder(Arc::new(FixedSizeDecoder))
}

#[tokio::test]
async fn restore_of_snapshot_preserves_ids_visibility_and_order() {
    let mut source = engine();
    let photo = ImageRef::new("data:image/png;base64,cGhvdG8=");
    let base = source.add_layer(Layer::global("Photo")).await.unwrap();
    source
        .add_object(SerializedObject::image(base, photo.clone(), Geometry::new(0.0, 0.0, 64.0, 32.0)))
        .await;
    let overlay = source.add_layer(Layer::global("Overlay")).await.unwrap();
    source
        .add_object(SerializedObject::text(overlay, "caption", Geometry::new(4.0, 4.0, 30.0, 8.0)))
        .await;
    source
        .draw_mask_stroke(vec![Point::new(1.0, 1.0), Point::new(9.0, 3.0)], 2.0)
        .await
        .unwrap();
    source.toggle_visibility(overlay).await;
    source.reorder_layers(&[overlay, base]).await;

    let json = source.create_snapshot().to_json().unwrap();
    let snapshot = Snapshot::from_json(&json).unwrap();

    let mut restored = engine();
    restored.restore(&snapshot).await;

    assert_eq!(restored.model().order(), source.model().order());
    for layer in source.model().layers() {
        let copy = restored.layer(layer.id).unwrap();
        assert_eq!(copy.visible, layer.visible, "visibility of '{}'", layer.name);
        assert_eq!(copy.parent_id, layer.parent_id);
        assert_eq!(copy.objects(), layer.objects());
    }
    assert_eq!(restored.model().active(), source.model().active());
    assert_eq!(restored.scene().len(), source.scene().len());

    let src = restored.layer(base).unwrap().objects()[0].image_src().unwrap().clone();
    assert_eq!(src, photo);
    assert!(!restored.can_undo());
}

#[tokio::test]
async fn restored_nodes_are_tagged_with_original_layers() {
    let mut source = engine();
    let base = source.add_layer(Layer::global("Base")).await.unwrap();
    let id = source
        .add_object(SerializedObject::text(base, "t", Geometry::default()))
        .await;

    let mut restored = engine();
    restored.restore(&source.create_snapshot()).await;

    let node = restored.scene_index().node_of(id).unwrap();
    assert_eq!(restored.scene_index().tag_of(node).unwrap().layer_id, base);
    assert!(restored.scene().contains(node));
}

#[tokio::test]
async fn summary_only_snapshot_restores_image_layers() {
    let text = r##"{
        "version": 1,
        "lastModified": 1700000000000,
        "canvas": { "width": 800, "height": 600, "backgroundColor": "#202020" },
        "layers": [
            { "id": "5b0b6f8e-6f43-4cf1-9a7e-1d2c3b4a5f60", "name": "Background",
              "type": "global", "src": "data:image/png;base64,AAAA",
              "x": 0, "y": 0, "width": 800, "height": 600, "rotation": 0,
              "visible": true, "zIndex": 0 },
            { "id": "0c6a1a55-2f5e-4b8e-8a51-3f7d1e2c9b10", "name": "Empty",
              "type": "global", "src": null,
              "x": 0, "y": 0, "width": 0, "height": 0, "rotation": 0,
              "visible": false, "zIndex": 1 }
        ]
    }"##;
    let snapshot = Snapshot::from_json(text).unwrap();

    let mut engine = engine();
    engine.restore(&snapshot).await;

    assert_eq!(engine.canvas().width, 800);
    assert_eq!(engine.model().len(), 2);
    assert_eq!(engine.scene().len(), 1);
    // No stored selection: the topmost global layer is selected.
    assert_eq!(engine.active_global_layer().unwrap().name, "Empty");
    let background = &engine.model().layers()[0];
    assert_eq!(background.objects()[0].content.geometry.width, 800.0);
    assert!(!engine.model().layers()[1].visible);
}

#[tokio::test]
async fn restore_after_edits_resets_history() {
    let mut engine = engine();
    let snapshot = engine.create_snapshot();
    engine.add_layer(Layer::global("Temp")).await;
    assert!(engine.can_undo());

    engine.restore(&snapshot).await;
    assert!(engine.model().is_empty());
    assert!(!engine.can_undo());
    assert!(!engine.can_redo());
    assert!(!engine.has_unsaved_changes());
}

#[test]
fn unsupported_version_is_rejected() {
    let text = r#"{ "version": 7, "lastModified": 0, "canvas": {}, "layers": [] }"#;
    assert!(matches!(
        Snapshot::from_json(text),
        Err(SnapshotError::UnsupportedVersion(7))
    ));
}
