//! Plain-text summaries printed by the CLI.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use stratum_core::diagnostics::Diagnostics;
use stratum_core::layer::LayerKind;
use stratum_core::snapshot::{Snapshot, SnapshotLayer};

use crate::script::ScriptReport;

/// Layer tree of a snapshot, sectional layers indented under their parent.
pub fn snapshot_summary(snapshot: &Snapshot, with_objects: bool) -> String {
    let mut out = String::new();
    let modified = DateTime::<Utc>::from_timestamp_millis(snapshot.last_modified)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".into());
    let _ = writeln!(out, "version:  {}", snapshot.version);
    let _ = writeln!(out, "modified: {modified}");
    let _ = writeln!(
        out,
        "canvas:   {}x{} ({})",
        snapshot.canvas.width, snapshot.canvas.height, snapshot.canvas.background_color
    );
    let _ = writeln!(out, "layers:   {}", snapshot.layers.len());

    let mut layers: Vec<&SnapshotLayer> = snapshot.layers.iter().collect();
    layers.sort_by_key(|l| std::cmp::Reverse(l.z_index));
    let active = snapshot.active.unwrap_or_default();

    for global in layers.iter().filter(|l| l.kind == LayerKind::Global) {
        let is_active = active.global == Some(global.id);
        write_layer(&mut out, global, 1, is_active, with_objects);
        for child in layers
            .iter()
            .filter(|l| l.kind == LayerKind::Sectional && l.parent_id == Some(global.id))
        {
            let is_active = active.sectional == Some(child.id);
            write_layer(&mut out, child, 2, is_active, with_objects);
        }
    }
    out
}

fn write_layer(
    out: &mut String,
    layer: &SnapshotLayer,
    depth: usize,
    active: bool,
    with_objects: bool,
) {
    let indent = "  ".repeat(depth);
    let marker = if active { "*" } else { " " };
    let hidden = if layer.visible { "" } else { " (hidden)" };
    let objects = layer.objects.as_deref().unwrap_or_default();
    let _ = writeln!(
        out,
        "{indent}{marker} {} [{}] {} objects{hidden}",
        layer.name,
        layer.id,
        objects.len()
    );
    if !layer.prompt_text.is_empty() {
        let _ = writeln!(out, "{indent}    prompt: {}", layer.prompt_text);
    }
    if with_objects {
        for object in objects {
            let b = object.bounds();
            let _ = writeln!(
                out,
                "{indent}    - {:?} {} at ({:.0}, {:.0}) {:.0}x{:.0}",
                object.kind(),
                object.object_id,
                b.x0,
                b.y0,
                b.width(),
                b.height()
            );
        }
    }
}

/// Outcome of a replay: steps, skips and engine diagnostics.
pub fn replay_summary(report: &ScriptReport, diagnostics: &Diagnostics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} steps run, {} skipped",
        report.steps_run,
        report.skipped.len()
    );
    for reason in &report.skipped {
        let _ = writeln!(out, "  skipped {reason}");
    }
    if !diagnostics.is_empty() {
        let _ = writeln!(out, "{} diagnostics:", diagnostics.len());
        for entry in diagnostics.entries() {
            let _ = writeln!(out, "  [{}] {}: {}", entry.level, entry.kind, entry.message);
        }
    }
    out
}
