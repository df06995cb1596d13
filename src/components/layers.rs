// ============================================================================
// LAYER MANAGEMENT — placement, ordering, duplication, hit-testing
// ============================================================================

use uuid::Uuid;

use crate::document::{Document, ImageLayer, LayerId, PixelResource, Selection};
use crate::geometry::{Point, Rect};

/// New layers fit inside this fraction of the surface.
const PLACEMENT_FRACTION: f32 = 0.5;
/// Offset between successively added layers.
const CASCADE_STEP: f32 = 30.0;
/// Offset applied to a duplicate relative to its source.
const DUPLICATE_OFFSET: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerMove {
    Up,
    Down,
    Top,
    Bottom,
}

/// Box for the `slot`-th added layer: the image fitted inside half the
/// surface, centred, then cascaded so stacked additions stay visible.
pub fn placement_for(doc: &Document, image_w: u32, image_h: u32, slot: usize) -> Rect {
    let max_w = doc.width as f32 * PLACEMENT_FRACTION;
    let max_h = doc.height as f32 * PLACEMENT_FRACTION;
    let (iw, ih) = (image_w.max(1) as f32, image_h.max(1) as f32);
    let scale = (max_w / iw).min(max_h / ih).min(1.0);
    let (w, h) = ((iw * scale).max(1.0), (ih * scale).max(1.0));

    let offset = (slot % 10) as f32 * CASCADE_STEP;
    let x = (doc.width as f32 - w) / 2.0 + offset;
    let y = (doc.height as f32 - h) / 2.0 + offset;
    Rect::new(
        x.clamp(0.0, (doc.width as f32 - w).max(0.0)),
        y.clamp(0.0, (doc.height as f32 - h).max(0.0)),
        w,
        h,
    )
}

/// Append a layer on top and select it.
pub fn add_layer(doc: &mut Document, name: impl Into<String>, source: PixelResource) -> LayerId {
    let rect = placement_for(doc, source.width(), source.height(), doc.layers.len());
    let layer = ImageLayer::new(name, source, rect);
    let id = layer.id;
    doc.layers.push(layer);
    doc.selection = Selection::Layer(id);
    id
}

pub fn remove_layer(doc: &mut Document, id: LayerId) -> Option<ImageLayer> {
    let idx = doc.layer_index(id)?;
    let removed = doc.layers.remove(idx);
    doc.prune_selection();
    Some(removed)
}

/// Copy a layer directly above its source, offset slightly, and select it.
pub fn duplicate_layer(doc: &mut Document, id: LayerId) -> Option<LayerId> {
    let idx = doc.layer_index(id)?;
    let mut copy = doc.layers[idx].clone();
    copy.id = Uuid::new_v4();
    copy.name = format!("{} copy", copy.name);
    copy.x += DUPLICATE_OFFSET;
    copy.y += DUPLICATE_OFFSET;
    let new_id = copy.id;
    doc.layers.insert(idx + 1, copy);
    doc.selection = Selection::Layer(new_id);
    Some(new_id)
}

/// Reorder a layer. Returns false when the move is a no-op (already at
/// that end of the stack, or unknown id).
pub fn move_layer(doc: &mut Document, id: LayerId, mv: LayerMove) -> bool {
    let Some(idx) = doc.layer_index(id) else { return false };
    let last = doc.layers.len() - 1;
    let target = match mv {
        LayerMove::Up if idx < last => idx + 1,
        LayerMove::Down if idx > 0 => idx - 1,
        LayerMove::Top if idx < last => last,
        LayerMove::Bottom if idx > 0 => 0,
        _ => return false,
    };
    match mv {
        LayerMove::Up | LayerMove::Down => doc.layers.swap(idx, target),
        LayerMove::Top | LayerMove::Bottom => {
            let layer = doc.layers.remove(idx);
            doc.layers.insert(target, layer);
        }
    }
    true
}

/// Topmost visible layer under `p`.
pub fn layer_at(doc: &Document, p: Point) -> Option<LayerId> {
    doc.layers
        .iter()
        .rev()
        .find(|l| l.visible && l.contains(p))
        .map(|l| l.id)
}

pub fn layer_order(doc: &Document) -> Vec<LayerId> {
    doc.layers.iter().map(|l| l.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn collage(n: usize) -> Document {
        let mut doc = Document::new_collage(1200, 800, [255; 4]);
        for i in 0..n {
            add_layer(&mut doc, format!("l{}", i), PixelResource::new(format!("mem://{}", i), RgbaImage::new(400, 200)));
        }
        doc
    }

    #[test]
    fn boundary_moves_are_noops() {
        let mut doc = collage(3);
        let before = layer_order(&doc);
        assert!(!move_layer(&mut doc, before[2], LayerMove::Up));
        assert!(!move_layer(&mut doc, before[2], LayerMove::Top));
        assert!(!move_layer(&mut doc, before[0], LayerMove::Down));
        assert!(!move_layer(&mut doc, before[0], LayerMove::Bottom));
        assert_eq!(layer_order(&doc), before);
    }

    #[test]
    fn moves_reorder_stack() {
        let mut doc = collage(3);
        let ids = layer_order(&doc);
        assert!(move_layer(&mut doc, ids[0], LayerMove::Up));
        assert_eq!(layer_order(&doc), vec![ids[1], ids[0], ids[2]]);
        assert!(move_layer(&mut doc, ids[2], LayerMove::Bottom));
        assert_eq!(layer_order(&doc), vec![ids[2], ids[1], ids[0]]);
        assert!(move_layer(&mut doc, ids[2], LayerMove::Top));
        assert_eq!(layer_order(&doc), vec![ids[1], ids[0], ids[2]]);
    }

    #[test]
    fn placement_fits_half_surface() {
        let doc = Document::new_collage(1200, 800, [255; 4]);
        let r = placement_for(&doc, 2400, 1200, 0);
        assert_eq!((r.width, r.height), (600.0, 300.0));
        let small = placement_for(&doc, 100, 50, 0);
        assert_eq!((small.width, small.height), (100.0, 50.0));
        let next = placement_for(&doc, 100, 50, 1);
        assert_eq!(next.x - small.x, CASCADE_STEP);
    }

    #[test]
    fn duplicate_sits_above_source() {
        let mut doc = collage(2);
        let ids = layer_order(&doc);
        let dup = duplicate_layer(&mut doc, ids[0]).unwrap();
        assert_eq!(layer_order(&doc), vec![ids[0], dup, ids[1]]);
        assert_eq!(doc.selection, Selection::Layer(dup));
        assert_eq!(doc.layers[1].name, "l0 copy");
    }

    #[test]
    fn hit_test_skips_hidden_layers() {
        let mut doc = collage(2);
        let ids = layer_order(&doc);
        let p = doc.layers[1].bounds().center();
        assert_eq!(layer_at(&doc, p), Some(ids[1]));
        doc.layers[1].visible = false;
        let under = if doc.layers[0].contains(p) { Some(ids[0]) } else { None };
        assert_eq!(layer_at(&doc, p), under);
    }

    #[test]
    fn removing_selected_layer_clears_selection() {
        let mut doc = collage(1);
        let id = doc.layers[0].id;
        assert!(remove_layer(&mut doc, id).is_some());
        assert_eq!(doc.selection, Selection::None);
        assert!(remove_layer(&mut doc, id).is_none());
    }
}
