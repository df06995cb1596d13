use ab_glyph::{point, Font, FontArc, ScaleFont};
use std::collections::HashMap;
use std::path::Path;

use image::{GrayImage, Luma, RgbaImage, imageops};

use crate::document::{TextAlignment, TextObject};
use crate::error::{EditorError, Result};
use crate::geometry::{Point, Rect};

/// Line spacing as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Padding added around a text's ink box for hit-testing and handles.
pub const HIT_PADDING: f32 = 8.0;
/// Font sizes never shrink below this, in pixels.
pub const MIN_FONT_PX: f32 = 8.0;
pub const RESIZE_HANDLE_SIZE: f32 = 20.0;
pub const DELETE_HANDLE_SIZE: f32 = 24.0;

/// Something that can measure and draw a line of text.
pub trait TextFace: Send + Sync {
    /// Advance width of `line` at `px` pixels.
    fn line_width(&self, line: &str, px: f32) -> f32;
    /// Distance from baseline to the top of the em box (positive).
    fn ascent(&self, px: f32) -> f32;
    /// Distance from baseline to the bottom of the em box (negative).
    fn descent(&self, px: f32) -> f32;
    /// Plot glyph coverage for `line` starting at `origin_x` on `baseline`.
    fn draw_line(&self, line: &str, px: f32, origin_x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32));
}

impl TextFace for FontArc {
    fn line_width(&self, line: &str, px: f32) -> f32 {
        let scaled = self.as_scaled(px);
        let mut cursor_x = 0.0f32;
        let mut last = None;
        for ch in line.chars() {
            let id = self.glyph_id(ch);
            if let Some(prev) = last {
                cursor_x += scaled.kern(prev, id);
            }
            cursor_x += scaled.h_advance(id);
            last = Some(id);
        }
        cursor_x
    }

    fn ascent(&self, px: f32) -> f32 {
        self.as_scaled(px).ascent()
    }

    fn descent(&self, px: f32) -> f32 {
        self.as_scaled(px).descent()
    }

    fn draw_line(&self, line: &str, px: f32, origin_x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        let scaled = self.as_scaled(px);
        let mut cursor_x = origin_x;
        let mut last = None;
        for ch in line.chars() {
            let id = self.glyph_id(ch);
            if let Some(prev) = last {
                cursor_x += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(px, point(cursor_x, baseline));
            if let Some(outlined) = self.outline_glyph(glyph) {
                let b = outlined.px_bounds();
                outlined.draw(|gx, gy, cov| {
                    plot(b.min.x as i32 + gx as i32, b.min.y as i32 + gy as i32, cov);
                });
            }
            cursor_x += scaled.h_advance(id);
            last = Some(id);
        }
    }
}

/// Deterministic stand-in face: every character advances 0.6em and each
/// non-whitespace character draws a solid 0.5em × 0.7em block.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockFace;

impl BlockFace {
    const ADVANCE: f32 = 0.6;
    const INK_W: f32 = 0.5;
    const INK_H: f32 = 0.7;
}

impl TextFace for BlockFace {
    fn line_width(&self, line: &str, px: f32) -> f32 {
        line.chars().count() as f32 * Self::ADVANCE * px
    }

    fn ascent(&self, px: f32) -> f32 {
        0.8 * px
    }

    fn descent(&self, px: f32) -> f32 {
        -0.2 * px
    }

    fn draw_line(&self, line: &str, px: f32, origin_x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        let top = (baseline - Self::INK_H * px).round() as i32;
        let bottom = baseline.round() as i32;
        for (i, ch) in line.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = (origin_x + i as f32 * Self::ADVANCE * px).round() as i32;
            let right = (origin_x + (i as f32 * Self::ADVANCE + Self::INK_W) * px).round() as i32;
            for y in top..bottom {
                for x in left..right {
                    plot(x, y, 1.0);
                }
            }
        }
    }
}

/// Family name → face lookup. Unknown families fall back to the default
/// family when one is registered, else to [`BlockFace`].
#[derive(Clone, Default)]
pub struct FontBook {
    faces: HashMap<String, FontArc>,
    default_family: Option<String>,
    fallback: BlockFace,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a face. The first registered family becomes the default.
    pub fn register(&mut self, family: impl Into<String>, font: FontArc) {
        let family = family.into();
        if self.default_family.is_none() {
            self.default_family = Some(family.clone());
        }
        self.faces.insert(family, font);
    }

    pub fn load_file(&mut self, family: impl Into<String>, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| EditorError::Validation(format!("invalid font {}: {}", path.display(), e)))?;
        self.register(family, font);
        Ok(())
    }

    pub fn has_family(&self, family: &str) -> bool {
        self.faces.contains_key(family)
    }

    pub fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.faces.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn face(&self, family: &str) -> &dyn TextFace {
        if let Some(f) = self.faces.get(family) {
            return f;
        }
        if let Some(f) = self.default_family.as_ref().and_then(|d| self.faces.get(d)) {
            return f;
        }
        &self.fallback
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct LineLayout {
    pub text: String,
    pub x: f32,
    pub width: f32,
    pub baseline: f32,
}

/// Measured geometry for one text object on a surface.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayout {
    pub font_px: f32,
    pub line_height: f32,
    pub lines: Vec<LineLayout>,
    /// Ink box in surface coordinates, before rotation.
    pub bounds: Rect,
}

fn aligned_x(anchor_x: f32, width: f32, align: TextAlignment) -> f32 {
    match align {
        TextAlignment::Left => anchor_x,
        TextAlignment::Center => anchor_x - width * 0.5,
        TextAlignment::Right => anchor_x - width,
    }
}

/// Lay out `text` at `rel_size × surface_height`, vertically centred on
/// the anchor.
pub fn layout_text(text: &TextObject, face: &dyn TextFace, surface_height: f32) -> TextLayout {
    let font_px = text.font_px(surface_height).max(1.0);
    let line_height = font_px * LINE_HEIGHT_FACTOR;
    let raw_lines: Vec<&str> = text.content.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let total_height = raw_lines.len() as f32 * line_height;
    let start_y = text.y - total_height / 2.0;
    let baseline_shift = (face.ascent(font_px) + face.descent(font_px)) / 2.0;

    let mut max_w = 0.0f32;
    let lines: Vec<LineLayout> = raw_lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let width = face.line_width(line, font_px);
            max_w = max_w.max(width);
            LineLayout {
                text: line.to_string(),
                x: aligned_x(text.x, width, text.align),
                width,
                baseline: start_y + (i as f32 + 0.5) * line_height + baseline_shift,
            }
        })
        .collect();

    TextLayout {
        font_px,
        line_height,
        lines,
        bounds: Rect::new(aligned_x(text.x, max_w, text.align), start_y, max_w, total_height),
    }
}

/// Map a surface point into the unrotated frame of a text anchored at
/// `anchor` and rotated by `degrees`.
fn to_text_frame(p: Point, anchor: Point, degrees: f32) -> Point {
    if degrees == 0.0 {
        return p;
    }
    let (sin, cos) = (-degrees).to_radians().sin_cos();
    let dx = p.x - anchor.x;
    let dy = p.y - anchor.y;
    Point::new(anchor.x + dx * cos - dy * sin, anchor.y + dx * sin + dy * cos)
}

/// A point hits a text when it falls in the ink box grown by 8px.
pub fn hit_test(text: &TextObject, layout: &TextLayout, p: Point) -> bool {
    let local = to_text_frame(p, text.anchor(), text.rotation);
    layout.bounds.expand(HIT_PADDING).contains(local)
}

// ============================================================================
// HANDLES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextHandle {
    Nw,
    Ne,
    Sw,
    Se,
}

impl TextHandle {
    pub fn all() -> &'static [TextHandle] {
        &[TextHandle::Nw, TextHandle::Ne, TextHandle::Sw, TextHandle::Se]
    }

    /// `ne` deletes the text, the other three resize it.
    pub fn is_delete(self) -> bool {
        matches!(self, TextHandle::Ne)
    }

    pub fn visual_size(self) -> f32 {
        if self.is_delete() { DELETE_HANDLE_SIZE } else { RESIZE_HANDLE_SIZE }
    }
}

fn handle_center(handle: TextHandle, padded: &Rect) -> Point {
    match handle {
        TextHandle::Nw => Point::new(padded.x, padded.y),
        TextHandle::Ne => Point::new(padded.right(), padded.y),
        TextHandle::Sw => Point::new(padded.x, padded.bottom()),
        TextHandle::Se => Point::new(padded.right(), padded.bottom()),
    }
}

/// Visual handle squares at the corners of the padded ink box.
pub fn handle_rects(layout: &TextLayout) -> Vec<(TextHandle, Rect)> {
    let padded = layout.bounds.expand(HIT_PADDING);
    TextHandle::all()
        .iter()
        .map(|&h| (h, Rect::centered_square(handle_center(h, &padded), h.visual_size())))
        .collect()
}

/// Which handle, if any, is under `p`. Uses a `hit_size` click area that
/// is larger than the drawn handle. The delete handle wins ties.
pub fn handle_at(text: &TextObject, layout: &TextLayout, p: Point, hit_size: f32) -> Option<TextHandle> {
    let local = to_text_frame(p, text.anchor(), text.rotation);
    let padded = layout.bounds.expand(HIT_PADDING);
    [TextHandle::Ne, TextHandle::Nw, TextHandle::Sw, TextHandle::Se]
        .into_iter()
        .find(|&h| Rect::centered_square(handle_center(h, &padded), hit_size).contains(local))
}

/// New font size for a corner drag from `start` to `current`.
/// `nw` subtracts the vertical delta, `sw` adds it, `se` adds the larger
/// of the two deltas. The delete handle never resizes.
pub fn resize_font_px(handle: TextHandle, original_px: f32, start: Point, current: Point) -> f32 {
    let (dx, dy) = current.delta_from(start);
    let next = match handle {
        TextHandle::Nw => original_px - dy,
        TextHandle::Sw => original_px + dy,
        TextHandle::Se => original_px + dx.max(dy),
        TextHandle::Ne => original_px,
    };
    next.max(MIN_FONT_PX)
}

/// In-flight pointer gesture on a text object. Frames update the text
/// without touching history; the session snapshots when the gesture ends.
#[derive(Clone, Debug, PartialEq)]
pub enum TextGesture {
    Move {
        id: crate::document::TextId,
        start_pointer: Point,
        start_anchor: Point,
    },
    Resize {
        id: crate::document::TextId,
        handle: TextHandle,
        start_pointer: Point,
        original_px: f32,
    },
}

impl TextGesture {
    pub fn id(&self) -> crate::document::TextId {
        match self {
            TextGesture::Move { id, .. } | TextGesture::Resize { id, .. } => *id,
        }
    }

    /// Apply the gesture at pointer `p` to `text`.
    pub fn update(&self, text: &mut TextObject, p: Point, surface_height: f32) {
        match *self {
            TextGesture::Move { start_pointer, start_anchor, .. } => {
                let (dx, dy) = p.delta_from(start_pointer);
                text.x = start_anchor.x + dx;
                text.y = start_anchor.y + dy;
            }
            TextGesture::Resize { handle, start_pointer, original_px, .. } => {
                let px = resize_font_px(handle, original_px, start_pointer, p);
                if surface_height > 0.0 {
                    text.rel_size = (px / surface_height).min(crate::document::MAX_REL_SIZE);
                }
            }
        }
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Unrotated RGBA rendering of a text, positioned in surface space.
pub struct TextRaster {
    pub image: RgbaImage,
    pub off_x: i32,
    pub off_y: i32,
}

fn dilate(coverage: &[f32], w: usize, h: usize, radius: f32) -> Vec<f32> {
    let r = radius.ceil() as i32;
    if r <= 0 {
        return coverage.to_vec();
    }
    let r2 = radius * radius;
    let mut out = vec![0.0f32; coverage.len()];
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let mut best = 0.0f32;
            for oy in -r..=r {
                for ox in -r..=r {
                    if (ox * ox + oy * oy) as f32 > r2 {
                        continue;
                    }
                    let (sx, sy) = (x + ox, y + oy);
                    if sx < 0 || sy < 0 || sx >= w as i32 || sy >= h as i32 {
                        continue;
                    }
                    best = best.max(coverage[sy as usize * w + sx as usize]);
                }
            }
            out[y as usize * w + x as usize] = best;
        }
    }
    out
}

fn put_over(dst: &mut RgbaImage, x: u32, y: u32, color: [u8; 4], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let top = image::Rgba([color[0], color[1], color[2], (color[3] as f32 * alpha).round().min(255.0) as u8]);
    let base = *dst.get_pixel(x, y);
    dst.put_pixel(x, y, crate::compositor::blend_normal(base, top, 1.0));
}

/// Rasterize a text with stroke and shadow into a local buffer.
/// Opacity and rotation are applied by the compositor.
pub fn rasterize(text: &TextObject, face: &dyn TextFace, surface_height: f32) -> Option<TextRaster> {
    let layout = layout_text(text, face, surface_height);
    if layout.bounds.width <= 0.0 || text.content.trim().is_empty() {
        return None;
    }

    let stroke_pad = text.stroke.as_ref().map_or(0.0, |s| s.width);
    let shadow_pad = text
        .shadow
        .as_ref()
        .map_or(0.0, |s| s.blur * 2.0 + s.offset_x.abs().max(s.offset_y.abs()));
    let pad = (stroke_pad + shadow_pad + 2.0).ceil();
    let area = layout.bounds.expand(pad);
    let off_x = area.x.floor() as i32;
    let off_y = area.y.floor() as i32;
    let w = area.width.ceil() as usize + 1;
    let h = area.height.ceil() as usize + 1;

    let mut fill = vec![0.0f32; w * h];
    for line in &layout.lines {
        face.draw_line(&line.text, layout.font_px, line.x, line.baseline, &mut |x, y, cov| {
            let (lx, ly) = (x - off_x, y - off_y);
            if lx >= 0 && ly >= 0 && (lx as usize) < w && (ly as usize) < h {
                let idx = ly as usize * w + lx as usize;
                fill[idx] = fill[idx].max(cov.clamp(0.0, 1.0));
            }
        });
    }

    let stroke = text
        .stroke
        .as_ref()
        .filter(|s| s.width > 0.0)
        .map(|s| (dilate(&fill, w, h, s.width / 2.0), s.color));

    let mut out = RgbaImage::new(w as u32, h as u32);

    if let Some(shadow) = text.shadow.as_ref() {
        let silhouette = stroke.as_ref().map_or(&fill, |(c, _)| c);
        let mut mask = GrayImage::new(w as u32, h as u32);
        for (i, &c) in silhouette.iter().enumerate() {
            if c > 0.0 {
                mask.put_pixel((i % w) as u32, (i / w) as u32, Luma([(c * 255.0).round() as u8]));
            }
        }
        if shadow.blur > 0.0 {
            mask = imageops::blur(&mask, shadow.blur / 2.0);
        }
        let (sx, sy) = (shadow.offset_x.round() as i32, shadow.offset_y.round() as i32);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let (mx, my) = (x - sx, y - sy);
                if mx < 0 || my < 0 || mx >= w as i32 || my >= h as i32 {
                    continue;
                }
                let a = mask.get_pixel(mx as u32, my as u32)[0] as f32 / 255.0;
                put_over(&mut out, x as u32, y as u32, shadow.color, a);
            }
        }
    }

    if let Some((cov, color)) = stroke.as_ref() {
        for (i, &c) in cov.iter().enumerate() {
            put_over(&mut out, (i % w) as u32, (i / w) as u32, *color, c);
        }
    }

    for (i, &c) in fill.iter().enumerate() {
        put_over(&mut out, (i % w) as u32, (i / w) as u32, text.color, c);
    }

    Some(TextRaster { image: out, off_x, off_y })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str, x: f32, y: f32) -> TextObject {
        let mut t = TextObject::new(content, Point::new(x, y));
        t.rel_size = 0.1;
        t
    }

    #[test]
    fn layout_centres_on_anchor() {
        let t = text("Hello", 400.0, 300.0);
        let l = layout_text(&t, &BlockFace, 600.0);
        assert_eq!(l.font_px, 60.0);
        assert_eq!(l.line_height, 72.0);
        // 5 chars × 0.6em × 60px
        assert!((l.bounds.width - 180.0).abs() < 1e-3);
        assert!((l.bounds.x - 310.0).abs() < 1e-3);
        assert!((l.bounds.y - 264.0).abs() < 1e-3);
    }

    #[test]
    fn multiline_height_uses_line_factor() {
        let t = text("a\nbb\nccc", 100.0, 100.0);
        let l = layout_text(&t, &BlockFace, 100.0);
        assert_eq!(l.lines.len(), 3);
        assert!((l.bounds.height - 3.0 * 12.0).abs() < 1e-3);
        assert!((l.bounds.y - (100.0 - 18.0)).abs() < 1e-3);
        assert!(l.lines[2].width > l.lines[0].width);
    }

    #[test]
    fn left_and_right_alignment() {
        let mut t = text("abcd", 100.0, 50.0);
        t.align = TextAlignment::Left;
        assert_eq!(layout_text(&t, &BlockFace, 100.0).bounds.x, 100.0);
        t.align = TextAlignment::Right;
        let l = layout_text(&t, &BlockFace, 100.0);
        assert!((l.bounds.right() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn hit_test_includes_padding() {
        let t = text("Hi", 100.0, 100.0);
        let l = layout_text(&t, &BlockFace, 100.0);
        // box: x 94..106, y 94..106
        assert!(hit_test(&t, &l, Point::new(87.0, 100.0)));
        assert!(!hit_test(&t, &l, Point::new(85.0, 100.0)));
    }

    #[test]
    fn handle_hit_area_is_larger_than_visual() {
        let t = text("Hello", 400.0, 300.0);
        let l = layout_text(&t, &BlockFace, 600.0);
        let padded = l.bounds.expand(HIT_PADDING);
        let near_se = Point::new(padded.right() + 11.0, padded.bottom() + 11.0);
        assert_eq!(handle_at(&t, &l, near_se, 24.0), Some(TextHandle::Se));
        assert_eq!(handle_at(&t, &l, near_se, 20.0), None);
        let ne = Point::new(padded.right(), padded.y);
        assert_eq!(handle_at(&t, &l, ne, 24.0), Some(TextHandle::Ne));
        assert!(TextHandle::Ne.is_delete());
    }

    #[test]
    fn corner_resize_rules() {
        let s = Point::new(0.0, 0.0);
        assert_eq!(resize_font_px(TextHandle::Nw, 40.0, s, Point::new(5.0, 10.0)), 30.0);
        assert_eq!(resize_font_px(TextHandle::Sw, 40.0, s, Point::new(5.0, 10.0)), 50.0);
        assert_eq!(resize_font_px(TextHandle::Se, 40.0, s, Point::new(25.0, 10.0)), 65.0);
        assert_eq!(resize_font_px(TextHandle::Nw, 40.0, s, Point::new(0.0, 100.0)), MIN_FONT_PX);
    }

    #[test]
    fn gesture_resize_updates_relative_size() {
        let mut t = text("x", 10.0, 10.0);
        let g = TextGesture::Resize {
            id: t.id,
            handle: TextHandle::Sw,
            start_pointer: Point::new(0.0, 0.0),
            original_px: 20.0,
        };
        g.update(&mut t, Point::new(0.0, 30.0), 200.0);
        assert!((t.rel_size - 0.25).abs() < 1e-6);
    }

    #[test]
    fn gesture_resize_stops_at_surface_height() {
        let mut t = text("x", 10.0, 10.0);
        let g = TextGesture::Resize {
            id: t.id,
            handle: TextHandle::Se,
            start_pointer: Point::new(0.0, 0.0),
            original_px: 20.0,
        };
        g.update(&mut t, Point::new(5e8, 5e8), 200.0);
        assert_eq!(t.rel_size, crate::document::MAX_REL_SIZE);
    }

    #[test]
    fn rasterize_paints_fill_colour() {
        let mut t = text("H", 50.0, 50.0);
        t.color = [255, 0, 0, 255];
        let r = rasterize(&t, &BlockFace, 100.0).unwrap();
        let hit = r.image.pixels().any(|p| p[0] == 255 && p[3] == 255 && p[1] == 0);
        assert!(hit);
    }

    #[test]
    fn unknown_family_falls_back_to_blocks() {
        let book = FontBook::new();
        assert_eq!(book.face("Nope").line_width("ab", 10.0), 12.0);
    }
}
