// ============================================================================
// COMPOSITOR — paints a Document onto a fresh RGBA surface
// ============================================================================
//
// Stateless: every call allocates its own surface and scratch buffers.
// Paint order is base image, image layers (index 0 first), the selection
// overlay of the active layer, then text objects. Text never passes
// through any filter pipeline.
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::document::{BorderSpec, Document, DropShadow, ImageLayer, TextObject};
use crate::geometry::{Point, Rect};
use crate::ops::filters;
use crate::ops::text::{self, FontBook};
use crate::ops::transform::selection_overlay;

const OVERLAY_COLOR: [u8; 4] = [0, 153, 255, 255];
const DELETE_COLOR: [u8; 4] = [230, 57, 70, 255];
const DASH_LEN: i32 = 6;

/// What to include beyond the image content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_text: bool,
    pub include_overlay: bool,
}

impl RenderOptions {
    /// Interactive view: everything.
    pub const EDITOR: Self = Self { include_text: true, include_overlay: true };
    /// Final output: no selection chrome.
    pub const EXPORT: Self = Self { include_text: true, include_overlay: false };
    /// Filtered image content only (crop staging).
    pub const IMAGE_ONLY: Self = Self { include_text: false, include_overlay: false };
}

/// Source-over blend of `top` onto `base` with an extra opacity factor.
pub fn blend_normal(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }
    let opacity = opacity.clamp(0.0, 1.0);

    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mix = |b: u8, t: u8| {
        let v = (t as f32 / 255.0 * top_a + b as f32 / 255.0 * base_a * (1.0 - top_a)) / out_a;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(base[0], top[0]),
        mix(base[1], top[1]),
        mix(base[2], top[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Where and how a source buffer lands on the surface.
#[derive(Clone, Copy, Debug)]
pub struct Placement {
    /// Unrotated destination box.
    pub rect: Rect,
    /// Rotation centre in surface coordinates.
    pub pivot: Point,
    /// Degrees, clockwise on screen.
    pub rotation: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    /// 0..1
    pub opacity: f32,
}

impl Placement {
    pub fn at(rect: Rect) -> Self {
        Self {
            rect,
            pivot: rect.center(),
            rotation: 0.0,
            flip_h: false,
            flip_v: false,
            opacity: 1.0,
        }
    }

    /// Axis-aligned bounds of the rotated destination box.
    fn bounding_box(&self) -> Rect {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let r = self.rect;
        let corners = [
            Point::new(r.x, r.y),
            Point::new(r.right(), r.y),
            Point::new(r.x, r.bottom()),
            Point::new(r.right(), r.bottom()),
        ];
        let mut min = Point::new(f32::MAX, f32::MAX);
        let mut max = Point::new(f32::MIN, f32::MIN);
        for c in corners {
            let dx = c.x - self.pivot.x;
            let dy = c.y - self.pivot.y;
            let x = self.pivot.x + dx * cos - dy * sin;
            let y = self.pivot.y + dx * sin + dy * cos;
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
        }
        Rect::from_corners(min, max)
    }
}

/// Bilinear sample with clamp-to-edge addressing.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    let x = x.clamp(0.0, max_x as f32);
    let y = y.clamp(0.0, max_y as f32);
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.clamp(0, max_x) as u32, sy.clamp(0, max_y) as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Paint `src` onto `dst` scaled into `p.rect`, rotated about `p.pivot`,
/// mirrored by the flip flags, at `p.opacity`. Inverse-mapped, row-parallel.
pub fn paint_image(dst: &mut RgbaImage, src: &RgbaImage, p: &Placement) {
    if src.width() == 0 || src.height() == 0 || p.rect.width <= 0.0 || p.rect.height <= 0.0 {
        return;
    }
    let bbox = p.bounding_box();
    let dw = dst.width() as i64;
    let dh = dst.height() as i64;
    let x0 = (bbox.x.floor() as i64).clamp(0, dw) as usize;
    let x1 = (bbox.right().ceil() as i64).clamp(0, dw) as usize;
    let y0 = (bbox.y.floor() as i64).clamp(0, dh) as usize;
    let y1 = (bbox.bottom().ceil() as i64).clamp(0, dh) as usize;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let (sin, cos) = (-p.rotation).to_radians().sin_cos();
    let scale_x = src.width() as f32 / p.rect.width;
    let scale_y = src.height() as f32 / p.rect.height;
    let stride = dst.width() as usize * 4;
    let raw: &mut [u8] = dst.as_mut();

    raw.par_chunks_mut(stride)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - p.pivot.y;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - p.pivot.x;
                let lx = p.pivot.x + dx * cos - dy * sin;
                let ly = p.pivot.y + dx * sin + dy * cos;
                let mut u = lx - p.rect.x;
                let mut v = ly - p.rect.y;
                if u < 0.0 || v < 0.0 || u >= p.rect.width || v >= p.rect.height {
                    continue;
                }
                if p.flip_h {
                    u = p.rect.width - u;
                }
                if p.flip_v {
                    v = p.rect.height - v;
                }
                let top = bilinear_sample(src, u * scale_x - 0.5, v * scale_y - 0.5);
                let i = x * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                let out = blend_normal(base, top, p.opacity);
                row[i..i + 4].copy_from_slice(&out.0);
            }
        });
}

/// Signed distance from a pixel centre to a rounded rectangle of size
/// `w×h` anchored at the origin. Negative inside.
fn rounded_rect_distance(px: f32, py: f32, w: f32, h: f32, radius: f32) -> f32 {
    let r = radius.min(w * 0.5).min(h * 0.5).max(0.0);
    let qx = (px - w * 0.5).abs() - (w * 0.5 - r);
    let qy = (py - h * 0.5).abs() - (h * 0.5 - r);
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0) - r
}

/// Clip to the rounded corners and draw the border inside the box.
fn apply_border(buf: &mut RgbaImage, border: &BorderSpec) {
    let (w, h) = (buf.width() as f32, buf.height() as f32);
    let stroke = Rgba(border.color);
    for (x, y, px) in buf.enumerate_pixels_mut() {
        let d = rounded_rect_distance(x as f32 + 0.5, y as f32 + 0.5, w, h, border.radius);
        if d > 0.0 {
            *px = Rgba([0, 0, 0, 0]);
        } else if border.width > 0.0 && d > -border.width {
            *px = blend_normal(*px, stroke, 1.0);
        }
    }
}

fn paint_drop_shadow(surface: &mut RgbaImage, layer: &ImageLayer, shadow: &DropShadow) {
    let pad = (shadow.blur * 2.0).ceil() + 1.0;
    let w = layer.width.round().max(1.0);
    let h = layer.height.round().max(1.0);
    let radius = layer.border.as_ref().map_or(0.0, |b| b.radius);
    let mut mask = RgbaImage::new((w + pad * 2.0) as u32, (h + pad * 2.0) as u32);
    let color = shadow.color;
    for (x, y, px) in mask.enumerate_pixels_mut() {
        let d = rounded_rect_distance(x as f32 + 0.5 - pad, y as f32 + 0.5 - pad, w, h, radius);
        if d <= 0.0 {
            *px = Rgba(color);
        } else {
            *px = Rgba([color[0], color[1], color[2], 0]);
        }
    }
    if shadow.blur > 0.0 {
        mask = imageops::blur(&mask, shadow.blur / 2.0);
    }
    let rect = Rect::new(
        layer.x + shadow.offset_x - pad,
        layer.y + shadow.offset_y - pad,
        w + pad * 2.0,
        h + pad * 2.0,
    );
    let center = layer.bounds().center();
    paint_image(
        surface,
        &mask,
        &Placement {
            rect,
            pivot: Point::new(center.x + shadow.offset_x, center.y + shadow.offset_y),
            rotation: layer.rotation,
            flip_h: false,
            flip_v: false,
            opacity: (shadow.opacity / 100.0) * (layer.opacity / 100.0),
        },
    );
}

/// Filter, scale and decorate one layer, then paint it.
pub fn paint_layer(surface: &mut RgbaImage, layer: &ImageLayer) {
    let w = layer.width.round().max(1.0) as u32;
    let h = layer.height.round().max(1.0) as u32;
    let filtered = filters::render_filtered(&layer.source.image, &layer.filters);
    let mut scaled = if filtered.dimensions() == (w, h) {
        filtered
    } else {
        imageops::resize(&filtered, w, h, imageops::FilterType::Triangle)
    };
    if let Some(border) = layer.border.as_ref() {
        apply_border(&mut scaled, border);
    }
    if let Some(shadow) = layer.shadow.as_ref() {
        paint_drop_shadow(surface, layer, shadow);
    }
    paint_image(
        surface,
        &scaled,
        &Placement {
            rect: layer.bounds(),
            pivot: layer.bounds().center(),
            rotation: layer.rotation,
            flip_h: layer.flip_h,
            flip_v: layer.flip_v,
            opacity: layer.opacity / 100.0,
        },
    );
}

fn rotate_about(p: Point, pivot: Point, degrees: f32) -> Point {
    if degrees == 0.0 {
        return p;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = p.x - pivot.x;
    let dy = p.y - pivot.y;
    Point::new(pivot.x + dx * cos - dy * sin, pivot.y + dx * sin + dy * cos)
}

fn plot_square(surface: &mut RgbaImage, center: Point, size: f32, color: [u8; 4]) {
    let half = size * 0.5;
    let x0 = (center.x - half).round() as i64;
    let y0 = (center.y - half).round() as i64;
    let n = size.round() as i64;
    for y in y0..y0 + n {
        for x in x0..x0 + n {
            if x >= 0 && y >= 0 && (x as u32) < surface.width() && (y as u32) < surface.height() {
                surface.put_pixel(x as u32, y as u32, Rgba(color));
            }
        }
    }
}

/// Dashed 2px outline walked along the rectangle perimeter.
fn paint_dashed_rect(surface: &mut RgbaImage, rect: Rect, pivot: Point, rotation: f32) {
    let corners = [
        Point::new(rect.x, rect.y),
        Point::new(rect.right(), rect.y),
        Point::new(rect.right(), rect.bottom()),
        Point::new(rect.x, rect.bottom()),
    ];
    let mut walked = 0i32;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let len = ((b.x - a.x).abs() + (b.y - a.y).abs()).round() as i32;
        for step in 0..len.max(1) {
            if (walked / DASH_LEN) % 2 == 0 {
                let t = step as f32 / len.max(1) as f32;
                let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                plot_square(surface, rotate_about(p, pivot, rotation), 2.0, OVERLAY_COLOR);
            }
            walked += 1;
        }
    }
}

/// Dashed outline plus eight handles around the active layer.
pub fn paint_layer_overlay(surface: &mut RgbaImage, layer: &ImageLayer) {
    let overlay = selection_overlay(layer.bounds());
    let pivot = layer.bounds().center();
    paint_dashed_rect(surface, overlay.outline, pivot, layer.rotation);
    for (_, r) in &overlay.handles {
        let c = rotate_about(r.center(), pivot, layer.rotation);
        plot_square(surface, c, r.width, OVERLAY_COLOR);
        plot_square(surface, c, (r.width - 2.0).max(1.0), [255, 255, 255, 255]);
    }
}

fn paint_text_overlay(surface: &mut RgbaImage, t: &TextObject, fonts: &FontBook, surface_height: f32) {
    let layout = text::layout_text(t, fonts.face(&t.font_family), surface_height);
    let anchor = t.anchor();
    paint_dashed_rect(surface, layout.bounds.expand(text::HIT_PADDING), anchor, t.rotation);
    for (h, r) in text::handle_rects(&layout) {
        let c = rotate_about(r.center(), anchor, t.rotation);
        let color = if h.is_delete() { DELETE_COLOR } else { OVERLAY_COLOR };
        plot_square(surface, c, r.width, color);
    }
}

/// Paint one text object (fill, stroke, shadow) at its opacity and rotation.
pub fn paint_text(surface: &mut RgbaImage, t: &TextObject, fonts: &FontBook) {
    let surface_height = surface.height() as f32;
    let Some(raster) = text::rasterize(t, fonts.face(&t.font_family), surface_height) else {
        return;
    };
    let rect = Rect::new(
        raster.off_x as f32,
        raster.off_y as f32,
        raster.image.width() as f32,
        raster.image.height() as f32,
    );
    paint_image(
        surface,
        &raster.image,
        &Placement {
            rect,
            pivot: t.anchor(),
            rotation: t.rotation,
            flip_h: false,
            flip_v: false,
            opacity: t.opacity / 100.0,
        },
    );
}

/// Render the document to a newly allocated surface.
pub fn render(doc: &Document, fonts: &FontBook, opts: RenderOptions) -> RgbaImage {
    let mut surface = RgbaImage::from_pixel(doc.width.max(1), doc.height.max(1), Rgba(doc.background));
    let (w, h) = (surface.width() as f32, surface.height() as f32);

    if let Some(base) = doc.base.as_ref() {
        let filtered = filters::render_filtered(&base.image, &doc.filters);
        let zoom = doc.filters.zoom;
        let rect = Rect::new((w - w * zoom) / 2.0, (h - h * zoom) / 2.0, w * zoom, h * zoom);
        paint_image(&mut surface, &filtered, &Placement::at(rect));
    }

    for layer in doc.layers.iter().filter(|l| l.visible) {
        paint_layer(&mut surface, layer);
    }

    if opts.include_overlay
        && let Some(layer) = doc.active_layer()
        && layer.visible
    {
        paint_layer_overlay(&mut surface, layer);
    }

    if opts.include_text {
        for t in &doc.texts {
            paint_text(&mut surface, t, fonts);
        }
        if opts.include_overlay
            && let Some(t) = doc.active_text()
        {
            paint_text_overlay(&mut surface, t, fonts, h);
        }
    }

    surface
}
