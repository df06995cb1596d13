// ============================================================================
// TRANSFORM OPERATIONS — resize, rotate, flip, interactive layer drag/resize
// ============================================================================

use image::imageops;
use uuid::Uuid;

use crate::document::{Document, ImageLayer, LayerId, PixelResource};
use crate::error::{EditorError, Result};
use crate::geometry::{Point, Rect};

/// Smallest width or height a layer can be dragged to.
pub const MIN_LAYER_SIZE: f32 = 50.0;
/// Visual side length of a layer selection handle.
pub const LAYER_HANDLE_SIZE: f32 = 8.0;
/// Gap between a layer's box and its dashed outline.
pub const OUTLINE_INSET: f32 = 2.0;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos3,
}

impl Interpolation {
    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

// ---------------------------------------------------------------------------
//  Aspect-locked resize
// ---------------------------------------------------------------------------

/// Working state of a resize request before it is committed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeState {
    pub original_width: u32,
    pub original_height: u32,
    pub width: u32,
    pub height: u32,
    pub lock_aspect: bool,
}

impl ResizeState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            original_width: width,
            original_height: height,
            width,
            height,
            lock_aspect: true,
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.original_height == 0 {
            1.0
        } else {
            self.original_width as f64 / self.original_height as f64
        }
    }

    pub fn on_width_change(&mut self, w: u32) {
        self.width = w;
        if self.lock_aspect {
            self.height = (w as f64 / self.aspect_ratio()).round() as u32;
        }
    }

    pub fn on_height_change(&mut self, h: u32) {
        self.height = h;
        if self.lock_aspect {
            self.width = (h as f64 * self.aspect_ratio()).round() as u32;
        }
    }

    pub fn scale_by_percent(&mut self, percent: f64) {
        self.width = (self.original_width as f64 * percent / 100.0).round() as u32;
        self.height = (self.original_height as f64 * percent / 100.0).round() as u32;
    }

    /// Two-pass clamp: width first, then height. Never enlarges.
    pub fn fit_to_bounds(&mut self, max_w: u32, max_h: u32) {
        let ratio = self.aspect_ratio();
        if self.width > max_w {
            self.width = max_w;
            self.height = (max_w as f64 / ratio).round() as u32;
        }
        if self.height > max_h {
            self.height = max_h;
            self.width = (max_h as f64 * ratio).round() as u32;
        }
    }

    /// Target dimensions, or a geometry error when either is 0 or above
    /// `max_dimension`.
    pub fn validate(&self, max_dimension: u32) -> Result<(u32, u32)> {
        validate_dimensions(self.width, self.height, max_dimension)?;
        Ok((self.width, self.height))
    }
}

pub fn validate_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EditorError::Geometry(format!("resize target {}x{} must be positive", width, height)));
    }
    if width > max_dimension || height > max_dimension {
        return Err(EditorError::Geometry(format!(
            "resize target {}x{} exceeds {}px",
            width, height, max_dimension
        )));
    }
    Ok(())
}

/// Resample the base image and scale every layer box and text anchor by
/// the same factors. Relative font sizes stay put so text follows the
/// surface height on its own.
pub fn resize_document(doc: &mut Document, new_w: u32, new_h: u32, interp: Interpolation) {
    let sx = new_w as f32 / doc.width.max(1) as f32;
    let sy = new_h as f32 / doc.height.max(1) as f32;

    if let Some(base) = doc.base.as_ref() {
        let resized = imageops::resize(base.image.as_ref(), new_w, new_h, interp.to_filter());
        doc.base = Some(PixelResource::new(derived_locator("resize"), resized));
    }
    for layer in &mut doc.layers {
        layer.x *= sx;
        layer.y *= sy;
        layer.width *= sx;
        layer.height *= sy;
    }
    for t in &mut doc.texts {
        t.x *= sx;
        t.y *= sy;
    }
    doc.width = new_w;
    doc.height = new_h;
}

pub(crate) fn derived_locator(kind: &str) -> String {
    format!("derived:{}-{}", kind, Uuid::new_v4())
}

// ---------------------------------------------------------------------------
//  Discrete rotate / flip
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateDirection {
    Clockwise90,
    CounterClockwise90,
    Half,
}

impl RotateDirection {
    pub fn degrees(self) -> f32 {
        match self {
            RotateDirection::Clockwise90 => 90.0,
            RotateDirection::CounterClockwise90 => -90.0,
            RotateDirection::Half => 180.0,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        !matches!(self, RotateDirection::Half)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

fn collage_target(doc: &mut Document) -> Result<&mut ImageLayer> {
    let Some(id) = doc.active_layer().map(|l| l.id) else {
        return Err(EditorError::Geometry("select a layer to transform".into()));
    };
    doc.layer_mut(id)
        .ok_or_else(|| EditorError::Geometry("select a layer to transform".into()))
}

/// Rotate the document. Single-image documents rotate the base buffer and
/// carry text anchors along; collages rotate the active layer in place.
pub fn rotate_document(doc: &mut Document, dir: RotateDirection) -> Result<()> {
    if doc.is_collage() {
        let layer = collage_target(doc)?;
        layer.rotation = (layer.rotation + dir.degrees()).rem_euclid(360.0);
        return Ok(());
    }
    let Some(base) = doc.base.as_ref() else {
        return Err(EditorError::NoDocument);
    };
    let rotated = match dir {
        RotateDirection::Clockwise90 => imageops::rotate90(base.image.as_ref()),
        RotateDirection::CounterClockwise90 => imageops::rotate270(base.image.as_ref()),
        RotateDirection::Half => imageops::rotate180(base.image.as_ref()),
    };
    let (w, h) = (doc.width as f32, doc.height as f32);
    for t in &mut doc.texts {
        let (x, y) = (t.x, t.y);
        (t.x, t.y) = match dir {
            RotateDirection::Clockwise90 => (h - y, x),
            RotateDirection::CounterClockwise90 => (y, w - x),
            RotateDirection::Half => (w - x, h - y),
        };
    }
    if dir.swaps_dimensions() {
        std::mem::swap(&mut doc.width, &mut doc.height);
    }
    doc.base = Some(PixelResource::new(derived_locator("rotate"), rotated));
    Ok(())
}

/// Mirror the document. Same targeting rules as [`rotate_document`].
pub fn flip_document(doc: &mut Document, axis: FlipAxis) -> Result<()> {
    if doc.is_collage() {
        let layer = collage_target(doc)?;
        match axis {
            FlipAxis::Horizontal => layer.flip_h = !layer.flip_h,
            FlipAxis::Vertical => layer.flip_v = !layer.flip_v,
        }
        return Ok(());
    }
    let Some(base) = doc.base.as_ref() else {
        return Err(EditorError::NoDocument);
    };
    let flipped = match axis {
        FlipAxis::Horizontal => imageops::flip_horizontal(base.image.as_ref()),
        FlipAxis::Vertical => imageops::flip_vertical(base.image.as_ref()),
    };
    let (w, h) = (doc.width as f32, doc.height as f32);
    for t in &mut doc.texts {
        match axis {
            FlipAxis::Horizontal => t.x = w - t.x,
            FlipAxis::Vertical => t.y = h - t.y,
        }
    }
    doc.base = Some(PixelResource::new(derived_locator("flip"), flipped));
    Ok(())
}

// ---------------------------------------------------------------------------
//  Layer handles and selection overlay
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerHandle {
    Nw,
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
}

/// Resize cursor shown while hovering a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeCursor {
    NwResize,
    NResize,
    NeResize,
    EResize,
    SeResize,
    SResize,
    SwResize,
    WResize,
}

impl ResizeCursor {
    pub fn css_name(self) -> &'static str {
        match self {
            ResizeCursor::NwResize => "nw-resize",
            ResizeCursor::NResize => "n-resize",
            ResizeCursor::NeResize => "ne-resize",
            ResizeCursor::EResize => "e-resize",
            ResizeCursor::SeResize => "se-resize",
            ResizeCursor::SResize => "s-resize",
            ResizeCursor::SwResize => "sw-resize",
            ResizeCursor::WResize => "w-resize",
        }
    }
}

impl LayerHandle {
    pub fn all() -> &'static [LayerHandle] {
        &[
            LayerHandle::Nw,
            LayerHandle::N,
            LayerHandle::Ne,
            LayerHandle::E,
            LayerHandle::Se,
            LayerHandle::S,
            LayerHandle::Sw,
            LayerHandle::W,
        ]
    }

    pub fn cursor(self) -> ResizeCursor {
        match self {
            LayerHandle::Nw => ResizeCursor::NwResize,
            LayerHandle::N => ResizeCursor::NResize,
            LayerHandle::Ne => ResizeCursor::NeResize,
            LayerHandle::E => ResizeCursor::EResize,
            LayerHandle::Se => ResizeCursor::SeResize,
            LayerHandle::S => ResizeCursor::SResize,
            LayerHandle::Sw => ResizeCursor::SwResize,
            LayerHandle::W => ResizeCursor::WResize,
        }
    }

    /// The handle that stays put while this one is dragged.
    pub fn opposite(self) -> LayerHandle {
        match self {
            LayerHandle::Nw => LayerHandle::Se,
            LayerHandle::N => LayerHandle::S,
            LayerHandle::Ne => LayerHandle::Sw,
            LayerHandle::E => LayerHandle::W,
            LayerHandle::Se => LayerHandle::Nw,
            LayerHandle::S => LayerHandle::N,
            LayerHandle::Sw => LayerHandle::Ne,
            LayerHandle::W => LayerHandle::E,
        }
    }

    fn moves_west(self) -> bool {
        matches!(self, LayerHandle::Nw | LayerHandle::W | LayerHandle::Sw)
    }

    fn moves_east(self) -> bool {
        matches!(self, LayerHandle::Ne | LayerHandle::E | LayerHandle::Se)
    }

    fn moves_north(self) -> bool {
        matches!(self, LayerHandle::Nw | LayerHandle::N | LayerHandle::Ne)
    }

    fn moves_south(self) -> bool {
        matches!(self, LayerHandle::Sw | LayerHandle::S | LayerHandle::Se)
    }

    /// Centre of this handle on the box `r`.
    pub fn anchor_on(self, r: &Rect) -> Point {
        let cx = r.x + r.width / 2.0;
        let cy = r.y + r.height / 2.0;
        match self {
            LayerHandle::Nw => Point::new(r.x, r.y),
            LayerHandle::N => Point::new(cx, r.y),
            LayerHandle::Ne => Point::new(r.right(), r.y),
            LayerHandle::E => Point::new(r.right(), cy),
            LayerHandle::Se => Point::new(r.right(), r.bottom()),
            LayerHandle::S => Point::new(cx, r.bottom()),
            LayerHandle::Sw => Point::new(r.x, r.bottom()),
            LayerHandle::W => Point::new(r.x, cy),
        }
    }
}

/// Derived decoration for the active layer. Never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionOverlay {
    pub outline: Rect,
    pub handles: Vec<(LayerHandle, Rect)>,
}

pub fn selection_overlay(bounds: Rect) -> SelectionOverlay {
    SelectionOverlay {
        outline: bounds.expand(OUTLINE_INSET),
        handles: LayerHandle::all()
            .iter()
            .map(|&h| (h, Rect::centered_square(h.anchor_on(&bounds), LAYER_HANDLE_SIZE)))
            .collect(),
    }
}

fn to_layer_frame(layer: &ImageLayer, p: Point) -> Point {
    if layer.rotation == 0.0 {
        return p;
    }
    let c = layer.bounds().center();
    let (sin, cos) = (-layer.rotation).to_radians().sin_cos();
    let dx = p.x - c.x;
    let dy = p.y - c.y;
    Point::new(c.x + dx * cos - dy * sin, c.y + dx * sin + dy * cos)
}

/// `p` rotated by `degrees` about `pivot`, from the layer's frame to the surface.
fn rotate_point(p: Point, pivot: Point, degrees: f32) -> Point {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = p.x - pivot.x;
    let dy = p.y - pivot.y;
    Point::new(pivot.x + dx * cos - dy * sin, pivot.y + dx * sin + dy * cos)
}

/// Handle of `layer` under `p`, using a square click area of `hit_size`.
pub fn layer_handle_at(layer: &ImageLayer, p: Point, hit_size: f32) -> Option<LayerHandle> {
    let local = to_layer_frame(layer, p);
    let bounds = layer.bounds();
    LayerHandle::all()
        .iter()
        .copied()
        .find(|h| Rect::centered_square(h.anchor_on(&bounds), hit_size).contains(local))
}

/// New box for a handle drag by `(dx, dy)` in the layer's own frame.
/// Opposite edges stay anchored; each axis floors at [`MIN_LAYER_SIZE`]
/// and stops at `max_size`.
pub fn resize_box(
    start: Rect,
    handle: LayerHandle,
    dx: f32,
    dy: f32,
    proportional: bool,
    aspect: f32,
    max_size: f32,
) -> Rect {
    let mut w = start.width;
    let mut h = start.height;
    if handle.moves_west() {
        w -= dx;
    }
    if handle.moves_east() {
        w += dx;
    }
    if handle.moves_north() {
        h -= dy;
    }
    if handle.moves_south() {
        h += dy;
    }

    if proportional && aspect > 0.0 {
        let width_dominant = match handle {
            LayerHandle::E | LayerHandle::W => true,
            LayerHandle::N | LayerHandle::S => false,
            _ => dx.abs() >= dy.abs(),
        };
        if width_dominant {
            h = w / aspect;
        } else {
            w = h * aspect;
        }
    }

    let max_size = max_size.max(MIN_LAYER_SIZE);
    w = w.clamp(MIN_LAYER_SIZE, max_size);
    h = h.clamp(MIN_LAYER_SIZE, max_size);

    let x = if handle.moves_west() { start.right() - w } else { start.x };
    let y = if handle.moves_north() { start.bottom() - h } else { start.y };
    Rect::new(x, y, w, h)
}

/// In-flight pointer gesture on a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGesture {
    pub id: LayerId,
    /// `None` moves the layer, `Some` resizes from that handle.
    pub handle: Option<LayerHandle>,
    pub start_pointer: Point,
    pub start_bounds: Rect,
    /// Aspect ratio captured when the drag began.
    pub start_aspect: f32,
}

impl LayerGesture {
    pub fn begin(layer: &ImageLayer, handle: Option<LayerHandle>, pointer: Point) -> Self {
        Self {
            id: layer.id,
            handle,
            start_pointer: pointer,
            start_bounds: layer.bounds(),
            start_aspect: layer.aspect_ratio(),
        }
    }

    /// Box for the pointer at `p`. On a rotated layer the box is shifted so
    /// the opposite handle stays where it was on screen.
    pub fn update(&self, rotation: f32, p: Point, proportional: bool, max_size: f32) -> Rect {
        let (dx, dy) = p.delta_from(self.start_pointer);
        match self.handle {
            None => Rect::new(
                self.start_bounds.x + dx,
                self.start_bounds.y + dy,
                self.start_bounds.width,
                self.start_bounds.height,
            ),
            Some(handle) => {
                let (sin, cos) = (-rotation).to_radians().sin_cos();
                let lx = dx * cos - dy * sin;
                let ly = dx * sin + dy * cos;
                let r = resize_box(self.start_bounds, handle, lx, ly, proportional, self.start_aspect, max_size);
                if rotation == 0.0 {
                    return r;
                }
                let fixed = handle.opposite();
                let before = rotate_point(fixed.anchor_on(&self.start_bounds), self.start_bounds.center(), rotation);
                let after = rotate_point(fixed.anchor_on(&r), r.center(), rotation);
                Rect::new(r.x + before.x - after.x, r.y + before.y - after.y, r.width, r.height)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextObject;
    use image::{Rgba, RgbaImage};

    #[test]
    fn aspect_locked_resize() {
        let mut s = ResizeState::new(1600, 900);
        s.on_width_change(800);
        assert_eq!((s.width, s.height), (800, 450));
        s.on_height_change(300);
        assert_eq!((s.width, s.height), (533, 300));
    }

    #[test]
    fn unlocked_resize_leaves_other_axis() {
        let mut s = ResizeState::new(1600, 900);
        s.lock_aspect = false;
        s.on_width_change(800);
        assert_eq!((s.width, s.height), (800, 900));
    }

    #[test]
    fn scale_and_fit() {
        let mut s = ResizeState::new(1600, 900);
        s.scale_by_percent(25.0);
        assert_eq!((s.width, s.height), (400, 225));

        let mut s = ResizeState::new(1000, 2000);
        s.fit_to_bounds(800, 800);
        assert_eq!((s.width, s.height), (400, 800));

        let mut small = ResizeState::new(100, 50);
        small.fit_to_bounds(800, 800);
        assert_eq!((small.width, small.height), (100, 50));
    }

    #[test]
    fn dimension_validation() {
        assert!(validate_dimensions(0, 10, 10_000).is_err());
        assert!(validate_dimensions(10_001, 10, 10_000).is_err());
        assert!(validate_dimensions(10_000, 1, 10_000).is_ok());
    }

    #[test]
    fn se_drag_floors_each_axis_independently() {
        let start = Rect::new(0.0, 0.0, 200.0, 100.0);
        let r = resize_box(start, LayerHandle::Se, -180.0, 10.0, false, 2.0, 10_000.0);
        assert_eq!(r.width, 50.0);
        assert_eq!(r.height, 110.0);
        let r = resize_box(start, LayerHandle::Se, 10.0, -90.0, false, 2.0, 10_000.0);
        assert_eq!(r.width, 210.0);
        assert_eq!(r.height, 50.0);
    }

    #[test]
    fn west_handle_keeps_east_edge() {
        let start = Rect::new(100.0, 100.0, 200.0, 100.0);
        let r = resize_box(start, LayerHandle::W, 50.0, 0.0, false, 2.0, 10_000.0);
        assert_eq!(r.right(), 300.0);
        assert_eq!(r.width, 150.0);
    }

    #[test]
    fn proportional_uses_start_aspect() {
        let mut layer = ImageLayer::new(
            "a",
            PixelResource::new("mem://a", RgbaImage::new(2, 1)),
            Rect::new(0.0, 0.0, 200.0, 100.0),
        );
        let g = LayerGesture::begin(&layer, Some(LayerHandle::Se), Point::new(200.0, 100.0));
        // Live box drifts; the gesture still uses 2:1.
        layer.set_bounds(Rect::new(0.0, 0.0, 300.0, 90.0));
        let r = g.update(0.0, Point::new(300.0, 110.0), true, 10_000.0);
        assert_eq!(r.width, 300.0);
        assert_eq!(r.height, 150.0);
    }

    #[test]
    fn drag_stops_at_max_size() {
        let start = Rect::new(0.0, 0.0, 200.0, 100.0);
        let r = resize_box(start, LayerHandle::Se, 5e8, 5e8, false, 2.0, 10_000.0);
        assert_eq!((r.width, r.height), (10_000.0, 10_000.0));
        let r = resize_box(start, LayerHandle::Nw, 5e8, -5e8, false, 2.0, 1_000.0);
        assert_eq!((r.width, r.height), (50.0, 1_000.0));
        assert_eq!(r.bottom(), 100.0);
    }

    #[test]
    fn rotated_resize_keeps_opposite_corner_on_screen() {
        let mut layer = ImageLayer::new(
            "a",
            PixelResource::new("mem://a", RgbaImage::new(2, 1)),
            Rect::new(100.0, 100.0, 200.0, 100.0),
        );
        layer.rotation = 90.0;
        let start = layer.bounds();
        let nw_on_screen = rotate_point(LayerHandle::Nw.anchor_on(&start), start.center(), 90.0);
        let se_on_screen = rotate_point(LayerHandle::Se.anchor_on(&start), start.center(), 90.0);

        let g = LayerGesture::begin(&layer, Some(LayerHandle::Se), se_on_screen);
        // At 90° a screen drag down is a drag east in the layer's frame.
        let r = g.update(90.0, Point::new(se_on_screen.x, se_on_screen.y + 40.0), false, 10_000.0);
        assert!((r.width - 240.0).abs() < 1e-3);
        assert!((r.height - 100.0).abs() < 1e-3);

        let nw_after = rotate_point(LayerHandle::Nw.anchor_on(&r), r.center(), 90.0);
        assert!((nw_after.x - nw_on_screen.x).abs() < 1e-3);
        assert!((nw_after.y - nw_on_screen.y).abs() < 1e-3);
    }

    #[test]
    fn move_gesture_translates() {
        let layer = ImageLayer::new(
            "a",
            PixelResource::new("mem://a", RgbaImage::new(1, 1)),
            Rect::new(10.0, 20.0, 100.0, 100.0),
        );
        let g = LayerGesture::begin(&layer, None, Point::new(50.0, 50.0));
        let r = g.update(0.0, Point::new(60.0, 45.0), false, 10_000.0);
        assert_eq!((r.x, r.y, r.width), (20.0, 15.0, 100.0));
    }

    #[test]
    fn overlay_has_eight_handles_and_inset_outline() {
        let o = selection_overlay(Rect::new(10.0, 10.0, 100.0, 50.0));
        assert_eq!(o.handles.len(), 8);
        assert_eq!(o.outline, Rect::new(8.0, 8.0, 104.0, 54.0));
        let se = o.handles.iter().find(|(h, _)| *h == LayerHandle::Se).map(|(_, r)| *r);
        assert_eq!(se, Some(Rect::new(106.0, 56.0, 8.0, 8.0)));
        assert_eq!(LayerHandle::Sw.cursor().css_name(), "sw-resize");
    }

    #[test]
    fn single_image_rotation_moves_text() {
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut doc = Document::from_image(PixelResource::new("mem://r", img));
        doc.texts.push(TextObject::new("t", Point::new(1.0, 0.5)));
        rotate_document(&mut doc, RotateDirection::Clockwise90).unwrap();
        assert_eq!((doc.width, doc.height), (2, 4));
        let base = doc.base.as_ref().unwrap();
        assert_eq!(*base.image.get_pixel(1, 0), Rgba([255, 0, 0, 255]));
        assert_eq!((doc.texts[0].x, doc.texts[0].y), (1.5, 1.0));
    }

    #[test]
    fn collage_rotation_needs_selected_layer() {
        let mut doc = Document::new_collage(100, 100, [255; 4]);
        doc.layers.push(ImageLayer::new(
            "a",
            PixelResource::new("mem://a", RgbaImage::new(1, 1)),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        ));
        assert!(matches!(
            rotate_document(&mut doc, RotateDirection::Half),
            Err(EditorError::Geometry(_))
        ));
        doc.selection = crate::document::Selection::Layer(doc.layers[0].id);
        flip_document(&mut doc, FlipAxis::Vertical).unwrap();
        rotate_document(&mut doc, RotateDirection::CounterClockwise90).unwrap();
        assert!(doc.layers[0].flip_v);
        assert_eq!(doc.layers[0].rotation, 270.0);
    }

    #[test]
    fn resize_scales_layers_and_text() {
        let mut doc = Document::from_image(PixelResource::new("mem://b", RgbaImage::new(200, 100)));
        doc.texts.push(TextObject::new("t", Point::new(100.0, 50.0)));
        resize_document(&mut doc, 100, 50, Interpolation::Lanczos3);
        assert_eq!((doc.width, doc.height), (100, 50));
        assert_eq!(doc.base.as_ref().map(|b| b.width()), Some(100));
        assert_eq!((doc.texts[0].x, doc.texts[0].y), (50.0, 25.0));
    }
}
