// ============================================================================
// DOCUMENT MODEL — base image, image layers, text objects, selection
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Rect};
use crate::ops::filters::{FilterParam, FilterSettings, SetOutcome};

pub type LayerId = Uuid;
pub type TextId = Uuid;

/// Widest blur a layer or text shadow takes, in pixels.
pub const MAX_SHADOW_BLUR: f32 = 100.0;
/// Largest shadow offset on either axis, in pixels.
pub const MAX_SHADOW_OFFSET: f32 = 1000.0;
/// Widest text stroke, in pixels.
pub const MAX_STROKE_WIDTH: f32 = 100.0;
/// Font size cap as a fraction of the surface height.
pub const MAX_REL_SIZE: f32 = 1.0;
pub const MIN_REL_SIZE: f32 = 0.001;

/// `v` if it is a finite number, else `fallback`.
fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

fn shadow_offset(v: f32, fallback: f32) -> f32 {
    finite_or(v, fallback).clamp(-MAX_SHADOW_OFFSET, MAX_SHADOW_OFFSET)
}

/// A decoded pixel source plus the locator it was decoded from.
/// Pixels are immutable once decoded and shared by `Arc`.
#[derive(Clone, Debug)]
pub struct PixelResource {
    pub locator: String,
    pub image: Arc<RgbaImage>,
}

impl PixelResource {
    pub fn new(locator: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            locator: locator.into(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BorderSpec {
    pub width: f32,
    pub color: [u8; 4],
    pub radius: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropShadow {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur: f32,
    pub color: [u8; 4],
    /// 0..100
    pub opacity: f32,
}

impl DropShadow {
    fn sanitized(mut self) -> Self {
        let d = DropShadow::default();
        self.offset_x = shadow_offset(self.offset_x, d.offset_x);
        self.offset_y = shadow_offset(self.offset_y, d.offset_y);
        self.blur = finite_or(self.blur, d.blur).clamp(0.0, MAX_SHADOW_BLUR);
        self.opacity = finite_or(self.opacity, d.opacity).clamp(0.0, 100.0);
        self
    }
}

impl BorderSpec {
    fn sanitized(mut self) -> Self {
        self.width = finite_or(self.width, 0.0).max(0.0);
        self.radius = finite_or(self.radius, 0.0).max(0.0);
        self
    }
}

impl Default for DropShadow {
    fn default() -> Self {
        Self {
            offset_x: 6.0,
            offset_y: 6.0,
            blur: 8.0,
            color: [0, 0, 0, 255],
            opacity: 50.0,
        }
    }
}

/// One placed image within a collage.
#[derive(Clone, Debug)]
pub struct ImageLayer {
    pub id: LayerId,
    pub name: String,
    pub source: PixelResource,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, about the layer's own centre.
    pub rotation: f32,
    /// 0..100
    pub opacity: f32,
    pub visible: bool,
    pub locked: bool,
    pub flip_h: bool,
    pub flip_v: bool,
    pub filters: FilterSettings,
    pub border: Option<BorderSpec>,
    pub shadow: Option<DropShadow>,
}

impl ImageLayer {
    pub fn new(name: impl Into<String>, source: PixelResource, bounds: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            rotation: 0.0,
            opacity: 100.0,
            visible: true,
            locked: false,
            flip_h: false,
            flip_v: false,
            filters: FilterSettings::default(),
            border: None,
            shadow: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn set_bounds(&mut self, r: Rect) {
        self.x = r.x;
        self.y = r.y;
        self.width = r.width;
        self.height = r.height;
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 { self.width / self.height } else { 1.0 }
    }

    /// Hit test in the layer's rotated frame.
    pub fn contains(&self, p: Point) -> bool {
        let c = self.bounds().center();
        let (sin, cos) = (-self.rotation).to_radians().sin_cos();
        let dx = p.x - c.x;
        let dy = p.y - c.y;
        let local = Point::new(c.x + dx * cos - dy * sin, c.y + dx * sin + dy * cos);
        self.bounds().contains(local)
    }

    /// Apply one field update. Returns the clamp report for filter and
    /// opacity edits.
    pub fn apply_patch(&mut self, patch: LayerPatch) -> Option<SetOutcome> {
        match patch {
            LayerPatch::Name(n) => self.name = n,
            LayerPatch::Position { x, y } => {
                self.x = finite_or(x, self.x);
                self.y = finite_or(y, self.y);
            }
            LayerPatch::Size { width, height } => {
                self.width = finite_or(width, self.width).max(1.0);
                self.height = finite_or(height, self.height).max(1.0);
            }
            LayerPatch::Rotation(deg) => self.rotation = finite_or(deg, self.rotation).rem_euclid(360.0),
            LayerPatch::Opacity(v) => {
                let stored = if v.is_nan() { 100.0 } else { v.clamp(0.0, 100.0) };
                self.opacity = stored;
                return Some(SetOutcome { value: stored, clamped: stored != v });
            }
            LayerPatch::Visible(v) => self.visible = v,
            LayerPatch::Locked(v) => self.locked = v,
            LayerPatch::FlipHorizontal(v) => self.flip_h = v,
            LayerPatch::FlipVertical(v) => self.flip_v = v,
            LayerPatch::Filter(param, value) => return Some(self.filters.set(param, value)),
            LayerPatch::ResetFilters => self.filters = FilterSettings::default(),
            LayerPatch::Border(b) => self.border = b.map(BorderSpec::sanitized),
            LayerPatch::BorderWidth(w) => {
                if let Some(b) = self.border.as_mut() {
                    b.width = finite_or(w, b.width).max(0.0);
                }
            }
            LayerPatch::BorderColor(c) => {
                if let Some(b) = self.border.as_mut() {
                    b.color = c;
                }
            }
            LayerPatch::BorderRadius(r) => {
                if let Some(b) = self.border.as_mut() {
                    b.radius = finite_or(r, b.radius).max(0.0);
                }
            }
            LayerPatch::Shadow(s) => self.shadow = s.map(DropShadow::sanitized),
            LayerPatch::ShadowOffset { x, y } => {
                if let Some(s) = self.shadow.as_mut() {
                    s.offset_x = shadow_offset(x, s.offset_x);
                    s.offset_y = shadow_offset(y, s.offset_y);
                }
            }
            LayerPatch::ShadowBlur(v) => {
                if let Some(s) = self.shadow.as_mut() {
                    s.blur = finite_or(v, s.blur).clamp(0.0, MAX_SHADOW_BLUR);
                }
            }
            LayerPatch::ShadowColor(c) => {
                if let Some(s) = self.shadow.as_mut() {
                    s.color = c;
                }
            }
            LayerPatch::ShadowOpacity(v) => {
                if let Some(s) = self.shadow.as_mut() {
                    s.opacity = finite_or(v, s.opacity).clamp(0.0, 100.0);
                }
            }
        }
        None
    }
}

/// Field-level updates to an [`ImageLayer`].
#[derive(Clone, Debug, PartialEq)]
pub enum LayerPatch {
    Name(String),
    Position { x: f32, y: f32 },
    Size { width: f32, height: f32 },
    Rotation(f32),
    Opacity(f32),
    Visible(bool),
    Locked(bool),
    FlipHorizontal(bool),
    FlipVertical(bool),
    Filter(FilterParam, f32),
    ResetFilters,
    Border(Option<BorderSpec>),
    BorderWidth(f32),
    BorderColor([u8; 4]),
    BorderRadius(f32),
    Shadow(Option<DropShadow>),
    ShadowOffset { x: f32, y: f32 },
    ShadowBlur(f32),
    ShadowColor([u8; 4]),
    ShadowOpacity(f32),
}

/// Text alignment options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlignment {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStroke {
    pub width: f32,
    pub color: [u8; 4],
}

impl TextStroke {
    fn sanitized(mut self) -> Self {
        self.width = finite_or(self.width, 0.0).clamp(0.0, MAX_STROKE_WIDTH);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextShadow {
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub color: [u8; 4],
}

impl TextShadow {
    fn sanitized(mut self) -> Self {
        self.blur = finite_or(self.blur, 0.0).clamp(0.0, MAX_SHADOW_BLUR);
        self.offset_x = shadow_offset(self.offset_x, 0.0);
        self.offset_y = shadow_offset(self.offset_y, 0.0);
        self
    }
}

/// A text overlay anchored in surface coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    pub id: TextId,
    pub content: String,
    pub x: f32,
    pub y: f32,
    /// Font size as a fraction of the surface height.
    pub rel_size: f32,
    pub font_family: String,
    pub color: [u8; 4],
    /// 0..100
    pub opacity: f32,
    pub rotation: f32,
    pub align: TextAlignment,
    pub stroke: Option<TextStroke>,
    pub shadow: Option<TextShadow>,
}

pub const DEFAULT_REL_SIZE: f32 = 0.06;
pub const DEFAULT_FONT_FAMILY: &str = "Sans";

impl TextObject {
    pub fn new(content: impl Into<String>, anchor: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            x: anchor.x,
            y: anchor.y,
            rel_size: DEFAULT_REL_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            color: [255, 255, 255, 255],
            opacity: 100.0,
            rotation: 0.0,
            align: TextAlignment::Center,
            stroke: None,
            shadow: None,
        }
    }

    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn font_px(&self, surface_height: f32) -> f32 {
        self.rel_size * surface_height
    }

    pub fn apply_patch(&mut self, patch: TextPatch) {
        match patch {
            TextPatch::Content(c) => self.content = c,
            TextPatch::Position { x, y } => {
                self.x = finite_or(x, self.x);
                self.y = finite_or(y, self.y);
            }
            TextPatch::RelSize(v) => {
                self.rel_size = finite_or(v, self.rel_size).clamp(MIN_REL_SIZE, MAX_REL_SIZE)
            }
            TextPatch::FontFamily(f) => self.font_family = f,
            TextPatch::Color(c) => self.color = c,
            TextPatch::Opacity(v) => self.opacity = finite_or(v, self.opacity).clamp(0.0, 100.0),
            TextPatch::Rotation(v) => self.rotation = finite_or(v, self.rotation).rem_euclid(360.0),
            TextPatch::Align(a) => self.align = a,
            TextPatch::Stroke(s) => self.stroke = s.map(TextStroke::sanitized),
            TextPatch::StrokeWidth(w) => {
                if let Some(s) = self.stroke.as_mut() {
                    s.width = finite_or(w, s.width).clamp(0.0, MAX_STROKE_WIDTH);
                }
            }
            TextPatch::StrokeColor(c) => {
                if let Some(s) = self.stroke.as_mut() {
                    s.color = c;
                }
            }
            TextPatch::Shadow(s) => self.shadow = s.map(TextShadow::sanitized),
            TextPatch::ShadowBlur(v) => {
                if let Some(s) = self.shadow.as_mut() {
                    s.blur = finite_or(v, s.blur).clamp(0.0, MAX_SHADOW_BLUR);
                }
            }
            TextPatch::ShadowOffset { x, y } => {
                if let Some(s) = self.shadow.as_mut() {
                    s.offset_x = shadow_offset(x, s.offset_x);
                    s.offset_y = shadow_offset(y, s.offset_y);
                }
            }
            TextPatch::ShadowColor(c) => {
                if let Some(s) = self.shadow.as_mut() {
                    s.color = c;
                }
            }
        }
    }
}

/// Field-level updates to a [`TextObject`].
#[derive(Clone, Debug, PartialEq)]
pub enum TextPatch {
    Content(String),
    Position { x: f32, y: f32 },
    RelSize(f32),
    FontFamily(String),
    Color([u8; 4]),
    Opacity(f32),
    Rotation(f32),
    Align(TextAlignment),
    Stroke(Option<TextStroke>),
    StrokeWidth(f32),
    StrokeColor([u8; 4]),
    Shadow(Option<TextShadow>),
    ShadowBlur(f32),
    ShadowOffset { x: f32, y: f32 },
    ShadowColor([u8; 4]),
}

/// At most one active text XOR one active layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    #[default]
    None,
    Text(TextId),
    Layer(LayerId),
}

/// The editable aggregate owned by one editing session.
#[derive(Clone, Debug)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub filters: FilterSettings,
    /// Paint order: index 0 is the bottom.
    pub layers: Vec<ImageLayer>,
    pub texts: Vec<TextObject>,
    pub selection: Selection,
    /// Original decoded source. `None` for collages started without one.
    pub base: Option<PixelResource>,
    /// Fill under collage layers.
    pub background: [u8; 4],
}

impl Document {
    /// Single-image document sized to its base image.
    pub fn from_image(base: PixelResource) -> Self {
        Self {
            width: base.width(),
            height: base.height(),
            filters: FilterSettings::default(),
            layers: Vec::new(),
            texts: Vec::new(),
            selection: Selection::None,
            base: Some(base),
            background: [0, 0, 0, 0],
        }
    }

    /// Empty collage surface.
    pub fn new_collage(width: u32, height: u32, background: [u8; 4]) -> Self {
        Self {
            width,
            height,
            filters: FilterSettings::default(),
            layers: Vec::new(),
            texts: Vec::new(),
            selection: Selection::None,
            base: None,
            background,
        }
    }

    pub fn is_collage(&self) -> bool {
        !self.layers.is_empty()
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&ImageLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut ImageLayer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn text(&self, id: TextId) -> Option<&TextObject> {
        self.texts.iter().find(|t| t.id == id)
    }

    pub fn text_mut(&mut self, id: TextId) -> Option<&mut TextObject> {
        self.texts.iter_mut().find(|t| t.id == id)
    }

    pub fn active_layer(&self) -> Option<&ImageLayer> {
        match self.selection {
            Selection::Layer(id) => self.layer(id),
            _ => None,
        }
    }

    pub fn active_text(&self) -> Option<&TextObject> {
        match self.selection {
            Selection::Text(id) => self.text(id),
            _ => None,
        }
    }

    /// Drop a selection that points at something no longer present.
    pub fn prune_selection(&mut self) {
        let stale = match self.selection {
            Selection::Text(id) => self.text(id).is_none(),
            Selection::Layer(id) => self.layer(id).is_none(),
            Selection::None => false,
        };
        if stale {
            self.selection = Selection::None;
        }
    }

    /// Pull layer boxes, font sizes and effect sizes back inside the
    /// editor's limits. Used after resizes and on loaded project files.
    pub fn enforce_limits(&mut self, max_dimension: u32) {
        let max = max_dimension.max(1) as f32;
        for l in &mut self.layers {
            l.width = finite_or(l.width, 1.0).clamp(1.0, max);
            l.height = finite_or(l.height, 1.0).clamp(1.0, max);
            l.border = l.border.take().map(BorderSpec::sanitized);
            l.shadow = l.shadow.take().map(DropShadow::sanitized);
        }
        for t in &mut self.texts {
            t.rel_size = finite_or(t.rel_size, DEFAULT_REL_SIZE).clamp(MIN_REL_SIZE, MAX_REL_SIZE);
            t.stroke = t.stroke.take().map(TextStroke::sanitized);
            t.shadow = t.shadow.take().map(TextShadow::sanitized);
        }
    }

    pub fn surface_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }
}
