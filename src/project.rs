use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::components::history::{
    self, DecodedRestore, DocumentState, HistoryManager, RestoreGate, RestoreTicket, SnapshotKind,
};
use crate::components::layers::{self, LayerMove};
use crate::compositor::{self, RenderOptions};
use crate::document::{
    Document, LayerId, LayerPatch, MAX_REL_SIZE, PixelResource, Selection, TextId, TextObject, TextPatch,
};
use crate::error::{EditorError, Result};
use crate::geometry::{Point, Rect};
use crate::io::{
    self, ConvertedAsset, ExportFormat, ExportOptions, GalleryImage, ImageLoader, RemoteConverter,
};
use crate::ops::crop::{self, CropState, PreCropSlot};
use crate::ops::filters::{self, FilterParam, FilterSettings, SetOutcome, TransformDescriptor};
use crate::ops::text::{self, FontBook, TextGesture, TextHandle, TextLayout};
use crate::ops::transform::{
    self, FlipAxis, Interpolation, LayerGesture, LayerHandle, ResizeCursor, ResizeState, RotateDirection,
};
use crate::presets::Preset;
use crate::settings::EditorSettings;

/// Click area for layer handles, larger than the drawn 8px square.
const LAYER_HANDLE_HIT: f32 = transform::LAYER_HANDLE_SIZE * 1.5;

/// What a pointer press landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Nothing,
    Text(TextId),
    TextHandle(TextId, TextHandle),
    /// The delete handle was pressed and the text is gone.
    TextDeleted(TextId),
    Layer(LayerId),
    LayerHandle(LayerId, LayerHandle),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RestoreOutcome {
    /// Nothing to undo/redo.
    Nothing,
    /// Applied; names of layers that failed to decode and were dropped.
    Restored { dropped: Vec<String> },
    /// A newer restore started before this one finished.
    Superseded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerLoadReport {
    pub added: Vec<LayerId>,
    pub failed: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CropReport {
    pub width: u32,
    pub height: u32,
    pub removed_texts: Vec<TextId>,
}

/// One editing session: the document plus everything that edits it.
///
/// Every entry point that changes the document re-renders the surface;
/// document-level edits also record a history snapshot. Failed entry
/// points leave both untouched.
pub struct EditorSession {
    pub id: Uuid,
    /// Display name (derived from the loaded image or project file)
    pub name: String,
    /// `None` until saved as a project file.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    settings: EditorSettings,
    document: Option<Document>,
    history: HistoryManager,
    text_history: HistoryManager<Vec<TextObject>>,
    crop: CropState,
    pre_crop: Option<PreCropSlot>,
    restore_gate: RestoreGate,
    text_gesture: Option<TextGesture>,
    layer_gesture: Option<LayerGesture>,
    fonts: FontBook,
    loader: Arc<dyn ImageLoader>,
    surface: Option<RgbaImage>,
}

impl EditorSession {
    pub fn new(settings: EditorSettings, loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Untitled".to_string(),
            path: None,
            is_dirty: false,
            history: HistoryManager::new(settings.history_cap),
            text_history: HistoryManager::new(settings.text_history_cap),
            settings,
            document: None,
            crop: CropState::Idle,
            pre_crop: None,
            restore_gate: RestoreGate::default(),
            text_gesture: None,
            layer_gesture: None,
            fonts: FontBook::new(),
            loader,
            surface: None,
        }
    }

    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Last rendered editor view, with selection overlay.
    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    fn doc(&self) -> Result<&Document> {
        self.document.as_ref().ok_or(EditorError::NoDocument)
    }

    fn doc_mut(&mut self) -> Result<&mut Document> {
        self.document.as_mut().ok_or(EditorError::NoDocument)
    }

    fn refresh(&mut self) {
        self.surface = self
            .document
            .as_ref()
            .map(|d| compositor::render(d, &self.fonts, RenderOptions::EDITOR));
    }

    /// Render, then snapshot.
    fn commit(&mut self, description: &str, kind: SnapshotKind) {
        self.refresh();
        let Some(doc) = self.document.as_ref() else { return };
        self.history.save_state(doc, description, kind);
        let texts_changed = self.text_history.current().is_none_or(|e| e.state != doc.texts);
        if texts_changed {
            self.text_history.record(description, kind, doc.texts.clone());
        }
        self.is_dirty = true;
    }

    fn install_document(&mut self, mut doc: Document, name: String) {
        doc.enforce_limits(self.settings.max_dimension);
        self.document = Some(doc);
        self.history.clear();
        self.text_history.clear();
        self.crop.cancel();
        self.pre_crop = None;
        self.text_gesture = None;
        self.layer_gesture = None;
        self.restore_gate.advance();
        self.name = name;
        self.path = None;
        self.commit("Open", SnapshotKind::Initial);
        self.is_dirty = false;
    }

    /// Drop the document and all history.
    pub fn reset(&mut self) {
        self.document = None;
        self.surface = None;
        self.history.clear();
        self.text_history.clear();
        self.crop.cancel();
        self.pre_crop = None;
        self.text_gesture = None;
        self.layer_gesture = None;
        self.restore_gate.advance();
        self.is_dirty = false;
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Decode `locator` through the loader and start a single-image document.
    pub async fn load_image(&mut self, locator: &str) -> Result<()> {
        let loader = Arc::clone(&self.loader);
        let img = loader.load(locator).await.inspect_err(|e| {
            crate::log_err!("Failed to load {}: {}", locator, e);
        })?;
        let name = display_name(locator);
        self.install_document(Document::from_image(PixelResource::new(locator, img)), name);
        crate::log_info!("Loaded {}", locator);
        Ok(())
    }

    /// Validate and decode an uploaded file.
    pub fn load_image_bytes(&mut self, bytes: &[u8], file_name: &str) -> Result<()> {
        io::validate_upload(bytes, file_name, self.settings.max_upload_bytes).inspect_err(|e| {
            crate::log_warn!("Rejected upload {}: {}", file_name, e);
        })?;
        let img = io::decode_bytes(bytes).inspect_err(|e| {
            crate::log_err!("Failed to decode {}: {}", file_name, e);
        })?;
        self.install_document(
            Document::from_image(PixelResource::new(file_name, img)),
            display_name(file_name),
        );
        Ok(())
    }

    /// Decode gallery images strictly in input order.
    async fn decode_gallery(&self, images: &[GalleryImage]) -> (Vec<(String, PixelResource)>, Vec<String>) {
        let loader = Arc::clone(&self.loader);
        let mut decoded = Vec::with_capacity(images.len());
        let mut failed = Vec::new();
        for img in images {
            match loader.load(&img.url).await {
                Ok(px) => decoded.push((img.name.clone(), PixelResource::new(img.url.clone(), px))),
                Err(e) => {
                    crate::log_warn!("Skipping gallery image '{}' ({}): {}", img.name, img.url, e);
                    failed.push(img.name.clone());
                }
            }
        }
        (decoded, failed)
    }

    /// Start a collage from gallery images. Fails, leaving the current
    /// document in place, when none of them decode.
    pub async fn create_collage(&mut self, images: &[GalleryImage]) -> Result<LayerLoadReport> {
        if images.is_empty() {
            return Err(EditorError::Validation("a collage needs at least one image".into()));
        }
        let (decoded, failed) = self.decode_gallery(images).await;
        if decoded.is_empty() {
            return Err(EditorError::Validation("none of the selected images could be loaded".into()));
        }
        let mut doc = Document::new_collage(
            self.settings.collage_width,
            self.settings.collage_height,
            self.settings.collage_background,
        );
        let added = decoded
            .into_iter()
            .map(|(name, px)| layers::add_layer(&mut doc, name, px))
            .collect();
        self.install_document(doc, "Collage".to_string());
        Ok(LayerLoadReport { added, failed })
    }

    /// Append gallery images as new top layers, in input order.
    pub async fn add_image_layers(&mut self, images: &[GalleryImage]) -> Result<LayerLoadReport> {
        self.doc()?;
        let (decoded, failed) = self.decode_gallery(images).await;
        if decoded.is_empty() {
            return Err(EditorError::Validation("none of the selected images could be loaded".into()));
        }
        let doc = self.doc_mut()?;
        let added: Vec<LayerId> = decoded
            .into_iter()
            .map(|(name, px)| layers::add_layer(doc, name, px))
            .collect();
        let description = if added.len() == 1 {
            "Add layer".to_string()
        } else {
            format!("Add {} layers", added.len())
        };
        self.commit(&description, SnapshotKind::Layer);
        Ok(LayerLoadReport { added, failed })
    }

    // ========================================================================
    // FILTERS
    // ========================================================================

    pub fn set_filter(&mut self, param: FilterParam, value: f32) -> Result<SetOutcome> {
        let doc = self.doc_mut()?;
        let before = doc.filters.get(param);
        let outcome = doc.filters.set(param, value);
        if outcome.value != before {
            self.commit(&format!("Adjust {}", param.name()), SnapshotKind::Filter);
        }
        Ok(outcome)
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        let doc = self.doc_mut()?;
        if doc.filters.is_neutral() {
            return Ok(());
        }
        doc.filters = FilterSettings::default();
        self.commit("Reset filters", SnapshotKind::Filter);
        Ok(())
    }

    /// Replace the look with a preset's values. Zoom is a view setting
    /// and is kept.
    pub fn apply_preset(&mut self, preset: &Preset) -> Result<()> {
        let doc = self.doc_mut()?;
        let zoom = doc.filters.zoom;
        let mut filters = preset.filters.clone();
        filters.clamp_all();
        filters.zoom = zoom;
        doc.filters = filters;
        self.commit(&format!("Apply preset {}", preset.name), SnapshotKind::Preset);
        Ok(())
    }

    pub fn filter_descriptor(&self) -> Result<TransformDescriptor> {
        Ok(filters::apply_filters(&self.doc()?.filters))
    }

    // ========================================================================
    // TEXT
    // ========================================================================

    /// Add a text at `anchor` (surface centre when `None`) and select it.
    pub fn add_text(&mut self, content: &str, anchor: Option<Point>) -> Result<TextId> {
        let doc = self.doc_mut()?;
        let anchor = anchor.unwrap_or_else(|| doc.surface_rect().center());
        let t = TextObject::new(content, anchor);
        let id = t.id;
        doc.texts.push(t);
        doc.selection = Selection::Text(id);
        self.commit("Add text", SnapshotKind::Text);
        Ok(id)
    }

    pub fn update_text(&mut self, id: TextId, patch: TextPatch) -> Result<()> {
        let max = self.settings.max_dimension as f32;
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        if let TextPatch::RelSize(v) = patch {
            let px = v * doc.height as f32;
            if !v.is_finite() || v > MAX_REL_SIZE || px > max {
                return Err(EditorError::Validation(format!(
                    "font size {} of the surface height is out of range",
                    v
                )));
            }
        }
        let t = doc
            .text_mut(id)
            .ok_or_else(|| EditorError::Validation(format!("unknown text {}", id)))?;
        if let TextPatch::FontFamily(family) = &patch
            && !self.fonts.has_family(family)
        {
            crate::log_warn!("Font '{}' is not registered, falling back", family);
        }
        let before = t.clone();
        t.apply_patch(patch);
        if *t != before {
            self.commit("Edit text", SnapshotKind::Text);
        }
        Ok(())
    }

    pub fn delete_text(&mut self, id: TextId) -> Result<()> {
        let doc = self.doc_mut()?;
        let before = doc.texts.len();
        doc.texts.retain(|t| t.id != id);
        if doc.texts.len() == before {
            return Err(EditorError::Validation(format!("unknown text {}", id)));
        }
        doc.prune_selection();
        self.commit("Delete text", SnapshotKind::Text);
        Ok(())
    }

    pub fn text_layout(&self, id: TextId) -> Result<TextLayout> {
        let doc = self.doc()?;
        let t = doc
            .text(id)
            .ok_or_else(|| EditorError::Validation(format!("unknown text {}", id)))?;
        Ok(text::layout_text(t, self.fonts.face(&t.font_family), doc.height as f32))
    }

    /// Step the text-only history back. Recorded in the main history too.
    pub fn undo_text(&mut self) -> Result<bool> {
        self.doc()?;
        let Some(entry) = self.text_history.undo() else { return Ok(false) };
        let texts = entry.state.clone();
        let doc = self.doc_mut()?;
        doc.texts = texts;
        doc.prune_selection();
        self.commit("Undo text edit", SnapshotKind::Text);
        Ok(true)
    }

    pub fn redo_text(&mut self) -> Result<bool> {
        self.doc()?;
        let Some(entry) = self.text_history.redo() else { return Ok(false) };
        let texts = entry.state.clone();
        let doc = self.doc_mut()?;
        doc.texts = texts;
        doc.prune_selection();
        self.commit("Redo text edit", SnapshotKind::Text);
        Ok(true)
    }

    // ========================================================================
    // SELECTION & POINTER GESTURES
    // ========================================================================

    pub fn select(&mut self, selection: Selection) -> Result<()> {
        let doc = self.doc_mut()?;
        doc.selection = selection;
        doc.prune_selection();
        self.refresh();
        Ok(())
    }

    fn hit_target(&self, p: Point) -> Result<PointerTarget> {
        let doc = self.doc()?;
        let surface_h = doc.height as f32;

        if let Some(t) = doc.active_text() {
            let layout = text::layout_text(t, self.fonts.face(&t.font_family), surface_h);
            if let Some(h) = text::handle_at(t, &layout, p, self.settings.handle_hit_size) {
                return Ok(PointerTarget::TextHandle(t.id, h));
            }
        }
        for t in doc.texts.iter().rev() {
            let layout = text::layout_text(t, self.fonts.face(&t.font_family), surface_h);
            if text::hit_test(t, &layout, p) {
                return Ok(PointerTarget::Text(t.id));
            }
        }
        if let Some(l) = doc.active_layer()
            && l.visible
            && let Some(h) = transform::layer_handle_at(l, p, LAYER_HANDLE_HIT)
        {
            return Ok(PointerTarget::LayerHandle(l.id, h));
        }
        Ok(layers::layer_at(doc, p).map_or(PointerTarget::Nothing, PointerTarget::Layer))
    }

    /// Press at `p`: select what is there and start the matching gesture.
    /// Pressing a text's delete handle deletes it immediately.
    pub fn pointer_down(&mut self, p: Point) -> Result<PointerTarget> {
        let target = self.hit_target(p)?;
        self.text_gesture = None;
        self.layer_gesture = None;
        if let PointerTarget::TextHandle(id, h) = target
            && h.is_delete()
        {
            self.delete_text(id)?;
            return Ok(PointerTarget::TextDeleted(id));
        }
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let surface_h = doc.height as f32;

        match target {
            PointerTarget::TextHandle(id, h) => {
                if let Some(t) = doc.text(id) {
                    self.text_gesture = Some(TextGesture::Resize {
                        id,
                        handle: h,
                        start_pointer: p,
                        original_px: t.font_px(surface_h),
                    });
                }
                doc.selection = Selection::Text(id);
            }
            PointerTarget::Text(id) => {
                if let Some(t) = doc.text(id) {
                    self.text_gesture = Some(TextGesture::Move {
                        id,
                        start_pointer: p,
                        start_anchor: t.anchor(),
                    });
                }
                doc.selection = Selection::Text(id);
            }
            PointerTarget::LayerHandle(id, h) => {
                if let Some(l) = doc.layer(id).filter(|l| !l.locked) {
                    self.layer_gesture = Some(LayerGesture::begin(l, Some(h), p));
                }
                doc.selection = Selection::Layer(id);
            }
            PointerTarget::Layer(id) => {
                if let Some(l) = doc.layer(id).filter(|l| !l.locked) {
                    self.layer_gesture = Some(LayerGesture::begin(l, None, p));
                }
                doc.selection = Selection::Layer(id);
            }
            PointerTarget::TextDeleted(_) | PointerTarget::Nothing => doc.selection = Selection::None,
        }
        self.refresh();
        Ok(target)
    }

    /// Drag frame. Updates geometry and re-renders without snapshotting.
    pub fn pointer_move(&mut self, p: Point, proportional: bool) -> Result<bool> {
        let text_gesture = self.text_gesture.clone();
        let layer_gesture = self.layer_gesture.clone();
        let max_size = self.settings.max_dimension as f32;
        let doc = self.doc_mut()?;
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Ok(false);
        }
        let surface_h = doc.height as f32;
        let mut moved = false;

        if let Some(g) = text_gesture
            && let Some(t) = doc.text_mut(g.id())
        {
            g.update(t, p, surface_h);
            moved = true;
        }
        if let Some(g) = layer_gesture
            && let Some(l) = doc.layer_mut(g.id)
        {
            let rect = g.update(l.rotation, p, proportional, max_size);
            l.set_bounds(rect);
            moved = true;
        }
        if moved {
            self.refresh();
        }
        Ok(moved)
    }

    /// End the gesture. Snapshots once if anything actually changed.
    pub fn pointer_up(&mut self) -> Result<bool> {
        let text_gesture = self.text_gesture.take();
        let layer_gesture = self.layer_gesture.take();
        let doc = self.doc()?;
        let surface_h = doc.height as f32;

        let description = match (&text_gesture, &layer_gesture) {
            (Some(TextGesture::Move { id, start_anchor, .. }), _) => doc
                .text(*id)
                .filter(|t| t.anchor() != *start_anchor)
                .map(|_| "Move text"),
            (Some(TextGesture::Resize { id, original_px, .. }), _) => doc
                .text(*id)
                .filter(|t| t.font_px(surface_h) != *original_px)
                .map(|_| "Resize text"),
            (None, Some(g)) => doc.layer(g.id).filter(|l| l.bounds() != g.start_bounds).map(|_| {
                if g.handle.is_some() { "Resize layer" } else { "Move layer" }
            }),
            (None, None) => None,
        };
        match description {
            Some(d) => {
                let kind = if text_gesture.is_some() { SnapshotKind::Text } else { SnapshotKind::Layer };
                self.commit(d, kind);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resize cursor for the active layer's handle under `p`.
    pub fn cursor_at(&self, p: Point) -> Option<ResizeCursor> {
        let layer = self.document.as_ref()?.active_layer()?;
        if layer.locked {
            return None;
        }
        transform::layer_handle_at(layer, p, LAYER_HANDLE_HIT).map(|h| h.cursor())
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    pub fn update_layer(&mut self, id: LayerId, patch: LayerPatch) -> Result<Option<SetOutcome>> {
        let max = self.settings.max_dimension as f32;
        if let LayerPatch::Size { width, height } = patch
            && !(width.is_finite() && height.is_finite() && width <= max && height <= max)
        {
            return Err(EditorError::Validation(format!(
                "layer size {}×{} exceeds {}px",
                width, height, max
            )));
        }
        let doc = self.doc_mut()?;
        let layer = doc
            .layer_mut(id)
            .ok_or_else(|| EditorError::Validation(format!("unknown layer {}", id)))?;
        let before = layer.clone();
        let outcome = layer.apply_patch(patch);
        let changed = layer.bounds() != before.bounds()
            || layer.name != before.name
            || layer.rotation != before.rotation
            || layer.opacity != before.opacity
            || layer.visible != before.visible
            || layer.locked != before.locked
            || layer.flip_h != before.flip_h
            || layer.flip_v != before.flip_v
            || layer.filters != before.filters
            || layer.border != before.border
            || layer.shadow != before.shadow;
        if changed {
            self.commit("Edit layer", SnapshotKind::Layer);
        }
        Ok(outcome)
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<()> {
        let doc = self.doc_mut()?;
        layers::remove_layer(doc, id).ok_or_else(|| EditorError::Validation(format!("unknown layer {}", id)))?;
        self.commit("Remove layer", SnapshotKind::Layer);
        Ok(())
    }

    pub fn duplicate_layer(&mut self, id: LayerId) -> Result<LayerId> {
        let doc = self.doc_mut()?;
        let new_id = layers::duplicate_layer(doc, id)
            .ok_or_else(|| EditorError::Validation(format!("unknown layer {}", id)))?;
        self.commit("Duplicate layer", SnapshotKind::Layer);
        Ok(new_id)
    }

    /// Reorder. Boundary moves return false and record nothing.
    pub fn move_layer(&mut self, id: LayerId, mv: LayerMove) -> Result<bool> {
        let doc = self.doc_mut()?;
        if !layers::move_layer(doc, id, mv) {
            return Ok(false);
        }
        self.commit("Reorder layer", SnapshotKind::Layer);
        Ok(true)
    }

    // ========================================================================
    // CROP
    // ========================================================================

    pub fn start_crop(&mut self, p: Point) -> Result<()> {
        self.doc()?;
        self.crop.start(p);
        Ok(())
    }

    pub fn update_crop(&mut self, p: Point) {
        self.crop.update(p);
    }

    pub fn crop_selection(&self) -> Option<Rect> {
        self.crop.selection()
    }

    pub fn cancel_crop(&mut self) {
        self.crop.cancel();
    }

    /// Commit the live crop rectangle. The composite is flattened into the
    /// new base: layers are merged and filters reset since both are baked in.
    pub fn finish_crop(&mut self) -> Result<CropReport> {
        let rect = self.crop.selection();
        self.crop.cancel();
        let rect = rect.ok_or_else(|| EditorError::Geometry("no crop in progress".into()))?;
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        crop::validate_crop(rect, doc.width, doc.height).inspect_err(|e| {
            crate::log_info!("Crop rejected: {}", e);
        })?;

        let composite = compositor::render(doc, &self.fonts, RenderOptions::IMAGE_ONLY);
        // A crop on top of a pending one ends undo-crop for both.
        self.pre_crop = match self.pre_crop.take() {
            Some(_) => None,
            None => Some(PreCropSlot {
                image: Arc::new(composite.clone()),
                width: doc.width,
                height: doc.height,
                texts: doc.texts.clone(),
                selection: doc.selection,
            }),
        };
        let cropped = crop::extract(&composite, rect);
        let (w, h) = cropped.dimensions();

        let doc = self.doc_mut()?;
        let removed_texts = crop::rebase_texts(&mut doc.texts, Point::new(rect.x, rect.y), w, h);
        doc.base = Some(PixelResource::new(transform::derived_locator("crop"), cropped));
        doc.width = w;
        doc.height = h;
        doc.layers.clear();
        doc.filters = FilterSettings::default();
        doc.prune_selection();
        self.commit("Crop", SnapshotKind::Crop);
        Ok(CropReport { width: w, height: h, removed_texts })
    }

    pub fn can_undo_crop(&self) -> bool {
        self.pre_crop.is_some()
    }

    /// Put the pre-crop composite back and clear the slot.
    pub fn undo_crop(&mut self) -> Result<()> {
        self.doc()?;
        let slot = self
            .pre_crop
            .take()
            .ok_or_else(|| EditorError::Geometry("no crop to undo".into()))?;
        let doc = self.doc_mut()?;
        doc.base = Some(PixelResource {
            locator: transform::derived_locator("precrop"),
            image: slot.image,
        });
        doc.width = slot.width;
        doc.height = slot.height;
        doc.texts = slot.texts;
        doc.layers.clear();
        doc.filters = FilterSettings::default();
        doc.selection = slot.selection;
        doc.prune_selection();
        self.commit("Undo crop", SnapshotKind::Crop);
        Ok(())
    }

    // ========================================================================
    // RESIZE / ROTATE / FLIP
    // ========================================================================

    /// Aspect-locked resize state seeded with the current dimensions.
    pub fn resize_state(&self) -> Result<ResizeState> {
        let doc = self.doc()?;
        Ok(ResizeState::new(doc.width, doc.height))
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let max = self.settings.max_dimension;
        let doc = self.doc_mut()?;
        transform::validate_dimensions(width, height, max).inspect_err(|e| {
            crate::log_info!("Resize rejected: {}", e);
        })?;
        if (width, height) == (doc.width, doc.height) {
            return Ok(());
        }
        transform::resize_document(doc, width, height, Interpolation::Lanczos3);
        doc.enforce_limits(max);
        self.pre_crop = None;
        self.commit("Resize", SnapshotKind::Transform);
        Ok(())
    }

    pub fn rotate(&mut self, dir: RotateDirection) -> Result<()> {
        transform::rotate_document(self.doc_mut()?, dir)?;
        self.pre_crop = None;
        self.commit("Rotate", SnapshotKind::Transform);
        Ok(())
    }

    pub fn flip(&mut self, axis: FlipAxis) -> Result<()> {
        transform::flip_document(self.doc_mut()?, axis)?;
        self.pre_crop = None;
        self.commit("Flip", SnapshotKind::Transform);
        Ok(())
    }

    // ========================================================================
    // UNDO / REDO
    // ========================================================================

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub async fn undo(&mut self) -> Result<RestoreOutcome> {
        self.doc()?;
        let Some(entry) = self.history.undo() else { return Ok(RestoreOutcome::Nothing) };
        let state = entry.state.clone();
        self.restore(&state).await
    }

    pub async fn redo(&mut self) -> Result<RestoreOutcome> {
        self.doc()?;
        let Some(entry) = self.history.redo() else { return Ok(RestoreOutcome::Nothing) };
        let state = entry.state.clone();
        self.restore(&state).await
    }

    async fn restore(&mut self, state: &DocumentState) -> Result<RestoreOutcome> {
        let ticket = self.begin_restore(state)?;
        let loader = Arc::clone(&self.loader);
        let decoded = ticket.decode(loader.as_ref()).await;
        Ok(self.finish_restore(decoded))
    }

    /// Synchronous half of a restore: filters, texts and surface geometry
    /// apply now; the returned ticket carries the layers to decode.
    pub fn begin_restore(&mut self, state: &DocumentState) -> Result<RestoreTicket> {
        self.doc()?;
        // Stepping through history leaves the state the undo-crop slot was taken for.
        self.pre_crop = None;
        self.text_gesture = None;
        self.layer_gesture = None;
        self.crop.cancel();
        let generation = self.restore_gate.advance();
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let ticket = history::begin_restore(doc, state, generation);
        self.refresh();
        Ok(ticket)
    }

    /// Swap in decoded layers unless a newer restore has started.
    pub fn finish_restore(&mut self, decoded: DecodedRestore) -> RestoreOutcome {
        let Some(doc) = self.document.as_mut() else { return RestoreOutcome::Superseded };
        let dropped = decoded.dropped.clone();
        if !history::finish_restore(doc, &self.restore_gate, decoded) {
            return RestoreOutcome::Superseded;
        }
        self.refresh();
        self.is_dirty = true;
        RestoreOutcome::Restored { dropped }
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Final composite: text included, no selection chrome.
    pub fn render_output(&self) -> Result<RgbaImage> {
        Ok(compositor::render(self.doc()?, &self.fonts, RenderOptions::EXPORT))
    }

    pub fn export(&self, format: ExportFormat, quality: Option<u8>) -> Result<Vec<u8>> {
        let opts = ExportOptions {
            quality: Some(quality.unwrap_or(self.settings.default_quality)),
            ..Default::default()
        };
        self.export_with(format, &opts)
    }

    pub fn export_with(&self, format: ExportFormat, opts: &ExportOptions) -> Result<Vec<u8>> {
        if !format.is_local() {
            return Err(EditorError::Validation(format!(
                "{} export goes through the remote converter",
                format.extension()
            )));
        }
        let img = self.render_output()?;
        io::encode_to_buffer(&img, format, opts).inspect_err(|e| {
            crate::log_err!("Export to {} failed: {}", format.extension(), e);
        })
    }

    /// Export through the remote converter. The document is never touched.
    pub async fn export_remote(
        &self,
        format: ExportFormat,
        quality: Option<u8>,
        converter: &dyn RemoteConverter,
    ) -> Result<ConvertedAsset> {
        let img = self.render_output()?;
        let quality = quality.or(Some(self.settings.default_quality));
        io::convert_remote(&img, format, quality, converter).await.inspect_err(|e| {
            crate::log_err!("Remote export to {} failed: {}", format.extension(), e);
        })
    }

    pub fn export_to_path(&self, path: &Path, format: Option<ExportFormat>, quality: Option<u8>) -> Result<()> {
        let format = match format {
            Some(f) => f,
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(ExportFormat::from_extension)
                .ok_or_else(|| EditorError::Validation(format!("cannot infer format for {}", path.display())))?,
        };
        let bytes = self.export(format, quality)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    // ========================================================================
    // PROJECT FILES
    // ========================================================================

    pub fn save_project(&mut self, path: &Path) -> Result<()> {
        io::save_document(self.doc()?, path)?;
        self.path = Some(path.to_path_buf());
        self.name = display_name(&path.to_string_lossy());
        self.is_dirty = false;
        Ok(())
    }

    /// Open a project file. Returns the names of layers that could not be
    /// decoded and were left out.
    pub async fn open_project(&mut self, path: &Path) -> Result<Vec<String>> {
        let loader = Arc::clone(&self.loader);
        let (doc, dropped) = io::load_document(path, loader.as_ref()).await?;
        transform::validate_dimensions(doc.width, doc.height, self.settings.max_dimension)?;
        self.install_document(doc, display_name(&path.to_string_lossy()));
        self.path = Some(path.to_path_buf());
        Ok(dropped)
    }
}

fn display_name(locator: &str) -> String {
    Path::new(locator.strip_prefix("file://").unwrap_or(locator))
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryLoader;
    use image::Rgba;
    use pollster::block_on;

    fn session_with(images: &[(&str, u32, u32)]) -> (EditorSession, Arc<MemoryLoader>) {
        let loader = Arc::new(MemoryLoader::new());
        for &(locator, w, h) in images {
            loader.insert(locator, RgbaImage::from_pixel(w, h, Rgba([40, 80, 120, 255])));
        }
        let session = EditorSession::new(EditorSettings::default(), loader.clone());
        (session, loader)
    }

    fn gallery(urls: &[&str]) -> Vec<GalleryImage> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| GalleryImage { id: i.to_string(), url: u.to_string(), name: format!("img{}", i) })
            .collect()
    }

    /// Comparable view: filters, texts, layer geometry.
    fn observable(s: &EditorSession) -> (FilterSettings, Vec<TextObject>, Vec<(LayerId, Rect, f32)>) {
        let doc = s.document().unwrap();
        (
            doc.filters.clone(),
            doc.texts.clone(),
            doc.layers.iter().map(|l| (l.id, l.bounds(), l.rotation)).collect(),
        )
    }

    #[test]
    fn undo_redo_replays_exactly() {
        let (mut s, _loader) = session_with(&[("mem://a", 300, 200), ("mem://b", 200, 300)]);
        block_on(s.create_collage(&gallery(&["mem://a", "mem://b"]))).unwrap();
        let mut states = vec![observable(&s)];

        let layer = s.document().unwrap().layers[0].id;
        s.set_filter(FilterParam::Brightness, 130.0).unwrap();
        states.push(observable(&s));
        let t = s.add_text("Hello", Some(Point::new(100.0, 100.0))).unwrap();
        states.push(observable(&s));
        s.update_layer(layer, LayerPatch::Position { x: 5.0, y: 7.0 }).unwrap();
        states.push(observable(&s));
        s.update_text(t, TextPatch::Content("Bye".into())).unwrap();
        states.push(observable(&s));
        s.move_layer(layer, LayerMove::Top).unwrap();
        states.push(observable(&s));

        for expected in states.iter().rev().skip(1) {
            assert!(matches!(block_on(s.undo()).unwrap(), RestoreOutcome::Restored { .. }));
            assert_eq!(&observable(&s), expected);
        }
        assert_eq!(block_on(s.undo()).unwrap(), RestoreOutcome::Nothing);
        for expected in states.iter().skip(1) {
            block_on(s.redo()).unwrap();
            assert_eq!(&observable(&s), expected);
        }
        assert!(!s.can_redo());
    }

    #[test]
    fn new_edit_after_undo_discards_redo() {
        let (mut s, _loader) = session_with(&[("mem://a", 50, 50)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.set_filter(FilterParam::Contrast, 120.0).unwrap();
        s.set_filter(FilterParam::Contrast, 140.0).unwrap();
        block_on(s.undo()).unwrap();
        assert!(s.can_redo());
        s.set_filter(FilterParam::Sepia, 30.0).unwrap();
        assert!(!s.can_redo());
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn clamped_filter_is_reported() {
        let (mut s, _loader) = session_with(&[("mem://a", 10, 10)]);
        block_on(s.load_image("mem://a")).unwrap();
        let out = s.set_filter(FilterParam::Brightness, 500.0).unwrap();
        assert_eq!(out, SetOutcome { value: 200.0, clamped: true });
        // Same value again records nothing.
        let len = s.history().len();
        s.set_filter(FilterParam::Brightness, 200.0).unwrap();
        assert_eq!(s.history().len(), len);
    }

    #[test]
    fn small_crop_leaves_document_and_history_alone() {
        let (mut s, _loader) = session_with(&[("mem://a", 800, 600)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(9.0, 9.0));
        assert!(matches!(s.finish_crop(), Err(EditorError::Geometry(_))));
        assert_eq!((s.document().unwrap().width, s.document().unwrap().height), (800, 600));
        assert_eq!(s.history().len(), 1);
        assert!(s.crop_selection().is_none());

        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(10.0, 10.0));
        let report = s.finish_crop().unwrap();
        assert_eq!((report.width, report.height), (10, 10));
        let base = s.document().unwrap().base.as_ref().unwrap();
        assert_eq!(base.image.dimensions(), (10, 10));
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn crop_rebases_text_and_can_be_undone_once() {
        let (mut s, _loader) = session_with(&[("mem://a", 800, 600)]);
        block_on(s.load_image("mem://a")).unwrap();
        let kept = s.add_text("keep", Some(Point::new(120.0, 120.0))).unwrap();
        let gone = s.add_text("gone", Some(Point::new(50.0, 50.0))).unwrap();

        s.start_crop(Point::new(300.0, 300.0)).unwrap();
        s.update_crop(Point::new(100.0, 100.0));
        let report = s.finish_crop().unwrap();
        assert_eq!(report.removed_texts, vec![gone]);
        let doc = s.document().unwrap();
        assert_eq!((doc.width, doc.height), (200, 200));
        let t = doc.text(kept).unwrap();
        assert_eq!((t.x, t.y), (20.0, 20.0));

        assert!(s.can_undo_crop());
        s.undo_crop().unwrap();
        let doc = s.document().unwrap();
        assert_eq!((doc.width, doc.height), (800, 600));
        assert_eq!(doc.texts.len(), 2);
        assert!(!s.can_undo_crop());
        assert!(s.undo_crop().is_err());
    }

    #[test]
    fn further_crop_or_transform_ends_undo_crop() {
        let (mut s, _loader) = session_with(&[("mem://a", 800, 600)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(400.0, 300.0));
        s.finish_crop().unwrap();
        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(100.0, 100.0));
        s.finish_crop().unwrap();
        assert!(!s.can_undo_crop());
        assert!(s.undo_crop().is_err());
        assert_eq!(s.document().unwrap().width, 100);

        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(50.0, 50.0));
        s.finish_crop().unwrap();
        assert!(s.can_undo_crop());
        s.rotate(RotateDirection::Clockwise90).unwrap();
        assert!(!s.can_undo_crop());
    }

    #[test]
    fn history_undo_of_a_crop_keeps_later_edits() {
        let (mut s, _loader) = session_with(&[("mem://a", 800, 600)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.start_crop(Point::new(0.0, 0.0)).unwrap();
        s.update_crop(Point::new(100.0, 100.0));
        s.finish_crop().unwrap();
        block_on(s.undo()).unwrap();
        assert!(!s.can_undo_crop());

        s.set_filter(FilterParam::Brightness, 150.0).unwrap();
        s.add_text("after", None).unwrap();
        assert!(s.undo_crop().is_err());
        let doc = s.document().unwrap();
        assert_eq!((doc.width, doc.height), (800, 600));
        assert_eq!(doc.filters.brightness, 150.0);
        assert_eq!(doc.texts.len(), 1);
    }

    #[test]
    fn oversized_layer_and_font_are_rejected() {
        let (mut s, _loader) = session_with(&[("mem://a", 40, 40), ("mem://b", 40, 40)]);
        let report = block_on(s.create_collage(&gallery(&["mem://a", "mem://b"]))).unwrap();
        let id = report.added[0];
        let len = s.history().len();
        let before = s.document().unwrap().layer(id).unwrap().bounds();

        let err = s.update_layer(id, LayerPatch::Size { width: 5e8, height: 5e8 });
        assert!(matches!(err, Err(EditorError::Validation(_))));
        assert!(s.update_layer(id, LayerPatch::Size { width: f32::NAN, height: 10.0 }).is_err());
        assert_eq!(s.document().unwrap().layer(id).unwrap().bounds(), before);
        assert_eq!(s.history().len(), len);

        s.update_layer(id, LayerPatch::Size { width: 10_000.0, height: 200.0 }).unwrap();
        assert_eq!(s.document().unwrap().layer(id).unwrap().width, 10_000.0);

        let t = s.add_text("big", None).unwrap();
        assert!(matches!(s.update_text(t, TextPatch::RelSize(5e6)), Err(EditorError::Validation(_))));
        assert!(s.update_text(t, TextPatch::RelSize(f32::INFINITY)).is_err());
        s.update_text(t, TextPatch::RelSize(0.5)).unwrap();
        assert_eq!(s.document().unwrap().text(t).unwrap().rel_size, 0.5);
    }

    #[test]
    fn nan_text_opacity_is_ignored() {
        let (mut s, _loader) = session_with(&[("mem://a", 100, 100)]);
        block_on(s.load_image("mem://a")).unwrap();
        let t = s.add_text("hello", None).unwrap();
        let len = s.history().len();
        s.update_text(t, TextPatch::Opacity(f32::NAN)).unwrap();
        let text = s.document().unwrap().text(t).unwrap();
        assert_eq!(text.opacity, 100.0);
        assert_eq!(s.history().len(), len);
    }

    #[test]
    fn undo_restores_pre_crop_dimensions() {
        let (mut s, _loader) = session_with(&[("mem://a", 400, 300)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.start_crop(Point::new(10.0, 10.0)).unwrap();
        s.update_crop(Point::new(110.0, 60.0));
        s.finish_crop().unwrap();
        block_on(s.undo()).unwrap();
        let doc = s.document().unwrap();
        assert_eq!((doc.width, doc.height), (400, 300));
        assert_eq!(doc.base.as_ref().unwrap().image.dimensions(), (400, 300));
    }

    #[test]
    fn text_drag_snapshots_once() {
        let (mut s, _loader) = session_with(&[("mem://a", 400, 400)]);
        block_on(s.load_image("mem://a")).unwrap();
        let id = s.add_text("Drag", Some(Point::new(200.0, 200.0))).unwrap();
        let len = s.history().len();

        assert_eq!(s.pointer_down(Point::new(200.0, 200.0)).unwrap(), PointerTarget::Text(id));
        s.pointer_move(Point::new(210.0, 205.0), false).unwrap();
        s.pointer_move(Point::new(230.0, 220.0), false).unwrap();
        assert_eq!(s.history().len(), len);
        assert!(s.pointer_up().unwrap());
        assert_eq!(s.history().len(), len + 1);
        let t = s.document().unwrap().text(id).unwrap();
        assert_eq!((t.x, t.y), (230.0, 220.0));
    }

    #[test]
    fn delete_handle_removes_text() {
        let (mut s, _loader) = session_with(&[("mem://a", 400, 400)]);
        block_on(s.load_image("mem://a")).unwrap();
        let id = s.add_text("Bin", Some(Point::new(200.0, 200.0))).unwrap();
        let layout = s.text_layout(id).unwrap();
        let ne = layout.bounds.expand(text::HIT_PADDING);
        let target = s.pointer_down(Point::new(ne.right(), ne.y)).unwrap();
        assert_eq!(target, PointerTarget::TextDeleted(id));
        assert!(s.document().unwrap().texts.is_empty());
        assert_eq!(s.document().unwrap().selection, Selection::None);
    }

    #[test]
    fn locked_layers_do_not_drag() {
        let (mut s, _loader) = session_with(&[("mem://a", 200, 200)]);
        block_on(s.create_collage(&gallery(&["mem://a"]))).unwrap();
        let id = s.document().unwrap().layers[0].id;
        s.update_layer(id, LayerPatch::Locked(true)).unwrap();
        let start = s.document().unwrap().layers[0].bounds();

        let c = start.center();
        assert_eq!(s.pointer_down(c).unwrap(), PointerTarget::Layer(id));
        assert!(!s.pointer_move(Point::new(c.x + 40.0, c.y), false).unwrap());
        assert!(!s.pointer_up().unwrap());
        assert_eq!(s.document().unwrap().layers[0].bounds(), start);
    }

    #[test]
    fn layer_handle_drag_respects_floor() {
        let (mut s, _loader) = session_with(&[("mem://a", 200, 100)]);
        block_on(s.create_collage(&gallery(&["mem://a"]))).unwrap();
        let b = s.document().unwrap().layers[0].bounds();
        let se = Point::new(b.right(), b.bottom());
        assert_eq!(s.cursor_at(se), Some(ResizeCursor::SeResize));
        assert!(matches!(s.pointer_down(se).unwrap(), PointerTarget::LayerHandle(_, LayerHandle::Se)));
        s.pointer_move(Point::new(b.x + 5.0, b.y + 5.0), false).unwrap();
        s.pointer_up().unwrap();
        let after = s.document().unwrap().layers[0].bounds();
        assert_eq!((after.width, after.height), (50.0, 50.0));
        assert_eq!((after.x, after.y), (b.x, b.y));
    }

    #[test]
    fn restore_drops_layers_whose_source_vanished() {
        let (mut s, loader) = session_with(&[("mem://a", 100, 100), ("mem://b", 100, 100)]);
        block_on(s.create_collage(&gallery(&["mem://a", "mem://b"]))).unwrap();
        s.set_filter(FilterParam::Sepia, 50.0).unwrap();
        loader.remove("mem://b");
        let outcome = block_on(s.undo()).unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored { dropped: vec!["img1".to_string()] });
        assert_eq!(s.document().unwrap().layers.len(), 1);
        assert_eq!(s.document().unwrap().filters.sepia, 0.0);
    }

    #[test]
    fn stale_restore_is_ignored() {
        let (mut s, _loader) = session_with(&[("mem://a", 100, 100)]);
        block_on(s.create_collage(&gallery(&["mem://a"]))).unwrap();
        let first = DocumentState::capture(s.document().unwrap());
        let mut second = first.clone();
        second.layers.clear();

        let stale = s.begin_restore(&first).unwrap();
        let fresh = s.begin_restore(&second).unwrap();
        let loader = MemoryLoader::new();
        loader.insert("mem://a", RgbaImage::new(100, 100));
        let stale = block_on(stale.decode(&loader));
        let fresh = block_on(fresh.decode(&loader));
        assert_eq!(s.finish_restore(stale), RestoreOutcome::Superseded);
        assert_eq!(s.document().unwrap().layers.len(), 1);
        assert_eq!(s.finish_restore(fresh), RestoreOutcome::Restored { dropped: vec![] });
        assert!(s.document().unwrap().layers.is_empty());
    }

    #[test]
    fn failed_loads_keep_current_document() {
        let (mut s, _loader) = session_with(&[("mem://a", 30, 20)]);
        block_on(s.load_image("mem://a")).unwrap();
        assert!(block_on(s.load_image("mem://missing")).is_err());
        assert!(block_on(s.create_collage(&gallery(&["mem://missing"]))).is_err());
        assert!(s.load_image_bytes(b"GIF89a-not-really", "x.gif").is_err());
        assert_eq!(s.document().unwrap().width, 30);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn resize_validates_and_scales() {
        let (mut s, _loader) = session_with(&[("mem://a", 1600, 900)]);
        block_on(s.load_image("mem://a")).unwrap();
        assert!(matches!(s.resize(0, 10), Err(EditorError::Geometry(_))));
        assert!(matches!(s.resize(10_001, 10), Err(EditorError::Geometry(_))));
        assert_eq!(s.history().len(), 1);

        let mut r = s.resize_state().unwrap();
        r.on_width_change(800);
        s.resize(r.width, r.height).unwrap();
        let doc = s.document().unwrap();
        assert_eq!((doc.width, doc.height), (800, 450));
    }

    #[test]
    fn text_sub_history_steps_back() {
        let (mut s, _loader) = session_with(&[("mem://a", 100, 100)]);
        block_on(s.load_image("mem://a")).unwrap();
        let id = s.add_text("one", None).unwrap();
        s.update_text(id, TextPatch::Content("two".into())).unwrap();
        assert!(s.undo_text().unwrap());
        assert_eq!(s.document().unwrap().text(id).unwrap().content, "one");
        assert!(s.redo_text().unwrap());
        assert_eq!(s.document().unwrap().text(id).unwrap().content, "two");
    }

    #[test]
    fn export_local_and_reject_remote_formats() {
        let (mut s, _loader) = session_with(&[("mem://a", 32, 24)]);
        block_on(s.load_image("mem://a")).unwrap();
        s.add_text("Hi", None).unwrap();
        let png = s.export(ExportFormat::Png, None).unwrap();
        let decoded = io::decode_bytes(&png).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
        assert!(matches!(s.export(ExportFormat::Pdf, None), Err(EditorError::Validation(_))));
    }

    #[test]
    fn entry_points_need_a_document() {
        let (mut s, _loader) = session_with(&[]);
        assert!(matches!(s.set_filter(FilterParam::Blur, 2.0), Err(EditorError::NoDocument)));
        assert!(matches!(block_on(s.undo()), Err(EditorError::NoDocument)));
        assert!(s.surface().is_none());
    }
}
