use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::SystemTime;

use crate::document::{
    BorderSpec, Document, DropShadow, ImageLayer, LayerId, PixelResource, Selection, TextObject,
};
use crate::io::ImageLoader;
use crate::ops::filters::FilterSettings;

// ============================================================================
// SNAPSHOT TYPES
// ============================================================================

/// Tag describing what kind of edit produced a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    Initial,
    Filter,
    Preset,
    Text,
    Layer,
    Crop,
    Transform,
}

/// An image layer with its pixels replaced by the locator they were
/// decoded from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub id: LayerId,
    pub name: String,
    pub locator: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub opacity: f32,
    pub visible: bool,
    pub locked: bool,
    pub flip_h: bool,
    pub flip_v: bool,
    pub filters: FilterSettings,
    pub border: Option<BorderSpec>,
    pub shadow: Option<DropShadow>,
}

impl LayerSnapshot {
    pub fn capture(layer: &ImageLayer) -> Self {
        Self {
            id: layer.id,
            name: layer.name.clone(),
            locator: layer.source.locator.clone(),
            x: layer.x,
            y: layer.y,
            width: layer.width,
            height: layer.height,
            rotation: layer.rotation,
            opacity: layer.opacity,
            visible: layer.visible,
            locked: layer.locked,
            flip_h: layer.flip_h,
            flip_v: layer.flip_v,
            filters: layer.filters.clone(),
            border: layer.border.clone(),
            shadow: layer.shadow.clone(),
        }
    }

    /// Rebuild the layer around freshly decoded pixels.
    pub fn to_layer(&self, source: PixelResource) -> ImageLayer {
        ImageLayer {
            id: self.id,
            name: self.name.clone(),
            source,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            opacity: self.opacity,
            visible: self.visible,
            locked: self.locked,
            flip_h: self.flip_h,
            flip_v: self.flip_v,
            filters: self.filters.clone(),
            border: self.border.clone(),
            shadow: self.shadow.clone(),
        }
    }
}

/// Deep copy of every restorable document field.
///
/// The base image is kept as its shared immutable pixel buffer so that
/// crop, resize and rotate are reversible; layers keep only locators.
#[derive(Clone, Debug)]
pub struct DocumentState {
    pub width: u32,
    pub height: u32,
    pub base: Option<PixelResource>,
    pub background: [u8; 4],
    pub filters: FilterSettings,
    pub texts: Vec<TextObject>,
    pub layers: Vec<LayerSnapshot>,
    pub selection: Selection,
}

impl DocumentState {
    pub fn capture(doc: &Document) -> Self {
        Self {
            width: doc.width,
            height: doc.height,
            base: doc.base.clone(),
            background: doc.background,
            filters: doc.filters.clone(),
            texts: doc.texts.clone(),
            layers: doc.layers.iter().map(LayerSnapshot::capture).collect(),
            selection: doc.selection,
        }
    }
}

/// One history entry.
#[derive(Clone, Debug)]
pub struct HistoryEntry<T> {
    pub description: String,
    pub kind: SnapshotKind,
    pub timestamp: SystemTime,
    pub state: T,
}

pub type Snapshot = HistoryEntry<DocumentState>;

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Linear snapshot history with a current index.
///
/// `index < len()` whenever the history is non-empty. Recording a new
/// entry after an undo discards the redo branch first; exceeding the cap
/// drops the oldest entry.
pub struct HistoryManager<T = DocumentState> {
    entries: VecDeque<HistoryEntry<T>>,
    index: usize,
    cap: usize,
}

impl<T: Clone> Default for HistoryManager<T> {
    fn default() -> Self {
        Self::new(50)
    }
}

impl<T: Clone> HistoryManager<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            cap: cap.max(1),
        }
    }

    pub fn record(&mut self, description: impl Into<String>, kind: SnapshotKind, state: T) {
        if !self.entries.is_empty() && self.index < self.entries.len() - 1 {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push_back(HistoryEntry {
            description: description.into(),
            kind,
            timestamp: SystemTime::now(),
            state,
        });
        self.index = self.entries.len() - 1;
        while self.entries.len() > self.cap {
            self.entries.pop_front();
            self.index = self.index.saturating_sub(1);
        }
    }

    /// Step back and return the entry to restore.
    pub fn undo(&mut self) -> Option<&HistoryEntry<T>> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    /// Step forward and return the entry to restore.
    pub fn redo(&mut self) -> Option<&HistoryEntry<T>> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.index < self.entries.len() - 1
    }

    pub fn current(&self) -> Option<&HistoryEntry<T>> {
        self.entries.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }

    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            self.entries.get(self.index).map(|e| e.description.as_str())
        } else {
            None
        }
    }

    pub fn redo_description(&self) -> Option<&str> {
        if self.can_redo() {
            self.entries.get(self.index + 1).map(|e| e.description.as_str())
        } else {
            None
        }
    }

    /// All descriptions, oldest first.
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.description.as_str()).collect()
    }
}

impl HistoryManager<DocumentState> {
    pub fn save_state(&mut self, doc: &Document, description: impl Into<String>, kind: SnapshotKind) {
        self.record(description, kind, DocumentState::capture(doc));
    }
}

// ============================================================================
// RESTORE
// ============================================================================

/// Monotonic counter that tells a finishing restore whether a newer one
/// has started since.
#[derive(Debug, Default)]
pub struct RestoreGate {
    generation: u64,
}

impl RestoreGate {
    pub fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The asynchronous half of a restore: layers still to decode.
#[derive(Clone, Debug)]
pub struct RestoreTicket {
    pub generation: u64,
    pub layers: Vec<LayerSnapshot>,
    pub selection: Selection,
}

/// Layers decoded for a ticket, ready to swap in.
#[derive(Debug)]
pub struct DecodedRestore {
    pub generation: u64,
    pub layers: Vec<ImageLayer>,
    pub dropped: Vec<String>,
    pub selection: Selection,
}

/// Apply the pure-data half of `state` and hand back a ticket for the
/// layers. The layer set is left untouched until the ticket completes.
pub fn begin_restore(doc: &mut Document, state: &DocumentState, generation: u64) -> RestoreTicket {
    doc.width = state.width;
    doc.height = state.height;
    doc.base = state.base.clone();
    doc.background = state.background;
    doc.filters = state.filters.clone();
    doc.texts = state.texts.clone();
    RestoreTicket {
        generation,
        layers: state.layers.clone(),
        selection: state.selection,
    }
}

impl RestoreTicket {
    /// Decode every layer in order. Failures drop that layer with a
    /// warning instead of failing the restore.
    pub async fn decode(self, loader: &dyn ImageLoader) -> DecodedRestore {
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut dropped = Vec::new();
        for snap in &self.layers {
            match loader.load(&snap.locator).await {
                Ok(img) => layers.push(snap.to_layer(PixelResource::new(snap.locator.clone(), img))),
                Err(e) => {
                    crate::log_warn!("Restore: dropping layer '{}' ({}): {}", snap.name, snap.locator, e);
                    dropped.push(snap.name.clone());
                }
            }
        }
        DecodedRestore {
            generation: self.generation,
            layers,
            dropped,
            selection: self.selection,
        }
    }
}

/// Swap decoded layers in. Returns false, leaving `doc` alone, when the
/// restore was superseded.
pub fn finish_restore(doc: &mut Document, gate: &RestoreGate, decoded: DecodedRestore) -> bool {
    if !gate.is_current(decoded.generation) {
        crate::log_info!(
            "Restore: discarding superseded restore (generation {} < {})",
            decoded.generation,
            gate.generation()
        );
        return false;
    }
    doc.layers = decoded.layers;
    doc.selection = decoded.selection;
    doc.prune_selection();
    true
}
