// ============================================================================
// CROP ENGINE — rectangle selection, validation, extraction, text re-basing
// ============================================================================

use std::sync::Arc;

use image::{RgbaImage, imageops};

use crate::document::{Selection, TextId, TextObject};
use crate::error::{EditorError, Result};
use crate::geometry::{Point, Rect};

/// Smallest accepted crop, per axis, in surface pixels.
pub const MIN_CROP_SIZE: f32 = 10.0;

/// Selection state. Committing happens in one step from `Selecting`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum CropState {
    #[default]
    Idle,
    Selecting { anchor: Point, current: Point },
}

impl CropState {
    pub fn start(&mut self, p: Point) {
        *self = CropState::Selecting { anchor: p, current: p };
    }

    pub fn update(&mut self, p: Point) {
        if let CropState::Selecting { current, .. } = self {
            *current = p;
        }
    }

    /// Live rectangle, normalised so any drag direction works.
    pub fn selection(&self) -> Option<Rect> {
        match *self {
            CropState::Selecting { anchor, current } => Some(Rect::from_corners(anchor, current)),
            CropState::Idle => None,
        }
    }

    pub fn is_selecting(&self) -> bool {
        matches!(self, CropState::Selecting { .. })
    }

    pub fn cancel(&mut self) {
        *self = CropState::Idle;
    }
}

pub fn validate_crop(rect: Rect, surface_w: u32, surface_h: u32) -> Result<()> {
    if rect.width < MIN_CROP_SIZE || rect.height < MIN_CROP_SIZE {
        return Err(EditorError::Geometry(format!(
            "crop {:.0}×{:.0} is smaller than {}×{}",
            rect.width, rect.height, MIN_CROP_SIZE, MIN_CROP_SIZE
        )));
    }
    if !rect.within_bounds(surface_w as f32, surface_h as f32) {
        return Err(EditorError::Geometry("crop extends past the image".into()));
    }
    Ok(())
}

/// Copy the integer-rounded crop rectangle out of `composite`, resampled
/// to exactly the rounded size when rounding pushed it past an edge.
pub fn extract(composite: &RgbaImage, rect: Rect) -> RgbaImage {
    let (x, y, w, h) = rect.rounded();
    let x = x.min(composite.width().saturating_sub(1));
    let y = y.min(composite.height().saturating_sub(1));
    let avail_w = w.min(composite.width() - x).max(1);
    let avail_h = h.min(composite.height() - y).max(1);
    let sub = imageops::crop_imm(composite, x, y, avail_w, avail_h).to_image();
    if (avail_w, avail_h) == (w, h) {
        sub
    } else {
        imageops::resize(&sub, w.max(1), h.max(1), imageops::FilterType::Lanczos3)
    }
}

/// Shift every anchor by the crop origin and delete texts that end up
/// outside the new surface. Returns the ids of deleted texts.
pub fn rebase_texts(texts: &mut Vec<TextObject>, origin: Point, new_w: u32, new_h: u32) -> Vec<TextId> {
    let bounds = Rect::new(0.0, 0.0, new_w as f32, new_h as f32);
    let mut removed = Vec::new();
    texts.retain_mut(|t| {
        t.x -= origin.x;
        t.y -= origin.y;
        if bounds.contains(t.anchor()) {
            true
        } else {
            removed.push(t.id);
            false
        }
    });
    removed
}

/// The single-slot state captured before the first crop of a chain.
#[derive(Clone, Debug)]
pub struct PreCropSlot {
    /// Filtered, text-free composite at full size.
    pub image: Arc<RgbaImage>,
    pub width: u32,
    pub height: u32,
    pub texts: Vec<TextObject>,
    pub selection: Selection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn nine_pixel_crop_is_rejected() {
        let r = Rect::new(0.0, 0.0, 9.0, 9.0);
        assert!(matches!(validate_crop(r, 800, 600), Err(EditorError::Geometry(_))));
        assert!(validate_crop(Rect::new(0.0, 0.0, 10.0, 10.0), 800, 600).is_ok());
    }

    #[test]
    fn out_of_bounds_crop_is_rejected() {
        assert!(validate_crop(Rect::new(790.0, 0.0, 20.0, 20.0), 800, 600).is_err());
        assert!(validate_crop(Rect::new(-1.0, 0.0, 20.0, 20.0), 800, 600).is_err());
    }

    #[test]
    fn selection_normalises_any_direction() {
        let mut s = CropState::default();
        s.start(Point::new(300.0, 300.0));
        s.update(Point::new(100.0, 120.0));
        assert_eq!(s.selection(), Some(Rect::new(100.0, 120.0, 200.0, 180.0)));
        s.cancel();
        assert_eq!(s.selection(), None);
    }

    #[test]
    fn texts_are_rebased_or_deleted() {
        let inside = TextObject::new("in", Point::new(120.0, 120.0));
        let outside = TextObject::new("out", Point::new(50.0, 50.0));
        let out_id = outside.id;
        let mut texts = vec![inside, outside];
        let removed = rebase_texts(&mut texts, Point::new(100.0, 100.0), 200, 200);
        assert_eq!(removed, vec![out_id]);
        assert_eq!(texts.len(), 1);
        assert_eq!((texts[0].x, texts[0].y), (20.0, 20.0));
    }

    #[test]
    fn extract_copies_sub_rectangle() {
        let mut img = RgbaImage::new(40, 30);
        img.put_pixel(12, 7, Rgba([1, 2, 3, 255]));
        let out = extract(&img, Rect::new(10.0, 5.0, 10.0, 10.0));
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(*out.get_pixel(2, 2), Rgba([1, 2, 3, 255]));
    }
}
