// ============================================================================
// GEOMETRY — points and axis-aligned rectangles in surface coordinates
// ============================================================================
//
// All coordinates are surface pixels. Callers convert pointer positions
// into surface space before handing them to the editor.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn delta_from(self, origin: Point) -> (f32, f32) {
        (self.x - origin.x, self.y - origin.y)
    }
}

/// Axis-aligned rectangle with a top-left origin and non-negative size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a rectangle from any two opposite corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: a.x.max(b.x) - x,
            height: a.y.max(b.y) - y,
        }
    }

    /// Square of side `size` centred on `center`.
    pub fn centered_square(center: Point, size: f32) -> Self {
        let half = size * 0.5;
        Self::new(center.x - half, center.y - half, size, size)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn expand(&self, pad: f32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }

    /// True when the rectangle lies fully within `[0,w]×[0,h]`.
    pub fn within_bounds(&self, w: f32, h: f32) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= w && self.bottom() <= h
    }

    /// Integer pixel bounds `(x, y, w, h)` with every component rounded.
    pub fn rounded(&self) -> (u32, u32, u32, u32) {
        (
            self.x.round().max(0.0) as u32,
            self.y.round().max(0.0) as u32,
            self.width.round().max(0.0) as u32,
            self.height.round().max(0.0) as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_normalises_any_drag_direction() {
        let r = Rect::from_corners(Point::new(300.0, 50.0), Point::new(100.0, 250.0));
        assert_eq!(r, Rect::new(100.0, 50.0, 200.0, 200.0));
    }

    #[test]
    fn expand_and_contains() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0).expand(8.0);
        assert!(r.contains(Point::new(2.0, 2.0)));
        assert!(!r.contains(Point::new(1.0, 20.0)));
    }

    #[test]
    fn within_bounds_rejects_overhang() {
        assert!(Rect::new(0.0, 0.0, 800.0, 600.0).within_bounds(800.0, 600.0));
        assert!(!Rect::new(1.0, 0.0, 800.0, 600.0).within_bounds(800.0, 600.0));
    }
}
