// ============================================================================
// FILTER PIPELINE — parameter ranges, clamping, transform descriptors
// ============================================================================
//
// `apply_filters` is a pure mapping from a settings record to an ordered
// list of elementary transforms. Only transforms that differ from their
// neutral value are emitted, so an untouched document renders unchanged.
// `apply_ops` is the CPU back end: it runs a descriptor left-to-right over
// an RGBA buffer. Order matters and is fixed.
// ============================================================================

use std::fmt;

use image::{RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Every named numeric filter parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterParam {
    Brightness,
    Contrast,
    Saturation,
    Grayscale,
    Sepia,
    Sharpen,
    Zoom,
    Hue,
    Exposure,
    Highlights,
    Shadows,
    Vignette,
    Blur,
    Invert,
}

impl FilterParam {
    pub fn all() -> &'static [FilterParam] {
        &[
            FilterParam::Brightness,
            FilterParam::Contrast,
            FilterParam::Saturation,
            FilterParam::Grayscale,
            FilterParam::Sepia,
            FilterParam::Sharpen,
            FilterParam::Zoom,
            FilterParam::Hue,
            FilterParam::Exposure,
            FilterParam::Highlights,
            FilterParam::Shadows,
            FilterParam::Vignette,
            FilterParam::Blur,
            FilterParam::Invert,
        ]
    }

    /// Inclusive valid range `(min, max)`.
    pub fn range(self) -> (f32, f32) {
        match self {
            FilterParam::Brightness | FilterParam::Contrast | FilterParam::Saturation => (0.0, 200.0),
            FilterParam::Grayscale | FilterParam::Sepia | FilterParam::Sharpen | FilterParam::Invert => {
                (0.0, 100.0)
            }
            FilterParam::Zoom => (0.1, 5.0),
            FilterParam::Hue => (0.0, 360.0),
            FilterParam::Exposure | FilterParam::Highlights | FilterParam::Shadows | FilterParam::Vignette => {
                (-100.0, 100.0)
            }
            FilterParam::Blur => (0.0, 20.0),
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            FilterParam::Brightness | FilterParam::Contrast | FilterParam::Saturation => 100.0,
            FilterParam::Zoom => 1.0,
            _ => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterParam::Brightness => "brightness",
            FilterParam::Contrast => "contrast",
            FilterParam::Saturation => "saturation",
            FilterParam::Grayscale => "grayscale",
            FilterParam::Sepia => "sepia",
            FilterParam::Sharpen => "sharpen",
            FilterParam::Zoom => "zoom",
            FilterParam::Hue => "hue",
            FilterParam::Exposure => "exposure",
            FilterParam::Highlights => "highlights",
            FilterParam::Shadows => "shadows",
            FilterParam::Vignette => "vignette",
            FilterParam::Blur => "blur",
            FilterParam::Invert => "invert",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|p| p.name() == name)
    }
}

/// Result of assigning a filter value. Clamping is silent but reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetOutcome {
    pub value: f32,
    pub clamped: bool,
}

/// A record of named numeric filter parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub grayscale: f32,
    pub sepia: f32,
    pub sharpen: f32,
    pub zoom: f32,
    pub hue: f32,
    pub exposure: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub vignette: f32,
    pub blur: f32,
    pub invert: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            grayscale: 0.0,
            sepia: 0.0,
            sharpen: 0.0,
            zoom: 1.0,
            hue: 0.0,
            exposure: 0.0,
            highlights: 0.0,
            shadows: 0.0,
            vignette: 0.0,
            blur: 0.0,
            invert: 0.0,
        }
    }
}

impl FilterSettings {
    pub fn get(&self, param: FilterParam) -> f32 {
        match param {
            FilterParam::Brightness => self.brightness,
            FilterParam::Contrast => self.contrast,
            FilterParam::Saturation => self.saturation,
            FilterParam::Grayscale => self.grayscale,
            FilterParam::Sepia => self.sepia,
            FilterParam::Sharpen => self.sharpen,
            FilterParam::Zoom => self.zoom,
            FilterParam::Hue => self.hue,
            FilterParam::Exposure => self.exposure,
            FilterParam::Highlights => self.highlights,
            FilterParam::Shadows => self.shadows,
            FilterParam::Vignette => self.vignette,
            FilterParam::Blur => self.blur,
            FilterParam::Invert => self.invert,
        }
    }

    fn slot_mut(&mut self, param: FilterParam) -> &mut f32 {
        match param {
            FilterParam::Brightness => &mut self.brightness,
            FilterParam::Contrast => &mut self.contrast,
            FilterParam::Saturation => &mut self.saturation,
            FilterParam::Grayscale => &mut self.grayscale,
            FilterParam::Sepia => &mut self.sepia,
            FilterParam::Sharpen => &mut self.sharpen,
            FilterParam::Zoom => &mut self.zoom,
            FilterParam::Hue => &mut self.hue,
            FilterParam::Exposure => &mut self.exposure,
            FilterParam::Highlights => &mut self.highlights,
            FilterParam::Shadows => &mut self.shadows,
            FilterParam::Vignette => &mut self.vignette,
            FilterParam::Blur => &mut self.blur,
            FilterParam::Invert => &mut self.invert,
        }
    }

    /// Assign `value`, clamping it into the parameter's range.
    /// A NaN resets the parameter to its default and counts as clamped.
    pub fn set(&mut self, param: FilterParam, value: f32) -> SetOutcome {
        let (min, max) = param.range();
        let stored = if value.is_nan() {
            param.default_value()
        } else {
            value.clamp(min, max)
        };
        *self.slot_mut(param) = stored;
        SetOutcome {
            value: stored,
            clamped: value.is_nan() || stored != value,
        }
    }

    /// Re-clamp every field (used on imported presets). Returns true if any
    /// field changed.
    pub fn clamp_all(&mut self) -> bool {
        let mut any = false;
        for &p in FilterParam::all() {
            let v = self.get(p);
            any |= self.set(p, v).clamped;
        }
        any
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// TRANSFORM DESCRIPTOR
// ============================================================================

/// One elementary transform. Percentages follow CSS filter semantics
/// (100% brightness is identity, 100% grayscale is fully grey).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOp {
    Brightness(f32),
    Contrast(f32),
    Saturate(f32),
    Blur(f32),
    HueRotate(f32),
    Sepia(f32),
    Grayscale(f32),
    Invert(f32),
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Brightness(v) => write!(f, "brightness({}%)", v),
            FilterOp::Contrast(v) => write!(f, "contrast({}%)", v),
            FilterOp::Saturate(v) => write!(f, "saturate({}%)", v),
            FilterOp::Blur(v) => write!(f, "blur({}px)", v),
            FilterOp::HueRotate(v) => write!(f, "hue-rotate({}deg)", v),
            FilterOp::Sepia(v) => write!(f, "sepia({}%)", v),
            FilterOp::Grayscale(v) => write!(f, "grayscale({}%)", v),
            FilterOp::Invert(v) => write!(f, "invert({}%)", v),
        }
    }
}

/// Ordered list of transforms produced from a [`FilterSettings`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformDescriptor {
    pub ops: Vec<FilterOp>,
}

impl TransformDescriptor {
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for TransformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "none");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

const NEUTRAL_EPS: f32 = 1e-4;

fn differs(value: f32, neutral: f32) -> bool {
    (value - neutral).abs() > NEUTRAL_EPS
}

/// Map a settings record to its transform descriptor.
///
/// Exposure, highlights and shadows fold into the brightness and contrast
/// factors before emission:
/// `brightness · (100 + exposure)/100 · (100 + highlights·0.5)/100` and
/// `contrast · (100 + shadows·0.3)/100`.
pub fn apply_filters(settings: &FilterSettings) -> TransformDescriptor {
    let exposure_adjust = 100.0 + settings.exposure;
    let highlights_adjust = 100.0 + settings.highlights * 0.5;
    let shadows_adjust = 100.0 + settings.shadows * 0.3;

    let brightness = settings.brightness * exposure_adjust / 100.0 * highlights_adjust / 100.0;
    let contrast = settings.contrast * shadows_adjust / 100.0;

    let mut ops = Vec::new();
    if differs(brightness, 100.0) {
        ops.push(FilterOp::Brightness(brightness));
    }
    if differs(contrast, 100.0) {
        ops.push(FilterOp::Contrast(contrast));
    }
    if differs(settings.saturation, 100.0) {
        ops.push(FilterOp::Saturate(settings.saturation));
    }
    if differs(settings.blur, 0.0) {
        ops.push(FilterOp::Blur(settings.blur));
    }
    if differs(settings.hue, 0.0) {
        ops.push(FilterOp::HueRotate(settings.hue));
    }
    if differs(settings.sepia, 0.0) {
        ops.push(FilterOp::Sepia(settings.sepia));
    }
    if differs(settings.grayscale, 0.0) {
        ops.push(FilterOp::Grayscale(settings.grayscale));
    }
    if differs(settings.invert, 0.0) {
        ops.push(FilterOp::Invert(settings.invert));
    }
    TransformDescriptor { ops }
}

// ============================================================================
// CPU BACK END
// ============================================================================

/// Apply a per-pixel transform to every pixel, row-parallel.
/// `transform` receives (r, g, b) as f32 in 0..255; alpha is preserved.
fn map_pixels<F>(img: &mut RgbaImage, transform: F)
where
    F: Fn(f32, f32, f32) -> (f32, f32, f32) + Sync,
{
    let stride = img.width() as usize * 4;
    if stride == 0 {
        return;
    }
    let raw: &mut [u8] = img.as_mut();
    raw.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (r, g, b) = transform(px[0] as f32, px[1] as f32, px[2] as f32);
            px[0] = r.round().clamp(0.0, 255.0) as u8;
            px[1] = g.round().clamp(0.0, 255.0) as u8;
            px[2] = b.round().clamp(0.0, 255.0) as u8;
        }
    });
}

fn apply_matrix(img: &mut RgbaImage, m: [[f32; 3]; 3]) {
    map_pixels(img, move |r, g, b| {
        (
            m[0][0] * r + m[0][1] * g + m[0][2] * b,
            m[1][0] * r + m[1][1] * g + m[1][2] * b,
            m[2][0] * r + m[2][1] * g + m[2][2] * b,
        )
    });
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(deg: f32) -> [[f32; 3]; 3] {
    let (sin, cos) = deg.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn sepia_matrix(amount: f32) -> [[f32; 3]; 3] {
    let g = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * g, 0.769 - 0.769 * g, 0.189 - 0.189 * g],
        [0.349 - 0.349 * g, 0.686 + 0.314 * g, 0.168 - 0.168 * g],
        [0.272 - 0.272 * g, 0.534 - 0.534 * g, 0.131 + 0.869 * g],
    ]
}

fn grayscale_matrix(amount: f32) -> [[f32; 3]; 3] {
    let g = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * g, 0.7152 - 0.7152 * g, 0.0722 - 0.0722 * g],
        [0.2126 - 0.2126 * g, 0.7152 + 0.2848 * g, 0.0722 - 0.0722 * g],
        [0.2126 - 0.2126 * g, 0.7152 - 0.7152 * g, 0.0722 + 0.9278 * g],
    ]
}

/// Run a descriptor over `img` in order.
pub fn apply_ops(img: &mut RgbaImage, ops: &[FilterOp]) {
    for op in ops {
        match *op {
            FilterOp::Brightness(p) => {
                let k = p / 100.0;
                map_pixels(img, move |r, g, b| (r * k, g * k, b * k));
            }
            FilterOp::Contrast(p) => {
                let k = p / 100.0;
                map_pixels(img, move |r, g, b| {
                    ((r - 127.5) * k + 127.5, (g - 127.5) * k + 127.5, (b - 127.5) * k + 127.5)
                });
            }
            FilterOp::Saturate(p) => apply_matrix(img, saturate_matrix(p / 100.0)),
            FilterOp::Blur(px) => {
                if px > 0.0 {
                    *img = imageops::blur(img, px);
                }
            }
            FilterOp::HueRotate(deg) => apply_matrix(img, hue_rotate_matrix(deg)),
            FilterOp::Sepia(p) => apply_matrix(img, sepia_matrix(p / 100.0)),
            FilterOp::Grayscale(p) => apply_matrix(img, grayscale_matrix(p / 100.0)),
            FilterOp::Invert(p) => {
                let a = (p / 100.0).clamp(0.0, 1.0);
                map_pixels(img, move |r, g, b| {
                    (
                        a * (255.0 - r) + (1.0 - a) * r,
                        a * (255.0 - g) + (1.0 - a) * g,
                        a * (255.0 - b) + (1.0 - a) * b,
                    )
                });
            }
        }
    }
}

/// 3×3 sharpen: centre weight `1 + 4k`, edge neighbours `-k`.
/// `amount` is 0..100. Edge pixels sample clamped coordinates.
pub fn sharpen(img: &RgbaImage, amount: f32) -> RgbaImage {
    let k = (amount / 100.0).clamp(0.0, 1.0);
    if k <= 0.0 {
        return img.clone();
    }
    let (w, h) = (img.width() as usize, img.height() as usize);
    let src = img.as_raw();
    let stride = w * 4;
    let mut out = img.clone();
    if w == 0 || h == 0 {
        return out;
    }
    let dst: &mut [u8] = out.as_mut();
    dst.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for x in 0..w {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(w - 1);
            for c in 0..3 {
                let at = |xx: usize, yy: usize| src[yy * stride + xx * 4 + c] as f32;
                let v = at(x, y) * (1.0 + 4.0 * k)
                    - k * (at(left, y) + at(right, y) + at(x, up) + at(x, down));
                row[x * 4 + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// Radial vignette. Positive `amount` darkens the edges, negative lightens.
pub fn vignette(img: &mut RgbaImage, amount: f32) {
    let v = (amount / 100.0).clamp(-1.0, 1.0);
    if v == 0.0 {
        return;
    }
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return;
    }
    let cx = w as f32 * 0.5;
    let cy = h as f32 * 0.5;
    let max_d = (cx * cx + cy * cy).sqrt().max(1.0);
    let stride = w * 4;
    let raw: &mut [u8] = img.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 + 0.5 - cy;
        for x in 0..w {
            let dx = x as f32 + 0.5 - cx;
            let d = (dx * dx + dy * dy).sqrt() / max_d;
            let weight = d * d * v.abs();
            for c in 0..3 {
                let ch = row[x * 4 + c] as f32;
                let out = if v > 0.0 {
                    ch * (1.0 - weight)
                } else {
                    ch + (255.0 - ch) * weight
                };
                row[x * 4 + c] = out.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
}

/// Full pipeline for one source buffer: descriptor, then sharpen, then
/// vignette. Zoom is geometric and handled by the compositor.
pub fn render_filtered(src: &RgbaImage, settings: &FilterSettings) -> RgbaImage {
    let descriptor = apply_filters(settings);
    let mut out = src.clone();
    apply_ops(&mut out, &descriptor.ops);
    if settings.sharpen > 0.0 {
        out = sharpen(&out, settings.sharpen);
    }
    vignette(&mut out, settings.vignette);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn every_parameter_clamps_to_its_bounds() {
        for &p in FilterParam::all() {
            let (min, max) = p.range();
            let mut s = FilterSettings::default();

            let below = s.set(p, min - 50.0);
            assert_eq!(below.value, min, "{:?}", p);
            assert!(below.clamped);
            assert_eq!(s.get(p), min);

            let above = s.set(p, max + 50.0);
            assert_eq!(above.value, max, "{:?}", p);
            assert!(above.clamped);

            let mid = (min + max) / 2.0;
            let inside = s.set(p, mid);
            assert_eq!(inside.value, mid);
            assert!(!inside.clamped);
        }
    }

    #[test]
    fn nan_resets_to_default() {
        let mut s = FilterSettings::default();
        s.set(FilterParam::Contrast, 150.0);
        let out = s.set(FilterParam::Contrast, f32::NAN);
        assert!(out.clamped);
        assert_eq!(s.contrast, 100.0);
    }

    #[test]
    fn defaults_produce_identity_descriptor() {
        let d = apply_filters(&FilterSettings::default());
        assert!(d.is_identity());
        assert_eq!(d.to_string(), "none");
    }

    #[test]
    fn extended_adjustments_fold_into_brightness_and_contrast() {
        let mut s = FilterSettings::default();
        s.set(FilterParam::Exposure, 20.0);
        s.set(FilterParam::Highlights, 10.0);
        s.set(FilterParam::Shadows, -10.0);
        let d = apply_filters(&s);
        match (d.ops[0], d.ops[1]) {
            (FilterOp::Brightness(b), FilterOp::Contrast(c)) => {
                assert!(approx(b, 126.0), "brightness {}", b);
                assert!(approx(c, 97.0), "contrast {}", c);
            }
            other => panic!("unexpected ops {:?}", other),
        }
    }

    #[test]
    fn descriptor_order_is_fixed() {
        let mut s = FilterSettings::default();
        s.set(FilterParam::Invert, 100.0);
        s.set(FilterParam::Grayscale, 50.0);
        s.set(FilterParam::Brightness, 120.0);
        s.set(FilterParam::Hue, 90.0);
        s.set(FilterParam::Blur, 2.0);
        assert_eq!(
            apply_filters(&s).to_string(),
            "brightness(120%) blur(2px) hue-rotate(90deg) grayscale(50%) invert(100%)"
        );
    }

    #[test]
    fn cpu_ops_follow_filter_formulas() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([100, 50, 200, 128]));
        apply_ops(&mut img, &[FilterOp::Brightness(200.0)]);
        assert_eq!(*img.get_pixel(0, 0), Rgba([200, 100, 255, 128]));

        let mut img = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        apply_ops(&mut img, &[FilterOp::Invert(100.0)]);
        assert_eq!(*img.get_pixel(0, 0), Rgba([245, 235, 225, 255]));

        let mut img = RgbaImage::from_pixel(1, 1, Rgba([200, 30, 90, 255]));
        apply_ops(&mut img, &[FilterOp::Grayscale(100.0)]);
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn order_changes_the_result() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 255]));
        let mut a = src.clone();
        apply_ops(&mut a, &[FilterOp::Brightness(150.0), FilterOp::Invert(100.0)]);
        let mut b = src.clone();
        apply_ops(&mut b, &[FilterOp::Invert(100.0), FilterOp::Brightness(150.0)]);
        assert_ne!(a.get_pixel(0, 0), b.get_pixel(0, 0));
    }

    #[test]
    fn vignette_darkens_corners_not_centre() {
        let mut img = RgbaImage::from_pixel(21, 21, Rgba([200, 200, 200, 255]));
        vignette(&mut img, 100.0);
        assert!(img.get_pixel(0, 0)[0] < 100);
        assert!(img.get_pixel(10, 10)[0] >= 199);
    }
}
