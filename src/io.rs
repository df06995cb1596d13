use async_trait::async_trait;
use futures::channel::oneshot;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::components::history::LayerSnapshot;
use crate::document::{Document, PixelResource, Selection, TextObject};
use crate::error::{EditorError, Result};
use crate::ops::filters::FilterSettings;

/// Upload extensions accepted for decoding.
pub const UPLOAD_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

// ============================================================================
// DECODING & UPLOAD VALIDATION
// ============================================================================

/// Check an upload before decoding: non-empty, under the size ceiling,
/// allow-listed extension and a sniffed format from the same list.
pub fn validate_upload(bytes: &[u8], file_name: &str, max_bytes: usize) -> Result<()> {
    if bytes.is_empty() {
        return Err(EditorError::Validation(format!("{} is empty", file_name)));
    }
    if bytes.len() > max_bytes {
        return Err(EditorError::Validation(format!(
            "{} is {} bytes, the limit is {}",
            file_name,
            bytes.len(),
            max_bytes
        )));
    }
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        return Err(EditorError::Validation(format!("unsupported file type: {}", file_name)));
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Gif | ImageFormat::Bmp) => Ok(()),
        Ok(other) => Err(EditorError::Validation(format!("{} contains {:?} data", file_name, other))),
        Err(_) => Err(EditorError::Validation(format!("{} is not a recognised image", file_name))),
    }
}

pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(EditorError::Validation("image has no pixels".into()));
    }
    Ok(img)
}

/// A gallery entry. Loaders only consume `url` and `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GalleryImage {
    pub id: String,
    pub url: String,
    pub name: String,
}

/// Decodes a pixel resource from its locator.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, locator: &str) -> Result<RgbaImage>;
}

/// Reads locators as file paths (an optional `file://` prefix is stripped).
#[derive(Clone, Copy, Debug, Default)]
pub struct FsLoader;

#[async_trait]
impl ImageLoader for FsLoader {
    /// Reads and decodes on the rayon pool; the caller only awaits the result.
    async fn load(&self, locator: &str) -> Result<RgbaImage> {
        let path = PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator));
        let (tx, rx) = oneshot::channel();
        rayon::spawn(move || {
            let result = std::fs::read(&path).map_err(EditorError::from).and_then(|bytes| {
                decode_bytes(&bytes).inspect_err(|e| {
                    crate::log_err!("Failed to decode {}: {}", path.display(), e);
                })
            });
            let _ = tx.send(result);
        });
        rx.await
            .map_err(|_| EditorError::Resource(format!("loading {} was abandoned", locator)))?
    }
}

/// In-memory locator → image table.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    images: RwLock<HashMap<String, RgbaImage>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<String>, image: RgbaImage) {
        let mut images = self.images.write().unwrap_or_else(|p| p.into_inner());
        images.insert(locator.into(), image);
    }

    pub fn remove(&self, locator: &str) {
        let mut images = self.images.write().unwrap_or_else(|p| p.into_inner());
        images.remove(locator);
    }
}

#[async_trait]
impl ImageLoader for MemoryLoader {
    async fn load(&self, locator: &str) -> Result<RgbaImage> {
        let images = self.images.read().unwrap_or_else(|p| p.into_inner());
        images
            .get(locator)
            .cloned()
            .ok_or_else(|| EditorError::Resource(format!("no image at {}", locator)))
    }
}

// ============================================================================
// EXPORT FORMATS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    Deflate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
    Gif,
    Ico,
    Webp,
    Avif,
    Pdf,
    Svg,
    Heic,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[
            ExportFormat::Png,
            ExportFormat::Jpeg,
            ExportFormat::Bmp,
            ExportFormat::Tga,
            ExportFormat::Tiff,
            ExportFormat::Gif,
            ExportFormat::Ico,
            ExportFormat::Webp,
            ExportFormat::Avif,
            ExportFormat::Pdf,
            ExportFormat::Svg,
            ExportFormat::Heic,
        ]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Tga => "tga",
            ExportFormat::Tiff => "tiff",
            ExportFormat::Gif => "gif",
            ExportFormat::Ico => "ico",
            ExportFormat::Webp => "webp",
            ExportFormat::Avif => "avif",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Svg => "svg",
            ExportFormat::Heic => "heic",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpeg" => Some(ExportFormat::Jpeg),
            "tif" => Some(ExportFormat::Tiff),
            e => Self::all().iter().copied().find(|f| f.extension() == e),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Bmp => "image/bmp",
            ExportFormat::Tga => "image/x-tga",
            ExportFormat::Tiff => "image/tiff",
            ExportFormat::Gif => "image/gif",
            ExportFormat::Ico => "image/x-icon",
            ExportFormat::Webp => "image/webp",
            ExportFormat::Avif => "image/avif",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Heic => "image/heic",
        }
    }

    /// Encoded in-process by [`encode_to_buffer`].
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ExportFormat::Png
                | ExportFormat::Jpeg
                | ExportFormat::Bmp
                | ExportFormat::Tga
                | ExportFormat::Tiff
                | ExportFormat::Gif
                | ExportFormat::Ico
        )
    }

    /// Vector tracing; never takes a quality parameter.
    pub fn is_trace(&self) -> bool {
        matches!(self, ExportFormat::Svg)
    }

    pub fn supports_quality(&self) -> bool {
        matches!(
            self,
            ExportFormat::Jpeg | ExportFormat::Webp | ExportFormat::Avif | ExportFormat::Heic
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// 1..=100, formats that support it only.
    pub quality: Option<u8>,
    pub tiff_compression: TiffCompression,
}

/// Encode `image` into a new buffer in a locally supported format.
pub fn encode_to_buffer(image: &RgbaImage, format: ExportFormat, opts: &ExportOptions) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let quality = opts.quality.unwrap_or(90).clamp(1, 100);

    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut cursor).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut cursor);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Tga => {
            TgaEncoder::new(&mut cursor).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Ico => {
            // ICO entries are limited to 256×256
            let dyn_img = if image.width() > 256 || image.height() > 256 {
                let scale = 256.0 / image.width().max(image.height()) as f32;
                let new_w = ((image.width() as f32 * scale) as u32).max(1);
                let new_h = ((image.height() as f32 * scale) as u32).max(1);
                let resized = image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::Lanczos3);
                DynamicImage::ImageRgba8(resized)
            } else {
                DynamicImage::ImageRgba8(image.clone())
            };
            dyn_img.write_to(&mut cursor, image::ImageOutputFormat::Ico)?;
        }
        ExportFormat::Tiff => encode_tiff(image, &mut cursor, opts.tiff_compression)?,
        ExportFormat::Gif => encode_static_gif(image, &mut cursor)?,
        other => {
            return Err(EditorError::Validation(format!(
                "{} needs the remote converter",
                other.extension()
            )));
        }
    }

    Ok(cursor.into_inner())
}

fn encode_tiff(image: &RgbaImage, out: &mut Cursor<Vec<u8>>, compression: TiffCompression) -> Result<()> {
    use tiff::encoder::{TiffEncoder, colortype::RGBA8, compression as tc};

    let err_map = |e: tiff::TiffError| EditorError::Resource(format!("TIFF encode error: {}", e));
    let mut enc = TiffEncoder::new(out).map_err(err_map)?;
    let (w, h) = image.dimensions();
    match compression {
        TiffCompression::None => enc.write_image::<RGBA8>(w, h, image.as_raw()),
        TiffCompression::Lzw => enc.write_image_with_compression::<RGBA8, _>(w, h, tc::Lzw, image.as_raw()),
        TiffCompression::Deflate => {
            enc.write_image_with_compression::<RGBA8, _>(w, h, tc::Deflate::default(), image.as_raw())
        }
    }
    .map_err(err_map)
}

/// Single-frame GIF through a 256-colour NeuQuant palette.
fn encode_static_gif(image: &RgbaImage, out: &mut Cursor<Vec<u8>>) -> Result<()> {
    if image.width() > u16::MAX as u32 || image.height() > u16::MAX as u32 {
        return Err(EditorError::Resource("image dimensions exceed GIF maximum (65535×65535)".into()));
    }
    let (w, h) = (image.width() as u16, image.height() as u16);
    let (palette, indexed) = quantize_rgba(image, 256);

    let mut encoder = gif::Encoder::new(out, w, h, &palette)
        .map_err(|e| EditorError::Resource(format!("GIF encoder init error: {}", e)))?;
    let frame = gif::Frame {
        width: w,
        height: h,
        buffer: std::borrow::Cow::Borrowed(&indexed),
        ..Default::default()
    };
    encoder
        .write_frame(&frame)
        .map_err(|e| EditorError::Resource(format!("GIF write error: {}", e)))
}

/// Quantize to a flat `[R,G,B, ...]` palette plus one index per pixel.
fn quantize_rgba(image: &RgbaImage, max_colors: usize) -> (Vec<u8>, Vec<u8>) {
    let nq = color_quant::NeuQuant::new(10, max_colors, image.as_raw());

    let mut palette = Vec::with_capacity(max_colors * 3);
    for i in 0..max_colors {
        match nq.lookup(i) {
            Some(color) => palette.extend_from_slice(&color[..3]),
            None => palette.extend_from_slice(&[0, 0, 0]),
        }
    }

    let indices = image
        .pixels()
        .map(|p| nq.index_of(&[p[0], p[1], p[2], p[3]]) as u8)
        .collect();

    (palette, indices)
}

// ============================================================================
// REMOTE CONVERSION
// ============================================================================

/// What the remote host can produce.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCapabilities {
    pub formats: Vec<ExportFormat>,
    /// False when the host lacks the tracing tool.
    pub trace_available: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversionRequest {
    /// PNG-encoded surface.
    pub buffer: Vec<u8>,
    pub target: ExportFormat,
    pub quality: Option<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Remote collaborator for formats the local encoder cannot produce.
#[async_trait]
pub trait RemoteConverter: Send + Sync {
    async fn capabilities(&self) -> Result<RemoteCapabilities>;
    async fn convert(&self, request: ConversionRequest) -> Result<ConvertedAsset>;
}

#[derive(Deserialize)]
struct RemoteErrorBody {
    error: String,
}

/// Map a non-2xx response to [`EditorError::Remote`], reading the
/// `{"error": "..."}` body when there is one.
pub fn remote_error(status: u16, body: &[u8]) -> EditorError {
    let message = match serde_json::from_slice::<RemoteErrorBody>(body) {
        Ok(b) => b.error,
        Err(_) if body.is_empty() => "no response body".to_string(),
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    EditorError::Remote { status, message }
}

/// Hand the surface to the remote converter. Never touches the document.
pub async fn convert_remote(
    image: &RgbaImage,
    format: ExportFormat,
    quality: Option<u8>,
    converter: &dyn RemoteConverter,
) -> Result<ConvertedAsset> {
    if format.is_local() {
        return Err(EditorError::Validation(format!(
            "{} is encoded locally",
            format.extension()
        )));
    }
    let caps = converter.capabilities().await?;
    if format.is_trace() && !caps.trace_available {
        return Err(EditorError::Remote {
            status: 501,
            message: "vector tracing is not available on this host".into(),
        });
    }
    if !caps.formats.contains(&format) {
        return Err(EditorError::Remote {
            status: 501,
            message: format!("{} conversion is not supported", format.extension()),
        });
    }

    let buffer = encode_to_buffer(image, ExportFormat::Png, &ExportOptions::default())?;
    let quality = if format.supports_quality() {
        quality.map(|q| q.clamp(1, 100))
    } else {
        None
    };
    let asset = converter
        .convert(ConversionRequest { buffer, target: format, quality })
        .await?;
    if asset.content_type != format.mime() {
        return Err(EditorError::Remote {
            status: 502,
            message: format!("expected {}, received {}", format.mime(), asset.content_type),
        });
    }
    Ok(asset)
}

// ============================================================================
// DOCUMENT FILE FORMAT
// ============================================================================

/// Magic header for the document file format (v1)
const DOC_MAGIC_V1: &str = "LFD1";

/// Layers are stored by locator; the base image is embedded as PNG.
#[derive(Serialize, Deserialize)]
struct DocumentFileV1 {
    magic: String,
    width: u32,
    height: u32,
    background: [u8; 4],
    filters: FilterSettings,
    texts: Vec<TextObject>,
    layers: Vec<LayerSnapshot>,
    selection: Selection,
    base_locator: Option<String>,
    base_png: Option<Vec<u8>>,
}

pub fn document_to_bytes(doc: &Document) -> Result<Vec<u8>> {
    let base_png = match doc.base.as_ref() {
        Some(b) => Some(encode_to_buffer(&b.image, ExportFormat::Png, &ExportOptions::default())?),
        None => None,
    };
    let file = DocumentFileV1 {
        magic: DOC_MAGIC_V1.to_string(),
        width: doc.width,
        height: doc.height,
        background: doc.background,
        filters: doc.filters.clone(),
        texts: doc.texts.clone(),
        layers: doc.layers.iter().map(LayerSnapshot::capture).collect(),
        selection: doc.selection,
        base_locator: doc.base.as_ref().map(|b| b.locator.clone()),
        base_png,
    };
    Ok(bincode::serialize(&file)?)
}

pub fn save_document(doc: &Document, path: &Path) -> Result<()> {
    std::fs::write(path, document_to_bytes(doc)?)?;
    Ok(())
}

/// Rebuild a document. Layers are decoded through `loader` in order;
/// ones that fail are dropped and their names returned.
pub async fn document_from_bytes(raw: &[u8], loader: &dyn ImageLoader) -> Result<(Document, Vec<String>)> {
    let file: DocumentFileV1 = bincode::deserialize(raw)?;
    if file.magic != DOC_MAGIC_V1 {
        return Err(EditorError::Validation("not a LayerForge document".into()));
    }
    if file.width == 0 || file.height == 0 {
        return Err(EditorError::Validation("document has no surface".into()));
    }

    let base = match (file.base_png, file.base_locator) {
        (Some(png), locator) => Some(PixelResource::new(
            locator.unwrap_or_else(|| "embedded:base".into()),
            decode_bytes(&png)?,
        )),
        (None, _) => None,
    };

    let mut layers = Vec::with_capacity(file.layers.len());
    let mut dropped = Vec::new();
    for snap in &file.layers {
        match loader.load(&snap.locator).await {
            Ok(img) => layers.push(snap.to_layer(PixelResource::new(snap.locator.clone(), img))),
            Err(e) => {
                crate::log_warn!("Document load: dropping layer '{}' ({}): {}", snap.name, snap.locator, e);
                dropped.push(snap.name.clone());
            }
        }
    }

    let mut doc = Document {
        width: file.width,
        height: file.height,
        filters: file.filters,
        layers,
        texts: file.texts,
        selection: file.selection,
        base,
        background: file.background,
    };
    doc.filters.clamp_all();
    doc.prune_selection();
    Ok((doc, dropped))
}

pub async fn load_document(path: &Path, loader: &dyn ImageLoader) -> Result<(Document, Vec<String>)> {
    let raw = std::fs::read(path)?;
    document_from_bytes(&raw, loader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};
    use crate::document::ImageLayer;
    use image::Rgba;

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]));
        encode_to_buffer(&img, ExportFormat::Png, &ExportOptions::default()).unwrap()
    }

    struct StubConverter {
        caps: RemoteCapabilities,
        content_type: &'static str,
        fail_with: Option<(u16, &'static str)>,
    }

    #[async_trait]
    impl RemoteConverter for StubConverter {
        async fn capabilities(&self) -> Result<RemoteCapabilities> {
            Ok(self.caps.clone())
        }

        async fn convert(&self, request: ConversionRequest) -> Result<ConvertedAsset> {
            if let Some((status, body)) = self.fail_with {
                return Err(remote_error(status, body.as_bytes()));
            }
            if request.target.is_trace() {
                assert!(request.quality.is_none());
            }
            Ok(ConvertedAsset {
                bytes: vec![1, 2, 3],
                content_type: self.content_type.to_string(),
            })
        }
    }

    #[test]
    fn upload_validation() {
        let png = png_bytes();
        assert!(validate_upload(&png, "photo.PNG", 1024 * 1024).is_ok());
        assert!(matches!(validate_upload(&png, "photo.exe", 1024 * 1024), Err(EditorError::Validation(_))));
        assert!(validate_upload(&png, "photo.png", 4).is_err());
        assert!(validate_upload(&[], "photo.png", 4).is_err());
        assert!(validate_upload(b"not an image at all", "photo.png", 1024).is_err());
    }

    #[test]
    fn local_formats_encode() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([200, 10, 10, 255]));
        for &f in ExportFormat::all().iter().filter(|f| f.is_local()) {
            let bytes = encode_to_buffer(&img, f, &ExportOptions { quality: Some(80), ..Default::default() })
                .unwrap_or_else(|e| panic!("{:?}: {}", f, e));
            assert!(!bytes.is_empty(), "{:?}", f);
        }
        assert!(encode_to_buffer(&img, ExportFormat::Pdf, &ExportOptions::default()).is_err());
        let decoded = decode_bytes(&encode_to_buffer(&img, ExportFormat::Png, &ExportOptions::default()).unwrap()).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn format_lookup() {
        assert_eq!(ExportFormat::from_extension("JPEG"), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_extension("tif"), Some(ExportFormat::Tiff));
        assert_eq!(ExportFormat::from_extension("svg"), Some(ExportFormat::Svg));
        assert_eq!(ExportFormat::from_extension("xcf"), None);
    }

    #[test]
    fn remote_error_body_is_parsed() {
        match remote_error(422, br#"{"error":"bad page size"}"#) {
            EditorError::Remote { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "bad page size");
            }
            other => panic!("unexpected {:?}", other),
        }
        match remote_error(500, b"") {
            EditorError::Remote { message, .. } => assert_eq!(message, "no response body"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn trace_requires_capability() {
        let img = RgbaImage::new(2, 2);
        let stub = StubConverter {
            caps: RemoteCapabilities { formats: vec![ExportFormat::Svg], trace_available: false },
            content_type: "image/svg+xml",
            fail_with: None,
        };
        let err = pollster::block_on(convert_remote(&img, ExportFormat::Svg, Some(80), &stub)).unwrap_err();
        assert!(matches!(err, EditorError::Remote { status: 501, .. }));

        let stub = StubConverter {
            caps: RemoteCapabilities { formats: vec![ExportFormat::Svg], trace_available: true },
            ..stub
        };
        let asset = pollster::block_on(convert_remote(&img, ExportFormat::Svg, Some(80), &stub)).unwrap();
        assert_eq!(asset.content_type, "image/svg+xml");
    }

    #[test]
    fn remote_failures_surface_as_errors() {
        let img = RgbaImage::new(2, 2);
        let stub = StubConverter {
            caps: RemoteCapabilities { formats: vec![ExportFormat::Pdf], trace_available: false },
            content_type: "application/pdf",
            fail_with: Some((500, r#"{"error":"converter crashed"}"#)),
        };
        let err = pollster::block_on(convert_remote(&img, ExportFormat::Pdf, Some(70), &stub)).unwrap_err();
        assert_eq!(err.to_string(), "Remote conversion failed (500): converter crashed");

        let mismatched = StubConverter { content_type: "text/html", fail_with: None, ..stub };
        let err = pollster::block_on(convert_remote(&img, ExportFormat::Pdf, Some(70), &mismatched)).unwrap_err();
        assert!(matches!(err, EditorError::Remote { status: 502, .. }));
    }

    #[test]
    fn document_file_round_trip() {
        let loader = MemoryLoader::new();
        loader.insert("mem://layer", RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));

        let mut doc = Document::from_image(PixelResource::new("photo.png", RgbaImage::from_pixel(5, 4, Rgba([7, 8, 9, 255]))));
        doc.texts.push(TextObject::new("hi", Point::new(2.0, 2.0)));
        doc.layers.push(ImageLayer::new(
            "kept",
            PixelResource::new("mem://layer", RgbaImage::new(2, 2)),
            Rect::new(0.0, 0.0, 2.0, 2.0),
        ));
        doc.layers.push(ImageLayer::new(
            "lost",
            PixelResource::new("mem://missing", RgbaImage::new(2, 2)),
            Rect::new(0.0, 0.0, 2.0, 2.0),
        ));

        let bytes = document_to_bytes(&doc).unwrap();
        let (back, dropped) = pollster::block_on(document_from_bytes(&bytes, &loader)).unwrap();
        assert_eq!(dropped, vec!["lost".to_string()]);
        assert_eq!((back.width, back.height), (5, 4));
        assert_eq!(back.texts, doc.texts);
        assert_eq!(back.layers.len(), 1);
        assert_eq!(back.base.as_ref().map(|b| b.locator.as_str()), Some("photo.png"));
        assert_eq!(*back.base.as_ref().unwrap().image.get_pixel(0, 0), Rgba([7, 8, 9, 255]));
    }

    #[test]
    fn fs_loader_reads_off_the_calling_thread() {
        let dir = std::env::temp_dir().join(format!("layerforge-io-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let locator = format!("file://{}", path.display());
        let img = pollster::block_on(FsLoader.load(&locator)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));

        let missing = dir.join("missing.png");
        let err = pollster::block_on(FsLoader.load(&missing.to_string_lossy())).unwrap_err();
        assert!(matches!(err, EditorError::Io(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
