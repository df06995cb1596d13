// ============================================================================
// LayerForge CLI — headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   layerforge -i photo.jpg -o out.png --filter brightness=120 --filter sepia=30
//   layerforge -i photo.jpg -o out.jpg --preset-file looks.json --preset Vintage
//   layerforge -i "shots/*.png" --output-dir small/ --fit 800x800 --format jpg
//   layerforge -i photo.png -o card.png --text "Hello" --text-pos 0.5,0.9
//   layerforge -i photo.png -o crop.png --crop 100,100,400,300 --rotate 90
//   layerforge -i photo.png -o photo.lfd                (save as project file)
//
// Steps run in a fixed order per file: preset, filters, crop, resize,
// rotate, flip, text, export.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::document::TextPatch;
use crate::error::{EditorError, Result};
use crate::geometry::Point;
use crate::io::{ExportFormat, ExportOptions, FsLoader, TiffCompression};
use crate::ops::filters::FilterParam;
use crate::ops::text::FontBook;
use crate::ops::transform::{FlipAxis, RotateDirection};
use crate::presets::PresetStore;
use crate::project::EditorSession;
use crate::settings::EditorSettings;

/// Extension of LayerForge project files.
pub const PROJECT_EXTENSION: &str = "lfd";

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LayerForge headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "layerforge",
    about = "LayerForge headless batch image processor",
    long_about = "Apply filters, presets, text, crop, resize and rotation to image files\n\
                  without opening an editor. Writes PNG, JPEG, BMP, TGA, TIFF, GIF (static),\n\
                  ICO and LFD project files.\n\n\
                  Example:\n  \
                  layerforge --input photo.png --filter contrast=120 --output result.png\n  \
                  layerforge -i *.jpg --preset-file looks.json --preset Noir --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    /// LFD project files keep their layers and texts.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff, gif, ico, lfd.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Defaults to the configured export quality.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// TIFF compression mode: none, lzw, deflate (default: none).
    #[arg(long, default_value = "none", value_name = "MODE")]
    pub tiff_compression: String,

    /// Filter value, repeatable (e.g. --filter brightness=120).
    #[arg(long = "filter", value_name = "NAME=VALUE")]
    pub filters: Vec<String>,

    /// Preset JSON file exported from the editor.
    #[arg(long, value_name = "FILE.json")]
    pub preset_file: Option<PathBuf>,

    /// Preset to apply, by name or id. Built-in presets are always available.
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Text to draw on the image.
    #[arg(long)]
    pub text: Option<String>,

    /// Text anchor as fractions of the image size (default 0.5,0.5).
    #[arg(long, value_name = "FX,FY")]
    pub text_pos: Option<String>,

    /// Text size as a fraction of the image height (default 0.06).
    #[arg(long, value_name = "FRACTION")]
    pub text_size: Option<f32>,

    /// TrueType/OpenType font file for --text.
    #[arg(long, value_name = "FONT")]
    pub font: Option<PathBuf>,

    /// Text colour as RRGGBB or RRGGBBAA hex.
    #[arg(long, value_name = "HEX")]
    pub text_color: Option<String>,

    /// Crop rectangle in pixels.
    #[arg(long, value_name = "X,Y,W,H")]
    pub crop: Option<String>,

    /// Resize to exact dimensions.
    #[arg(long, value_name = "WxH", conflicts_with_all = ["scale", "fit"])]
    pub resize: Option<String>,

    /// Resize by percent, keeping aspect ratio.
    #[arg(long, value_name = "PERCENT", conflicts_with = "fit")]
    pub scale: Option<f64>,

    /// Shrink to fit inside a box, keeping aspect ratio.
    #[arg(long, value_name = "WxH")]
    pub fit: Option<String>,

    /// Rotate clockwise by 90, 180 or 270 degrees.
    #[arg(long, value_name = "DEGREES", allow_negative_numbers = true)]
    pub rotate: Option<i32>,

    /// Flip: horizontal or vertical.
    #[arg(long, value_name = "AXIS")]
    pub flip: Option<String>,

    /// Echo log output to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parsed, validated edit plan shared by every input file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditPlan {
    pub filters: Vec<(FilterParam, f32)>,
    pub preset: Option<crate::presets::Preset>,
    pub crop: Option<(f32, f32, f32, f32)>,
    pub resize: Option<Resize>,
    pub rotate: Option<RotateDirection>,
    pub flip: Option<FlipAxis>,
    pub text: Option<TextPlan>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resize {
    Exact(u32, u32),
    Percent(f64),
    Fit(u32, u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextPlan {
    pub content: String,
    /// Anchor as fractions of the surface size.
    pub position: (f32, f32),
    pub rel_size: Option<f32>,
    pub color: Option<[u8; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Image(ExportFormat),
    Project,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Image(f) => f.extension(),
            OutputKind::Project => PROJECT_EXTENSION,
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo(args.verbose);

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let output_kind = match parse_output_kind(args.format.as_deref(), args.output.as_deref()) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let export_opts = ExportOptions {
        quality: args.quality,
        tiff_compression: match args.tiff_compression.to_lowercase().as_str() {
            "lzw" => TiffCompression::Lzw,
            "deflate" => TiffCompression::Deflate,
            _ => TiffCompression::None,
        },
    };

    let plan = match build_plan(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut fonts = FontBook::new();
    if let Some(path) = &args.font
        && let Err(e) = fonts.load_file("cli", path)
    {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let settings = EditorSettings::load();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), output_kind)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let mut session = EditorSession::new(settings.clone(), Arc::new(FsLoader)).with_fonts(fonts.clone());

        match run_one(&mut session, input_path, &output_path, &plan, output_kind, &export_opts) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

pub fn run_one(
    session: &mut EditorSession,
    input: &Path,
    output: &Path,
    plan: &EditPlan,
    kind: OutputKind,
    opts: &ExportOptions,
) -> Result<()> {
    // -- Step 1: Load ----------------------------------------------------
    let is_project = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PROJECT_EXTENSION));
    if is_project {
        let dropped = pollster::block_on(session.open_project(input))?;
        for name in dropped {
            eprintln!("  warning: layer '{}' could not be loaded", name);
        }
    } else {
        pollster::block_on(session.load_image(&input.to_string_lossy()))?;
    }

    // -- Step 2: Look ----------------------------------------------------
    if let Some(preset) = &plan.preset {
        session.apply_preset(preset)?;
    }
    for &(param, value) in &plan.filters {
        let outcome = session.set_filter(param, value)?;
        if outcome.clamped {
            eprintln!("  warning: {} clamped to {}", param.name(), outcome.value);
        }
    }

    // -- Step 3: Geometry ------------------------------------------------
    if let Some((x, y, w, h)) = plan.crop {
        session.start_crop(Point::new(x, y))?;
        session.update_crop(Point::new(x + w, y + h));
        session.finish_crop()?;
    }
    if let Some(resize) = plan.resize {
        let mut state = session.resize_state()?;
        match resize {
            Resize::Exact(w, h) => {
                state.lock_aspect = false;
                state.on_width_change(w);
                state.on_height_change(h);
            }
            Resize::Percent(p) => state.scale_by_percent(p),
            Resize::Fit(w, h) => state.fit_to_bounds(w, h),
        }
        let (w, h) = state.validate(session.settings().max_dimension)?;
        session.resize(w, h)?;
    }
    if let Some(dir) = plan.rotate {
        session.rotate(dir)?;
    }
    if let Some(axis) = plan.flip {
        session.flip(axis)?;
    }

    // -- Step 4: Text ----------------------------------------------------
    if let Some(text) = &plan.text {
        let (w, h) = session
            .document()
            .map(|d| (d.width as f32, d.height as f32))
            .ok_or(EditorError::NoDocument)?;
        let id = session.add_text(&text.content, Some(Point::new(w * text.position.0, h * text.position.1)))?;
        if let Some(rel) = text.rel_size {
            session.update_text(id, TextPatch::RelSize(rel))?;
        }
        if let Some(color) = text.color {
            session.update_text(id, TextPatch::Color(color))?;
        }
    }

    // -- Step 5: Save ----------------------------------------------------
    match kind {
        OutputKind::Project => session.save_project(output),
        OutputKind::Image(format) => {
            let mut opts = *opts;
            opts.quality = opts.quality.or(Some(session.settings().default_quality));
            let bytes = session.export_with(format, &opts)?;
            std::fs::write(output, bytes)?;
            Ok(())
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn build_plan(args: &CliArgs) -> Result<EditPlan> {
    let mut plan = EditPlan::default();

    for spec in &args.filters {
        plan.filters.push(parse_filter(spec)?);
    }

    if let Some(name) = &args.preset {
        let mut store = PresetStore::with_builtins();
        if let Some(path) = &args.preset_file {
            store.import_json(&std::fs::read_to_string(path)?)?;
        }
        let preset = store
            .get(name)
            .or_else(|| store.find_by_name(name))
            .ok_or_else(|| EditorError::Validation(format!("unknown preset '{}'", name)))?;
        plan.preset = Some(preset.clone());
    } else if args.preset_file.is_some() {
        return Err(EditorError::Validation("--preset-file needs --preset".into()));
    }

    if let Some(crop) = &args.crop {
        let v = parse_numbers(crop, ',', 4)?;
        plan.crop = Some((v[0], v[1], v[2], v[3]));
    }

    plan.resize = if let Some(s) = &args.resize {
        let (w, h) = parse_size(s)?;
        Some(Resize::Exact(w, h))
    } else if let Some(p) = args.scale {
        Some(Resize::Percent(p))
    } else if let Some(s) = &args.fit {
        let (w, h) = parse_size(s)?;
        Some(Resize::Fit(w, h))
    } else {
        None
    };

    plan.rotate = match args.rotate {
        None => None,
        Some(90) | Some(-270) => Some(RotateDirection::Clockwise90),
        Some(180) | Some(-180) => Some(RotateDirection::Half),
        Some(270) | Some(-90) => Some(RotateDirection::CounterClockwise90),
        Some(d) => return Err(EditorError::Validation(format!("cannot rotate by {} degrees", d))),
    };

    plan.flip = match args.flip.as_deref().map(str::to_lowercase).as_deref() {
        None => None,
        Some("horizontal") | Some("h") => Some(FlipAxis::Horizontal),
        Some("vertical") | Some("v") => Some(FlipAxis::Vertical),
        Some(other) => return Err(EditorError::Validation(format!("unknown flip axis '{}'", other))),
    };

    if let Some(content) = &args.text {
        let position = match &args.text_pos {
            Some(s) => {
                let v = parse_numbers(s, ',', 2)?;
                (v[0], v[1])
            }
            None => (0.5, 0.5),
        };
        let color = args.text_color.as_deref().map(parse_hex_color).transpose()?;
        plan.text = Some(TextPlan {
            content: content.clone(),
            position,
            rel_size: args.text_size,
            color,
        });
    }

    Ok(plan)
}

fn parse_filter(spec: &str) -> Result<(FilterParam, f32)> {
    let (name, value) = spec
        .split_once('=')
        .ok_or_else(|| EditorError::Validation(format!("expected NAME=VALUE, got '{}'", spec)))?;
    let param = FilterParam::from_name(name.trim())
        .ok_or_else(|| EditorError::Validation(format!("unknown filter '{}'", name.trim())))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|_| EditorError::Validation(format!("invalid value in '{}'", spec)))?;
    Ok((param, value))
}

fn parse_numbers(s: &str, sep: char, count: usize) -> Result<Vec<f32>> {
    let values: Vec<f32> = s
        .split(sep)
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| EditorError::Validation(format!("invalid number list '{}'", s)))?;
    if values.len() != count {
        return Err(EditorError::Validation(format!(
            "expected {} values in '{}', got {}",
            count,
            s,
            values.len()
        )));
    }
    Ok(values)
}

fn parse_size(s: &str) -> Result<(u32, u32)> {
    let bad = || EditorError::Validation(format!("expected WIDTHxHEIGHT, got '{}'", s));
    let (w, h) = s.to_lowercase().split_once('x').map(|(a, b)| (a.trim().to_string(), b.trim().to_string())).ok_or_else(bad)?;
    Ok((w.parse().map_err(|_| bad())?, h.parse().map_err(|_| bad())?))
}

fn parse_hex_color(s: &str) -> Result<[u8; 4]> {
    let hex = s.trim_start_matches('#');
    let bad = || EditorError::Validation(format!("invalid colour '{}'", s));
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(bad());
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
    let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
    Ok([byte(0)?, byte(2)?, byte(4)?, alpha])
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the output kind from `--format` or the output extension.
/// Defaults to PNG when neither names one. Unknown names and formats
/// that need the remote converter are rejected.
fn parse_output_kind(format_arg: Option<&str>, output: Option<&Path>) -> Result<OutputKind> {
    let ext = match (format_arg, output.and_then(|out| out.extension())) {
        (Some(f), _) => f.to_lowercase(),
        (None, Some(e)) => e.to_string_lossy().to_lowercase(),
        (None, None) => return Ok(OutputKind::Image(ExportFormat::Png)),
    };
    if ext == PROJECT_EXTENSION {
        return Ok(OutputKind::Project);
    }
    match ExportFormat::from_extension(&ext) {
        Some(f) if f.is_local() => Ok(OutputKind::Image(f)),
        Some(f) => Err(EditorError::Validation(format!(
            "{} export needs the conversion service and is not available offline",
            f.extension()
        ))),
        None => Err(EditorError::Validation(format!("unknown output format '{}'", ext))),
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, kind: OutputKind) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = kind.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["layerforge", "-i", "in.png"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn plan_parses_every_step() {
        let plan = build_plan(&args(&[
            "--filter", "brightness=120",
            "--filter", "sepia = 30",
            "--preset", "noir",
            "--crop", "10,20,100,50",
            "--fit", "800x600",
            "--rotate", "-90",
            "--flip", "h",
            "--text", "Hi",
            "--text-color", "#ff000080",
        ]))
        .unwrap();
        assert_eq!(plan.filters, vec![(FilterParam::Brightness, 120.0), (FilterParam::Sepia, 30.0)]);
        assert_eq!(plan.preset.as_ref().map(|p| p.name.as_str()), Some("Noir"));
        assert_eq!(plan.crop, Some((10.0, 20.0, 100.0, 50.0)));
        assert_eq!(plan.resize, Some(Resize::Fit(800, 600)));
        assert_eq!(plan.rotate, Some(RotateDirection::CounterClockwise90));
        assert_eq!(plan.flip, Some(FlipAxis::Horizontal));
        let text = plan.text.unwrap();
        assert_eq!(text.position, (0.5, 0.5));
        assert_eq!(text.color, Some([255, 0, 0, 128]));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(build_plan(&args(&["--filter", "glow=3"])).is_err());
        assert!(build_plan(&args(&["--crop", "1,2,3"])).is_err());
        assert!(build_plan(&args(&["--rotate", "45"])).is_err());
        assert!(build_plan(&args(&["--preset", "nope"])).is_err());
        assert!(build_plan(&args(&["--text", "x", "--text-color", "red"])).is_err());
    }

    #[test]
    fn output_kind_from_extension_or_flag() {
        assert_eq!(parse_output_kind(None, Some(Path::new("a.JPG"))).unwrap(), OutputKind::Image(ExportFormat::Jpeg));
        assert_eq!(parse_output_kind(Some("lfd"), None).unwrap(), OutputKind::Project);
        assert_eq!(parse_output_kind(None, None).unwrap(), OutputKind::Image(ExportFormat::Png));
        assert!(parse_output_kind(Some("webp"), None).is_err());
    }

    #[test]
    fn unknown_output_format_is_an_error() {
        assert!(matches!(parse_output_kind(Some("jpgg"), None), Err(EditorError::Validation(_))));
        assert!(parse_output_kind(None, Some(Path::new("out.xyz"))).is_err());
        assert_eq!(parse_output_kind(None, Some(Path::new("out"))).unwrap(), OutputKind::Image(ExportFormat::Png));
    }

    #[test]
    fn output_path_avoids_overwriting_input() {
        let kind = OutputKind::Image(ExportFormat::Png);
        let p = build_output_path(Path::new("dir/a.png"), None, None, kind).unwrap();
        assert_eq!(p, PathBuf::from("dir/a_out.png"));
        let p = build_output_path(Path::new("dir/a.jpg"), None, Some(Path::new("out")), kind).unwrap();
        assert_eq!(p, PathBuf::from("out/a.png"));
    }

    #[test]
    fn pipeline_crops_and_resizes_a_file() {
        let dir = std::env::temp_dir().join(format!("layerforge-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.png");
        RgbaImage::from_pixel(400, 300, Rgba([10, 200, 30, 255])).save(&input).unwrap();
        let output = dir.join("out.png");

        let plan = build_plan(&args(&["--crop", "0,0,200,100", "--scale", "50", "--text", "ok"])).unwrap();
        let mut session = EditorSession::new(EditorSettings::default(), Arc::new(FsLoader));
        run_one(
            &mut session,
            &input,
            &output,
            &plan,
            OutputKind::Image(ExportFormat::Png),
            &ExportOptions::default(),
        )
        .unwrap();

        let written = image::open(&output).unwrap();
        assert_eq!((written.width(), written.height()), (100, 50));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
