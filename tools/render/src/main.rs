//! Renders classified-raster JSON (as written by `rusle`) to PNG.
//! Unclassified pixels are transparent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::{Rgba, RgbaImage};

use rusle_core::classify::{DEGRADATION_BAND, SOIL_LOSS_BAND, SOIL_LOSS_LEGEND};
use rusle_core::{ClassifiedRaster, CLASS_NODATA};

// ── Palettes ──────────────────────────────────────────────────────────────────

const YELLOW: [u8; 3] = [255, 255, 0];
const ORANGE: [u8; 3] = [255, 165, 0];
const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 128, 0];

/// Colour ramp over `[min, max]`; values outside are clamped to the end stops.
struct Palette {
    min: f32,
    max: f32,
    stops: &'static [[u8; 3]],
}

// Soil-loss DN 1..=5, slight to severe.
const SOIL_LOSS_STOPS: [[u8; 3]; 5] =
    [[0x12, 0xff, 0x50], [0xe5, 0xff, 0x12], [0xff, 0x48, 0x12], [0xe6, 0x19, 0x4b], [0x80, 0x00, 0x00]];

static DEGRADATION: Palette = Palette { min: 0.0, max: 2.0, stops: &[YELLOW, ORANGE, RED] };
static SEVERITY: Palette = Palette { min: 1.0, max: 3.0, stops: &[GREEN, YELLOW, RED] };
static SOIL_LOSS: Palette = Palette { min: 1.0, max: 5.0, stops: &SOIL_LOSS_STOPS };

impl Palette {
    fn color(&self, class: u8) -> Rgba<u8> {
        if class == CLASS_NODATA {
            return Rgba([0, 0, 0, 0]);
        }
        let t = ((class as f32 - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        let pos = t * (self.stops.len() - 1) as f32;
        let i = (pos.floor() as usize).min(self.stops.len() - 2);
        let f = pos - i as f32;
        let (a, b) = (self.stops[i], self.stops[i + 1]);
        let mix = |k: usize| (a[k] as f32 + (b[k] as f32 - a[k] as f32) * f).round() as u8;
        Rgba([mix(0), mix(1), mix(2), 255])
    }
}

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Style {
    /// Pick from the raster's band name.
    Auto,
    Degradation,
    Severity,
    SoilLoss,
}

#[derive(Parser, Debug)]
#[command(name = "render", about = "Render classified erosion maps to PNG")]
struct Args {
    /// Classified raster JSON files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory; defaults to each input's directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "auto")]
    style: Style,
}

fn palette_for(style: Style, raster: &ClassifiedRaster) -> &'static Palette {
    match style {
        Style::Degradation => &DEGRADATION,
        Style::Severity => &SEVERITY,
        Style::SoilLoss => &SOIL_LOSS,
        Style::Auto if raster.name == DEGRADATION_BAND => &DEGRADATION,
        Style::Auto if raster.name == SOIL_LOSS_BAND => &SOIL_LOSS,
        Style::Auto => &SEVERITY,
    }
}

/// Legend lines for the soil-loss map, `#rrggbb  Name (range t/ha/yr)`.
fn soil_loss_legend() -> Vec<String> {
    SOIL_LOSS_STOPS
        .iter()
        .zip(SOIL_LOSS_LEGEND)
        .map(|([r, g, b], (name, range))| format!("#{r:02x}{g:02x}{b:02x}  {name} ({range} tonnes/ha/year)"))
        .collect()
}

fn render(raster: &ClassifiedRaster, palette: &Palette) -> RgbaImage {
    let (w, h) = (raster.grid.width, raster.grid.height);
    RgbaImage::from_fn(w as u32, h as u32, |x, y| palette.color(raster.get(y as usize, x as usize)))
}

fn render_file(input: &Path, out_dir: Option<&Path>, style: Style) -> Result<PathBuf> {
    let text = fs::read_to_string(input).with_context(|| format!("Cannot read {}", input.display()))?;
    let raster: ClassifiedRaster = serde_json::from_str(&text)
        .with_context(|| format!("Not a classified raster: {}", input.display()))?;

    let palette = palette_for(style, &raster);
    if std::ptr::eq(palette, &SOIL_LOSS) {
        for line in soil_loss_legend() {
            println!("  {line}");
        }
    }
    let img = render(&raster, palette);
    let dir = out_dir.or_else(|| input.parent()).unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("map");
    let path = dir.join(format!("{stem}.png"));
    img.save(&path).with_context(|| format!("Cannot save {}", path.display()))?;
    Ok(path)
}

fn main() -> Result<()> {
    let args = Args::parse();
    for input in &args.inputs {
        let path = render_file(input, args.output.as_deref(), args.style)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
