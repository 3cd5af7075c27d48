//! Single-band GeoTIFF reading and writing.
//!
//! Georeferencing uses ModelPixelScale + ModelTiepoint (north-up only) and the
//! EPSG code from the GeoKeyDirectory. No-data comes from the GDAL_NODATA tag.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;

use rusle_core::{ClassifiedRaster, GridSpec, Raster, CLASS_NODATA, NODATA};

// ── GeoKey ids ───────────────────────────────────────────────────────────────

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

// ── Reading ──────────────────────────────────────────────────────────────────

/// EPSG code from a GeoKeyDirectory: `[version, revision, minor, count, (id, loc, n, value)*]`.
fn epsg_from_keys(keys: &[u16]) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|k| (k[0] == PROJECTED_CS_TYPE || k[0] == GEOGRAPHIC_TYPE) && k[1] == 0 && k[3] > 0)
        .map(|k| k[3])
}

/// Whether the directory declares `GTRasterTypeGeoKey = PixelIsPoint`.
fn pixel_is_point(keys: &[u16]) -> bool {
    let Some(&count) = keys.get(3) else { return false };
    keys[4..]
        .chunks_exact(4)
        .take(count as usize)
        .any(|k| k[0] == GT_RASTER_TYPE && k[1] == 0 && k[3] == RASTER_PIXEL_IS_POINT)
}

/// Grid for a `width` x `height` image from ModelPixelScale and ModelTiepoint.
///
/// The tiepoint maps raster (i, j) to model (x, y). With PixelIsPoint it
/// names a pixel centre, so the NW corner sits half a pixel up and left.
fn grid_from_tags(
    width: usize,
    height: usize,
    scale: &[f64],
    tiepoint: &[f64],
    point: bool,
    crs: String,
) -> GridSpec {
    let mut min_x = tiepoint[3] - tiepoint[0] * scale[0];
    let mut max_y = tiepoint[4] + tiepoint[1] * scale[1];
    if point {
        min_x -= 0.5 * scale[0];
        max_y += 0.5 * scale[1];
    }
    GridSpec::new(
        width,
        height,
        min_x,
        min_x + width as f64 * scale[0],
        max_y - height as f64 * scale[1],
        max_y,
        crs,
    )
}

fn to_f32(image: DecodingResult) -> Result<Vec<f32>> {
    Ok(match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => bail!("unsupported pixel type"),
    })
}

/// Read band 1 of a GeoTIFF as a raster named `name`.
///
/// Pixels equal to the file's no-data value are rewritten to [`NODATA`].
pub fn read_band(path: &Path, name: &str) -> Result<Raster> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Not a valid TIFF: {}", path.display()))?;

    let (width, height) = decoder.dimensions()?;
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        bail!("{} has no north-up georeferencing", path.display());
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        bail!("{} has malformed georeferencing tags", path.display());
    }
    let keys: Vec<u16> = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .unwrap_or_default();
    let crs = epsg_from_keys(&keys)
        .map(|code| format!("EPSG:{code}"))
        .unwrap_or_else(|| "EPSG:4326".to_string());
    let point = pixel_is_point(&keys);
    let file_nodata = decoder
        .find_tag(Tag::GdalNodata)?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f32>().ok());

    let mut data = to_f32(decoder.read_image()?)
        .with_context(|| format!("Cannot decode {}", path.display()))?;
    if let Some(nd) = file_nodata {
        for v in data.iter_mut().filter(|v| **v == nd) {
            *v = NODATA;
        }
    }

    let grid = grid_from_tags(width as usize, height as usize, &scale, &tiepoint, point, crs);
    Ok(Raster::from_vec(name, grid, data, Some(NODATA))?)
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn geo_keys(grid: &GridSpec) -> Vec<u16> {
    let epsg = grid
        .crs
        .strip_prefix("EPSG:")
        .and_then(|c| c.parse::<u16>().ok())
        .unwrap_or(4326);
    let (model, cs_key) = if grid.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };
    vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        cs_key, 0, 1, epsg,
    ]
}

fn write_georeferenced<C>(path: &Path, grid: &GridSpec, nodata: &str, data: &[C::Inner]) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = tiff.new_image::<C>(grid.width as u32, grid.height as u32)?;
    let scale = [grid.pixel_width(), grid.pixel_height(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, grid.min_x, grid.max_y, 0.0];
    let keys = geo_keys(grid);
    image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
    image.encoder().write_tag(Tag::GdalNodata, nodata)?;
    image.write_data(data)?;
    Ok(())
}

/// Write a classified raster as an 8-bit GeoTIFF; unclassified pixels keep [`CLASS_NODATA`].
pub fn write_classes(path: &Path, raster: &ClassifiedRaster) -> Result<()> {
    write_georeferenced::<colortype::Gray8>(path, &raster.grid, &CLASS_NODATA.to_string(), &raster.data)
}

/// Write a continuous raster as a 32-bit float GeoTIFF.
pub fn write_band(path: &Path, raster: &Raster) -> Result<()> {
    let nodata = raster.nodata.unwrap_or(NODATA);
    write_georeferenced::<colortype::Gray32Float>(path, &raster.grid, &nodata.to_string(), &raster.data)
}
