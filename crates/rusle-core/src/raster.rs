use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};

/// No-data sentinel written by every derived raster.
pub const NODATA: f32 = -9999.0;

/// No-data value for categorical outputs (outside the region, or undefined input).
pub const CLASS_NODATA: u8 = 255;

/// Grid geometry shared by every raster taking part in one operation.
///
/// Bounds are in CRS units. Storage is row-major with row 0 at `max_y`
/// (north-up), matching how GeoTIFF composites are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// CRS identifier, e.g. `EPSG:4326` or `EPSG:32636`.
    pub crs: String,
}

impl GridSpec {
    pub fn new(
        width: usize,
        height: usize,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
        crs: impl Into<String>,
    ) -> Self {
        Self { width, height, min_x, max_x, min_y, max_y, crs: crs.into() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel size along x, in CRS units.
    pub fn pixel_width(&self) -> f64 {
        if self.width == 0 { 0.0 } else { (self.max_x - self.min_x) / self.width as f64 }
    }

    /// Pixel size along y, in CRS units (positive).
    pub fn pixel_height(&self) -> f64 {
        if self.height == 0 { 0.0 } else { (self.max_y - self.min_y) / self.height as f64 }
    }

    /// CRS coordinates of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.min_x + (col as f64 + 0.5) * self.pixel_width();
        let y = self.max_y - (row as f64 + 0.5) * self.pixel_height();
        (x, y)
    }

    /// True for longitude/latitude grids, where pixel sizes are in degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(
            self.crs.to_ascii_uppercase().as_str(),
            "EPSG:4326" | "OGC:CRS84" | "WGS84"
        )
    }

    /// Same dimensions, same CRS, and bounds equal up to a small fraction of a pixel.
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        if self.width != other.width || self.height != other.height || self.crs != other.crs {
            return false;
        }
        let tol_x = self.pixel_width().abs() * 1e-6;
        let tol_y = self.pixel_height().abs() * 1e-6;
        (self.min_x - other.min_x).abs() <= tol_x
            && (self.max_x - other.max_x).abs() <= tol_x
            && (self.min_y - other.min_y).abs() <= tol_y
            && (self.max_y - other.max_y).abs() <= tol_y
    }

    /// Human-readable geometry, used in alignment diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "{}x{} px over x[{}, {}] y[{}, {}] ({})",
            self.width, self.height, self.min_x, self.max_x, self.min_y, self.max_y, self.crs
        )
    }
}

/// A named, georeferenced single-band grid of `f32` values.
///
/// Coordinate math uses f64; cell values use f32. Derived rasters are built
/// once by a pipeline stage and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    pub name: String,
    pub grid: GridSpec,
    /// Row-major values, row 0 = north.
    pub data: Vec<f32>,
    pub nodata: Option<f32>,
}

impl Raster {
    /// Create a raster filled with `fill`, using the standard no-data sentinel.
    pub fn new(name: impl Into<String>, grid: GridSpec, fill: f32) -> Self {
        let len = grid.len();
        Self { name: name.into(), grid, data: vec![fill; len], nodata: Some(NODATA) }
    }

    /// Wrap existing row-major values.
    pub fn from_vec(
        name: impl Into<String>,
        grid: GridSpec,
        data: Vec<f32>,
        nodata: Option<f32>,
    ) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(RusleError::InvalidDimensions {
                width: grid.width,
                height: grid.height,
                len: data.len(),
            });
        }
        Ok(Self { name: name.into(), grid, data, nodata })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.grid.width + col] = val;
    }

    /// True if `v` is NaN or equal to this raster's sentinel.
    #[inline]
    pub fn is_nodata(&self, v: f32) -> bool {
        v.is_nan() || self.nodata == Some(v)
    }

    /// Value at `(row, col)`, or `None` for a no-data pixel.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.get(row, col);
        if self.is_nodata(v) { None } else { Some(v) }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pixel-wise unary expression.
    ///
    /// No-data inputs, `None` results and non-finite results all become
    /// [`NODATA`] in the output.
    pub fn map<F>(&self, name: impl Into<String>, f: F) -> Raster
    where
        F: Fn(f64) -> Option<f64>,
    {
        let data = self
            .data
            .iter()
            .map(|&v| {
                if self.is_nodata(v) {
                    return NODATA;
                }
                finite_or_nodata(f(v as f64))
            })
            .collect();
        Raster { name: name.into(), grid: self.grid.clone(), data, nodata: Some(NODATA) }
    }

    /// Pixel-wise binary expression over two aligned rasters.
    pub fn zip_map<F>(
        &self,
        other: &Raster,
        operation: &'static str,
        name: impl Into<String>,
        f: F,
    ) -> Result<Raster>
    where
        F: Fn(f64, f64) -> Option<f64>,
    {
        self.ensure_aligned(other, operation)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| {
                if self.is_nodata(a) || other.is_nodata(b) {
                    return NODATA;
                }
                finite_or_nodata(f(a as f64, b as f64))
            })
            .collect();
        Ok(Raster { name: name.into(), grid: self.grid.clone(), data, nodata: Some(NODATA) })
    }

    /// Copy with every pixel whose mask entry is `false` set to no-data.
    pub fn masked(&self, mask: &[bool]) -> Raster {
        debug_assert_eq!(mask.len(), self.data.len());
        let data = self
            .data
            .iter()
            .zip(mask.iter())
            .map(|(&v, &inside)| if inside && !self.is_nodata(v) { v } else { NODATA })
            .collect();
        Raster { name: self.name.clone(), grid: self.grid.clone(), data, nodata: Some(NODATA) }
    }

    /// `AlignmentError` unless both rasters share grid geometry.
    pub fn ensure_aligned(&self, other: &Raster, operation: &'static str) -> Result<()> {
        if self.grid.is_aligned_with(&other.grid) {
            return Ok(());
        }
        Err(RusleError::Alignment {
            operation,
            left: self.name.clone(),
            left_shape: self.grid.describe(),
            right: other.name.clone(),
            right_shape: other.grid.describe(),
        })
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    /// `(min, max)` over valid pixels, or `None` if every pixel is no-data.
    pub fn valid_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|&&v| !self.is_nodata(v))
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[inline]
fn finite_or_nodata(v: Option<f64>) -> f32 {
    match v {
        Some(x) if x.is_finite() => x as f32,
        _ => NODATA,
    }
}

/// Categorical raster produced by one classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRaster {
    pub name: String,
    pub grid: GridSpec,
    /// Row-major class codes; [`CLASS_NODATA`] marks unclassified pixels.
    pub data: Vec<u8>,
}

impl ClassifiedRaster {
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.grid.width + col]
    }

    /// Class code at `(row, col)`, or `None` if unclassified.
    pub fn class_at(&self, row: usize, col: usize) -> Option<u8> {
        match self.get(row, col) {
            CLASS_NODATA => None,
            c => Some(c),
        }
    }

    /// Pixel count per class code, excluding unclassified pixels.
    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for &c in self.data.iter().filter(|&&c| c != CLASS_NODATA) {
            *counts.entry(c).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: usize, h: usize) -> GridSpec {
        GridSpec::new(w, h, 0.0, w as f64 * 30.0, 0.0, h as f64 * 30.0, "EPSG:32636")
    }

    #[test]
    fn pixel_center_is_north_up() {
        let g = grid(4, 2);
        assert_eq!(g.pixel_center(0, 0), (15.0, 45.0));
        assert_eq!(g.pixel_center(1, 3), (105.0, 15.0));
    }

    #[test]
    fn zero_width_grid_is_empty() {
        assert!(grid(0, 3).is_empty());
        assert_eq!(grid(0, 3).pixel_width(), 0.0);
        assert!(!grid(1, 1).is_empty());
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = Raster::from_vec("x", grid(3, 3), vec![0.0; 8], None).unwrap_err();
        assert!(matches!(err, RusleError::InvalidDimensions { len: 8, .. }));
    }

    #[test]
    fn map_propagates_nodata_and_non_finite() {
        let r = Raster::from_vec("x", grid(3, 1), vec![1.0, -9999.0, 0.0], Some(-9999.0)).unwrap();
        let out = r.map("inv", |v| Some(1.0 / v));
        assert_eq!(out.data, vec![1.0, NODATA, NODATA]);
        assert_eq!(out.name, "inv");
    }

    #[test]
    fn zip_map_rejects_misaligned_grids() {
        let a = Raster::new("a", grid(3, 3), 1.0);
        let b = Raster::new("b", grid(4, 3), 1.0);
        let err = a.zip_map(&b, "test", "c", |x, y| Some(x + y)).unwrap_err();
        match err {
            RusleError::Alignment { left, right, .. } => {
                assert_eq!(left, "a");
                assert_eq!(right, "b");
            }
            other => panic!("expected alignment error, got {other:?}"),
        }
    }

    #[test]
    fn crs_mismatch_is_not_aligned() {
        let mut other = grid(3, 3);
        other.crs = "EPSG:4326".into();
        assert!(!grid(3, 3).is_aligned_with(&other));
    }

    #[test]
    fn masked_clears_outside_pixels() {
        let r = Raster::new("x", grid(2, 2), 5.0);
        let out = r.masked(&[true, false, false, true]);
        assert_eq!(out.data, vec![5.0, NODATA, NODATA, 5.0]);
        assert_eq!(out.valid_count(), 2);
        assert_eq!(out.valid_range(), Some((5.0, 5.0)));
    }

    #[test]
    fn class_counts_skip_unclassified() {
        let c = ClassifiedRaster {
            name: "c".into(),
            grid: grid(4, 1),
            data: vec![0, 2, CLASS_NODATA, 2],
        };
        let counts = c.class_counts();
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.get(&2), Some(&2));
        assert_eq!(counts.len(), 2);
        assert_eq!(c.class_at(0, 2), None);
    }
}
