//! The four RUSLE factor rasters: rainfall (R), soil erodibility (K),
//! length-slope (LS) and cover management (C).
//!
//! Every factor is computed pixel-wise and then clipped to the region of
//! interest. Support practice (P) is not modelled.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::raster::{GridSpec, Raster};
use crate::region::RegionOfInterest;

/// Scale constant shared by the slope term and the NDVI divisor of LS.
pub const LS_SCALE: f64 = 0.0896;
/// `K = K_INTERCEPT + K_PER_CLASS * texture_class`.
pub const K_INTERCEPT: f64 = 0.15;
pub const K_PER_CLASS: f64 = 0.15;
/// Cover-management value applied uniformly.
pub const C_CONSTANT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    R,
    K,
    LS,
    C,
}

impl FactorKind {
    pub fn band_name(self) -> &'static str {
        match self {
            FactorKind::R => "R",
            FactorKind::K => "K",
            FactorKind::LS => "LS",
            FactorKind::C => "C",
        }
    }
}

/// A raster tagged with the factor it represents.
#[derive(Debug, Clone)]
pub struct FactorRaster {
    pub kind: FactorKind,
    pub raster: Raster,
}

impl FactorRaster {
    fn clipped(kind: FactorKind, raster: Raster, roi: &RegionOfInterest) -> Self {
        let raster = roi.clip(&raster);
        debug!(
            factor = kind.band_name(),
            valid = raster.valid_count(),
            range = ?raster.valid_range(),
            "factor computed"
        );
        Self { kind, raster }
    }
}

/// R: the annual-summed rainfall raster, unchanged.
pub fn r_factor(annual_rainfall: &Raster, roi: &RegionOfInterest) -> FactorRaster {
    let r = annual_rainfall.map(FactorKind::R.band_name(), Some);
    FactorRaster::clipped(FactorKind::R, r, roi)
}

/// K: linear in the soil-texture class code, `0.15 + 0.15 * class`.
pub fn k_factor(soil_texture: &Raster, roi: &RegionOfInterest) -> FactorRaster {
    let k = soil_texture.map(FactorKind::K.band_name(), |class| {
        Some(K_INTERCEPT + K_PER_CLASS * class)
    });
    FactorRaster::clipped(FactorKind::K, k, roi)
}

/// LS: `(tan(slope) * 0.0896 + 1) * (NDVI / 0.0896)`, slope in degrees.
pub fn ls_factor(slope_deg: &Raster, ndvi: &Raster, roi: &RegionOfInterest) -> Result<FactorRaster> {
    let ls = slope_deg.zip_map(ndvi, "LS factor", FactorKind::LS.band_name(), |slope, ndvi| {
        Some((slope.to_radians().tan() * LS_SCALE + 1.0) * (ndvi / LS_SCALE))
    })?;
    Ok(FactorRaster::clipped(FactorKind::LS, ls, roi))
}

/// C: constant 0.01 on `grid`, independent of any input raster.
pub fn c_factor(grid: &GridSpec, roi: &RegionOfInterest) -> FactorRaster {
    let c = Raster::new(FactorKind::C.band_name(), grid.clone(), C_CONSTANT as f32);
    FactorRaster::clipped(FactorKind::C, c, roi)
}
