//! Spectral indices from merged multispectral bands.

use tracing::{debug, warn};

use crate::band_stack::BandStack;
use crate::error::Result;
use crate::raster::Raster;

/// Output band name of [`compute_ndvi`].
pub const NDVI_BAND: &str = "NDVI";

/// Normalized difference `(a - b) / (a + b)`.
///
/// Pixels where either input is no-data, or where `a + b == 0`, are written as
/// the no-data sentinel.
pub fn normalized_difference(a: &Raster, b: &Raster, name: &str) -> Result<Raster> {
    a.zip_map(b, "normalized difference", name, |a, b| {
        let sum = a + b;
        if sum == 0.0 {
            None
        } else {
            Some((a - b) / sum)
        }
    })
}

/// Normalized Difference Vegetation Index, `(NIR - RED) / (NIR + RED)`.
pub fn compute_ndvi(stack: &BandStack, nir_band: &str, red_band: &str) -> Result<Raster> {
    let nir = stack.band(nir_band)?;
    let red = stack.band(red_band)?;
    let ndvi = normalized_difference(nir, red, NDVI_BAND)?;

    let valid = ndvi.valid_count();
    if valid == 0 && !ndvi.grid.is_empty() {
        warn!(nir_band, red_band, "NDVI has no valid pixels");
    } else {
        debug!(nir_band, red_band, valid, range = ?ndvi.valid_range(), "NDVI computed");
    }
    Ok(ndvi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RusleError;
    use crate::raster::{GridSpec, NODATA};
    use approx::assert_abs_diff_eq;

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, 0.0, 60.0, 0.0, 30.0, "EPSG:32636")
    }

    fn stack(nir: Vec<f32>, red: Vec<f32>) -> BandStack {
        BandStack::from_bands(vec![
            Raster::from_vec("B5", grid(), nir, None).unwrap(),
            Raster::from_vec("B4", grid(), red, None).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn ndvi_of_vegetated_pixel() {
        let ndvi = compute_ndvi(&stack(vec![0.5, 0.3], vec![0.1, 0.3]), "B5", "B4").unwrap();
        assert_eq!(ndvi.name, NDVI_BAND);
        assert_abs_diff_eq!(ndvi.data[0], 2.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ndvi.data[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_denominator_is_nodata() {
        let ndvi = compute_ndvi(&stack(vec![0.0, 0.2], vec![0.0, -0.2]), "B5", "B4").unwrap();
        assert_eq!(ndvi.data, vec![NODATA, NODATA]);
        assert!(ndvi.data.iter().all(|v| v.is_finite()));
        assert_eq!(ndvi.value(0, 0), None);
    }

    #[test]
    fn missing_red_band_is_reported() {
        let err = compute_ndvi(&stack(vec![0.5, 0.5], vec![0.1, 0.1]), "B5", "B3").unwrap_err();
        assert!(matches!(err, RusleError::MissingBand { ref band, .. } if band == "B3"));
    }

    #[test]
    fn misaligned_bands_are_fatal() {
        let other = GridSpec::new(1, 2, 0.0, 30.0, 0.0, 60.0, "EPSG:32636");
        let s = BandStack::from_bands(vec![
            Raster::from_vec("B5", grid(), vec![0.5, 0.5], None).unwrap(),
            Raster::from_vec("B4", other, vec![0.1, 0.1], None).unwrap(),
        ])
        .unwrap();
        assert!(matches!(compute_ndvi(&s, "B5", "B4"), Err(RusleError::Alignment { .. })));
    }
}
