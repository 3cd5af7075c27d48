//! Multiplicative combination of the factor rasters into the erosion estimate.

use tracing::debug;

use crate::error::{Result, RusleError};
use crate::factors::FactorRaster;
use crate::raster::{Raster, NODATA};

/// Output band name of [`combine`].
pub const EROSION_BAND: &str = "erosion";

/// Pixel-wise product of any number of aligned rasters.
///
/// The product is accumulated in f64, so input order does not change the
/// result beyond the final f32 rounding. A pixel that is no-data in any input
/// is no-data in the output.
pub fn product(name: &str, inputs: &[&Raster]) -> Result<Raster> {
    let first = inputs
        .first()
        .ok_or_else(|| RusleError::Configuration("product of zero rasters".into()))?;
    for other in &inputs[1..] {
        first.ensure_aligned(other, "erosion composite")?;
    }

    let data = (0..first.data.len())
        .map(|i| {
            let mut acc = 1.0f64;
            for r in inputs {
                let v = r.data[i];
                if r.is_nodata(v) {
                    return NODATA;
                }
                acc *= v as f64;
            }
            if acc.is_finite() { acc as f32 } else { NODATA }
        })
        .collect();

    Ok(Raster {
        name: name.to_string(),
        grid: first.grid.clone(),
        data,
        nodata: Some(NODATA),
    })
}

/// `erosion = R * K * LS * C`.
pub fn combine(r: &FactorRaster, k: &FactorRaster, ls: &FactorRaster, c: &FactorRaster) -> Result<Raster> {
    let erosion = product(EROSION_BAND, &[&r.raster, &k.raster, &ls.raster, &c.raster])?;
    debug!(valid = erosion.valid_count(), range = ?erosion.valid_range(), "erosion combined");
    Ok(erosion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorKind;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new(3, 1, 0.0, 90.0, 0.0, 30.0, "EPSG:32636")
    }

    fn factor(kind: FactorKind, values: Vec<f32>) -> FactorRaster {
        let raster = Raster::from_vec(kind.band_name(), grid(), values, Some(NODATA)).unwrap();
        FactorRaster { kind, raster }
    }

    #[test]
    fn combine_is_pixelwise_product() {
        let r = factor(FactorKind::R, vec![400.0, 250.0, 0.0]);
        let k = factor(FactorKind::K, vec![0.3, 1.2, 0.45]);
        let ls = factor(FactorKind::LS, vec![5.0, 2.5, 9.0]);
        let c = factor(FactorKind::C, vec![0.01, 0.01, 0.01]);
        let e = combine(&r, &k, &ls, &c).unwrap();
        assert_eq!(e.name, EROSION_BAND);
        assert_relative_eq!(e.data[0], 6.0, max_relative = 1e-5);
        assert_relative_eq!(e.data[1], 7.5, max_relative = 1e-5);
        assert_eq!(e.data[2], 0.0);
    }

    #[test]
    fn reordering_inputs_gives_same_result() {
        let r = factor(FactorKind::R, vec![413.7, 91.3, 1.1]);
        let k = factor(FactorKind::K, vec![0.3, 1.05, 0.6]);
        let ls = factor(FactorKind::LS, vec![7.13, -2.2, 0.017]);
        let c = factor(FactorKind::C, vec![0.01, 0.01, 0.01]);
        let a = combine(&r, &k, &ls, &c).unwrap();
        let b = combine(&c, &ls, &r, &k).unwrap();
        let nested = product("erosion", &[
            &product("rk", &[&r.raster, &k.raster]).unwrap(),
            &product("lsc", &[&ls.raster, &c.raster]).unwrap(),
        ])
        .unwrap();
        for i in 0..3 {
            assert_relative_eq!(a.data[i], b.data[i], max_relative = 1e-5);
            assert_relative_eq!(a.data[i], nested.data[i], max_relative = 1e-5);
        }
    }

    #[test]
    fn nodata_in_any_factor_is_nodata() {
        let r = factor(FactorKind::R, vec![NODATA, 1.0, 1.0]);
        let k = factor(FactorKind::K, vec![1.0, 1.0, 1.0]);
        let ls = factor(FactorKind::LS, vec![1.0, 1.0, NODATA]);
        let c = factor(FactorKind::C, vec![1.0, 1.0, 1.0]);
        let e = combine(&r, &k, &ls, &c).unwrap();
        assert_eq!(e.data, vec![NODATA, 1.0, NODATA]);
    }

    #[test]
    fn misaligned_factor_is_fatal() {
        let r = factor(FactorKind::R, vec![1.0; 3]);
        let k = factor(FactorKind::K, vec![1.0; 3]);
        let ls = factor(FactorKind::LS, vec![1.0; 3]);
        let mut c = factor(FactorKind::C, vec![1.0; 3]);
        c.raster.grid.min_x = 15.0;
        match combine(&r, &k, &ls, &c).unwrap_err() {
            RusleError::Alignment { right, .. } => assert_eq!(right, "C"),
            other => panic!("expected alignment error, got {other:?}"),
        }
    }
}
