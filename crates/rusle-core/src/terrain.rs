//! Slope from elevation (Horn 1981).
//!
//! Slope is evaluated at every interior cell with Horn's 3×3 weighted finite
//! differences. Border cells, and cells whose neighbourhood touches no-data,
//! are written as the no-data sentinel.

use tracing::debug;

use crate::raster::{GridSpec, Raster, NODATA};

/// Output band name of [`compute_slope_degrees`].
pub const SLOPE_BAND: &str = "slope";

/// Metres per degree of latitude.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Cell size `(dx, dy)` in metres.
///
/// Projected grids use their pixel size directly. Geographic grids convert
/// degrees to metres at the grid's mid-latitude.
pub(crate) fn cellsize_m(grid: &GridSpec) -> (f64, f64) {
    let px = grid.pixel_width().abs();
    let py = grid.pixel_height().abs();
    if !grid.is_geographic() {
        return (px, py);
    }
    let mid_lat = (grid.min_y + grid.max_y) / 2.0;
    (
        px * METRES_PER_DEGREE * mid_lat.to_radians().cos(),
        py * METRES_PER_DEGREE,
    )
}

/// Horn (1981) weighted 3×3 gradient at interior cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run, or `None` if any
/// neighbour is no-data.
///
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// Row 0 is north, so `dz/dy` is north minus south.
///
/// Caller must ensure `1 ≤ r ≤ height−2` and `1 ≤ c ≤ width−2`.
fn horn_gradient(dem: &Raster, r: usize, c: usize, dx: f64, dy: f64) -> Option<(f64, f64)> {
    let nw = dem.value(r - 1, c - 1)? as f64;
    let n  = dem.value(r - 1, c    )? as f64;
    let ne = dem.value(r - 1, c + 1)? as f64;
    let w  = dem.value(r,     c - 1)? as f64;
    let e  = dem.value(r,     c + 1)? as f64;
    let sw = dem.value(r + 1, c - 1)? as f64;
    let s  = dem.value(r + 1, c    )? as f64;
    let se = dem.value(r + 1, c + 1)? as f64;

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * dx);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dy);
    Some((dz_dx, dz_dy))
}

/// Surface slope in degrees.
pub fn compute_slope_degrees(dem: &Raster) -> Raster {
    let (w, h) = (dem.width(), dem.height());
    let mut out = Raster::new(SLOPE_BAND, dem.grid.clone(), NODATA);

    if w < 3 || h < 3 {
        debug!(width = w, height = h, "DEM too small for a 3x3 neighbourhood");
        return out;
    }

    let (dx, dy) = cellsize_m(&dem.grid);
    if dx <= 0.0 || dy <= 0.0 {
        debug!(dx, dy, "degenerate DEM cell size");
        return out;
    }

    for r in 1..h - 1 {
        for c in 1..w - 1 {
            if dem.value(r, c).is_none() {
                continue;
            }
            if let Some((dz_dx, dz_dy)) = horn_gradient(dem, r, c, dx, dy) {
                let slope = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
                out.set(r, c, slope as f32);
            }
        }
    }

    debug!(valid = out.valid_count(), range = ?out.valid_range(), "slope computed");
    out
}
