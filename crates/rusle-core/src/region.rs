//! Region of interest: the polygon every raster in a run is clipped to.
//!
//! Coordinates are in the CRS of the grids being clipped. A pixel belongs to
//! the region when its centre lies strictly inside the polygon.

use geo::{Area, BoundingRect, Contains, LineString, Point, Polygon};

use crate::error::{Result, RusleError};
use crate::raster::{GridSpec, Raster};

#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    name: String,
    polygon: Polygon<f64>,
    /// `(min_x, min_y, max_x, max_y)`.
    bounds: (f64, f64, f64, f64),
}

impl RegionOfInterest {
    /// Build a region from an exterior ring. The ring is closed automatically.
    pub fn new(name: impl Into<String>, exterior: Vec<(f64, f64)>) -> Result<Self> {
        Self::with_holes(name, exterior, Vec::new())
    }

    pub fn with_holes(
        name: impl Into<String>,
        exterior: Vec<(f64, f64)>,
        holes: Vec<Vec<(f64, f64)>>,
    ) -> Result<Self> {
        let name = name.into();
        let all_finite = exterior
            .iter()
            .chain(holes.iter().flatten())
            .all(|(x, y)| x.is_finite() && y.is_finite());
        if !all_finite {
            return Err(RusleError::Configuration(format!(
                "region `{name}` has non-finite coordinates"
            )));
        }

        let polygon = Polygon::new(
            LineString::from(exterior),
            holes.into_iter().map(LineString::from).collect(),
        );
        if polygon.exterior().0.len() < 4 || polygon.unsigned_area() <= 0.0 {
            return Err(RusleError::Configuration(format!("region `{name}` is empty")));
        }
        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| RusleError::Configuration(format!("region `{name}` is empty")))?;
        let bounds = (rect.min().x, rect.min().y, rect.max().x, rect.max().y);

        Ok(Self { name, polygon, bounds })
    }

    /// Axis-aligned rectangle region.
    pub fn from_bbox(
        name: impl Into<String>,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Result<Self> {
        Self::new(
            name,
            vec![(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y)],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(min_x, min_y, max_x, max_y)` of the exterior ring.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.bounds
    }

    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        if x < min_x || x > max_x || y < min_y || y > max_y {
            return false;
        }
        self.polygon.contains(&Point::new(x, y))
    }

    /// Per-pixel inclusion mask for `grid`, row-major.
    pub fn mask(&self, grid: &GridSpec) -> Vec<bool> {
        let mut mask = Vec::with_capacity(grid.len());
        for r in 0..grid.height {
            for c in 0..grid.width {
                let (x, y) = grid.pixel_center(r, c);
                mask.push(self.contains(x, y));
            }
        }
        mask
    }

    /// Copy of `raster` with every pixel outside the region set to no-data.
    pub fn clip(&self, raster: &Raster) -> Raster {
        raster.masked(&self.mask(&raster.grid))
    }

    /// True if the region's bounding box overlaps the grid extent.
    pub fn overlaps(&self, grid: &GridSpec) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        min_x < grid.max_x && max_x > grid.min_x && min_y < grid.max_y && max_y > grid.min_y
    }
}
