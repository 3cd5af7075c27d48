//! Raster source seam.
//!
//! The pipeline never fetches or composites imagery itself. It asks a
//! [`RasterSource`] for one pre-reduced composite per product, constrained to
//! the run's region and analysis period, and checks the returned bands.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::band_stack::BandStack;
use crate::config::AnalysisPeriod;
use crate::error::{Result, RusleError};
use crate::region::RegionOfInterest;

/// Temporal reduction applied by the source to a product's observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Median,
    Sum,
}

/// One product to fetch and the bands to keep from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRequest {
    /// Catalogue identifier, e.g. `LANDSAT/LC08/C01/T1_TOA`.
    pub product_id: String,
    /// `None` for static single-image products (DEM, soil texture).
    #[serde(default)]
    pub reducer: Option<Reducer>,
    /// Native band names, in the order they should appear in the stack.
    pub bands: Vec<String>,
    /// Prepended to every band name so that products sharing native names
    /// (e.g. `B4` in Landsat and Sentinel-2) stay distinct after merging.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ProductRequest {
    pub fn new(product_id: &str, reducer: Option<Reducer>, bands: &[&str]) -> Self {
        Self {
            product_id: product_id.to_string(),
            reducer,
            bands: bands.iter().map(|b| b.to_string()).collect(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Band name as it appears in the merged stack.
    pub fn stack_name(&self, band: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}{band}"),
            None => band.to_string(),
        }
    }

    /// Stack names of every requested band, in request order.
    pub fn stack_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| self.stack_name(b)).collect()
    }
}

/// Everything a source needs to build one composite.
#[derive(Debug, Clone, Copy)]
pub struct CompositeRequest<'a> {
    pub product: &'a ProductRequest,
    pub region: &'a RegionOfInterest,
    pub period: &'a AnalysisPeriod,
}

/// Supplies composited rasters.
///
/// Implementations return a stack whose band names are the request's
/// [`ProductRequest::stack_names`], already reduced over the period and
/// aligned to a common grid.
pub trait RasterSource {
    fn fetch_composite(&self, request: &CompositeRequest<'_>) -> Result<BandStack>;
}

/// Fetch a product and keep exactly the requested bands, in request order.
pub fn fetch_product(source: &dyn RasterSource, request: &CompositeRequest<'_>) -> Result<BandStack> {
    let stack = source.fetch_composite(request)?;
    let names = request.product.stack_names();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    stack.select(&refs)
}

/// Source backed by pre-built stacks keyed by product id.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    products: HashMap<String, BandStack>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product_id: impl Into<String>, stack: BandStack) {
        self.products.insert(product_id.into(), stack);
    }

    pub fn with_product(mut self, product_id: impl Into<String>, stack: BandStack) -> Self {
        self.insert(product_id, stack);
        self
    }
}

impl RasterSource for InMemorySource {
    fn fetch_composite(&self, request: &CompositeRequest<'_>) -> Result<BandStack> {
        self.products
            .get(&request.product.product_id)
            .cloned()
            .ok_or_else(|| RusleError::Source {
                product: request.product.product_id.clone(),
                reason: "product not available".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GridSpec, Raster};

    fn band(name: &str) -> Raster {
        Raster::new(name, GridSpec::new(1, 1, 0.0, 1.0, 0.0, 1.0, "EPSG:32636"), 0.0)
    }

    #[test]
    fn prefix_applies_to_stack_names() {
        let p = ProductRequest::new("COPERNICUS/S2", Some(Reducer::Median), &["B4", "B8"])
            .with_prefix("S2_");
        assert_eq!(p.stack_names(), vec!["S2_B4", "S2_B8"]);
    }

    #[test]
    fn reducer_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Reducer::Sum).unwrap(), "\"sum\"");
    }

    #[test]
    fn fetch_product_selects_requested_bands() {
        let stack = BandStack::from_bands(vec![band("B3"), band("B4"), band("B5")]).unwrap();
        let source = InMemorySource::new().with_product("L8", stack);
        let product = ProductRequest::new("L8", Some(Reducer::Median), &["B5", "B4"]);
        let region = RegionOfInterest::from_bbox("r", 0.0, 0.0, 1.0, 1.0).unwrap();
        let period = AnalysisPeriod::calendar_year(2019).unwrap();
        let req = CompositeRequest { product: &product, region: &region, period: &period };

        let out = fetch_product(&source, &req).unwrap();
        assert_eq!(out.names(), vec!["B5", "B4"]);
    }

    #[test]
    fn unknown_product_is_source_error() {
        let source = InMemorySource::new();
        let product = ProductRequest::new("missing", None, &["b0"]);
        let region = RegionOfInterest::from_bbox("r", 0.0, 0.0, 1.0, 1.0).unwrap();
        let period = AnalysisPeriod::calendar_year(2019).unwrap();
        let req = CompositeRequest { product: &product, region: &region, period: &period };
        assert!(matches!(fetch_product(&source, &req), Err(RusleError::Source { .. })));
    }
}
