//! Run configuration.
//!
//! Everything a run depends on is carried explicitly here and passed into
//! every collaborator call: region, period, products, band names, thresholds.
//! Defaults reproduce the reference 2019 Amman–Zarqa basin run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::classify::{SeverityRule, Thresholds};
use crate::error::{Result, RusleError};
use crate::region::RegionOfInterest;
use crate::source::{ProductRequest, Reducer};

/// Polygon boundary, in the CRS of the input rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    /// Exterior ring as `[x, y]` pairs; closing vertex optional.
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl RegionConfig {
    pub fn from_bbox(name: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            name: name.to_string(),
            exterior: vec![[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]],
            holes: Vec::new(),
        }
    }

    pub fn build(&self) -> Result<RegionOfInterest> {
        let ring = |pts: &[[f64; 2]]| pts.iter().map(|p| (p[0], p[1])).collect::<Vec<_>>();
        RegionOfInterest::with_holes(
            self.name.clone(),
            ring(&self.exterior),
            self.holes.iter().map(|h| ring(h)).collect(),
        )
    }
}

/// Inclusive analysis date range handed to the raster source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let period = Self { start, end };
        period.validate()?;
        Ok(period)
    }

    /// January 1st through December 31st of `year`.
    pub fn calendar_year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(RusleError::Configuration(format!("year {year} is out of range"))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(RusleError::Configuration(format!(
                "analysis period starts {} after it ends {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Products fetched for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    /// Multispectral composites, merged into one band stack in this order.
    pub multispectral: Vec<ProductRequest>,
    pub elevation: ProductRequest,
    /// Periodic rainfall, summed over the period.
    pub rainfall: ProductRequest,
    /// Categorical soil texture classes.
    pub soil_texture: ProductRequest,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self {
            multispectral: vec![
                ProductRequest::new(
                    "LANDSAT/LC08/C01/T1_TOA",
                    Some(Reducer::Median),
                    &["B2", "B3", "B4", "B5", "B6", "B7", "B10", "B11"],
                ),
                ProductRequest::new(
                    "COPERNICUS/S2",
                    Some(Reducer::Median),
                    &["B2", "B3", "B4", "B8", "B11", "B12"],
                )
                .with_prefix("S2_"),
                ProductRequest::new(
                    "MODIS/006/MOD09A1",
                    Some(Reducer::Median),
                    &["sur_refl_b01", "sur_refl_b02", "sur_refl_b06", "sur_refl_b07"],
                ),
            ],
            elevation: ProductRequest::new("USGS/SRTMGL1_003", None, &["elevation"]),
            rainfall: ProductRequest::new("UCSB-CHG/CHIRPS/PENTAD", Some(Reducer::Sum), &["precipitation"]),
            soil_texture: ProductRequest::new(
                "OpenLandMap/SOL/SOL_TEXTURE-CLASS_USDA-TT_M/v02",
                None,
                &["b0"],
            ),
        }
    }
}

/// Stack names of the bands feeding NDVI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandMapping {
    pub nir: String,
    pub red: String,
}

impl Default for BandMapping {
    fn default() -> Self {
        // Landsat 8 OLI.
        Self { nir: "B5".into(), red: "B4".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Two cut points: {low, high}.
    pub degradation: Thresholds,
    /// Three cut points.
    pub severity: Thresholds,
    /// Four cut points, t/ha/yr, for soil-loss classes DN 1..=5.
    #[serde(default = "default_soil_loss")]
    pub soil_loss: Thresholds,
}

fn default_soil_loss() -> Thresholds {
    Thresholds::from_static(&[10.0, 40.0, 70.0, 100.0])
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            degradation: Thresholds::from_static(&[50.0, 150.0]),
            severity: Thresholds::from_static(&[0.0, 10.0, 50.0]),
            soil_loss: default_soil_loss(),
        }
    }
}

/// Labels and resolution handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub degradation_label: String,
    pub severity_label: String,
    /// When set, the soil-loss class map is exported under this label too.
    pub soil_loss_label: Option<String>,
    /// Export resolution, CRS units per pixel.
    pub scale: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            degradation_label: "soil_degradation_map".into(),
            severity_label: "annual_soil_erosion_classes".into(),
            soil_loss_label: None,
            scale: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub region: RegionConfig,
    pub period: AnalysisPeriod,
    #[serde(default)]
    pub products: ProductCatalog,
    #[serde(default)]
    pub bands: BandMapping,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub severity_rule: SeverityRule,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: RegionConfig::from_bbox("AZB_watershed", 35.70, 31.75, 36.60, 32.40),
            period: AnalysisPeriod {
                start: NaiveDate::from_ymd_opt(2019, 1, 1).expect("valid date"),
                end: NaiveDate::from_ymd_opt(2019, 12, 31).expect("valid date"),
            },
            products: ProductCatalog::default(),
            bands: BandMapping::default(),
            thresholds: ThresholdConfig::default(),
            severity_rule: SeverityRule::default(),
            export: ExportConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RusleError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant that does not need raster data.
    pub fn validate(&self) -> Result<()> {
        self.region.build()?;
        self.period.validate()?;

        if self.thresholds.degradation.len() != 2 {
            return Err(RusleError::Configuration(format!(
                "degradation needs 2 thresholds, got {}",
                self.thresholds.degradation.len()
            )));
        }
        if self.thresholds.severity.len() != 3 {
            return Err(RusleError::Configuration(format!(
                "erosion severity needs 3 thresholds, got {}",
                self.thresholds.severity.len()
            )));
        }

        if self.thresholds.soil_loss.len() != 4 {
            return Err(RusleError::Configuration(format!(
                "soil loss needs 4 thresholds, got {}",
                self.thresholds.soil_loss.len()
            )));
        }

        if self.products.multispectral.is_empty() {
            return Err(RusleError::Configuration("no multispectral products configured".into()));
        }
        for p in &self.products.multispectral {
            if p.bands.is_empty() {
                return Err(RusleError::Configuration(format!(
                    "product `{}` selects no bands",
                    p.product_id
                )));
            }
        }
        for p in [&self.products.elevation, &self.products.rainfall, &self.products.soil_texture] {
            if p.bands.len() != 1 {
                return Err(RusleError::Configuration(format!(
                    "product `{}` must select exactly one band, got {}",
                    p.product_id,
                    p.bands.len()
                )));
            }
        }

        let stack_names: Vec<String> = self
            .products
            .multispectral
            .iter()
            .flat_map(|p| p.stack_names())
            .collect();
        for (i, name) in stack_names.iter().enumerate() {
            if stack_names[..i].contains(name) {
                return Err(RusleError::DuplicateBand(name.clone()));
            }
        }
        for band in [&self.bands.nir, &self.bands.red] {
            if !stack_names.contains(band) {
                return Err(RusleError::Configuration(format!(
                    "NDVI band `{band}` is not selected by any multispectral product"
                )));
            }
        }

        if !(self.export.scale.is_finite() && self.export.scale > 0.0) {
            return Err(RusleError::Configuration(format!(
                "export scale must be positive, got {}",
                self.export.scale
            )));
        }
        Ok(())
    }
}
