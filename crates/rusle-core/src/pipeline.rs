//! Pipeline orchestrator: fetches inputs, runs every stage in order, hands the
//! classified maps to a sink.

use tracing::{debug, info, warn};

use crate::band_stack::BandStack;
use crate::classify::{classify_degradation, classify_severity, classify_soil_loss};
use crate::compositor::combine;
use crate::config::PipelineConfig;
use crate::error::{Result, RusleError};
use crate::factors::{c_factor, k_factor, ls_factor, r_factor, FactorRaster};
use crate::raster::{ClassifiedRaster, Raster};
use crate::region::RegionOfInterest;
use crate::sink::{ExportRequest, ResultSink};
use crate::source::{fetch_product, CompositeRequest, ProductRequest, RasterSource};
use crate::spectral::compute_ndvi;
use crate::terrain::compute_slope_degrees;

// ── Public structs ────────────────────────────────────────────────────────────

/// Composites fetched for one run.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Merged multispectral bands.
    pub stack: BandStack,
    pub elevation: Raster,
    /// Rainfall summed over the analysis period.
    pub rainfall: Raster,
    pub soil_texture: Raster,
}

/// Every raster a run produces, intermediates included.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub ndvi: Raster,
    pub slope: Raster,
    pub r: FactorRaster,
    pub k: FactorRaster,
    pub ls: FactorRaster,
    pub c: FactorRaster,
    pub erosion: Raster,
    pub degradation: ClassifiedRaster,
    pub severity: ClassifiedRaster,
    /// Soil-loss classes DN 1..=5.
    pub soil_loss: ClassifiedRaster,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct ErosionPipeline {
    config: PipelineConfig,
    region: RegionOfInterest,
}

impl ErosionPipeline {
    /// Validate the configuration. Nothing is fetched or computed on failure.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let region = config.region.build()?;
        Ok(Self { config, region })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn region(&self) -> &RegionOfInterest {
        &self.region
    }

    fn request<'a>(&'a self, product: &'a ProductRequest) -> CompositeRequest<'a> {
        CompositeRequest { product, region: &self.region, period: &self.config.period }
    }

    fn fetch_single(&self, source: &dyn RasterSource, product: &ProductRequest) -> Result<Raster> {
        let stack = fetch_product(source, &self.request(product))?;
        stack
            .into_bands()
            .into_iter()
            .next()
            .ok_or_else(|| RusleError::Source {
                product: product.product_id.clone(),
                reason: "composite has no bands".into(),
            })
    }

    /// Fetch every composite the run needs from `source`.
    pub fn fetch_inputs(&self, source: &dyn RasterSource) -> Result<PipelineInputs> {
        let products = &self.config.products;

        let mut stacks = Vec::with_capacity(products.multispectral.len());
        for product in &products.multispectral {
            let stack = fetch_product(source, &self.request(product))?;
            debug!(product = %product.product_id, bands = stack.len(), "composite fetched");
            stacks.push(stack);
        }
        let stack = BandStack::merge(stacks)?;

        Ok(PipelineInputs {
            stack,
            elevation: self.fetch_single(source, &products.elevation)?,
            rainfall: self.fetch_single(source, &products.rainfall)?,
            soil_texture: self.fetch_single(source, &products.soil_texture)?,
        })
    }

    /// Run every stage on already-fetched inputs.
    ///
    /// Stage order:
    ///   1. NDVI and slope
    ///   2. R, K, LS, C factors (concurrent with the `threading` feature)
    ///   3. Erosion composite
    ///   4. Degradation, severity and soil-loss classification
    pub fn evaluate(&self, inputs: &PipelineInputs) -> Result<PipelineOutputs> {
        let region = &self.region;

        // ── 1. Derived rasters ──────────────────────────────────────────────
        // Slope sees the full DEM so cells on the region edge keep their
        // neighbourhood; both rasters are clipped before any further use.
        let ndvi = compute_ndvi(&inputs.stack, &self.config.bands.nir, &self.config.bands.red)?;
        let slope = compute_slope_degrees(&inputs.elevation);

        if !region.overlaps(&ndvi.grid) {
            warn!(region = region.name(), grid = %ndvi.grid.describe(), "region does not overlap input grid");
        }
        let ndvi = region.clip(&ndvi);
        let slope = region.clip(&slope);

        // ── 2. Factors ──────────────────────────────────────────────────────
        let (r, k, ls, c) = compute_factors(inputs, &slope, &ndvi, region)?;

        // ── 3. Erosion composite ────────────────────────────────────────────
        let erosion = combine(&r, &k, &ls, &c)?;

        // ── 4. Classification ───────────────────────────────────────────────
        let thresholds = &self.config.thresholds;
        let degradation = classify_degradation(&erosion, &thresholds.degradation, region);
        let severity =
            classify_severity(&erosion, &thresholds.severity, self.config.severity_rule, region);
        let soil_loss = classify_soil_loss(&erosion, &thresholds.soil_loss, region);

        info!(
            region = region.name(),
            erosion_valid = erosion.valid_count(),
            degradation = ?degradation.class_counts(),
            severity = ?severity.class_counts(),
            soil_loss = ?soil_loss.class_counts(),
            "erosion classified"
        );

        Ok(PipelineOutputs { ndvi, slope, r, k, ls, c, erosion, degradation, severity, soil_loss })
    }

    /// Fetch inputs and evaluate.
    pub fn run(&self, source: &dyn RasterSource) -> Result<PipelineOutputs> {
        info!(
            region = self.region.name(),
            start = %self.config.period.start,
            end = %self.config.period.end,
            "pipeline started"
        );
        let inputs = self.fetch_inputs(source)?;
        self.evaluate(&inputs)
    }

    /// Hand the classified maps to `sink`: degradation, severity, then soil
    /// loss when it has a label. Persisting sinks must not publish anything
    /// until every map has been accepted.
    pub fn export(&self, outputs: &PipelineOutputs, sink: &mut dyn ResultSink) -> Result<()> {
        let export = &self.config.export;
        let mut maps = vec![
            (&outputs.degradation, export.degradation_label.as_str()),
            (&outputs.severity, export.severity_label.as_str()),
        ];
        if let Some(label) = &export.soil_loss_label {
            maps.push((&outputs.soil_loss, label.as_str()));
        }
        for (raster, label) in maps {
            let request = ExportRequest { label, scale: export.scale, region: &self.region };
            sink.accept(raster, &request)?;
            debug!(label, "exported");
        }
        Ok(())
    }
}

// ── Factor evaluation ─────────────────────────────────────────────────────────

type Factors = (FactorRaster, FactorRaster, FactorRaster, FactorRaster);

#[cfg(feature = "threading")]
fn compute_factors(
    inputs: &PipelineInputs,
    slope: &Raster,
    ndvi: &Raster,
    region: &RegionOfInterest,
) -> Result<Factors> {
    let ((r, k), (ls, c)) = rayon::join(
        || {
            rayon::join(
                || r_factor(&inputs.rainfall, region),
                || k_factor(&inputs.soil_texture, region),
            )
        },
        || {
            rayon::join(
                || ls_factor(slope, ndvi, region),
                || c_factor(&inputs.rainfall.grid, region),
            )
        },
    );
    Ok((r, k, ls?, c))
}

#[cfg(not(feature = "threading"))]
fn compute_factors(
    inputs: &PipelineInputs,
    slope: &Raster,
    ndvi: &Raster,
    region: &RegionOfInterest,
) -> Result<Factors> {
    let r = r_factor(&inputs.rainfall, region);
    let k = k_factor(&inputs.soil_texture, region);
    let ls = ls_factor(slope, ndvi, region)?;
    let c = c_factor(&inputs.rainfall.grid, region);
    Ok((r, k, ls, c))
}

// ── Unit tests ────────────────────────────────────────────────────────────────
