//! Result sink seam: where the classified maps go once a run succeeds.

use crate::error::Result;
use crate::raster::ClassifiedRaster;
use crate::region::RegionOfInterest;

/// Metadata accompanying each exported map.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    /// Descriptive label, e.g. `soil_degradation_map`.
    pub label: &'a str,
    /// Target resolution, CRS units per pixel.
    pub scale: f64,
    pub region: &'a RegionOfInterest,
}

/// Persists or renders labelled classified rasters.
pub trait ResultSink {
    fn accept(&mut self, raster: &ClassifiedRaster, request: &ExportRequest<'_>) -> Result<()>;
}

/// Sink that keeps every accepted map in memory, keyed by label.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub outputs: Vec<(String, ClassifiedRaster)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &str) -> Option<&ClassifiedRaster> {
        self.outputs.iter().find(|(l, _)| l == label).map(|(_, r)| r)
    }
}

impl ResultSink for MemorySink {
    fn accept(&mut self, raster: &ClassifiedRaster, request: &ExportRequest<'_>) -> Result<()> {
        self.outputs.push((request.label.to_string(), raster.clone()));
        Ok(())
    }
}
