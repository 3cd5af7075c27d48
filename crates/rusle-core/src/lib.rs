//! RUSLE-style annual soil erosion estimation over a region of interest.
//!
//! Factor rasters (R, K, LS, C) are derived from composited inputs, multiplied
//! into an erosion index and classified into degradation and severity maps.
//! Raster acquisition and export sit behind the [`source::RasterSource`] and
//! [`sink::ResultSink`] traits.

pub mod band_stack;
pub mod classify;
pub mod compositor;
pub mod config;
pub mod error;
pub mod factors;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod sink;
pub mod source;
pub mod spectral;
pub mod terrain;

pub use band_stack::BandStack;
pub use classify::{SeverityRule, Thresholds};
pub use config::{AnalysisPeriod, PipelineConfig};
pub use error::{Result, RusleError};
pub use factors::{FactorKind, FactorRaster};
pub use pipeline::{ErosionPipeline, PipelineInputs, PipelineOutputs};
pub use raster::{ClassifiedRaster, GridSpec, Raster, CLASS_NODATA, NODATA};
pub use region::RegionOfInterest;
pub use sink::{ExportRequest, MemorySink, ResultSink};
pub use source::{InMemorySource, ProductRequest, RasterSource, Reducer};
