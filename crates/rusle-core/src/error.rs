//! Error types for the erosion pipeline.
//!
//! Per-pixel degeneracies (zero denominators, out-of-domain inputs) are not
//! errors: they resolve to the raster's no-data sentinel. Everything here is
//! structural and aborts the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RusleError {
    /// Rasters fed to one combining operation do not share grid geometry.
    #[error("grid mismatch in {operation}: `{left}` is {left_shape} but `{right}` is {right_shape}")]
    Alignment {
        operation: &'static str,
        left: String,
        left_shape: String,
        right: String,
        right_shape: String,
    },

    #[error("band `{band}` not found in stack (available: {available})")]
    MissingBand { band: String, available: String },

    #[error("band `{0}` appears more than once in the merged stack")]
    DuplicateBand(String),

    /// Invalid run configuration, detected before any raster is computed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid raster dimensions: {width}x{height} with {len} values")]
    InvalidDimensions { width: usize, height: usize, len: usize },

    #[error("raster source failed for `{product}`: {reason}")]
    Source { product: String, reason: String },

    #[error("result sink failed for `{label}`: {reason}")]
    Sink { label: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RusleError>;
