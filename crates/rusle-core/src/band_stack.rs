//! Ordered, name-addressed collection of single-band rasters.

use crate::error::{Result, RusleError};
use crate::raster::Raster;

#[derive(Debug, Clone, Default)]
pub struct BandStack {
    bands: Vec<Raster>,
}

impl BandStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stack from rasters, rejecting duplicate band names.
    pub fn from_bands(bands: Vec<Raster>) -> Result<Self> {
        let mut stack = Self::new();
        for band in bands {
            stack.push(band)?;
        }
        Ok(stack)
    }

    /// Append a band. Names must be unique within the stack.
    pub fn push(&mut self, band: Raster) -> Result<()> {
        if self.contains(&band.name) {
            return Err(RusleError::DuplicateBand(band.name));
        }
        self.bands.push(band);
        Ok(())
    }

    /// Concatenate stacks in order. Name collisions are an error, never renamed.
    pub fn merge(stacks: impl IntoIterator<Item = BandStack>) -> Result<Self> {
        let mut merged = Self::new();
        for stack in stacks {
            for band in stack.bands {
                merged.push(band)?;
            }
        }
        Ok(merged)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    /// Look up a band by name.
    pub fn band(&self, name: &str) -> Result<&Raster> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| RusleError::MissingBand {
                band: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Ordered sub-stack with the named bands.
    pub fn select(&self, names: &[&str]) -> Result<BandStack> {
        let mut out = BandStack::new();
        for name in names {
            out.push(self.band(name)?.clone())?;
        }
        Ok(out)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Raster> {
        self.bands.iter()
    }

    pub fn into_bands(self) -> Vec<Raster> {
        self.bands
    }
}
