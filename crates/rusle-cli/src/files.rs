//! Directory-backed raster source and result sink.
//!
//! Input layout, one entry per product (`/` in product ids becomes `_`):
//!
//! ```text
//! inputs/LANDSAT_LC08_C01_T1_TOA.json      serialized Vec<Raster>, native band names
//! inputs/USGS_SRTMGL1_003/elevation.tif    or one GeoTIFF per native band
//! ```
//!
//! Composites are expected to be already reduced over the analysis period.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use rusle_core::band_stack::BandStack;
use rusle_core::source::CompositeRequest;
use rusle_core::{
    ClassifiedRaster, ExportRequest, ProductRequest, Raster, RasterSource, ResultSink, RusleError,
};

use crate::geotiff;

/// File-system key for a catalogue product id.
pub fn product_key(product_id: &str) -> String {
    product_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

// ── Source ───────────────────────────────────────────────────────────────────

pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load(&self, product: &ProductRequest) -> Result<BandStack> {
        let key = product_key(&product.product_id);
        let json_path = self.root.join(format!("{key}.json"));

        let bands: Vec<Raster> = if json_path.is_file() {
            let text = fs::read_to_string(&json_path)
                .with_context(|| format!("Cannot read {}", json_path.display()))?;
            let bands: Vec<Raster> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid raster JSON: {}", json_path.display()))?;
            bands
                .into_iter()
                .filter(|b| product.bands.contains(&b.name))
                .collect()
        } else {
            let dir = self.root.join(&key);
            product
                .bands
                .iter()
                .map(|band| geotiff::read_band(&dir.join(format!("{band}.tif")), band))
                .collect::<Result<_>>()?
        };

        let renamed = bands.into_iter().map(|b| {
            let stack_name = product.stack_name(&b.name);
            b.renamed(stack_name)
        });
        Ok(BandStack::from_bands(renamed.collect())?)
    }
}

impl RasterSource for FileSource {
    fn fetch_composite(&self, request: &CompositeRequest<'_>) -> rusle_core::Result<BandStack> {
        let product = request.product;
        debug!(product = %product.product_id, root = %self.root.display(), "loading composite");
        self.load(product).map_err(|e| RusleError::Source {
            product: product.product_id.clone(),
            reason: format!("{e:#}"),
        })
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────────

const STAGING_DIR: &str = ".staging";

#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub label: String,
    pub band: String,
    pub region: String,
    pub scale: f64,
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub class_counts: BTreeMap<u8, usize>,
    pub files: Vec<String>,
}

/// Writes each classified map as `<label>.tif` and `<label>.json`, plus a
/// `manifest.json` describing every export.
///
/// Maps are staged under `.staging/` as they are accepted and only moved into
/// the output directory by [`FileSink::finish`], so a failed run leaves no
/// partial set of maps behind.
pub struct FileSink {
    root: PathBuf,
    staging: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl FileSink {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Cannot clear {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Cannot create output directory {}", root.display()))?;
        Ok(Self { root, staging, entries: Vec::new() })
    }

    fn write(&self, raster: &ClassifiedRaster, label: &str) -> Result<Vec<String>> {
        let tif = format!("{label}.tif");
        let json = format!("{label}.json");
        geotiff::write_classes(&self.staging.join(&tif), raster)?;
        let path = self.staging.join(&json);
        fs::write(&path, serde_json::to_string(raster)?)
            .with_context(|| format!("Write failed: {}", path.display()))?;
        Ok(vec![tif, json])
    }

    /// Move every staged map into the output directory, write `manifest.json`
    /// and return its path.
    pub fn finish(self) -> Result<PathBuf> {
        for file in self.entries.iter().flat_map(|e| &e.files) {
            let (from, to) = (self.staging.join(file), self.root.join(file));
            fs::rename(&from, &to)
                .with_context(|| format!("Cannot move {} to {}", from.display(), to.display()))?;
        }
        fs::remove_dir_all(&self.staging)
            .with_context(|| format!("Cannot remove {}", self.staging.display()))?;

        let path = self.root.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&self.entries)?)
            .with_context(|| format!("Write failed: {}", path.display()))?;
        info!(path = %path.display(), exports = self.entries.len(), "manifest written");
        Ok(path)
    }
}

impl ResultSink for FileSink {
    fn accept(&mut self, raster: &ClassifiedRaster, request: &ExportRequest<'_>) -> rusle_core::Result<()> {
        let grid = &raster.grid;
        if !grid.is_geographic() && (grid.pixel_width() - request.scale).abs() > 1e-6 {
            warn!(
                label = request.label,
                pixel = grid.pixel_width(),
                scale = request.scale,
                "raster resolution differs from export scale; writing native grid"
            );
        }

        let files = self.write(raster, request.label).map_err(|e| RusleError::Sink {
            label: request.label.to_string(),
            reason: format!("{e:#}"),
        })?;
        info!(label = request.label, files = ?files, "map exported");

        self.entries.push(ManifestEntry {
            label: request.label.to_string(),
            band: raster.name.clone(),
            region: request.region.name().to_string(),
            scale: request.scale,
            crs: grid.crs.clone(),
            width: grid.width,
            height: grid.height,
            class_counts: raster.class_counts(),
            files,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusle_core::config::AnalysisPeriod;
    use rusle_core::{GridSpec, Reducer, RegionOfInterest, CLASS_NODATA, NODATA};

    fn grid() -> GridSpec {
        GridSpec::new(2, 2, 0.0, 60.0, 0.0, 60.0, "EPSG:32636")
    }

    fn fetch(source: &FileSource, product: &ProductRequest) -> rusle_core::Result<BandStack> {
        let region = RegionOfInterest::from_bbox("r", 0.0, 0.0, 60.0, 60.0).unwrap();
        let period = AnalysisPeriod::calendar_year(2019).unwrap();
        source.fetch_composite(&CompositeRequest { product, region: &region, period: &period })
    }

    #[test]
    fn product_ids_become_file_keys() {
        assert_eq!(product_key("LANDSAT/LC08/C01/T1_TOA"), "LANDSAT_LC08_C01_T1_TOA");
        assert_eq!(product_key("UCSB-CHG/CHIRPS/PENTAD"), "UCSB-CHG_CHIRPS_PENTAD");
    }

    #[test]
    fn json_stack_is_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let bands = vec![
            Raster::new("B4", grid(), 0.1),
            Raster::new("B8", grid(), 0.5),
            Raster::new("B12", grid(), 0.3),
        ];
        fs::write(dir.path().join("COPERNICUS_S2.json"), serde_json::to_string(&bands).unwrap()).unwrap();

        let source = FileSource::new(dir.path());
        let product =
            ProductRequest::new("COPERNICUS/S2", Some(Reducer::Median), &["B4", "B8"]).with_prefix("S2_");
        let stack = fetch(&source, &product).unwrap();
        assert_eq!(stack.names(), vec!["S2_B4", "S2_B8"]);
    }

    #[test]
    fn geotiff_band_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("DEM")).unwrap();
        let dem = Raster::from_vec("elevation", grid(), vec![1.0, 2.0, 3.0, NODATA], Some(NODATA)).unwrap();
        geotiff::write_band(&dir.path().join("DEM").join("elevation.tif"), &dem).unwrap();

        let source = FileSource::new(dir.path());
        let stack = fetch(&source, &ProductRequest::new("DEM", None, &["elevation"])).unwrap();
        let band = stack.band("elevation").unwrap();
        assert_eq!(band.value(0, 1), Some(2.0));
        assert_eq!(band.value(1, 1), None);
    }

    #[test]
    fn missing_product_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        let err = fetch(&source, &ProductRequest::new("SOIL", None, &["b0"])).unwrap_err();
        assert!(matches!(err, RusleError::Source { ref product, .. } if product == "SOIL"));
    }

    #[test]
    fn sink_writes_maps_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(dir.path().join("out")).unwrap();
        let region = RegionOfInterest::from_bbox("box", 0.0, 0.0, 60.0, 60.0).unwrap();
        let map = ClassifiedRaster {
            name: "soil_degradation".into(),
            grid: GridSpec::new(2, 2, 0.0, 60.0, 0.0, 60.0, "EPSG:32636"),
            data: vec![0, 1, 2, CLASS_NODATA],
        };
        let request = ExportRequest { label: "soil_degradation_map", scale: 30.0, region: &region };
        sink.accept(&map, &request).unwrap();
        let manifest = sink.finish().unwrap();

        let out = dir.path().join("out");
        assert!(out.join("soil_degradation_map.tif").is_file());
        let back: ClassifiedRaster =
            serde_json::from_str(&fs::read_to_string(out.join("soil_degradation_map.json")).unwrap()).unwrap();
        assert_eq!(back, map);

        let entries: serde_json::Value = serde_json::from_str(&fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(entries[0]["label"], "soil_degradation_map");
        assert_eq!(entries[0]["region"], "box");
        assert_eq!(entries[0]["class_counts"]["2"], 1);
        assert!(!out.join(STAGING_DIR).exists());
    }

    #[test]
    fn maps_stay_staged_until_finish() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut sink = FileSink::create(&out).unwrap();
        let region = RegionOfInterest::from_bbox("box", 0.0, 0.0, 60.0, 60.0).unwrap();
        let map = ClassifiedRaster { name: "severity".into(), grid: grid(), data: vec![1, 2, 3, CLASS_NODATA] };
        for label in ["severity_a", "severity_b"] {
            let request = ExportRequest { label, scale: 30.0, region: &region };
            sink.accept(&map, &request).unwrap();
        }

        assert!(!out.join("severity_a.tif").exists());
        assert!(!out.join("manifest.json").exists());
        assert!(out.join(STAGING_DIR).join("severity_b.json").is_file());

        sink.finish().unwrap();
        for file in ["severity_a.tif", "severity_a.json", "severity_b.tif", "severity_b.json", "manifest.json"] {
            assert!(out.join(file).is_file(), "{file}");
        }
        assert!(!out.join(STAGING_DIR).exists());
    }

    #[test]
    fn dropped_sink_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let region = RegionOfInterest::from_bbox("box", 0.0, 0.0, 60.0, 60.0).unwrap();
        {
            let mut sink = FileSink::create(&out).unwrap();
            let map = ClassifiedRaster { name: "severity".into(), grid: grid(), data: vec![1; 4] };
            let request = ExportRequest { label: "severity_map", scale: 30.0, region: &region };
            sink.accept(&map, &request).unwrap();
        }
        assert!(!out.join("severity_map.tif").exists());

        // A new run clears leftovers from the abandoned one.
        FileSink::create(&out).unwrap().finish().unwrap();
        assert!(!out.join("severity_map.tif").exists());
        assert!(!out.join(STAGING_DIR).exists());
    }
}
