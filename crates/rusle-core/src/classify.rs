//! Threshold classification of the erosion raster.
//!
//! Two rules are applied to the same erosion raster:
//!   - degradation: mutually exclusive brackets, a value equal to a cut point
//!     belongs to the upper bracket (`v < low → 0`, `v < high → 1`, else 2);
//!   - severity: an additive score where the i-th cut point (1-based) adds
//!     `i` when the value strictly exceeds it. Cuts {0, 10, 50} give scores
//!     {0, 1, 3, 6}, not {0, 1, 2, 3}.
//!
//! A third rule maps erosion (t/ha/yr) to the five soil-loss classes used on
//! published maps, DN 1 (slight) through 5 (severe), with the same
//! upper-bracket boundary rule as degradation.
//!
//! Pixels outside the region or with no-data erosion are [`CLASS_NODATA`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RusleError};
use crate::raster::{ClassifiedRaster, Raster, CLASS_NODATA};
use crate::region::RegionOfInterest;

pub const DEGRADATION_BAND: &str = "soil_degradation";
pub const SEVERITY_BAND: &str = "erosion_classes";
pub const SOIL_LOSS_BAND: &str = "soil_loss_classes";

/// Soil-loss class names for DN 1..=5, with their erosion ranges in t/ha/yr.
pub const SOIL_LOSS_LEGEND: [(&str, &str); 5] = [
    ("Slight", "<10"),
    ("Moderate", "10-40"),
    ("High", "40-70"),
    ("Very High", "70-100"),
    ("Severe", ">100"),
];

/// Strictly increasing, finite cut points. N cuts define N + 1 classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    pub fn new(cuts: Vec<f64>) -> Result<Self> {
        if cuts.is_empty() {
            return Err(RusleError::Configuration("thresholds are empty".into()));
        }
        if let Some(bad) = cuts.iter().find(|c| !c.is_finite()) {
            return Err(RusleError::Configuration(format!("threshold {bad} is not finite")));
        }
        if let Some(pair) = cuts.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RusleError::Configuration(format!(
                "thresholds must be strictly increasing, got {} then {} in {cuts:?}",
                pair[0], pair[1]
            )));
        }
        Ok(Self(cuts))
    }

    /// Built-in defaults, known to be ordered.
    pub(crate) fn from_static(cuts: &[f64]) -> Self {
        debug_assert!(cuts.windows(2).all(|w| w[0] < w[1]));
        Self(cuts.to_vec())
    }

    pub fn cuts(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bracket index: number of cut points `<= value`.
    pub fn bracket(&self, value: f64) -> u8 {
        self.0.iter().take_while(|&&cut| value >= cut).count() as u8
    }

    /// Number of cut points strictly below `value`.
    pub fn exceeded(&self, value: f64) -> u8 {
        self.0.iter().take_while(|&&cut| value > cut).count() as u8
    }

    /// Additive score: sum of the 1-based indices of every cut strictly below `value`.
    pub fn additive_score(&self, value: f64) -> u8 {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &cut)| value > cut)
            .map(|(i, _)| i as u8 + 1)
            .sum()
    }
}

impl TryFrom<Vec<f64>> for Thresholds {
    type Error = RusleError;

    fn try_from(cuts: Vec<f64>) -> Result<Self> {
        Self::new(cuts)
    }
}

impl From<Thresholds> for Vec<f64> {
    fn from(t: Thresholds) -> Self {
        t.0
    }
}

/// How the severity map turns erosion values into class codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityRule {
    /// Weighted sum of exceeded cut points (scores 0, 1, 3, 6 for three cuts).
    #[default]
    AdditiveScore,
    /// Count of exceeded cut points (classes 0, 1, 2, 3 for three cuts).
    Bracketed,
}

fn classify_with<F>(erosion: &Raster, roi: &RegionOfInterest, name: &str, rule: F) -> ClassifiedRaster
where
    F: Fn(f64) -> u8,
{
    let mask = roi.mask(&erosion.grid);
    let data = erosion
        .data
        .iter()
        .zip(mask.iter())
        .map(|(&v, &inside)| {
            if !inside || erosion.is_nodata(v) {
                CLASS_NODATA
            } else {
                rule(v as f64)
            }
        })
        .collect();
    let out = ClassifiedRaster { name: name.to_string(), grid: erosion.grid.clone(), data };
    debug!(band = name, counts = ?out.class_counts(), "classified");
    out
}

/// Soil degradation classes {0, 1, 2} from two cut points.
pub fn classify_degradation(
    erosion: &Raster,
    thresholds: &Thresholds,
    roi: &RegionOfInterest,
) -> ClassifiedRaster {
    classify_with(erosion, roi, DEGRADATION_BAND, |v| thresholds.bracket(v))
}

/// Erosion severity classes under `rule`.
pub fn classify_severity(
    erosion: &Raster,
    thresholds: &Thresholds,
    rule: SeverityRule,
    roi: &RegionOfInterest,
) -> ClassifiedRaster {
    match rule {
        SeverityRule::AdditiveScore => {
            classify_with(erosion, roi, SEVERITY_BAND, |v| thresholds.additive_score(v))
        }
        SeverityRule::Bracketed => {
            classify_with(erosion, roi, SEVERITY_BAND, |v| thresholds.exceeded(v))
        }
    }
}

/// Soil-loss classes DN 1..=5 from four cut points.
pub fn classify_soil_loss(
    erosion: &Raster,
    thresholds: &Thresholds,
    roi: &RegionOfInterest,
) -> ClassifiedRaster {
    classify_with(erosion, roi, SOIL_LOSS_BAND, |v| thresholds.bracket(v) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GridSpec, NODATA};

    fn degradation() -> Thresholds {
        Thresholds::new(vec![50.0, 150.0]).unwrap()
    }

    fn severity() -> Thresholds {
        Thresholds::new(vec![0.0, 10.0, 50.0]).unwrap()
    }

    fn row(values: Vec<f32>) -> (Raster, RegionOfInterest) {
        let n = values.len();
        let grid = GridSpec::new(n, 1, 0.0, n as f64, 0.0, 1.0, "EPSG:32636");
        let roi = RegionOfInterest::from_bbox("all", 0.0, 0.0, n as f64, 1.0).unwrap();
        (Raster::from_vec("erosion", grid, values, Some(NODATA)).unwrap(), roi)
    }

    #[test]
    fn degradation_boundaries_go_to_upper_class() {
        let t = degradation();
        assert_eq!(t.bracket(49.999), 0);
        assert_eq!(t.bracket(50.0), 1);
        assert_eq!(t.bracket(149.999), 1);
        assert_eq!(t.bracket(150.0), 2);
        assert_eq!(t.bracket(150.001), 2);
        assert_eq!(t.bracket(-3.0), 0);
    }

    #[test]
    fn severity_is_additive_score() {
        let t = severity();
        assert_eq!(t.additive_score(0.0), 0);
        assert_eq!(t.additive_score(5.0), 1);
        assert_eq!(t.additive_score(10.0), 1);
        assert_eq!(t.additive_score(20.0), 3);
        assert_eq!(t.additive_score(50.0), 3);
        assert_eq!(t.additive_score(60.0), 6);
        assert_eq!(t.additive_score(-1.0), 0);
    }

    #[test]
    fn bracketed_rule_counts_exceeded_cuts() {
        let (erosion, roi) = row(vec![0.0, 5.0, 20.0, 60.0]);
        let c = classify_severity(&erosion, &severity(), SeverityRule::Bracketed, &roi);
        assert_eq!(c.data, vec![0, 1, 2, 3]);
    }

    #[test]
    fn degradation_raster_classes() {
        let (erosion, roi) = row(vec![49.999, 50.0, 150.0, 150.001, NODATA]);
        let c = classify_degradation(&erosion, &degradation(), &roi);
        assert_eq!(c.name, DEGRADATION_BAND);
        assert_eq!(c.data, vec![0, 1, 2, 2, CLASS_NODATA]);
    }

    #[test]
    fn severity_raster_scores() {
        let (erosion, roi) = row(vec![0.0, 5.0, 20.0, 60.0]);
        let c = classify_severity(&erosion, &severity(), SeverityRule::default(), &roi);
        assert_eq!(c.name, SEVERITY_BAND);
        assert_eq!(c.data, vec![0, 1, 3, 6]);
    }

    #[test]
    fn soil_loss_classes_start_at_one() {
        let t = Thresholds::new(vec![10.0, 40.0, 70.0, 100.0]).unwrap();
        let (erosion, roi) = row(vec![0.0, 9.9, 10.0, 55.0, 70.0, 100.0, 250.0, NODATA]);
        let c = classify_soil_loss(&erosion, &t, &roi);
        assert_eq!(c.name, SOIL_LOSS_BAND);
        assert_eq!(c.data, vec![1, 1, 2, 3, 4, 5, 5, CLASS_NODATA]);
        assert_eq!(SOIL_LOSS_LEGEND.len(), t.len() + 1);
    }

    #[test]
    fn outside_region_is_unclassified() {
        let (erosion, _) = row(vec![100.0, 100.0]);
        let west = RegionOfInterest::from_bbox("west", 0.0, 0.0, 1.0, 1.0).unwrap();
        let c = classify_degradation(&erosion, &degradation(), &west);
        assert_eq!(c.data, vec![1, CLASS_NODATA]);
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        assert!(matches!(
            Thresholds::new(vec![150.0, 50.0]),
            Err(RusleError::Configuration(_))
        ));
        assert!(Thresholds::new(vec![10.0, 10.0]).is_err());
        assert!(Thresholds::new(vec![]).is_err());
        assert!(Thresholds::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn thresholds_deserialize_with_validation() {
        let t: Thresholds = serde_json::from_str("[0, 10, 50]").unwrap();
        assert_eq!(t.cuts(), &[0.0, 10.0, 50.0]);
        assert!(serde_json::from_str::<Thresholds>("[50, 0]").is_err());
    }
}
