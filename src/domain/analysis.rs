//! Analysis categories and ML results consumed by the overlays

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::geometry::{ImagePixel, ImagePoint, Rect};

/// Analysis that can be requested for a region of interest
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Vegetation,
    Health,
    PlantCount,
    PestDisease,
    Biomass,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Vegetation,
        AnalysisKind::Health,
        AnalysisKind::PlantCount,
        AnalysisKind::PestDisease,
        AnalysisKind::Biomass,
    ];

    /// Key used on the wire and in result objects
    pub fn key(self) -> &'static str {
        match self {
            AnalysisKind::Vegetation => "vegetation",
            AnalysisKind::Health => "health",
            AnalysisKind::PlantCount => "plant_count",
            AnalysisKind::PestDisease => "pest_disease",
            AnalysisKind::Biomass => "biomass",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.key() == s.trim())
            .ok_or_else(|| format!("unknown analysis '{s}'"))
    }
}

/// A tree detected by the backend
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeDetection {
    pub center: ImagePoint,
    /// Detected crown area in pixels
    pub area_px: f64,
}

impl TreeDetection {
    /// Radius of a circle with the detected area
    pub fn radius_px(&self) -> f64 {
        (self.area_px.max(0.0) / std::f64::consts::PI).sqrt()
    }
}

/// A pest or disease region detected by the backend
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PestRegion {
    pub bbox: Rect<ImagePixel>,
    /// 0.0-1.0
    #[serde(default)]
    pub severity: f64,
}

/// Scalar metrics and vector detections driving the overlay layers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    /// Percentage of vegetated pixels, 0-100
    #[serde(default)]
    pub vegetation_pct: Option<f64>,
    /// Health index, 0-100
    #[serde(default)]
    pub health_index: Option<f64>,
    /// Percentage of water pixels, 0-100
    #[serde(default)]
    pub water_pct: Option<f64>,
    /// Stress/heat score, 0-100
    #[serde(default)]
    pub heat_index: Option<f64>,
    #[serde(default)]
    pub trees: Vec<TreeDetection>,
    #[serde(default)]
    pub pests: Vec<PestRegion>,
}
