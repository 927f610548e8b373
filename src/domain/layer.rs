//! Overlay layer and view-mode types

use serde::{Deserialize, Serialize};

use crate::config::ShapeColor;

/// Semantic channel a layer draws
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerCategory {
    Original,
    Vegetation,
    Health,
    Trees,
    Pests,
    Water,
    Heatmap,
    Roi,
}

impl LayerCategory {
    pub const ALL: [LayerCategory; 8] = [
        LayerCategory::Original,
        LayerCategory::Vegetation,
        LayerCategory::Health,
        LayerCategory::Trees,
        LayerCategory::Pests,
        LayerCategory::Water,
        LayerCategory::Heatmap,
        LayerCategory::Roi,
    ];

    /// Compositing tier; lower tiers are drawn first
    pub fn z_tier(self) -> u8 {
        match self {
            LayerCategory::Original => 0,
            LayerCategory::Vegetation
            | LayerCategory::Health
            | LayerCategory::Heatmap
            | LayerCategory::Water => 1,
            LayerCategory::Trees | LayerCategory::Pests => 2,
            LayerCategory::Roi => 3,
        }
    }

    /// Procedural layers are gradients keyed off a scalar metric
    pub fn is_procedural(self) -> bool {
        self.z_tier() == 1
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LayerCategory::Original => "Original",
            LayerCategory::Vegetation => "Vegetation",
            LayerCategory::Health => "Health",
            LayerCategory::Trees => "Trees",
            LayerCategory::Pests => "Pests",
            LayerCategory::Water => "Water",
            LayerCategory::Heatmap => "Heatmap",
            LayerCategory::Roi => "ROI",
        }
    }

    pub fn default_color(self) -> ShapeColor {
        match self {
            LayerCategory::Original => ShapeColor::rgb(1.0, 1.0, 1.0),
            LayerCategory::Vegetation => ShapeColor::rgb(0.13, 0.77, 0.37),
            LayerCategory::Health => ShapeColor::rgb(0.92, 0.70, 0.03),
            LayerCategory::Trees => ShapeColor::rgb(0.09, 0.64, 0.29),
            LayerCategory::Pests => ShapeColor::rgb(0.86, 0.15, 0.15),
            LayerCategory::Water => ShapeColor::rgb(0.23, 0.51, 0.96),
            LayerCategory::Heatmap => ShapeColor::rgb(0.98, 0.45, 0.09),
            LayerCategory::Roi => ShapeColor::rgb(0.02, 0.71, 0.83),
        }
    }
}

/// An independently toggleable visual channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub category: LayerCategory,
    pub visible: bool,
    /// Opacity percentage, 0..=100
    pub opacity: u8,
    pub color: ShapeColor,
}

impl Layer {
    pub fn new(category: LayerCategory) -> Self {
        Self {
            id: format!("{:?}", category).to_lowercase(),
            name: category.display_name().to_string(),
            category,
            visible: category == LayerCategory::Original,
            opacity: if category == LayerCategory::Original { 100 } else { 70 },
            color: category.default_color(),
        }
    }

    /// Opacity as 0.0-1.0
    pub fn alpha(&self) -> f32 {
        self.opacity.min(100) as f32 / 100.0
    }
}

/// A named bundle of layer visibility flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Original,
    Vegetation,
    Health,
    Detection,
    Water,
    Heatmap,
    Full,
}

impl ViewMode {
    pub const ALL: [ViewMode; 7] = [
        ViewMode::Original,
        ViewMode::Vegetation,
        ViewMode::Health,
        ViewMode::Detection,
        ViewMode::Water,
        ViewMode::Heatmap,
        ViewMode::Full,
    ];

    /// Layers visible in this preset; every other layer is hidden
    pub fn visible_layers(self) -> &'static [LayerCategory] {
        use LayerCategory::*;
        match self {
            ViewMode::Original => &[Original],
            ViewMode::Vegetation => &[Original, Vegetation],
            ViewMode::Health => &[Original, Health],
            ViewMode::Detection => &[Original, Vegetation, Trees, Pests],
            ViewMode::Water => &[Original, Water],
            ViewMode::Heatmap => &[Original, Heatmap],
            ViewMode::Full => &[Original, Vegetation, Health, Trees, Pests, Roi],
        }
    }

    pub fn shows(self, category: LayerCategory) -> bool {
        self.visible_layers().contains(&category)
    }

    pub fn key(self) -> &'static str {
        match self {
            ViewMode::Original => "original",
            ViewMode::Vegetation => "vegetation",
            ViewMode::Health => "health",
            ViewMode::Detection => "detection",
            ViewMode::Water => "water",
            ViewMode::Heatmap => "heatmap",
            ViewMode::Full => "full",
        }
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewMode::ALL
            .into_iter()
            .find(|m| m.key() == s.trim())
            .ok_or_else(|| format!("unknown view mode '{s}'"))
    }
}
