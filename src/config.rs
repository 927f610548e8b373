//! Configuration persistence for croplens settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisKind, ViewMode};

/// Serializable color representation for config storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for ShapeColor {
    fn default() -> Self {
        // Matches the store's default annotation color (#FF0000)
        Self {
            r: 1.0,
            g: 0.0,
            b: 0.0,
        }
    }
}

impl ShapeColor {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Convert to image crate RGBA format (0-255)
    pub fn to_rgba_u8(self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            255,
        ]
    }

    /// `#RRGGBB` as stored by the annotation backend
    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba_u8();
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    /// Parse `#RRGGBB` (leading `#` optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)? as f32 / 255.0,
            g: channel(2)? as f32 / 255.0,
            b: channel(4)? as f32 / 255.0,
        })
    }
}

/// Unit convention of the zoom control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZoomConvention {
    /// Plain scale factor, clamped to [0.05, 15]
    #[default]
    Factor,
    /// Percentage, clamped to [25, 300]
    Percent,
}

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropLensConfig {
    /// Backend root URL
    pub api_base_url: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Delay between analysis-summary polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on analysis-summary polls
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    /// Analyses requested for an ROI when the caller names none
    #[serde(default = "default_analyses")]
    pub default_analyses: Vec<AnalysisKind>,
    /// Color for point and polygon annotations
    pub annotation_color: ShapeColor,
    /// Color for measurement lines
    pub measurement_color: ShapeColor,
    /// Color for the ROI polygon
    pub roi_color: ShapeColor,
    /// GSD used when the backend reports none (flagged as estimated)
    #[serde(default = "default_fallback_gsd_m")]
    pub fallback_gsd_m: f64,
    /// Initial view-mode preset
    #[serde(default)]
    pub default_view_mode: ViewMode,
    /// Zoom unit convention
    #[serde(default)]
    pub zoom_convention: ZoomConvention,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_max_attempts() -> u32 {
    60 // ~2 minutes at the default interval
}

fn default_analyses() -> Vec<AnalysisKind> {
    vec![AnalysisKind::Vegetation, AnalysisKind::Health]
}

fn default_fallback_gsd_m() -> f64 {
    0.03
}

impl CropLensConfig {
    /// Directory name under the platform config dir
    pub const ID: &'static str = "croplens";

    /// Environment variable overriding `api_base_url`
    pub const API_URL_ENV: &'static str = "CROPLENS_API_URL";

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Default location of the stored session token
    pub fn session_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("session.json"))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("Error loading config, using defaults: {:?}", err);
                    Self::default()
                }
            },
            Some(_) => Self::default(),
            None => {
                log::warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };
        if let Ok(url) = std::env::var(Self::API_URL_ENV)
            && !url.trim().is_empty()
        {
            config.api_base_url = url;
        }
        config
    }

    /// Save configuration to disk
    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            log::error!("Could not determine config directory for saving");
            return;
        };
        if let Err(err) = self.save_to(&path) {
            log::error!("Failed to save config: {:?}", err);
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Malformed config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CropLensConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            default_analyses: default_analyses(),
            annotation_color: ShapeColor::default(),
            // Yellow
            measurement_color: ShapeColor::rgb(1.0, 0.9, 0.0),
            // Cyan
            roi_color: ShapeColor::rgb(0.02, 0.71, 0.83),
            fallback_gsd_m: default_fallback_gsd_m(),
            default_view_mode: ViewMode::Original,
            zoom_convention: ZoomConvention::Factor,
        }
    }
}
