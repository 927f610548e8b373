//! Overlay rendering module
//!
//! This module contains:
//! - The layer stack with view-mode presets
//! - Render constants shared by every overlay
//! - Label placement
//! - Scene compositing using tiny-skia

pub mod geometry;
pub mod image;
pub mod labels;
pub mod layers;

pub use image::{DraftOverlay, RenderOutput, RoiOverlay, Scene, render_scene};
pub use labels::PlacedLabel;
pub use layers::LayerStack;
