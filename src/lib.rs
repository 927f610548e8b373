//! Geospatial annotation and region-of-interest analysis for aerial crop imagery
//!
//! The engine maps pointer input between viewport, image-pixel and UTM frames,
//! turns drawing gestures into measured annotations that persist optimistically
//! against the dashboard backend, composites analysis overlays with tiny-skia,
//! and runs the three-step ROI analysis workflow.

pub mod annotations;
pub mod api;
pub mod config;
pub mod domain;
pub mod imagery;
pub mod measure;
pub mod render;
pub mod roi;
pub mod session;
pub mod transform;
