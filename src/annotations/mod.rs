//! Annotation drawing, persistence and export
//!
//! This module provides:
//! - The drawing tool state machine and eraser hit testing
//! - Message handlers for DrawMsg
//! - Optimistic persistence against the annotation store
//! - Local GeoJSON export

pub mod geojson;
pub mod handlers;
pub mod sync;
pub mod tools;

pub use sync::{AnnotationSync, PendingCreate};
pub use tools::{DrawOutcome, DrawingState, Tool};
