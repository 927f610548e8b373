//! Pure domain types with minimal dependencies
//!
//! This module contains core types used throughout the engine.
//! Types here must not depend on the network client or the renderer
//! to avoid circular dependencies.

pub mod analysis;
pub mod annotation;
pub mod geometry;
pub mod imagery;
pub mod layer;

pub use analysis::*;
pub use annotation::*;
pub use geometry::*;
pub use imagery::*;
pub use layer::*;
