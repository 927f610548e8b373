//! Annotation types for drawing on aerial images
//!
//! All annotation geometry is stored in image-pixel coordinates, never in viewport space.

use serde::{Deserialize, Serialize};

use super::geometry::{ImagePixel, ImagePoint, Rect};
use crate::config::ShapeColor;

/// Annotation type as understood by the editor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Point,
    Polygon,
    Measurement,
    Roi,
    /// Created by other clients; rendered and exported but not drawable here
    Circle,
    /// Created by other clients; rendered and exported but not drawable here
    Rectangle,
}

impl AnnotationKind {
    /// Type name used by the annotation store. ROI shapes are stored as polygons.
    pub fn wire_name(self) -> &'static str {
        match self {
            AnnotationKind::Point => "point",
            AnnotationKind::Polygon | AnnotationKind::Roi => "polygon",
            AnnotationKind::Measurement => "measurement",
            AnnotationKind::Circle => "circle",
            AnnotationKind::Rectangle => "rectangle",
        }
    }
}

/// Shape of an annotation in image-pixel coordinates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationGeometry {
    Point { at: ImagePoint },
    Polygon { vertices: Vec<ImagePoint> },
    Measurement { start: ImagePoint, end: ImagePoint },
    Roi { vertices: Vec<ImagePoint> },
    Circle { center: ImagePoint, radius: f64 },
    Rectangle { rect: Rect<ImagePixel> },
}

impl AnnotationGeometry {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationGeometry::Point { .. } => AnnotationKind::Point,
            AnnotationGeometry::Polygon { .. } => AnnotationKind::Polygon,
            AnnotationGeometry::Measurement { .. } => AnnotationKind::Measurement,
            AnnotationGeometry::Roi { .. } => AnnotationKind::Roi,
            AnnotationGeometry::Circle { .. } => AnnotationKind::Circle,
            AnnotationGeometry::Rectangle { .. } => AnnotationKind::Rectangle,
        }
    }
}

/// An annotation owned by exactly one image.
///
/// `id` is `None` while the annotation is a local draft awaiting the store.
/// `local_key` never changes, so a draft keeps its render identity when the
/// server id arrives.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: Option<i64>,
    pub local_key: u64,
    pub image_id: i64,
    pub geometry: AnnotationGeometry,
    pub color: ShapeColor,
    /// Human readable derived value ("45.0 m²", "12.30 m")
    pub derived_label: Option<String>,
    /// Area in m² for polygons and ROIs, length in m for measurements
    pub derived_metric: Option<f64>,
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        self.geometry.kind()
    }

    /// Whether this annotation is still a local draft
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}
