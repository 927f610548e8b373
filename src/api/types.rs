//! Wire types exchanged with the dashboard backend
//!
//! These mirror the JSON the backend produces. Conversions into domain types
//! live here so the rest of the crate never sees raw wire shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ShapeColor;
use crate::domain::{
    AnalysisKind, Annotation, AnnotationGeometry, GeoPoint, GroundSampleDistance, ImageInfo,
    ImagePoint, Rect, UtmCorners, UtmInfo,
};

// ============================================================================
// Images
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub images: Vec<ImageInfo>,
    #[serde(default)]
    pub total: u64,
}

/// `GET images/{id}/gsd`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GsdResponse {
    #[serde(default)]
    pub image_id: Option<i64>,
    #[serde(default)]
    pub gsd_m: Option<f64>,
    #[serde(default)]
    pub gsd_cm: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub is_estimated: bool,
}

impl GsdResponse {
    /// Resolve to a usable GSD, substituting `fallback_m` (flagged as
    /// estimated) when the backend has no positive value
    pub fn resolve(&self, fallback_m: f64) -> GroundSampleDistance {
        match self.gsd_m {
            Some(m) if m.is_finite() && m > 0.0 => GroundSampleDistance {
                meters_per_pixel: m,
                is_estimated: self.is_estimated,
            },
            _ => GroundSampleDistance::estimated(fallback_m),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EastingNorthing {
    pub easting: f64,
    pub northing: f64,
}

impl From<EastingNorthing> for GeoPoint {
    fn from(p: EastingNorthing) -> Self {
        GeoPoint::from_utm(p.easting, p.northing)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtmCornersResponse {
    #[serde(alias = "topLeft")]
    pub top_left: EastingNorthing,
    #[serde(alias = "bottomRight")]
    pub bottom_right: EastingNorthing,
}

/// `GET images/{id}/utm-info`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmInfoResponse {
    #[serde(default, alias = "hasGps")]
    pub has_gps: bool,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default, alias = "centerPoint")]
    pub center_point: Option<EastingNorthing>,
    #[serde(default)]
    pub corners: Option<UtmCornersResponse>,
}

impl From<UtmInfoResponse> for UtmInfo {
    fn from(r: UtmInfoResponse) -> Self {
        UtmInfo {
            has_gps: r.has_gps,
            zone: r.zone,
            center_point: r.center_point.map(Into::into),
            corners: r.corners.map(|c| UtmCorners {
                top_left: c.top_left.into(),
                bottom_right: c.bottom_right.into(),
            }),
        }
    }
}

// ============================================================================
// Annotations
// ============================================================================

/// Value of `data.role` marking a polygon as the region of interest
pub const ROI_ROLE: &str = "roi";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl From<ImagePoint> for Xy {
    fn from(p: ImagePoint) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<Xy> for ImagePoint {
    fn from(p: Xy) -> Self {
        ImagePoint::new(p.x, p.y)
    }
}

/// Free-form `data` payload of an annotation record.
///
/// Keys this client does not know are kept in `extra` so a round trip through
/// the editor never drops fields written by other clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Xy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Xy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Xy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "areaM2", default, skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(rename = "perimeterM", default, skip_serializing_if = "Option::is_none")]
    pub perimeter_m: Option<f64>,
    #[serde(
        rename = "distancePixels",
        alias = "distance_pixels",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub distance_pixels: Option<f64>,
    #[serde(
        rename = "distanceM",
        alias = "distance_meters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An annotation as stored by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: i64,
    pub image_id: i64,
    pub annotation_type: String,
    #[serde(default)]
    pub data: AnnotationData,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl AnnotationRecord {
    /// Creation time, accepting both offset and naive ISO-8601 timestamps
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.created_at.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&chrono::Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|t| t.and_utc())
            })
    }

    /// Convert into an editor annotation.
    ///
    /// Returns `None` for unknown types or records whose data is missing the
    /// fields their type needs.
    pub fn to_annotation(&self, local_key: u64) -> Option<Annotation> {
        let d = &self.data;
        let geometry = match self.annotation_type.as_str() {
            "point" => AnnotationGeometry::Point {
                at: ImagePoint::new(d.x?, d.y?),
            },
            "polygon" => {
                let vertices: Vec<ImagePoint> =
                    d.points.as_ref()?.iter().copied().map(ImagePoint::from).collect();
                if d.role.as_deref() == Some(ROI_ROLE) {
                    AnnotationGeometry::Roi { vertices }
                } else {
                    AnnotationGeometry::Polygon { vertices }
                }
            }
            "measurement" => AnnotationGeometry::Measurement {
                start: d.start?.into(),
                end: d.end?.into(),
            },
            "circle" => AnnotationGeometry::Circle {
                center: d.center?.into(),
                radius: d.radius?,
            },
            "rectangle" => AnnotationGeometry::Rectangle {
                rect: Rect::from_xywh(d.x?, d.y?, d.width?, d.height?),
            },
            other => {
                log::warn!("Skipping annotation {} of unknown type {:?}", self.id, other);
                return None;
            }
        };

        let derived_metric = match &geometry {
            AnnotationGeometry::Polygon { .. } | AnnotationGeometry::Roi { .. } => d.area_m2,
            AnnotationGeometry::Measurement { .. } => d.distance_m,
            _ => None,
        };

        Some(Annotation {
            id: Some(self.id),
            local_key,
            image_id: self.image_id,
            geometry,
            color: d
                .color
                .as_deref()
                .and_then(ShapeColor::from_hex)
                .unwrap_or_default(),
            derived_label: d.label.clone(),
            derived_metric,
        })
    }
}

/// `POST annotations/` body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateAnnotation {
    pub image_id: i64,
    pub annotation_type: String,
    pub data: AnnotationData,
}

impl CreateAnnotation {
    pub fn from_annotation(annotation: &Annotation) -> Self {
        let mut data = AnnotationData {
            label: annotation.derived_label.clone(),
            color: Some(annotation.color.to_hex()),
            ..Default::default()
        };
        match &annotation.geometry {
            AnnotationGeometry::Point { at } => {
                data.x = Some(at.x);
                data.y = Some(at.y);
            }
            AnnotationGeometry::Polygon { vertices } | AnnotationGeometry::Roi { vertices } => {
                data.points = Some(vertices.iter().map(|p| p.to_array()).collect());
                data.area_m2 = annotation.derived_metric;
                if matches!(annotation.geometry, AnnotationGeometry::Roi { .. }) {
                    data.role = Some(ROI_ROLE.to_string());
                }
            }
            AnnotationGeometry::Measurement { start, end } => {
                data.start = Some((*start).into());
                data.end = Some((*end).into());
                data.distance_pixels = Some(start.distance_to(end));
                data.distance_m = annotation.derived_metric;
            }
            AnnotationGeometry::Circle { center, radius } => {
                data.center = Some((*center).into());
                data.radius = Some(*radius);
            }
            AnnotationGeometry::Rectangle { rect } => {
                data.x = Some(rect.min.x);
                data.y = Some(rect.min.y);
                data.width = Some(rect.width());
                data.height = Some(rect.height());
            }
        }
        Self {
            image_id: annotation.image_id,
            annotation_type: annotation.kind().wire_name().to_string(),
            data,
        }
    }

    pub fn with_perimeter(mut self, perimeter_m: Option<f64>) -> Self {
        self.data.perimeter_m = perimeter_m;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationListResponse {
    pub annotations: Vec<AnnotationRecord>,
    #[serde(default)]
    pub total: u64,
}

/// Scope of a server-side GeoJSON export
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportScope {
    Image(i64),
    Project(i64),
}

impl ExportScope {
    pub fn query(self) -> (&'static str, String) {
        match self {
            ExportScope::Image(id) => ("image_id", id.to_string()),
            ExportScope::Project(id) => ("project_id", id.to_string()),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// `POST images/{id}/analyze-roi` body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiAnalysisRequest {
    pub polygon: Vec<[f64; 2]>,
    pub analyses: Vec<AnalysisKind>,
}

impl RoiAnalysisRequest {
    pub fn new(vertices: &[ImagePoint], analyses: &[AnalysisKind]) -> Self {
        Self {
            polygon: vertices.iter().map(|p| p.to_array()).collect(),
            analyses: analyses.to_vec(),
        }
    }
}

/// Per-category ROI analysis results.
///
/// Each category value is backend-defined; a category that failed on its own
/// carries an `error` field instead of metrics. Responses wrapped in a
/// `results` object are unwrapped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RoiAnalysisResult {
    pub categories: BTreeMap<String, Value>,
}

impl From<Value> for RoiAnalysisResult {
    fn from(value: Value) -> Self {
        let body = match value {
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    map.insert("results".to_string(), other);
                    map
                }
                None => map,
            },
            _ => serde_json::Map::new(),
        };
        Self {
            categories: body.into_iter().collect(),
        }
    }
}

impl RoiAnalysisResult {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.categories.get(key)
    }

    /// Error message a category reported, if any
    pub fn error(&self, key: &str) -> Option<&str> {
        let value = self.categories.get(key)?.get("error")?;
        Some(value.as_str().unwrap_or("error"))
    }

    /// Whether a category is present and did not fail
    pub fn is_ok(&self, key: &str) -> bool {
        self.categories.contains_key(key) && self.error(key).is_none()
    }

    /// Requested analyses that came back without an error
    pub fn succeeded<'a>(&'a self, requested: &'a [AnalysisKind]) -> impl Iterator<Item = AnalysisKind> + 'a {
        requested.iter().copied().filter(|k| self.is_ok(k.key()))
    }

    /// Requested analyses that are missing or failed
    pub fn failed<'a>(&'a self, requested: &'a [AnalysisKind]) -> impl Iterator<Item = AnalysisKind> + 'a {
        requested.iter().copied().filter(|k| !self.is_ok(k.key()))
    }
}

/// `POST projects/{id}/analyze`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    #[serde(default)]
    pub analyses_started: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// `GET projects/{id}/analysis-summary`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub total_images: u32,
    #[serde(default)]
    pub analyzed_images: u32,
    #[serde(default)]
    pub pending_images: u32,
    #[serde(default)]
    pub vegetation_coverage_avg: f64,
    #[serde(default)]
    pub health_index_avg: f64,
    #[serde(default)]
    pub land_use_summary: BTreeMap<String, f64>,
    #[serde(default)]
    pub status: String,
}

impl AnalysisSummary {
    pub const COMPLETED: &'static str = "completed";

    /// At least one analyzed image and an overall completed status
    pub fn is_complete(&self) -> bool {
        self.analyzed_images >= 1 && self.status == Self::COMPLETED
    }
}
