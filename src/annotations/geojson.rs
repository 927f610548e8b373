//! GeoJSON FeatureCollection built from in-memory annotations
//!
//! Images with a GPS center export lon/lat; anything else exports raw pixel
//! coordinates under the `image-pixel` CRS.

use serde_json::{Value, json};

use crate::domain::{Annotation, AnnotationGeometry, GroundSampleDistance, ImageInfo, ImagePoint};

pub const CRS_LON_LAT: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";
pub const CRS_IMAGE_PIXEL: &str = "image-pixel";

/// Meters per degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Pixel to `(lat, lon)` using the image center and GSD.
///
/// Pixel y grows downward, so it is negated before becoming a latitude offset.
pub fn pixel_to_latlon(
    p: &ImagePoint,
    center_lat: f64,
    center_lon: f64,
    width: u32,
    height: u32,
    gsd: &GroundSampleDistance,
) -> (f64, f64) {
    let dx_m = (p.x - width as f64 / 2.0) * gsd.meters_per_pixel;
    let dy_m = -(p.y - height as f64 / 2.0) * gsd.meters_per_pixel;
    let dlat = dy_m / METERS_PER_DEGREE;
    let dlon = dx_m / (METERS_PER_DEGREE * center_lat.to_radians().cos());
    (center_lat + dlat, center_lon + dlon)
}

struct Georef {
    lat: f64,
    lon: f64,
    width: u32,
    height: u32,
    gsd: GroundSampleDistance,
}

impl Georef {
    fn from_image(image: &ImageInfo, gsd: &GroundSampleDistance) -> Option<Self> {
        let (lat, lon) = image.gps_center()?;
        let size = image.size()?;
        if size.is_empty() {
            return None;
        }
        Some(Self {
            lat,
            lon,
            width: size.width,
            height: size.height,
            gsd: *gsd,
        })
    }
}

fn coord(p: &ImagePoint, georef: Option<&Georef>) -> Value {
    match georef {
        Some(g) => {
            let (lat, lon) = pixel_to_latlon(p, g.lat, g.lon, g.width, g.height, &g.gsd);
            json!([lon, lat])
        }
        None => json!([p.x, p.y]),
    }
}

fn closed_ring(vertices: &[ImagePoint], georef: Option<&Georef>) -> Value {
    let mut ring: Vec<Value> = vertices.iter().map(|p| coord(p, georef)).collect();
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    Value::Array(ring)
}

fn feature(annotation: &Annotation, georef: Option<&Georef>) -> Option<Value> {
    let mut properties = json!({
        "annotation_id": annotation.id,
        "type": annotation.kind().wire_name(),
        "label": annotation.derived_label,
        "color": annotation.color.to_hex(),
        "image_id": annotation.image_id,
    });

    let geometry = match &annotation.geometry {
        AnnotationGeometry::Point { at } => json!({"type": "Point", "coordinates": coord(at, georef)}),
        AnnotationGeometry::Polygon { vertices } | AnnotationGeometry::Roi { vertices } => {
            if vertices.len() < 3 {
                return None;
            }
            properties["area_m2"] = json!(annotation.derived_metric);
            if matches!(annotation.geometry, AnnotationGeometry::Roi { .. }) {
                properties["role"] = json!("roi");
            }
            json!({"type": "Polygon", "coordinates": [closed_ring(vertices, georef)]})
        }
        AnnotationGeometry::Measurement { start, end } => {
            properties["distance_m"] = json!(annotation.derived_metric);
            json!({
                "type": "LineString",
                "coordinates": [coord(start, georef), coord(end, georef)],
            })
        }
        AnnotationGeometry::Circle { center, radius } => {
            properties["radius_pixels"] = json!(radius);
            json!({"type": "Point", "coordinates": coord(center, georef)})
        }
        AnnotationGeometry::Rectangle { rect } => {
            if rect.width() <= 0.0 || rect.height() <= 0.0 {
                return None;
            }
            let corners = [
                rect.min,
                ImagePoint::new(rect.max.x, rect.min.y),
                rect.max,
                ImagePoint::new(rect.min.x, rect.max.y),
            ];
            json!({"type": "Polygon", "coordinates": [closed_ring(&corners, georef)]})
        }
    };

    Some(json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    }))
}

/// Build a FeatureCollection from the annotations of one image.
///
/// Drafts without a server id are included with a null `annotation_id`.
pub fn export_local(
    annotations: &[Annotation],
    image: &ImageInfo,
    gsd: &GroundSampleDistance,
) -> Value {
    let georef = Georef::from_image(image, gsd);
    let crs = if georef.is_some() {
        CRS_LON_LAT
    } else {
        CRS_IMAGE_PIXEL
    };
    let features: Vec<Value> = annotations
        .iter()
        .filter(|a| a.image_id == image.id)
        .filter_map(|a| feature(a, georef.as_ref()))
        .collect();
    log::debug!(
        "Exported {} of {} annotations for image {} ({})",
        features.len(),
        annotations.len(),
        image.id,
        crs
    );
    json!({
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": crs}},
        "features": features,
    })
}
