//! Per-image metadata: ground sampling distance and UTM georeference

use serde::{Deserialize, Serialize};

use super::geometry::{GeoPoint, ImageSize};

/// Real-world size of one image pixel
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundSampleDistance {
    pub meters_per_pixel: f64,
    /// True when the value was guessed rather than derived from camera or GPS metadata.
    /// Every real-world value derived from an estimated GSD must be shown as approximate.
    pub is_estimated: bool,
}

impl GroundSampleDistance {
    pub const fn measured(meters_per_pixel: f64) -> Self {
        Self {
            meters_per_pixel,
            is_estimated: false,
        }
    }

    pub const fn estimated(meters_per_pixel: f64) -> Self {
        Self {
            meters_per_pixel,
            is_estimated: true,
        }
    }

    /// Pixel distance to meters
    pub fn meters(&self, pixels: f64) -> f64 {
        pixels * self.meters_per_pixel
    }

    /// Pixel area to square meters
    pub fn square_meters(&self, pixel_area: f64) -> f64 {
        pixel_area * self.meters_per_pixel * self.meters_per_pixel
    }

    pub fn centimeters_per_pixel(&self) -> f64 {
        self.meters_per_pixel * 100.0
    }
}

/// Top-left / bottom-right UTM corners of an image footprint
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtmCorners {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

/// UTM georeference of an image; only present in full when the image carries GPS metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmInfo {
    pub has_gps: bool,
    pub zone: Option<String>,
    pub center_point: Option<GeoPoint>,
    pub corners: Option<UtmCorners>,
}

impl UtmInfo {
    pub fn without_gps() -> Self {
        Self::default()
    }

    /// Derive the footprint corners from the UTM center, image size and GSD.
    ///
    /// Northing grows upwards, so the top-left corner has the larger northing.
    pub fn from_center(
        zone: impl Into<String>,
        center: GeoPoint,
        size: ImageSize,
        gsd: GroundSampleDistance,
    ) -> Self {
        let half_w = size.width as f64 / 2.0 * gsd.meters_per_pixel;
        let half_h = size.height as f64 / 2.0 * gsd.meters_per_pixel;
        Self {
            has_gps: true,
            zone: Some(zone.into()),
            center_point: Some(center),
            corners: Some(UtmCorners {
                top_left: GeoPoint::from_utm(center.easting() - half_w, center.northing() + half_h),
                bottom_right: GeoPoint::from_utm(
                    center.easting() + half_w,
                    center.northing() - half_h,
                ),
            }),
        }
    }

    /// Short "zone E N" readout of the center point
    pub fn center_readout(&self) -> Option<String> {
        if !self.has_gps {
            return None;
        }
        let center = self.center_point.as_ref()?;
        let zone = self.zone.as_deref().unwrap_or("?");
        Some(format!(
            "{zone} {:.1}E {:.1}N",
            center.easting(),
            center.northing()
        ))
    }
}

/// Image record as listed by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: i64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

impl ImageInfo {
    pub fn size(&self) -> Option<ImageSize> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(ImageSize::new(w, h)),
            _ => None,
        }
    }

    pub fn gps_center(&self) -> Option<(f64, f64)> {
        Some((self.center_lat?, self.center_lon?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_from_center_follow_northing_up() {
        let info = UtmInfo::from_center(
            "23S",
            GeoPoint::from_utm(500_000.0, 7_000_000.0),
            ImageSize::new(1000, 500),
            GroundSampleDistance::measured(0.1),
        );
        let corners = info.corners.unwrap();
        assert_eq!(corners.top_left, GeoPoint::from_utm(499_950.0, 7_000_025.0));
        assert_eq!(corners.bottom_right, GeoPoint::from_utm(500_050.0, 6_999_975.0));
        assert_eq!(
            info.center_readout().as_deref(),
            Some("23S 500000.0E 7000000.0N")
        );
    }

    #[test]
    fn gsd_scales_area_by_square() {
        let gsd = GroundSampleDistance::measured(0.03);
        assert!((gsd.square_meters(50_000.0) - 45.0).abs() < 1e-9);
        assert!((gsd.meters(100.0) - 3.0).abs() < 1e-12);
    }
}
