//! Coordinate transform stack
//!
//! Explicit conversions between the three frames an image viewer juggles:
//! viewport (device pixels), image pixels at native resolution, and UTM
//! easting/northing. All functions here are pure.

use crate::config::ZoomConvention;
use crate::domain::{GeoPoint, ImagePoint, ImageSize, UtmInfo, ViewportPoint};

/// Zoom limits for the factor-based viewer
pub const MIN_ZOOM_FACTOR: f64 = 0.05;
pub const MAX_ZOOM_FACTOR: f64 = 15.0;
/// Zoom limits for the percentage-based viewer
pub const MIN_ZOOM_PERCENT: f64 = 25.0;
pub const MAX_ZOOM_PERCENT: f64 = 300.0;

/// Affine image-to-viewport mapping: `screen = image * zoom + pan`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    zoom: f64,
    pan: ViewportPoint,
    convention: ZoomConvention,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity(ZoomConvention::Factor)
    }
}

impl ViewTransform {
    pub fn identity(convention: ZoomConvention) -> Self {
        Self {
            zoom: 1.0,
            pan: ViewportPoint::new(0.0, 0.0),
            convention,
        }
    }

    /// Build a transform, clamping the zoom factor to the convention's bounds
    pub fn new(zoom: f64, pan: ViewportPoint, convention: ZoomConvention) -> Self {
        Self {
            zoom: clamp_zoom(zoom, convention),
            pan,
            convention,
        }
    }

    /// Fit `image` inside `viewport`, centered
    pub fn fit(image: ImageSize, viewport: ImageSize, convention: ZoomConvention) -> Self {
        if image.is_empty() || viewport.is_empty() {
            return Self::identity(convention);
        }
        let zoom = clamp_zoom(
            (viewport.width as f64 / image.width as f64)
                .min(viewport.height as f64 / image.height as f64),
            convention,
        );
        let pan = ViewportPoint::new(
            (viewport.width as f64 - image.width as f64 * zoom) / 2.0,
            (viewport.height as f64 - image.height as f64 * zoom) / 2.0,
        );
        Self {
            zoom,
            pan,
            convention,
        }
    }

    /// Screen pixels per image pixel
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Zoom expressed as a percentage (100% = native resolution)
    pub fn zoom_percent(&self) -> f64 {
        self.zoom * 100.0
    }

    pub fn pan(&self) -> ViewportPoint {
        self.pan
    }

    pub fn convention(&self) -> ZoomConvention {
        self.convention
    }

    /// Move the image by a viewport delta
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan = self.pan.offset(dx, dy);
    }

    /// Change zoom keeping the image point under `cursor` fixed.
    ///
    /// `new_pan = cursor - (cursor - old_pan) * (new_zoom / old_zoom)`
    pub fn zoom_at(&mut self, cursor: ViewportPoint, requested_zoom: f64) {
        let new_zoom = clamp_zoom(requested_zoom, self.convention);
        let ratio = new_zoom / self.zoom;
        self.pan = ViewportPoint::new(
            cursor.x - (cursor.x - self.pan.x) * ratio,
            cursor.y - (cursor.y - self.pan.y) * ratio,
        );
        self.zoom = new_zoom;
    }

    /// Multiply the zoom by `factor` about `cursor` (wheel and +/- keys)
    pub fn zoom_by(&mut self, cursor: ViewportPoint, factor: f64) {
        self.zoom_at(cursor, self.zoom * factor);
    }

    /// tiny-skia transform mapping image pixels onto the viewport
    pub fn to_skia(&self) -> tiny_skia::Transform {
        tiny_skia::Transform::from_row(
            self.zoom as f32,
            0.0,
            0.0,
            self.zoom as f32,
            self.pan.x as f32,
            self.pan.y as f32,
        )
    }
}

/// Clamp a zoom factor to the bounds of the given convention
pub fn clamp_zoom(zoom: f64, convention: ZoomConvention) -> f64 {
    if !zoom.is_finite() || zoom <= 0.0 {
        return 1.0;
    }
    match convention {
        ZoomConvention::Factor => zoom.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR),
        ZoomConvention::Percent => {
            (zoom * 100.0).clamp(MIN_ZOOM_PERCENT, MAX_ZOOM_PERCENT) / 100.0
        }
    }
}

/// Viewport point to image pixels
pub fn to_image(screen: ViewportPoint, view: &ViewTransform) -> ImagePoint {
    ImagePoint::new(
        (screen.x - view.pan.x) / view.zoom,
        (screen.y - view.pan.y) / view.zoom,
    )
}

/// Image pixels to viewport point
pub fn to_screen(image: ImagePoint, view: &ViewTransform) -> ViewportPoint {
    ViewportPoint::new(
        image.x * view.zoom + view.pan.x,
        image.y * view.zoom + view.pan.y,
    )
}

/// Image pixels to UTM easting/northing.
///
/// Interpolates linearly between the footprint corners; `None` when the
/// image has no GPS fix or no corners.
pub fn to_geographic(image: ImagePoint, utm: &UtmInfo, size: ImageSize) -> Option<GeoPoint> {
    if !utm.has_gps || size.is_empty() {
        return None;
    }
    let corners = utm.corners.as_ref()?;
    let u = image.x / size.width as f64;
    let v = image.y / size.height as f64;
    let tl = corners.top_left;
    let br = corners.bottom_right;
    Some(GeoPoint::from_utm(
        tl.easting() + u * (br.easting() - tl.easting()),
        tl.northing() + v * (br.northing() - tl.northing()),
    ))
}

/// Inverse of [`to_geographic`], used to place grid lines
pub fn from_geographic(geo: GeoPoint, utm: &UtmInfo, size: ImageSize) -> Option<ImagePoint> {
    if !utm.has_gps || size.is_empty() {
        return None;
    }
    let corners = utm.corners.as_ref()?;
    let tl = corners.top_left;
    let br = corners.bottom_right;
    let span_e = br.easting() - tl.easting();
    let span_n = br.northing() - tl.northing();
    if span_e == 0.0 || span_n == 0.0 {
        return None;
    }
    Some(ImagePoint::new(
        (geo.easting() - tl.easting()) / span_e * size.width as f64,
        (geo.northing() - tl.northing()) / span_n * size.height as f64,
    ))
}
