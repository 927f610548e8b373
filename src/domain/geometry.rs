//! Frame-tagged geometric types
//!
//! Every point carries the coordinate frame it lives in as a type parameter,
//! so viewport, image-pixel and geographic values cannot be mixed by accident.
//! Conversions between frames live in [`crate::transform`].

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Marker trait for coordinate frames
pub trait Frame: Copy + Debug + Default + PartialEq + Send + Sync + 'static {}

/// Device pixels of the rendering surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport;

/// Pixel space of the source image at native resolution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImagePixel;

/// UTM easting/northing in meters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geographic;

impl Frame for Viewport {}

impl Frame for ImagePixel {}

impl Frame for Geographic {}

/// A 2D point in frame `F`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Point<F: Frame> {
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    frame: PhantomData<F>,
}

pub type ViewportPoint = Point<Viewport>;
pub type ImagePoint = Point<ImagePixel>;
pub type GeoPoint = Point<Geographic>;

impl<F: Frame> Point<F> {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            frame: PhantomData,
        }
    }

    /// Euclidean distance to another point in the same frame
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Translate by an offset expressed in this frame's units
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Whether two points coincide within `tolerance`
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl<F: Frame> From<[f64; 2]> for Point<F> {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }
}

impl Point<Geographic> {
    pub const fn from_utm(easting: f64, northing: f64) -> Self {
        Self::new(easting, northing)
    }

    pub fn easting(&self) -> f64 {
        self.x
    }

    pub fn northing(&self) -> f64 {
        self.y
    }
}

/// Image dimensions in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center(&self) -> ImagePoint {
        ImagePoint::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    pub fn contains(&self, p: &ImagePoint) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width as f64 && p.y < self.height as f64
    }
}

/// Axis-aligned rectangle in frame `F`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Rect<F: Frame> {
    pub min: Point<F>,
    pub max: Point<F>,
}

impl<F: Frame> Rect<F> {
    /// Create a rectangle from two arbitrary corners
    pub fn from_corners(a: Point<F>, b: Point<F>) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_corners(Point::new(x, y), Point::new(x + width, y + height))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point<F> {
        Point::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn contains(&self, p: &Point<F>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Grow the rectangle by `margin` on every side
    pub fn inflate(&self, margin: f64) -> Self {
        Self {
            min: self.min.offset(-margin, -margin),
            max: self.max.offset(margin, margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_from_corners_normalizes() {
        let r = Rect::<ImagePixel>::from_corners(ImagePoint::new(10.0, 2.0), ImagePoint::new(4.0, 8.0));
        assert_eq!(r.min, ImagePoint::new(4.0, 2.0));
        assert_eq!(r.max, ImagePoint::new(10.0, 8.0));
        assert_eq!(r.width(), 6.0);
        assert_eq!(r.height(), 6.0);
    }

    #[test]
    fn point_serializes_without_frame_tag() {
        let p = ImagePoint::new(1.5, 2.0);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":2.0}"#);
        let back: ImagePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
