//! Geometry and measurement engine
//!
//! Polygon area/perimeter, distances, real-world unit formatting and "nice"
//! tick selection for scale bars and coordinate grids. Every function is total:
//! degenerate input yields zero or `None`, never a panic.

use crate::domain::{Frame, GroundSampleDistance, ImagePoint, Point};

/// Square meters per hectare; areas at or above this render in hectares
pub const M2_PER_HECTARE: f64 = 10_000.0;
/// Distances at or above this render in kilometers
pub const M_PER_KM: f64 = 1_000.0;

/// Target on-screen length of a scale bar, in viewport pixels
pub const SCALE_BAR_MIN_PX: f64 = 80.0;
pub const SCALE_BAR_MAX_PX: f64 = 200.0;

/// Mantissas of the canonical scale-bar sequence, repeated per power of ten
const SCALE_BAR_STEPS: [f64; 3] = [1.0, 2.0, 5.0];

// ============================================================================
// Polygon math
// ============================================================================

/// Signed shoelace area; positive for counterclockwise order in a y-up frame
pub fn signed_area<F: Frame>(vertices: &[Point<F>]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = &vertices[i];
            let b = &vertices[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

/// Unsigned polygon area in the frame's square units. Fewer than 3 vertices yields 0.
pub fn polygon_area<F: Frame>(vertices: &[Point<F>]) -> f64 {
    signed_area(vertices).abs()
}

/// Closed-ring perimeter in the frame's units
pub fn polygon_perimeter<F: Frame>(vertices: &[Point<F>]) -> f64 {
    if vertices.len() < 2 {
        return 0.0;
    }
    let n = vertices.len();
    (0..n)
        .map(|i| vertices[i].distance_to(&vertices[(i + 1) % n]))
        .sum()
}

/// Polygon area in square meters
pub fn polygon_area_m2(vertices: &[ImagePoint], gsd: &GroundSampleDistance) -> f64 {
    gsd.square_meters(polygon_area(vertices))
}

/// Polygon perimeter in meters
pub fn polygon_perimeter_m(vertices: &[ImagePoint], gsd: &GroundSampleDistance) -> f64 {
    gsd.meters(polygon_perimeter(vertices))
}

/// Distance between two image points in meters
pub fn distance_m(a: &ImagePoint, b: &ImagePoint, gsd: &GroundSampleDistance) -> f64 {
    gsd.meters(a.distance_to(b))
}

/// Arithmetic mean of the vertices.
///
/// Good enough for label anchoring; for non-convex shapes the result can fall
/// outside the polygon.
pub fn centroid<F: Frame>(vertices: &[Point<F>]) -> Option<Point<F>> {
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Ray-casting point-in-polygon test
pub fn contains_point<F: Frame>(vertices: &[Point<F>], p: &Point<F>) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = &vertices[i];
        let vj = &vertices[j];
        if (vi.y > p.y) != (vj.y > p.y)
            && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Shortest distance from `p` to the segment `a`-`b`
pub fn distance_to_segment<F: Frame>(p: &Point<F>, a: &Point<F>, b: &Point<F>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

// ============================================================================
// Unit formatting
// ============================================================================

/// `"9999.0 m²"` below one hectare, `"1.00 ha"` from one hectare up
pub fn format_area(square_meters: f64) -> String {
    if square_meters >= M2_PER_HECTARE {
        format!("{:.2} ha", square_meters / M2_PER_HECTARE)
    } else {
        format!("{:.1} m²", square_meters)
    }
}

/// `"999.00 m"` below one kilometer, `"1.00 km"` from one kilometer up
pub fn format_distance(meters: f64) -> String {
    if meters >= M_PER_KM {
        format!("{:.2} km", meters / M_PER_KM)
    } else {
        format!("{:.2} m", meters)
    }
}

/// Prefix a derived label with `~` when the GSD is estimated
pub fn flag_estimate(label: String, gsd: &GroundSampleDistance) -> String {
    if gsd.is_estimated {
        format!("~{label}")
    } else {
        label
    }
}

// ============================================================================
// Tick selection
// ============================================================================

/// A chosen scale-bar length
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBar {
    pub meters: f64,
    pub screen_px: f64,
}

impl ScaleBar {
    pub fn label(&self) -> String {
        format_distance(self.meters)
    }
}

/// Canonical scale-bar sequence: 0.5, 1, 2, 5, 10, 20, 50, ... up to 5000 km
pub fn scale_bar_candidates() -> impl Iterator<Item = f64> {
    std::iter::once(0.5).chain(
        (0..7).flat_map(|exp| SCALE_BAR_STEPS.iter().map(move |m| m * 10f64.powi(exp))),
    )
}

/// Pick the scale-bar length for the current GSD and zoom factor.
///
/// Takes the smallest candidate whose on-screen length reaches
/// [`SCALE_BAR_MIN_PX`]; because the sequence is increasing this is also the
/// smallest candidate inside `[SCALE_BAR_MIN_PX, SCALE_BAR_MAX_PX]` whenever one
/// exists. Falls back to the largest candidate.
pub fn pick_scale_bar(meters_per_pixel: f64, zoom: f64) -> Option<ScaleBar> {
    if meters_per_pixel <= 0.0 || zoom <= 0.0 || !meters_per_pixel.is_finite() {
        return None;
    }
    let px_per_meter = zoom / meters_per_pixel;
    let mut last = None;
    for meters in scale_bar_candidates() {
        let bar = ScaleBar {
            meters,
            screen_px: meters * px_per_meter,
        };
        if bar.screen_px >= SCALE_BAR_MIN_PX {
            return Some(bar);
        }
        last = Some(bar);
    }
    last
}

/// Grid spacing for a visible coordinate range: `range / 4` rounded to 1, 2, 5 or 10
/// times a power of ten
pub fn nice_grid_spacing(range: f64) -> f64 {
    let raw = range.abs() / 4.0;
    if raw == 0.0 || !raw.is_finite() {
        return 0.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized < 1.5 {
        1.0
    } else if normalized < 3.0 {
        2.0
    } else if normalized < 7.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImagePixel, Viewport, ViewportPoint};
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<ImagePoint> {
        vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(10.0, 0.0),
            ImagePoint::new(10.0, 10.0),
            ImagePoint::new(0.0, 10.0),
        ]
    }

    #[test]
    fn shoelace_square_either_orientation() {
        let gsd = GroundSampleDistance::measured(1.0);
        let mut pts = square();
        assert_abs_diff_eq!(polygon_area_m2(&pts, &gsd), 100.0);
        let forward = signed_area(&pts);
        pts.reverse();
        assert_abs_diff_eq!(polygon_area_m2(&pts, &gsd), 100.0);
        assert_abs_diff_eq!(signed_area(&pts), -forward);
    }

    #[test]
    fn degenerate_polygons_have_zero_area() {
        let two = [ImagePoint::new(0.0, 0.0), ImagePoint::new(5.0, 5.0)];
        assert_eq!(polygon_area(&two), 0.0);
        assert_eq!(polygon_area::<ImagePixel>(&[]), 0.0);
        let collinear = [
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(1.0, 1.0),
            ImagePoint::new(2.0, 2.0),
        ];
        assert_eq!(polygon_area(&collinear), 0.0);
    }

    #[test]
    fn area_scales_with_gsd_squared() {
        let gsd = GroundSampleDistance::measured(0.03);
        // 250 x 200 px = 50,000 px²
        let pts = [
            ImagePoint::new(100.0, 100.0),
            ImagePoint::new(350.0, 100.0),
            ImagePoint::new(350.0, 300.0),
            ImagePoint::new(100.0, 300.0),
        ];
        let area = polygon_area_m2(&pts, &gsd);
        assert_abs_diff_eq!(area, 45.0, epsilon = 1e-9);
        assert_eq!(format_area(area), "45.0 m²");
    }

    #[test]
    fn perimeter_closes_ring() {
        assert_abs_diff_eq!(polygon_perimeter(&square()), 40.0);
        let gsd = GroundSampleDistance::measured(0.5);
        assert_abs_diff_eq!(polygon_perimeter_m(&square(), &gsd), 20.0);
    }

    #[test]
    fn distance_uses_gsd() {
        let gsd = GroundSampleDistance::measured(0.05);
        let d = distance_m(&ImagePoint::new(0.0, 0.0), &ImagePoint::new(30.0, 40.0), &gsd);
        assert_abs_diff_eq!(d, 2.5);
    }

    #[test]
    fn area_formatting_boundary() {
        assert_eq!(format_area(9999.0), "9999.0 m²");
        assert_eq!(format_area(10_000.0), "1.00 ha");
        assert_eq!(format_area(123_456.0), "12.35 ha");
    }

    #[test]
    fn distance_formatting_boundary() {
        assert_eq!(format_distance(999.0), "999.00 m");
        assert_eq!(format_distance(1000.0), "1.00 km");
        assert_eq!(format_distance(0.5), "0.50 m");
    }

    #[test]
    fn estimated_gsd_flags_labels() {
        let label = format_area(45.0);
        assert_eq!(
            flag_estimate(label.clone(), &GroundSampleDistance::estimated(0.03)),
            "~45.0 m²"
        );
        assert_eq!(
            flag_estimate(label, &GroundSampleDistance::measured(0.03)),
            "45.0 m²"
        );
    }

    #[test]
    fn scale_bar_lands_in_band() {
        // 0.05 m/px at 100% zoom: 20 px per meter, so 5 m = 100 px
        let bar = pick_scale_bar(0.05, 1.0).unwrap();
        assert_eq!(bar.meters, 5.0);
        assert!(bar.screen_px >= SCALE_BAR_MIN_PX && bar.screen_px <= SCALE_BAR_MAX_PX);
        assert_eq!(bar.label(), "5.00 m");
    }

    #[test]
    fn scale_bar_takes_smallest_over_lower_bound_when_band_missed() {
        // 41 px per meter: 2 m = 82 px fits, 1 m = 41 px does not
        let bar = pick_scale_bar(1.0 / 41.0, 1.0).unwrap();
        assert_eq!(bar.meters, 2.0);

        // 300 px per meter: 0.5 m = 150 px, the first candidate already fits
        let bar = pick_scale_bar(1.0, 300.0).unwrap();
        assert_eq!(bar.meters, 0.5);

        // 1000 px per meter: nothing fits the band; 0.5 m = 500 px is the smallest over 80
        let bar = pick_scale_bar(0.001, 1.0).unwrap();
        assert_eq!(bar.meters, 0.5);
        assert!(bar.screen_px > SCALE_BAR_MAX_PX);
    }

    #[test]
    fn scale_bar_candidates_are_increasing() {
        let c: Vec<f64> = scale_bar_candidates().collect();
        assert_eq!(&c[..8], &[0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]);
        assert!(c.windows(2).all(|w| w[0] < w[1]));
        assert!(pick_scale_bar(0.0, 1.0).is_none());
    }

    #[test]
    fn grid_spacing_rounds_leading_digit() {
        assert_abs_diff_eq!(nice_grid_spacing(400.0), 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(nice_grid_spacing(900.0), 200.0, epsilon = 1e-12);
        assert_abs_diff_eq!(nice_grid_spacing(1800.0), 500.0, epsilon = 1e-12);
        assert_abs_diff_eq!(nice_grid_spacing(3500.0), 1000.0, epsilon = 1e-12);
        assert_abs_diff_eq!(nice_grid_spacing(2.0), 0.5, epsilon = 1e-12);
        assert_eq!(nice_grid_spacing(0.0), 0.0);
    }

    #[test]
    fn centroid_is_vertex_mean() {
        let c = centroid(&square()).unwrap();
        assert_eq!(c, ImagePoint::new(5.0, 5.0));
        assert!(centroid::<Viewport>(&[]).is_none());
    }

    #[test]
    fn hit_testing_helpers() {
        let sq = square();
        assert!(contains_point(&sq, &ImagePoint::new(5.0, 5.0)));
        assert!(!contains_point(&sq, &ImagePoint::new(15.0, 5.0)));
        let a = ViewportPoint::new(0.0, 0.0);
        let b = ViewportPoint::new(10.0, 0.0);
        assert_abs_diff_eq!(distance_to_segment(&ViewportPoint::new(5.0, 3.0), &a, &b), 3.0);
        assert_abs_diff_eq!(distance_to_segment(&ViewportPoint::new(-4.0, 3.0), &a, &b), 5.0);
        assert_abs_diff_eq!(distance_to_segment(&ViewportPoint::new(1.0, 1.0), &a, &a), 2f64.sqrt());
    }
}
