//! Shared geometry constants and helpers for overlay rendering
//!
//! Stroke widths and marker sizes are in viewport pixels, so overlays keep a
//! constant on-screen weight at every zoom level.

/// User annotation constants
pub mod annotation {
    /// Outline stroke width
    pub const STROKE: f32 = 2.5;
    /// Dark border drawn under strokes for contrast on bright imagery
    pub const BORDER: f32 = 4.5;
    /// Radius of point markers
    pub const POINT_RADIUS: f32 = 6.0;
    /// Radius of vertex handles on open drafts
    pub const VERTEX_RADIUS: f32 = 3.5;
    /// Fill alpha for closed polygons
    pub const FILL_ALPHA: f32 = 0.3;
    /// Half length of the perpendicular ticks at measurement ends
    pub const MEASURE_TICK: f32 = 6.0;
    /// Dash pattern for the rubber band segment
    pub const RUBBER_BAND_DASH: [f32; 2] = [6.0, 4.0];
}

/// Region-of-interest polygon constants
pub mod roi {
    pub const STROKE: f32 = 3.0;
    pub const FILL_ALPHA: f32 = 0.18;
    pub const OPEN_DASH: [f32; 2] = [8.0, 5.0];
}

/// ML vector overlay constants
pub mod detection {
    /// Smallest on-screen radius of a tree marker
    pub const MIN_TREE_RADIUS: f32 = 2.0;
    /// Dash pattern for pest bounding rectangles
    pub const PEST_DASH: [f32; 2] = [5.0, 3.0];
    pub const PEST_STROKE: f32 = 2.0;
}

/// Heads-up elements (scale bar, grid, label backgrounds)
pub mod hud {
    /// Distance of the scale bar from the viewport's bottom-left corner
    pub const MARGIN: f32 = 16.0;
    pub const SCALE_BAR_HEIGHT: f32 = 6.0;
    pub const GRID_STROKE: f32 = 1.0;
    pub const GRID_ALPHA: u8 = 110;
    /// Approximate glyph advance used to size label backgrounds
    pub const LABEL_CHAR_WIDTH: f32 = 7.0;
    pub const LABEL_HEIGHT: f32 = 16.0;
    pub const LABEL_PADDING: f32 = 4.0;
}

/// Points perpendicular to the segment `a`-`b` at `at`, `half` pixels to each side
#[inline]
pub fn perpendicular_tick(
    ax: f32,
    ay: f32,
    bx: f32,
    by: f32,
    at_x: f32,
    at_y: f32,
    half: f32,
) -> Option<(f32, f32, f32, f32)> {
    let dx = bx - ax;
    let dy = by - ay;
    let len = (dx * dx + dy * dy).sqrt();
    if len < f32::EPSILON {
        return None;
    }
    let nx = -dy / len * half;
    let ny = dx / len * half;
    Some((at_x + nx, at_y + ny, at_x - nx, at_y - ny))
}

/// Estimated on-screen size of a label background
#[inline]
pub fn label_box(text: &str) -> (f32, f32) {
    let chars = text.chars().count() as f32;
    (
        chars * hud::LABEL_CHAR_WIDTH + 2.0 * hud::LABEL_PADDING,
        hud::LABEL_HEIGHT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_perpendicular_and_centered() {
        let (x1, y1, x2, y2) = perpendicular_tick(0.0, 0.0, 10.0, 0.0, 10.0, 0.0, 5.0).unwrap();
        assert_eq!((x1, x2), (10.0, 10.0));
        assert_eq!((y1, y2), (5.0, -5.0));
        assert!(perpendicular_tick(1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 5.0).is_none());
    }

    #[test]
    fn label_box_grows_with_text() {
        let (short, h) = label_box("1 m");
        let (long, _) = label_box("12.35 ha");
        assert!(long > short);
        assert_eq!(h, hud::LABEL_HEIGHT);
    }
}
