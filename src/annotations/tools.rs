//! Drawing tools and the in-progress shape state machine
//!
//! Pointer input arrives in viewport coordinates and is converted to image
//! pixels before it is stored, so drafts stay anchored to the image while the
//! view pans or zooms.

use crate::domain::{Annotation, AnnotationGeometry, ImagePoint, ViewportPoint};
use crate::measure;
use crate::transform::{self, ViewTransform};

/// Two clicks closer than this many viewport pixels are the same click
pub const DUPLICATE_CLICK_TOLERANCE_PX: f64 = 2.0;

/// Hit radius of the eraser in viewport pixels
pub const ERASER_TOLERANCE_PX: f64 = 8.0;

/// Minimum vertex count for a closed ring
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Active editing tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tool {
    #[default]
    Select,
    Point,
    Polygon,
    Measurement,
    Roi,
    Eraser,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Point => "point",
            Tool::Polygon => "polygon",
            Tool::Measurement => "measurement",
            Tool::Roi => "roi",
            Tool::Eraser => "eraser",
        }
    }
}

/// Pointer input delivered to the drawing state machine
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Click(ViewportPoint),
    /// Sent after the two clicks that make it up
    DoubleClick(ViewportPoint),
    Move(ViewportPoint),
}

/// A shape under construction, in image pixels
#[derive(Clone, Debug, PartialEq)]
pub enum Draft {
    Ring {
        vertices: Vec<ImagePoint>,
        roi: bool,
    },
    Measurement {
        start: ImagePoint,
    },
}

/// A completed shape handed over to annotation persistence
#[derive(Clone, Debug, PartialEq)]
pub enum FinishedShape {
    Point(ImagePoint),
    Polygon(Vec<ImagePoint>),
    Measurement { start: ImagePoint, end: ImagePoint },
    Roi(Vec<ImagePoint>),
}

impl FinishedShape {
    pub fn into_geometry(self) -> AnnotationGeometry {
        match self {
            FinishedShape::Point(at) => AnnotationGeometry::Point { at },
            FinishedShape::Polygon(vertices) => AnnotationGeometry::Polygon { vertices },
            FinishedShape::Measurement { start, end } => {
                AnnotationGeometry::Measurement { start, end }
            }
            FinishedShape::Roi(vertices) => AnnotationGeometry::Roi { vertices },
        }
    }
}

/// What a pointer or key event did to the drawing state.
///
/// Invalid gestures, such as closing a ring with fewer than three vertices,
/// are `Ignored` and leave the draft untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOutcome {
    Ignored,
    /// First vertex or measurement start placed
    Started,
    VertexAdded(usize),
    /// Rubber band cursor moved
    Tracking,
    Finished(FinishedShape),
    Cancelled,
    /// Eraser click at an image position; the caller resolves the hit
    EraseAt(ImagePoint),
}

/// Drawing state machine: `Idle -> Drafting -> Finished -> Idle`
#[derive(Clone, Debug, Default)]
pub struct DrawingState {
    tool: Tool,
    draft: Option<Draft>,
    cursor: Option<ImagePoint>,
}

impl DrawingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// Last pointer position while a draft is open
    pub fn cursor(&self) -> Option<ImagePoint> {
        self.cursor
    }

    /// Whether a drawing tool is in the middle of a gesture.
    ///
    /// Pan and zoom are blocked while this is true.
    pub fn is_mid_gesture(&self) -> bool {
        self.tool != Tool::Select && self.draft.is_some()
    }

    /// Switch tools; any in-progress draft is discarded
    pub fn set_tool(&mut self, tool: Tool) {
        if self.draft.is_some() && tool != self.tool {
            log::debug!("Discarding {} draft on tool switch", self.tool.name());
        }
        if tool != self.tool {
            self.reset();
        }
        self.tool = tool;
    }

    /// Abandon the in-progress draft (Escape)
    pub fn cancel(&mut self) -> DrawOutcome {
        if self.draft.is_none() {
            return DrawOutcome::Ignored;
        }
        self.reset();
        DrawOutcome::Cancelled
    }

    fn reset(&mut self) {
        self.draft = None;
        self.cursor = None;
    }

    pub fn handle_pointer(&mut self, event: PointerEvent, view: &ViewTransform) -> DrawOutcome {
        match event {
            PointerEvent::Click(at) => self.click(transform::to_image(at, view)),
            PointerEvent::DoubleClick(at) => {
                let tolerance = DUPLICATE_CLICK_TOLERANCE_PX / view.zoom();
                self.double_click(transform::to_image(at, view), tolerance)
            }
            PointerEvent::Move(at) => {
                if self.draft.is_none() {
                    return DrawOutcome::Ignored;
                }
                self.cursor = Some(transform::to_image(at, view));
                DrawOutcome::Tracking
            }
        }
    }

    fn click(&mut self, at: ImagePoint) -> DrawOutcome {
        match self.tool {
            Tool::Select => DrawOutcome::Ignored,
            Tool::Eraser => DrawOutcome::EraseAt(at),
            Tool::Point => DrawOutcome::Finished(FinishedShape::Point(at)),
            Tool::Measurement => match self.draft.take() {
                Some(Draft::Measurement { start }) => {
                    self.reset();
                    DrawOutcome::Finished(FinishedShape::Measurement { start, end: at })
                }
                _ => {
                    self.draft = Some(Draft::Measurement { start: at });
                    self.cursor = Some(at);
                    DrawOutcome::Started
                }
            },
            Tool::Polygon | Tool::Roi => match &mut self.draft {
                Some(Draft::Ring { vertices, .. }) => {
                    vertices.push(at);
                    DrawOutcome::VertexAdded(vertices.len())
                }
                _ => {
                    self.draft = Some(Draft::Ring {
                        vertices: vec![at],
                        roi: self.tool == Tool::Roi,
                    });
                    self.cursor = Some(at);
                    DrawOutcome::Started
                }
            },
        }
    }

    fn double_click(&mut self, at: ImagePoint, tolerance: f64) -> DrawOutcome {
        let Some(Draft::Ring { vertices, roi }) = &mut self.draft else {
            return DrawOutcome::Ignored;
        };

        // The second click of the double-click already appended this point
        if vertices.len() >= 2 {
            let last = vertices[vertices.len() - 1];
            let prev = vertices[vertices.len() - 2];
            if last.approx_eq(&prev, tolerance) && last.approx_eq(&at, tolerance) {
                vertices.pop();
            }
        }

        if vertices.len() < MIN_POLYGON_VERTICES {
            log::debug!(
                "Ignoring double-click on ring with {} vertices",
                vertices.len()
            );
            return DrawOutcome::Ignored;
        }
        if measure::polygon_area(vertices) <= 0.0 {
            log::debug!("Ignoring double-click on a ring without area");
            return DrawOutcome::Ignored;
        }

        let vertices = std::mem::take(vertices);
        let shape = if *roi {
            FinishedShape::Roi(vertices)
        } else {
            FinishedShape::Polygon(vertices)
        };
        self.reset();
        DrawOutcome::Finished(shape)
    }
}

// ============================================================================
// Eraser hit testing
// ============================================================================

/// Server id of the topmost persisted annotation under `at`.
///
/// Drafts still awaiting the store are skipped, so the eraser can never act
/// on a shape that has no id yet.
pub fn pick_annotation(annotations: &[Annotation], at: &ImagePoint, tolerance: f64) -> Option<i64> {
    annotations
        .iter()
        .rev()
        .filter(|a| !a.is_new())
        .find(|a| hits(&a.geometry, at, tolerance))
        .and_then(|a| a.id)
}

fn hits(geometry: &AnnotationGeometry, at: &ImagePoint, tolerance: f64) -> bool {
    match geometry {
        AnnotationGeometry::Point { at: p } => p.distance_to(at) <= tolerance,
        AnnotationGeometry::Polygon { vertices } | AnnotationGeometry::Roi { vertices } => {
            measure::contains_point(vertices, at)
                || ring_edges(vertices).any(|(a, b)| measure::distance_to_segment(at, a, b) <= tolerance)
        }
        AnnotationGeometry::Measurement { start, end } => {
            measure::distance_to_segment(at, start, end) <= tolerance
        }
        AnnotationGeometry::Circle { center, radius } => center.distance_to(at) <= radius + tolerance,
        AnnotationGeometry::Rectangle { rect } => rect.inflate(tolerance).contains(at),
    }
}

fn ring_edges(vertices: &[ImagePoint]) -> impl Iterator<Item = (&ImagePoint, &ImagePoint)> {
    let n = vertices.len();
    (0..n).map(move |i| (&vertices[i], &vertices[(i + 1) % n]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ShapeColor, ZoomConvention};

    fn view() -> ViewTransform {
        ViewTransform::identity(ZoomConvention::Factor)
    }

    fn click(state: &mut DrawingState, x: f64, y: f64) -> DrawOutcome {
        state.handle_pointer(PointerEvent::Click(ViewportPoint::new(x, y)), &view())
    }

    fn double_click(state: &mut DrawingState, x: f64, y: f64) -> DrawOutcome {
        click(state, x, y);
        click(state, x, y);
        state.handle_pointer(PointerEvent::DoubleClick(ViewportPoint::new(x, y)), &view())
    }

    #[test]
    fn polygon_closes_on_double_click_without_duplicate() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Polygon);
        assert_eq!(click(&mut state, 0.0, 0.0), DrawOutcome::Started);
        assert_eq!(click(&mut state, 10.0, 0.0), DrawOutcome::VertexAdded(2));
        click(&mut state, 10.0, 10.0);

        let outcome = double_click(&mut state, 0.0, 10.0);
        let DrawOutcome::Finished(FinishedShape::Polygon(vertices)) = outcome else {
            panic!("expected finished polygon, got {outcome:?}");
        };
        assert_eq!(vertices.len(), 4);
        assert!(state.draft().is_none());
    }

    #[test]
    fn collinear_ring_keeps_draft_open() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Roi);
        click(&mut state, 0.0, 0.0);
        click(&mut state, 100.0, 0.0);
        assert_eq!(double_click(&mut state, 200.0, 0.0), DrawOutcome::Ignored);
        let Some(Draft::Ring { vertices, roi: true }) = state.draft() else {
            panic!("expected the ROI ring to stay open");
        };
        assert_eq!(vertices.len(), 3);

        assert!(matches!(
            double_click(&mut state, 200.0, 100.0),
            DrawOutcome::Finished(FinishedShape::Roi(_))
        ));
    }

    #[test]
    fn double_click_with_two_vertices_keeps_draft() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Polygon);
        click(&mut state, 0.0, 0.0);
        assert_eq!(double_click(&mut state, 5.0, 5.0), DrawOutcome::Ignored);
        assert!(state.is_mid_gesture());
    }

    #[test]
    fn escape_then_new_polygon_has_no_old_vertices() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Polygon);
        click(&mut state, 1.0, 1.0);
        click(&mut state, 2.0, 2.0);
        assert_eq!(state.cancel(), DrawOutcome::Cancelled);
        assert!(!state.is_mid_gesture());

        click(&mut state, 100.0, 100.0);
        click(&mut state, 200.0, 100.0);
        let DrawOutcome::Finished(FinishedShape::Polygon(vertices)) =
            double_click(&mut state, 200.0, 200.0)
        else {
            panic!("expected finished polygon");
        };
        assert_eq!(
            vertices,
            vec![
                ImagePoint::new(100.0, 100.0),
                ImagePoint::new(200.0, 100.0),
                ImagePoint::new(200.0, 200.0),
            ]
        );
    }

    #[test]
    fn tool_switch_discards_draft() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Roi);
        click(&mut state, 1.0, 1.0);
        state.set_tool(Tool::Measurement);
        assert!(state.draft().is_none());
        assert_eq!(state.cancel(), DrawOutcome::Ignored);
    }

    #[test]
    fn roi_tool_finishes_as_roi() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Roi);
        click(&mut state, 0.0, 0.0);
        click(&mut state, 10.0, 0.0);
        let outcome = double_click(&mut state, 10.0, 10.0);
        assert!(matches!(outcome, DrawOutcome::Finished(FinishedShape::Roi(ref v)) if v.len() == 3));
    }

    #[test]
    fn measurement_takes_two_clicks_in_image_space() {
        let mut state = DrawingState::new();
        state.set_tool(Tool::Measurement);
        let zoomed = ViewTransform::new(2.0, ViewportPoint::new(10.0, 0.0), ZoomConvention::Factor);
        state.handle_pointer(PointerEvent::Click(ViewportPoint::new(10.0, 0.0)), &zoomed);
        assert!(state.is_mid_gesture());
        let outcome =
            state.handle_pointer(PointerEvent::Click(ViewportPoint::new(210.0, 0.0)), &zoomed);
        assert_eq!(
            outcome,
            DrawOutcome::Finished(FinishedShape::Measurement {
                start: ImagePoint::new(0.0, 0.0),
                end: ImagePoint::new(100.0, 0.0),
            })
        );
        assert!(!state.is_mid_gesture());
    }

    #[test]
    fn select_tool_never_blocks_navigation() {
        let mut state = DrawingState::new();
        assert_eq!(click(&mut state, 3.0, 3.0), DrawOutcome::Ignored);
        assert!(!state.is_mid_gesture());
    }

    #[test]
    fn pick_skips_drafts_and_prefers_topmost() {
        let make = |id: Option<i64>, key: u64, geometry| Annotation {
            id,
            local_key: key,
            image_id: 1,
            geometry,
            color: ShapeColor::default(),
            derived_label: None,
            derived_metric: None,
        };
        let square = vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(10.0, 0.0),
            ImagePoint::new(10.0, 10.0),
            ImagePoint::new(0.0, 10.0),
        ];
        let annotations = vec![
            make(Some(1), 1, AnnotationGeometry::Polygon { vertices: square.clone() }),
            make(Some(2), 2, AnnotationGeometry::Point { at: ImagePoint::new(5.0, 5.0) }),
            make(None, 3, AnnotationGeometry::Polygon { vertices: square }),
        ];
        assert_eq!(pick_annotation(&annotations, &ImagePoint::new(5.0, 5.0), 1.0), Some(2));
        assert_eq!(pick_annotation(&annotations, &ImagePoint::new(2.0, 2.0), 1.0), Some(1));
        assert_eq!(pick_annotation(&annotations, &ImagePoint::new(50.0, 50.0), 1.0), None);
    }
}
