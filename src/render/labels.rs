//! Label placement for measurement and point annotations
//!
//! Labels are anchored in image space and converted to viewport pixels, so
//! they follow the shape under pan and zoom. Polygon labels sit on the vertex
//! centroid, which can fall outside a strongly non-convex polygon.

use crate::annotations::tools::Draft;
use crate::domain::{Annotation, AnnotationGeometry, GroundSampleDistance, ImagePoint, ViewportPoint};
use crate::measure;
use crate::transform::{ViewTransform, to_screen};

use super::geometry::{annotation, hud};

/// A label ready to draw, centered on `at`
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLabel {
    pub text: String,
    pub at: ViewportPoint,
    /// Derived from an estimated GSD
    pub approximate: bool,
}

fn anchor(geometry: &AnnotationGeometry) -> Option<(ImagePoint, f64, f64)> {
    // (image anchor, viewport dx, viewport dy)
    let above = -(hud::LABEL_HEIGHT as f64);
    match geometry {
        AnnotationGeometry::Polygon { vertices } | AnnotationGeometry::Roi { vertices } => {
            measure::centroid(vertices).map(|c| (c, 0.0, 0.0))
        }
        AnnotationGeometry::Measurement { start, end } => Some((
            ImagePoint::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0),
            0.0,
            above,
        )),
        AnnotationGeometry::Point { at } => {
            let offset = annotation::POINT_RADIUS as f64 + hud::LABEL_PADDING as f64;
            Some((*at, 0.0, above - offset))
        }
        AnnotationGeometry::Circle { center, .. } => Some((*center, 0.0, 0.0)),
        AnnotationGeometry::Rectangle { rect } => Some((rect.center(), 0.0, 0.0)),
    }
}

/// Place the derived label of each annotation that has one
pub fn layout<'a>(
    annotations: impl IntoIterator<Item = &'a Annotation>,
    gsd: &GroundSampleDistance,
    view: &ViewTransform,
) -> Vec<PlacedLabel> {
    annotations
        .into_iter()
        .filter_map(|a| {
            let text = a.derived_label.clone()?;
            let (at, dx, dy) = anchor(&a.geometry)?;
            Some(PlacedLabel {
                text,
                at: to_screen(at, view).offset(dx, dy),
                approximate: gsd.is_estimated && a.derived_metric.is_some(),
            })
        })
        .collect()
}

/// Live distance label for a measurement being drawn
pub fn draft_label(
    draft: Option<&Draft>,
    cursor: Option<ImagePoint>,
    gsd: &GroundSampleDistance,
    view: &ViewTransform,
) -> Option<PlacedLabel> {
    let Some(Draft::Measurement { start }) = draft else {
        return None;
    };
    let end = cursor?;
    let meters = measure::distance_m(start, &end, gsd);
    let geometry = AnnotationGeometry::Measurement { start: *start, end };
    let (at, dx, dy) = anchor(&geometry)?;
    Some(PlacedLabel {
        text: measure::flag_estimate(measure::format_distance(meters), gsd),
        at: to_screen(at, view).offset(dx, dy),
        approximate: gsd.is_estimated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ShapeColor, ZoomConvention};

    fn annotation(geometry: AnnotationGeometry, label: &str) -> Annotation {
        Annotation {
            id: Some(1),
            local_key: 1,
            image_id: 1,
            geometry,
            color: ShapeColor::default(),
            derived_label: Some(label.to_string()),
            derived_metric: Some(1.0),
        }
    }

    #[test]
    fn polygon_label_sits_on_centroid_in_viewport() {
        let square = vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(100.0, 0.0),
            ImagePoint::new(100.0, 100.0),
            ImagePoint::new(0.0, 100.0),
        ];
        let view = ViewTransform::new(2.0, ViewportPoint::new(10.0, 20.0), ZoomConvention::Factor);
        let labels = layout(
            &[annotation(AnnotationGeometry::Polygon { vertices: square }, "3.0 m²")],
            &GroundSampleDistance::measured(0.03),
            &view,
        );
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].at, ViewportPoint::new(110.0, 120.0));
        assert!(!labels[0].approximate);
    }

    #[test]
    fn unlabeled_annotations_are_skipped() {
        let mut a = annotation(
            AnnotationGeometry::Point {
                at: ImagePoint::new(5.0, 5.0),
            },
            "",
        );
        a.derived_label = None;
        let view = ViewTransform::identity(ZoomConvention::Factor);
        assert!(layout(&[a], &GroundSampleDistance::estimated(0.03), &view).is_empty());
    }

    #[test]
    fn live_measurement_label_is_flagged_when_estimated() {
        let view = ViewTransform::identity(ZoomConvention::Factor);
        let draft = Draft::Measurement {
            start: ImagePoint::new(0.0, 0.0),
        };
        let label = draft_label(
            Some(&draft),
            Some(ImagePoint::new(100.0, 0.0)),
            &GroundSampleDistance::estimated(0.03),
            &view,
        )
        .unwrap();
        assert_eq!(label.text, "~3.00 m");
        assert!(label.approximate);
        assert_eq!(label.at.x, 50.0);
        assert!(draft_label(None, None, &GroundSampleDistance::measured(0.1), &view).is_none());
    }
}
