//! Annotation message handlers
//!
//! Handles DrawMsg for all annotation drawing operations.

use crate::annotations::tools::{
    DrawOutcome, Draft, ERASER_TOLERANCE_PX, FinishedShape, Tool, pick_annotation,
};
use crate::domain::{Annotation, AnnotationKind, ImagePoint, LayerCategory};
use crate::measure;
use crate::session::messages::{Command, DrawMsg};
use crate::session::state::EditorSession;

/// Handle a DrawMsg, modifying session state
///
/// Returns the store requests the finished gesture needs.
pub fn handle_draw_msg(session: &mut EditorSession, msg: DrawMsg) -> Vec<Command> {
    match msg {
        DrawMsg::SetTool(tool) => {
            set_tool(session, tool);
            Vec::new()
        }
        DrawMsg::Cancel => {
            let tool = session.drawing.tool();
            if session.drawing.cancel() == DrawOutcome::Cancelled && tool == Tool::Roi {
                session.roi.abandon_drawing();
            }
            Vec::new()
        }
        DrawMsg::Pointer(event) => {
            if session.image_id().is_none() {
                return Vec::new();
            }
            let tool = session.drawing.tool();
            let commands = match session.drawing.handle_pointer(event, &session.view) {
                DrawOutcome::Started if tool == Tool::Roi => {
                    session.roi.begin_drawing();
                    Vec::new()
                }
                DrawOutcome::Finished(shape) => finish_shape(session, shape),
                DrawOutcome::EraseAt(at) => erase_at(session, at),
                _ => Vec::new(),
            };
            // The ring may have shrunk on a rejected double-click
            if tool == Tool::Roi
                && let Some(Draft::Ring { vertices, .. }) = session.drawing.draft()
            {
                session.roi.update_drawing(vertices.len());
            }
            commands
        }
    }
}

fn set_tool(session: &mut EditorSession, tool: Tool) {
    if session.drawing.tool() == Tool::Roi && tool != Tool::Roi {
        session.roi.abandon_drawing();
    }
    session.drawing.set_tool(tool);
    if tool == Tool::Roi {
        session.layers.set_visible(LayerCategory::Roi, true);
    }
}

// ============================================================================
// Finished shapes
// ============================================================================

/// Derive the label and metric, show the draft and request persistence
fn finish_shape(session: &mut EditorSession, shape: FinishedShape) -> Vec<Command> {
    let gsd = session.gsd;
    let config = &session.config;
    let (color, label, metric, perimeter) = match &shape {
        FinishedShape::Point(_) => (config.annotation_color, None, None, None),
        FinishedShape::Polygon(vertices) | FinishedShape::Roi(vertices) => {
            let area = measure::polygon_area_m2(vertices, &gsd);
            let color = if matches!(shape, FinishedShape::Roi(_)) {
                config.roi_color
            } else {
                config.annotation_color
            };
            (
                color,
                Some(measure::flag_estimate(measure::format_area(area), &gsd)),
                Some(area),
                Some(measure::polygon_perimeter_m(vertices, &gsd)),
            )
        }
        FinishedShape::Measurement { start, end } => {
            let meters = measure::distance_m(start, end, &gsd);
            (
                config.measurement_color,
                Some(measure::flag_estimate(measure::format_distance(meters), &gsd)),
                Some(meters),
                None,
            )
        }
    };

    let mut commands = Vec::new();
    if let FinishedShape::Roi(vertices) = &shape {
        if !session.roi.close(vertices.clone()) {
            session.roi.abandon_drawing();
            return commands;
        }
        commands.extend(replace_stored_roi(session));
    }

    let annotation = Annotation {
        id: None,
        local_key: 0,
        image_id: 0,
        geometry: shape.into_geometry(),
        color,
        derived_label: label,
        derived_metric: metric,
    };
    if let Some(mut pending) = session.annotations.begin_create(annotation) {
        log::debug!(
            "Persisting {} annotation {}",
            pending.body.annotation_type,
            pending.local_key
        );
        pending.body = pending.body.with_perimeter(perimeter);
        commands.push(Command::PersistAnnotation(pending));
    }
    commands
}

/// One ROI per image: previously stored ROI polygons are deleted.
///
/// ROIs still waiting for their create are withdrawn; the sync deletes them
/// once the store hands back an id.
fn replace_stored_roi(session: &mut EditorSession) -> Vec<Command> {
    let (stored, in_flight): (Vec<_>, Vec<_>) = session
        .annotations
        .annotations()
        .iter()
        .filter(|a| a.kind() == AnnotationKind::Roi)
        .map(|a| (a.id, a.local_key))
        .partition(|(id, _)| id.is_some());
    for (_, local_key) in in_flight {
        session.annotations.withdraw_draft(local_key);
    }
    stored
        .into_iter()
        .filter_map(|(id, _)| id)
        .filter(|id| session.annotations.begin_delete(*id))
        .map(Command::DeleteAnnotation)
        .collect()
}

// ============================================================================
// Eraser
// ============================================================================

fn erase_at(session: &mut EditorSession, at: ImagePoint) -> Vec<Command> {
    let tolerance = ERASER_TOLERANCE_PX / session.view.zoom();
    let Some(id) = pick_annotation(session.annotations.annotations(), &at, tolerance) else {
        return Vec::new();
    };
    let is_roi = session
        .annotations
        .get(id)
        .is_some_and(|a| a.kind() == AnnotationKind::Roi);
    if !session.annotations.begin_delete(id) {
        return Vec::new();
    }
    if is_roi {
        session.roi.clear();
    }
    vec![Command::DeleteAnnotation(id)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::sync::PendingCreate;
    use crate::api::types::AnnotationRecord;
    use crate::config::CropLensConfig;
    use crate::domain::{GroundSampleDistance, ImageInfo, ImageSize, UtmInfo};
    use crate::imagery::ImageMetadata;
    use crate::roi::RoiPhase;
    use crate::session::messages::{Msg, StoreMsg};

    fn session(gsd: GroundSampleDistance) -> EditorSession {
        let size = ImageSize::new(1000, 1000);
        let mut session = EditorSession::new(CropLensConfig::default(), size);
        session.update(Msg::ImageOpened {
            image: ImageInfo {
                id: 3,
                width: Some(1000),
                height: Some(1000),
                center_lat: None,
                center_lon: None,
                status: None,
                project_id: None,
            },
            project_id: Some(1),
            metadata: ImageMetadata {
                image_id: 3,
                size,
                gsd,
                utm: UtmInfo::without_gps(),
            },
        });
        session
    }

    fn draw_ring(session: &mut EditorSession, points: &[(f64, f64)]) -> Vec<Command> {
        for (x, y) in points {
            session.update(Msg::click(*x, *y));
        }
        let (x, y) = points[points.len() - 1];
        session.update(Msg::click(x, y));
        session.update(Msg::double_click(x, y))
    }

    fn persisted(session: &mut EditorSession, pending: &PendingCreate, id: i64) {
        session.annotations.complete_create(
            pending.local_key,
            Ok(AnnotationRecord {
                id,
                image_id: pending.image_id,
                annotation_type: pending.body.annotation_type.clone(),
                data: pending.body.data.clone(),
                created_at: None,
            }),
        );
    }

    #[test]
    fn polygon_gets_area_label_and_is_persisted() {
        let mut s = session(GroundSampleDistance::measured(0.03));
        s.update(Msg::set_tool(Tool::Polygon));
        let commands = draw_ring(&mut s, &[(0.0, 0.0), (250.0, 0.0), (250.0, 200.0), (0.0, 200.0)]);

        let [Command::PersistAnnotation(pending)] = commands.as_slice() else {
            panic!("expected one persist command, got {commands:?}");
        };
        assert_eq!(pending.body.annotation_type, "polygon");
        assert_eq!(pending.body.data.label.as_deref(), Some("45.0 m²"));
        assert_eq!(pending.body.data.points.as_ref().map(Vec::len), Some(4));
        assert!((pending.body.data.perimeter_m.unwrap() - 27.0).abs() < 1e-9);

        let drafts = s.annotations.annotations();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].is_new());
    }

    #[test]
    fn measurement_finishes_on_second_click_with_estimate_flag() {
        let mut s = session(GroundSampleDistance::estimated(0.03));
        s.update(Msg::set_tool(Tool::Measurement));
        assert!(s.update(Msg::click(0.0, 0.0)).is_empty());
        let commands = s.update(Msg::click(300.0, 400.0));
        let [Command::PersistAnnotation(pending)] = commands.as_slice() else {
            panic!("expected one persist command");
        };
        assert_eq!(pending.body.data.label.as_deref(), Some("~15.00 m"));
        assert!((pending.body.data.distance_m.unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn eraser_deletes_persisted_annotations_only() {
        let mut s = session(GroundSampleDistance::measured(0.1));
        s.update(Msg::set_tool(Tool::Point));
        let first = s.update(Msg::click(100.0, 100.0));
        let Some(Command::PersistAnnotation(pending)) = first.first() else {
            panic!("expected persist command");
        };
        let pending = pending.clone();
        s.update(Msg::click(500.0, 500.0));

        s.update(Msg::set_tool(Tool::Eraser));
        // Still a draft: nothing to delete
        assert!(s.update(Msg::click(500.0, 500.0)).is_empty());

        persisted(&mut s, &pending, 11);
        let commands = s.update(Msg::click(103.0, 102.0));
        assert!(matches!(commands.as_slice(), [Command::DeleteAnnotation(11)]));
        assert!(s.annotations.get(11).is_none());
    }

    #[test]
    fn new_roi_replaces_the_stored_one() {
        let mut s = session(GroundSampleDistance::measured(0.03));
        s.update(Msg::set_tool(Tool::Roi));
        assert!(s.layers.is_visible(LayerCategory::Roi));

        let square = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let commands = draw_ring(&mut s, &square);
        let [Command::PersistAnnotation(pending)] = commands.as_slice() else {
            panic!("expected one persist command");
        };
        assert_eq!(pending.body.data.role.as_deref(), Some("roi"));
        assert_eq!(s.roi.phase(), &RoiPhase::Closed);
        let pending = pending.clone();
        persisted(&mut s, &pending, 21);

        s.update(Msg::click(200.0, 200.0));
        assert!(matches!(s.roi.phase(), RoiPhase::Drawing { vertices: 1 }));
        let commands = draw_ring(&mut s, &[(300.0, 200.0), (300.0, 300.0)]);
        assert!(matches!(commands.first(), Some(Command::DeleteAnnotation(21))));
        assert!(matches!(commands.get(1), Some(Command::PersistAnnotation(_))));
        assert_eq!(s.roi.polygon().map(<[_]>::len), Some(3));
    }

    #[test]
    fn roi_replaced_while_its_save_is_in_flight_leaves_one_stored() {
        let mut s = session(GroundSampleDistance::measured(0.03));
        s.update(Msg::set_tool(Tool::Roi));

        let commands = draw_ring(&mut s, &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)]);
        let [Command::PersistAnnotation(first)] = commands.as_slice() else {
            panic!("expected one persist command");
        };
        let first = first.clone();

        // Second ROI before the first one has an id
        let commands = draw_ring(&mut s, &[(200.0, 200.0), (300.0, 200.0), (300.0, 300.0)]);
        let [Command::PersistAnnotation(second)] = commands.as_slice() else {
            panic!("expected only a persist command, got {commands:?}");
        };
        let second = second.clone();
        assert_eq!(s.annotations.annotations().len(), 1);

        let record = |pending: &PendingCreate, id| AnnotationRecord {
            id,
            image_id: pending.image_id,
            annotation_type: pending.body.annotation_type.clone(),
            data: pending.body.data.clone(),
            created_at: None,
        };
        let commands = s.update(Msg::Store(StoreMsg::Created {
            local_key: first.local_key,
            result: Ok(record(&first, 21)),
        }));
        assert!(matches!(commands.as_slice(), [Command::DeleteAnnotation(21)]));

        let commands = s.update(Msg::Store(StoreMsg::Created {
            local_key: second.local_key,
            result: Ok(record(&second, 22)),
        }));
        assert!(commands.is_empty());

        let rois: Vec<_> = s
            .annotations
            .annotations()
            .iter()
            .filter(|a| a.kind() == AnnotationKind::Roi)
            .collect();
        assert_eq!(rois.len(), 1);
        assert_eq!(rois[0].id, Some(22));
        assert_eq!(s.roi.phase(), &RoiPhase::Closed);
    }

    #[test]
    fn collinear_roi_stays_in_drawing() {
        let mut s = session(GroundSampleDistance::measured(0.03));
        s.update(Msg::set_tool(Tool::Roi));

        let commands = draw_ring(&mut s, &[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)]);
        assert!(commands.is_empty());
        assert!(matches!(s.roi.phase(), RoiPhase::Drawing { vertices: 3 }));
        assert!(s.drawing.is_mid_gesture());
        assert!(s.annotations.annotations().is_empty());

        s.update(Msg::Draw(DrawMsg::Cancel));
        assert_eq!(s.roi.phase(), &RoiPhase::Idle);
        assert!(s.drawing.draft().is_none());
    }

    #[test]
    fn switching_tools_abandons_roi_drawing() {
        let mut s = session(GroundSampleDistance::measured(0.03));
        s.update(Msg::set_tool(Tool::Roi));
        s.update(Msg::click(0.0, 0.0));
        s.update(Msg::click(10.0, 0.0));
        assert!(matches!(s.roi.phase(), RoiPhase::Drawing { vertices: 2 }));

        s.update(Msg::set_tool(Tool::Polygon));
        assert_eq!(s.roi.phase(), &RoiPhase::Idle);
        assert!(s.drawing.draft().is_none());
    }

    #[test]
    fn clicks_without_an_image_are_ignored() {
        let mut s = EditorSession::new(CropLensConfig::default(), ImageSize::new(100, 100));
        s.update(Msg::set_tool(Tool::Point));
        assert!(s.update(Msg::click(10.0, 10.0)).is_empty());
        assert!(s.annotations.annotations().is_empty());
    }
}
