//! Editor session state and its update loop
//!
//! `EditorSession` owns everything shown for the current image. `update`
//! applies one message and returns the commands the driver must run; the
//! driver feeds the answers back as messages.

use image::RgbaImage;

use crate::annotations::handlers::handle_draw_msg;
use crate::annotations::sync::AnnotationSync;
use crate::annotations::tools::{Draft, DrawingState};
use crate::config::CropLensConfig;
use crate::domain::{
    AnnotationGeometry, GroundSampleDistance, ImageInfo, ImagePoint, ImageSize, LayerCategory,
    SceneAnalysis, UtmInfo, ViewportPoint,
};
use crate::imagery::ImageMetadata;
use crate::render::{DraftOverlay, LayerStack, RoiOverlay, Scene};
use crate::roi::RoiWorkflow;
use crate::transform::ViewTransform;

use super::messages::{Command, LayerMsg, Msg, RoiMsg, StoreMsg, ViewMsg};

#[derive(Debug)]
pub struct EditorSession {
    pub config: CropLensConfig,
    pub image: Option<ImageInfo>,
    pub project_id: Option<i64>,
    pub image_size: ImageSize,
    pub viewport: ImageSize,
    pub gsd: GroundSampleDistance,
    pub utm: UtmInfo,
    pub view: ViewTransform,
    pub drawing: DrawingState,
    pub annotations: AnnotationSync,
    pub layers: LayerStack,
    pub roi: RoiWorkflow,
    pub analysis: Option<SceneAnalysis>,
}

impl EditorSession {
    pub fn new(config: CropLensConfig, viewport: ImageSize) -> Self {
        let layers = LayerStack::new(config.default_view_mode);
        let view = ViewTransform::identity(config.zoom_convention);
        let gsd = GroundSampleDistance::estimated(config.fallback_gsd_m);
        Self {
            config,
            image: None,
            project_id: None,
            image_size: ImageSize::default(),
            viewport,
            gsd,
            utm: UtmInfo::without_gps(),
            view,
            drawing: DrawingState::new(),
            annotations: AnnotationSync::new(),
            layers,
            roi: RoiWorkflow::new(),
            analysis: None,
        }
    }

    pub fn image_id(&self) -> Option<i64> {
        self.image.as_ref().map(|i| i.id)
    }

    /// Apply one message
    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        match msg {
            Msg::Draw(msg) => handle_draw_msg(self, msg),
            Msg::Store(msg) => self.handle_store_msg(msg),
            Msg::View(msg) => {
                self.handle_view_msg(msg);
                Vec::new()
            }
            Msg::Layer(msg) => {
                self.handle_layer_msg(msg);
                Vec::new()
            }
            Msg::Roi(msg) => self.handle_roi_msg(msg),
            Msg::ImageOpened {
                image,
                project_id,
                metadata,
            } => self.open_image(image, project_id, metadata),
            Msg::AnalysisLoaded(analysis) => {
                self.analysis = Some(analysis);
                Vec::new()
            }
        }
    }

    fn open_image(
        &mut self,
        image: ImageInfo,
        project_id: Option<i64>,
        metadata: ImageMetadata,
    ) -> Vec<Command> {
        log::info!(
            "Opened image {} ({}x{}, {:.2} cm/px{})",
            image.id,
            metadata.size.width,
            metadata.size.height,
            metadata.gsd.centimeters_per_pixel(),
            if metadata.gsd.is_estimated { ", estimated" } else { "" }
        );
        self.drawing.cancel();
        self.roi.clear();
        self.annotations.switch_image(image.id);
        self.image_size = metadata.size;
        self.gsd = metadata.gsd;
        self.utm = metadata.utm;
        self.analysis = None;
        self.view = ViewTransform::fit(self.image_size, self.viewport, self.config.zoom_convention);
        let id = image.id;
        self.project_id = project_id.or(image.project_id);
        self.image = Some(image);
        vec![Command::LoadAnnotations(id)]
    }

    // ========================================================================
    // Store answers
    // ========================================================================

    fn handle_store_msg(&mut self, msg: StoreMsg) -> Vec<Command> {
        match msg {
            StoreMsg::Listed { image_id, result } => match result {
                Ok(records) => {
                    if self.annotations.load(image_id, &records) {
                        self.reveal_roi();
                    }
                }
                Err(err) => log::warn!("Failed to list annotations for image {}: {}", image_id, err),
            },
            StoreMsg::Created { local_key, result } => {
                self.annotations.complete_create(local_key, result);
            }
            StoreMsg::Deleted { id, result } => {
                self.annotations.complete_delete(id, result);
            }
        }
        // Replaced ROIs whose create was still in flight
        self.annotations
            .take_orphans()
            .into_iter()
            .map(Command::DeleteAnnotation)
            .collect()
    }

    // ========================================================================
    // View
    // ========================================================================

    fn viewport_center(&self) -> ViewportPoint {
        ViewportPoint::new(
            self.viewport.width as f64 / 2.0,
            self.viewport.height as f64 / 2.0,
        )
    }

    fn handle_view_msg(&mut self, msg: ViewMsg) {
        let navigates = !matches!(msg, ViewMsg::Resize(_));
        if navigates && self.drawing.is_mid_gesture() {
            log::debug!("View change blocked while drawing");
            return;
        }
        match msg {
            ViewMsg::Resize(size) => self.viewport = size,
            ViewMsg::Pan { dx, dy } => self.view.pan_by(dx, dy),
            ViewMsg::ZoomAt { cursor, factor } => self.view.zoom_by(cursor, factor),
            ViewMsg::ZoomCentered(factor) => {
                let center = self.viewport_center();
                self.view.zoom_by(center, factor);
            }
            ViewMsg::Reset => {
                self.view =
                    ViewTransform::fit(self.image_size, self.viewport, self.config.zoom_convention);
            }
        }
    }

    fn handle_layer_msg(&mut self, msg: LayerMsg) {
        match msg {
            LayerMsg::Toggle(category) => {
                self.layers.toggle(category);
            }
            LayerMsg::SetOpacity(category, opacity) => self.layers.set_opacity(category, opacity),
            LayerMsg::ApplyViewMode(mode) => {
                self.layers.apply_view_mode(mode);
                self.reveal_roi();
            }
        }
    }

    // ========================================================================
    // ROI
    // ========================================================================

    /// Presets hide the ROI layer; keep it shown while the image has an ROI
    fn reveal_roi(&mut self) {
        if self.roi.polygon().is_some() || self.stored_roi().is_some() {
            self.layers.reveal(LayerCategory::Roi);
        }
    }

    /// Vertices of the persisted ROI annotation, if the image has one
    fn stored_roi(&self) -> Option<Vec<ImagePoint>> {
        self.annotations
            .annotations()
            .iter()
            .rev()
            .find_map(|a| match &a.geometry {
                AnnotationGeometry::Roi { vertices } => Some(vertices.clone()),
                _ => None,
            })
    }

    fn handle_roi_msg(&mut self, msg: RoiMsg) -> Vec<Command> {
        match msg {
            RoiMsg::Run(analyses) => {
                let Some(image_id) = self.image_id() else {
                    log::warn!("No image open for ROI analysis");
                    return Vec::new();
                };
                if self.roi.polygon().is_none()
                    && let Some(stored) = self.stored_roi()
                {
                    self.roi.close(stored);
                }
                let analyses = if analyses.is_empty() {
                    self.config.default_analyses.clone()
                } else {
                    analyses
                };
                match self.roi.start(image_id, self.project_id, &analyses) {
                    Some((job, cancel, generation)) => vec![Command::RunRoi {
                        job,
                        cancel,
                        generation,
                    }],
                    None => {
                        log::warn!("ROI analysis not started: {}", self.roi.phase().status_text());
                        Vec::new()
                    }
                }
            }
            RoiMsg::Progress { generation, event } => {
                self.roi.apply_event(generation, &event);
                Vec::new()
            }
            RoiMsg::Finished { generation, result } => {
                self.roi.finish(generation, result);
                Vec::new()
            }
            RoiMsg::Clear => {
                self.roi.clear();
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Scene for the compositor; `base` is the cached image pixels
    pub fn scene<'a>(&'a self, base: Option<&'a RgbaImage>) -> Scene<'a> {
        let roi = self
            .roi
            .polygon()
            .or_else(|| {
                self.annotations
                    .annotations()
                    .iter()
                    .rev()
                    .find_map(|a| match &a.geometry {
                        AnnotationGeometry::Roi { vertices } => Some(vertices.as_slice()),
                        _ => None,
                    })
            })
            .map(|vertices| RoiOverlay {
                vertices,
                color: self.config.roi_color,
            });

        let draft = self.drawing.draft().map(|draft| DraftOverlay {
            draft,
            cursor: self.drawing.cursor(),
            color: match draft {
                Draft::Ring { roi: true, .. } => self.config.roi_color,
                Draft::Ring { .. } => self.config.annotation_color,
                Draft::Measurement { .. } => self.config.measurement_color,
            },
        });

        Scene {
            base,
            image_size: self.image_size,
            layers: &self.layers,
            analysis: self.analysis.as_ref(),
            roi,
            annotations: self.annotations.annotations(),
            draft,
            gsd: self.gsd,
            utm: Some(&self.utm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::tools::Tool;
    use crate::domain::{AnalysisKind, LayerCategory, ViewMode};
    use crate::roi::{RoiEvent, RoiPhase, RoiReport};

    fn opened(size: ImageSize) -> EditorSession {
        let mut session = EditorSession::new(CropLensConfig::default(), size);
        let image = ImageInfo {
            id: 9,
            width: Some(size.width),
            height: Some(size.height),
            center_lat: None,
            center_lon: None,
            status: None,
            project_id: None,
        };
        let metadata = ImageMetadata {
            image_id: 9,
            size,
            gsd: GroundSampleDistance::measured(0.03),
            utm: UtmInfo::without_gps(),
        };
        let commands = session.update(Msg::ImageOpened {
            image,
            project_id: Some(4),
            metadata,
        });
        assert!(matches!(commands.as_slice(), [Command::LoadAnnotations(9)]));
        session
    }

    #[test]
    fn pan_and_zoom_are_blocked_mid_gesture() {
        let mut session = opened(ImageSize::new(400, 400));
        let before = session.view;

        session.update(Msg::set_tool(Tool::Polygon));
        session.update(Msg::click(10.0, 10.0));
        session.update(Msg::View(ViewMsg::Pan { dx: 50.0, dy: 0.0 }));
        session.update(Msg::zoom_centered(2.0));
        assert_eq!(session.view, before);

        session.update(Msg::cancel());
        session.update(Msg::View(ViewMsg::Pan { dx: 50.0, dy: 0.0 }));
        assert_ne!(session.view, before);
    }

    #[test]
    fn layer_messages_reach_the_stack() {
        let mut session = opened(ImageSize::new(100, 100));
        session.update(Msg::view_mode(ViewMode::Detection));
        assert!(session.layers.is_visible(LayerCategory::Trees));
        session.update(Msg::toggle_layer(LayerCategory::Trees));
        assert!(!session.layers.is_visible(LayerCategory::Trees));
        assert!(session.layers.is_visible(LayerCategory::Pests));
        assert_eq!(session.layers.view_mode(), None);
    }

    #[test]
    fn roi_run_uses_default_analyses_and_drops_stale_progress() {
        let mut session = opened(ImageSize::new(400, 400));
        session.update(Msg::set_tool(Tool::Roi));
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)] {
            session.update(Msg::click(x, y));
        }
        session.update(Msg::double_click(100.0, 100.0));
        assert_eq!(session.roi.phase(), &RoiPhase::Closed);

        let commands = session.update(Msg::run_roi(Vec::new()));
        let [Command::RunRoi { job, generation, .. }] = commands.as_slice() else {
            panic!("expected a RunRoi command, got {commands:?}");
        };
        assert_eq!(job.analyses, vec![AnalysisKind::Vegetation, AnalysisKind::Health]);
        assert_eq!(job.project_id, Some(4));
        let generation = *generation;

        session.update(Msg::Roi(RoiMsg::Progress {
            generation,
            event: RoiEvent::StepStarted {
                step: 2,
                total: 3,
                label: "Dispatching project analysis",
            },
        }));
        assert!(matches!(session.roi.phase(), RoiPhase::Running { step: 2, .. }));

        session.update(Msg::clear_roi());
        session.update(Msg::Roi(RoiMsg::Finished {
            generation,
            result: Ok(RoiReport::default()),
        }));
        assert_eq!(session.roi.phase(), &RoiPhase::Idle);
    }

    #[test]
    fn project_falls_back_to_the_image_record() {
        let size = ImageSize::new(100, 100);
        let mut session = EditorSession::new(CropLensConfig::default(), size);
        let image = ImageInfo {
            id: 12,
            width: Some(100),
            height: Some(100),
            center_lat: None,
            center_lon: None,
            status: None,
            project_id: Some(7),
        };
        let metadata = ImageMetadata {
            image_id: 12,
            size,
            gsd: GroundSampleDistance::measured(0.03),
            utm: UtmInfo::without_gps(),
        };
        session.update(Msg::ImageOpened {
            image: image.clone(),
            project_id: None,
            metadata: metadata.clone(),
        });
        assert_eq!(session.project_id, Some(7));

        session.update(Msg::ImageOpened {
            image,
            project_id: Some(4),
            metadata,
        });
        assert_eq!(session.project_id, Some(4));
    }

    #[test]
    fn presets_keep_an_existing_roi_visible() {
        let mut session = opened(ImageSize::new(400, 400));
        session.update(Msg::view_mode(ViewMode::Original));
        assert!(!session.layers.is_visible(LayerCategory::Roi));

        session.update(Msg::set_tool(Tool::Roi));
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)] {
            session.update(Msg::click(x, y));
        }
        session.update(Msg::double_click(100.0, 100.0));
        assert_eq!(session.roi.phase(), &RoiPhase::Closed);

        for mode in [ViewMode::Original, ViewMode::Vegetation, ViewMode::Detection] {
            session.update(Msg::view_mode(mode));
            assert!(session.layers.is_visible(LayerCategory::Roi));
            assert_eq!(session.layers.view_mode(), Some(mode));
        }
    }

    #[test]
    fn scene_reflects_draft_and_view() {
        let mut session = opened(ImageSize::new(200, 100));
        session.update(Msg::set_tool(Tool::Measurement));
        session.update(Msg::click(10.0, 10.0));
        session.update(Msg::pointer_move(60.0, 10.0));
        let scene = session.scene(None);
        let draft = scene.draft.unwrap();
        assert_eq!(draft.color, session.config.measurement_color);
        assert!(draft.cursor.is_some());
        assert!(scene.roi.is_none());
        assert_eq!(scene.image_size, ImageSize::new(200, 100));
    }
}
