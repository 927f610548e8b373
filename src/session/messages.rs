//! Message types for the editor session
//!
//! This module contains:
//! - Msg enum with nested sub-enums for organized message handling
//! - Command enum for the side effects an update asks the driver to run

use crate::annotations::sync::PendingCreate;
use crate::annotations::tools::{PointerEvent, Tool};
use crate::api::ApiError;
use crate::api::types::AnnotationRecord;
use crate::domain::{
    AnalysisKind, ImageInfo, ImageSize, LayerCategory, SceneAnalysis, ViewMode, ViewportPoint,
};
use crate::imagery::ImageMetadata;
use crate::roi::{Cancellation, RoiError, RoiEvent, RoiJob, RoiReport};

// ============================================================================
// Drawing
// ============================================================================

/// Drawing and annotation messages
#[derive(Debug, Clone)]
pub enum DrawMsg {
    /// Activate a tool; any unclosed draft is discarded
    SetTool(Tool),
    /// Pointer input over the viewport
    Pointer(PointerEvent),
    /// Escape: drop the open draft
    Cancel,
}

/// Answers from the annotation store
#[derive(Debug)]
pub enum StoreMsg {
    Listed {
        image_id: i64,
        result: Result<Vec<AnnotationRecord>, ApiError>,
    },
    Created {
        local_key: u64,
        result: Result<AnnotationRecord, ApiError>,
    },
    Deleted {
        id: i64,
        result: Result<(), ApiError>,
    },
}

// ============================================================================
// View and layers
// ============================================================================

/// Pan, zoom and viewport messages
#[derive(Debug, Clone, Copy)]
pub enum ViewMsg {
    /// Viewport resized
    Resize(ImageSize),
    /// Drag by a viewport offset
    Pan { dx: f64, dy: f64 },
    /// Wheel zoom about the cursor
    ZoomAt { cursor: ViewportPoint, factor: f64 },
    /// Keyboard zoom about the viewport center
    ZoomCentered(f64),
    /// Fit the image back into the viewport
    Reset,
}

/// Layer visibility and opacity messages
#[derive(Debug, Clone, Copy)]
pub enum LayerMsg {
    Toggle(LayerCategory),
    SetOpacity(LayerCategory, u8),
    ApplyViewMode(ViewMode),
}

// ============================================================================
// ROI
// ============================================================================

/// Region-of-interest workflow messages
#[derive(Debug)]
pub enum RoiMsg {
    /// Start the three-step analysis; empty means the configured defaults
    Run(Vec<AnalysisKind>),
    /// Progress from the job of `generation`
    Progress { generation: u64, event: RoiEvent },
    /// Final result of the job of `generation`
    Finished {
        generation: u64,
        result: Result<RoiReport, RoiError>,
    },
    /// Drop the ROI and any running job
    Clear,
}

// ============================================================================
// Main Message Enum
// ============================================================================

/// Messages for editor session interactions
#[derive(Debug)]
pub enum Msg {
    Draw(DrawMsg),
    Store(StoreMsg),
    View(ViewMsg),
    Layer(LayerMsg),
    Roi(RoiMsg),
    /// A new image finished loading
    ImageOpened {
        image: ImageInfo,
        project_id: Option<i64>,
        metadata: ImageMetadata,
    },
    /// ML results for the open image
    AnalysisLoaded(SceneAnalysis),
}

/// Side effects requested by an update
#[derive(Debug)]
pub enum Command {
    LoadAnnotations(i64),
    PersistAnnotation(PendingCreate),
    DeleteAnnotation(i64),
    RunRoi {
        job: RoiJob,
        cancel: Cancellation,
        generation: u64,
    },
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl Msg {
    pub fn set_tool(tool: Tool) -> Self {
        Self::Draw(DrawMsg::SetTool(tool))
    }
    pub fn click(x: f64, y: f64) -> Self {
        Self::Draw(DrawMsg::Pointer(PointerEvent::Click(ViewportPoint::new(x, y))))
    }
    pub fn double_click(x: f64, y: f64) -> Self {
        Self::Draw(DrawMsg::Pointer(PointerEvent::DoubleClick(ViewportPoint::new(x, y))))
    }
    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::Draw(DrawMsg::Pointer(PointerEvent::Move(ViewportPoint::new(x, y))))
    }
    pub fn cancel() -> Self {
        Self::Draw(DrawMsg::Cancel)
    }

    pub fn zoom_centered(factor: f64) -> Self {
        Self::View(ViewMsg::ZoomCentered(factor))
    }
    pub fn reset_view() -> Self {
        Self::View(ViewMsg::Reset)
    }

    pub fn toggle_layer(category: LayerCategory) -> Self {
        Self::Layer(LayerMsg::Toggle(category))
    }
    pub fn view_mode(mode: ViewMode) -> Self {
        Self::Layer(LayerMsg::ApplyViewMode(mode))
    }

    pub fn run_roi(analyses: Vec<AnalysisKind>) -> Self {
        Self::Roi(RoiMsg::Run(analyses))
    }
    pub fn clear_roi() -> Self {
        Self::Roi(RoiMsg::Clear)
    }
}
