//! Region-of-interest workflow
//!
//! - `workflow`: the per-image ROI state machine
//! - `orchestrator`: the three-step analysis run
//! - `cancel`: cancellation token shared with a running job

pub mod cancel;
pub mod orchestrator;
pub mod workflow;

pub use cancel::Cancellation;
pub use orchestrator::{PollOutcome, PollSettings, RoiEvent, RoiJob, RoiReport, run_roi_analysis};
pub use workflow::{RoiPhase, RoiWorkflow};

use crate::api::ApiError;

/// Errors that end an ROI run before it reports
#[derive(Debug, thiserror::Error)]
pub enum RoiError {
    #[error("No closed ROI polygon (at least 3 vertices enclosing an area)")]
    NoClosedPolygon,
    #[error("No analyses requested")]
    NoAnalyses,
    #[error("ROI analysis failed: {0}")]
    Fatal(#[source] ApiError),
    #[error("ROI workflow cancelled")]
    Cancelled,
}
