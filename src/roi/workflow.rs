//! Per-image ROI state machine
//!
//! `Idle -> Drawing -> Closed -> Running -> Completed | Failed`
//!
//! Only one ROI polygon exists per image. Starting a new one, or clearing,
//! cancels any running job and bumps the generation so late progress from the
//! old job is dropped.

use super::cancel::Cancellation;
use super::orchestrator::{RoiEvent, RoiJob, RoiReport, TOTAL_STEPS};
use super::RoiError;
use crate::domain::{AnalysisKind, ImagePoint};
use crate::measure;

#[derive(Clone, Debug, PartialEq)]
pub enum RoiPhase {
    Idle,
    Drawing {
        vertices: usize,
    },
    Closed,
    Running {
        step: u8,
        total: u8,
        label: &'static str,
    },
    Completed {
        succeeded: usize,
        total: usize,
    },
    Failed {
        message: String,
    },
}

impl RoiPhase {
    /// Short status text for progress and toast display
    pub fn status_text(&self) -> String {
        match self {
            RoiPhase::Idle => "No region selected".to_string(),
            RoiPhase::Drawing { vertices } => format!("Drawing region ({vertices} points)"),
            RoiPhase::Closed => "Region ready for analysis".to_string(),
            RoiPhase::Running { step, total, label } => format!("Step {step}/{total}: {label}"),
            RoiPhase::Completed { succeeded, total } => {
                format!("{succeeded} of {total} steps succeeded")
            }
            RoiPhase::Failed { message } => format!("Analysis failed: {message}"),
        }
    }
}

#[derive(Debug)]
pub struct RoiWorkflow {
    phase: RoiPhase,
    polygon: Option<Vec<ImagePoint>>,
    report: Option<RoiReport>,
    cancel: Option<Cancellation>,
    generation: u64,
}

impl Default for RoiWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl RoiWorkflow {
    pub fn new() -> Self {
        Self {
            phase: RoiPhase::Idle,
            polygon: None,
            report: None,
            cancel: None,
            generation: 0,
        }
    }

    pub fn phase(&self) -> &RoiPhase {
        &self.phase
    }

    /// The closed ROI polygon, if any
    pub fn polygon(&self) -> Option<&[ImagePoint]> {
        self.polygon.as_deref()
    }

    pub fn report(&self) -> Option<&RoiReport> {
        self.report.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, RoiPhase::Running { .. })
    }

    /// First vertex placed; any previous ROI is cleared
    pub fn begin_drawing(&mut self) {
        self.clear();
        self.phase = RoiPhase::Drawing { vertices: 1 };
    }

    pub fn update_drawing(&mut self, vertices: usize) {
        if let RoiPhase::Drawing { vertices: count } = &mut self.phase {
            *count = vertices;
        }
    }

    /// Draft discarded (Escape or tool switch)
    pub fn abandon_drawing(&mut self) {
        if matches!(self.phase, RoiPhase::Drawing { .. }) {
            self.phase = RoiPhase::Idle;
        }
    }

    /// Close the ROI; rejected unless the ring has 3+ vertices and an area
    pub fn close(&mut self, vertices: Vec<ImagePoint>) -> bool {
        if vertices.len() < 3 || measure::polygon_area(&vertices) <= 0.0 {
            log::debug!("Rejecting degenerate ROI with {} vertices", vertices.len());
            return false;
        }
        if self.is_running() {
            self.clear();
        }
        self.polygon = Some(vertices);
        self.report = None;
        self.phase = RoiPhase::Closed;
        true
    }

    /// Enter `Running` and hand out the job for the orchestrator.
    ///
    /// Returns the job, its cancellation token and the generation that
    /// progress updates must carry.
    pub fn start(
        &mut self,
        image_id: i64,
        project_id: Option<i64>,
        analyses: &[AnalysisKind],
    ) -> Option<(RoiJob, Cancellation, u64)> {
        if self.is_running() {
            log::debug!("ROI analysis already running");
            return None;
        }
        let polygon = self.polygon.clone()?;
        self.generation += 1;
        let cancel = Cancellation::new();
        self.cancel = Some(cancel.clone());
        self.report = None;
        self.phase = RoiPhase::Running {
            step: 1,
            total: TOTAL_STEPS,
            label: "Starting",
        };
        let job = RoiJob {
            image_id,
            project_id,
            polygon,
            analyses: analyses.to_vec(),
        };
        Some((job, cancel, self.generation))
    }

    /// Apply a progress event from the job of `generation`
    pub fn apply_event(&mut self, generation: u64, event: &RoiEvent) -> bool {
        if generation != self.generation || !self.is_running() {
            return false;
        }
        if let RoiEvent::StepStarted { step, total, label } = event {
            self.phase = RoiPhase::Running {
                step: *step,
                total: *total,
                label: *label,
            };
        }
        true
    }

    /// Apply the job's final result
    pub fn finish(&mut self, generation: u64, result: Result<RoiReport, RoiError>) -> bool {
        if generation != self.generation {
            log::debug!("Dropping result of superseded ROI job {}", generation);
            return false;
        }
        self.cancel = None;
        match result {
            Ok(report) => {
                self.phase = RoiPhase::Completed {
                    succeeded: report.succeeded_steps(),
                    total: report.completed_steps(),
                };
                self.report = Some(report);
            }
            Err(RoiError::Cancelled) => {
                self.phase = if self.polygon.is_some() {
                    RoiPhase::Closed
                } else {
                    RoiPhase::Idle
                };
            }
            Err(err) => {
                log::error!("ROI workflow failed: {}", err);
                self.phase = RoiPhase::Failed {
                    message: err.to_string(),
                };
            }
        }
        true
    }

    /// Drop the ROI and any running job, back to `Idle`
    pub fn clear(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            log::info!("Cancelling running ROI analysis");
            cancel.cancel();
        }
        self.generation += 1;
        self.polygon = None;
        self.report = None;
        self.phase = RoiPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::orchestrator::{StepOutcome, StepReport};

    fn triangle() -> Vec<ImagePoint> {
        vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(10.0, 0.0),
            ImagePoint::new(0.0, 10.0),
        ]
    }

    fn report(errors: usize) -> RoiReport {
        RoiReport {
            steps: (0..3)
                .map(|i| StepReport {
                    label: "step",
                    outcome: if i < errors {
                        StepOutcome::Failed("x".into())
                    } else {
                        StepOutcome::Succeeded
                    },
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn walks_through_all_phases() {
        let mut roi = RoiWorkflow::new();
        roi.begin_drawing();
        roi.update_drawing(3);
        assert_eq!(roi.phase(), &RoiPhase::Drawing { vertices: 3 });
        assert!(roi.close(triangle()));
        assert_eq!(roi.phase(), &RoiPhase::Closed);

        let (job, _cancel, generation) = roi.start(1, Some(2), &[AnalysisKind::Health]).unwrap();
        assert_eq!(job.polygon.len(), 3);
        assert!(roi.start(1, Some(2), &[AnalysisKind::Health]).is_none());

        roi.apply_event(
            generation,
            &RoiEvent::StepStarted {
                step: 2,
                total: 3,
                label: "dispatch",
            },
        );
        assert_eq!(roi.phase().status_text(), "Step 2/3: dispatch");

        assert!(roi.finish(generation, Ok(report(1))));
        assert_eq!(
            roi.phase(),
            &RoiPhase::Completed {
                succeeded: 2,
                total: 3
            }
        );
        assert_eq!(roi.report().unwrap().errors(), 1);
    }

    #[test]
    fn degenerate_polygons_do_not_close() {
        let mut roi = RoiWorkflow::new();
        roi.begin_drawing();
        assert!(!roi.close(triangle()[..2].to_vec()));
        let collinear = vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(1.0, 1.0),
            ImagePoint::new(2.0, 2.0),
        ];
        assert!(!roi.close(collinear));
        assert!(matches!(roi.phase(), RoiPhase::Drawing { .. }));
    }

    #[test]
    fn clear_cancels_and_drops_late_results() {
        let mut roi = RoiWorkflow::new();
        roi.close(triangle());
        let (_, cancel, generation) = roi.start(1, None, &[AnalysisKind::Vegetation]).unwrap();

        roi.clear();
        assert!(cancel.is_cancelled());
        assert_eq!(roi.phase(), &RoiPhase::Idle);
        assert!(roi.polygon().is_none());

        assert!(!roi.apply_event(generation, &RoiEvent::PollAttempt { attempt: 1, max_attempts: 60 }));
        assert!(!roi.finish(generation, Ok(report(0))));
        assert_eq!(roi.phase(), &RoiPhase::Idle);
    }

    #[test]
    fn fatal_error_fails_the_workflow() {
        let mut roi = RoiWorkflow::new();
        roi.close(triangle());
        let (_, _, generation) = roi.start(1, Some(1), &[AnalysisKind::Biomass]).unwrap();
        roi.finish(generation, Err(RoiError::Fatal(crate::api::ApiError::Unauthenticated)));
        assert!(matches!(roi.phase(), RoiPhase::Failed { .. }));
        assert!(roi.polygon().is_some());
    }

    #[test]
    fn new_drawing_replaces_previous_roi() {
        let mut roi = RoiWorkflow::new();
        roi.close(triangle());
        roi.begin_drawing();
        assert!(roi.polygon().is_none());
        roi.abandon_drawing();
        assert_eq!(roi.phase(), &RoiPhase::Idle);
    }
}
