//! Three-step ROI analysis run
//!
//! 1. ROI analysis of the closed polygon on the selected image
//! 2. Project-wide analysis dispatch
//! 3. Completion polling of the project summary
//!
//! Steps run strictly in order and each one's failure is counted without
//! stopping the next. Only a rejected token in step 1 or cancellation ends
//! the run early.

use std::time::Duration;

use super::cancel::Cancellation;
use super::RoiError;
use crate::api::types::{AnalysisSummary, DispatchResponse, RoiAnalysisRequest, RoiAnalysisResult};
use crate::api::{AnalysisBackend, ApiError};
use crate::config::CropLensConfig;
use crate::domain::{AnalysisKind, ImagePoint};
use crate::measure;

pub const TOTAL_STEPS: u8 = 3;

/// Everything needed to run the workflow once
#[derive(Clone, Debug, PartialEq)]
pub struct RoiJob {
    pub image_id: i64,
    pub project_id: Option<i64>,
    pub polygon: Vec<ImagePoint>,
    pub analyses: Vec<AnalysisKind>,
}

/// Completion polling bounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

impl From<&CropLensConfig> for PollSettings {
    fn from(config: &CropLensConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.poll_max_attempts.max(1),
        }
    }
}

/// Progress notifications, delivered in order
#[derive(Clone, Debug, PartialEq)]
pub enum RoiEvent {
    StepStarted {
        step: u8,
        total: u8,
        label: &'static str,
    },
    StepFinished {
        step: u8,
        succeeded: bool,
    },
    PollAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    /// Always the last event of a run that was not aborted
    Completed {
        succeeded: usize,
        total: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub label: &'static str,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == StepOutcome::Succeeded
    }
}

/// How completion polling ended
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Completed { attempts: u32 },
    /// Not an error; results may arrive through a later refresh
    TimedOut { attempts: u32 },
    /// Every attempt errored
    Failed { attempts: u32, last_error: String },
}

/// Aggregate result of a run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoiReport {
    pub steps: Vec<StepReport>,
    pub roi_result: Option<RoiAnalysisResult>,
    pub dispatch: Option<DispatchResponse>,
    pub summary: Option<AnalysisSummary>,
    pub poll: Option<PollOutcome>,
}

impl RoiReport {
    pub fn completed_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn errors(&self) -> usize {
        self.steps.iter().filter(|s| !s.succeeded()).count()
    }

    pub fn succeeded_steps(&self) -> usize {
        self.completed_steps() - self.errors()
    }

    pub fn all_succeeded(&self) -> bool {
        self.errors() == 0
    }

    /// "N of M steps succeeded"
    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} steps succeeded",
            self.succeeded_steps(),
            self.completed_steps()
        )
    }
}

const STEP_LABELS: [&str; TOTAL_STEPS as usize] = [
    "Analyzing region of interest",
    "Starting project analysis",
    "Waiting for analysis to complete",
];

/// Run the workflow against `backend`.
///
/// `on_event` receives progress in order and always gets a final
/// [`RoiEvent::Completed`] unless the run returns an error.
pub async fn run_roi_analysis<B, F>(
    backend: &B,
    job: &RoiJob,
    poll: PollSettings,
    cancel: &Cancellation,
    mut on_event: F,
) -> Result<RoiReport, RoiError>
where
    B: AnalysisBackend + ?Sized,
    F: FnMut(RoiEvent),
{
    if job.polygon.len() < 3 || measure::polygon_area(&job.polygon) <= 0.0 {
        return Err(RoiError::NoClosedPolygon);
    }
    if job.analyses.is_empty() {
        return Err(RoiError::NoAnalyses);
    }

    let mut report = RoiReport::default();

    // ========================================================================
    // Step 1: ROI analysis
    // ========================================================================
    begin_step(1, &mut on_event, cancel)?;
    let request = RoiAnalysisRequest::new(&job.polygon, &job.analyses);
    let step1 = tokio::select! {
        result = backend.analyze_roi(job.image_id, &request) => result,
        _ = cancel.cancelled() => return Err(RoiError::Cancelled),
    };
    let outcome = match step1 {
        Ok(result) => {
            let failed: Vec<&str> = result.failed(&job.analyses).map(|k| k.key()).collect();
            if !failed.is_empty() {
                log::warn!("ROI analysis returned errors for: {}", failed.join(", "));
            }
            report.roi_result = Some(result);
            StepOutcome::Succeeded
        }
        Err(err) if err.is_auth_failure() => {
            log::error!("ROI analysis rejected: {}", err);
            return Err(RoiError::Fatal(err));
        }
        Err(err) => {
            log::error!("ROI analysis failed: {}", err);
            StepOutcome::Failed(err.to_string())
        }
    };
    finish_step(1, outcome, &mut report, &mut on_event);

    // ========================================================================
    // Step 2: project dispatch
    // ========================================================================
    begin_step(2, &mut on_event, cancel)?;
    let outcome = match job.project_id {
        None => StepOutcome::Failed("image is not part of a project".to_string()),
        Some(project_id) => {
            let dispatched = tokio::select! {
                result = backend.dispatch_project_analysis(project_id) => result,
                _ = cancel.cancelled() => return Err(RoiError::Cancelled),
            };
            match dispatched {
                Ok(response) => {
                    log::info!(
                        "Project {} analysis dispatched for {} image(s)",
                        project_id,
                        response.analyses_started
                    );
                    report.dispatch = Some(response);
                    StepOutcome::Succeeded
                }
                Err(err) => {
                    log::error!("Project analysis dispatch failed: {}", err);
                    StepOutcome::Failed(err.to_string())
                }
            }
        }
    };
    finish_step(2, outcome, &mut report, &mut on_event);

    // ========================================================================
    // Step 3: completion polling
    // ========================================================================
    begin_step(3, &mut on_event, cancel)?;
    let outcome = match job.project_id {
        None => StepOutcome::Failed("image is not part of a project".to_string()),
        Some(project_id) => {
            let (poll_outcome, summary) =
                poll_until_complete(backend, project_id, poll, cancel, &mut on_event).await?;
            let outcome = match &poll_outcome {
                PollOutcome::Completed { .. } | PollOutcome::TimedOut { .. } => {
                    StepOutcome::Succeeded
                }
                PollOutcome::Failed { last_error, .. } => StepOutcome::Failed(last_error.clone()),
            };
            report.poll = Some(poll_outcome);
            report.summary = summary;
            outcome
        }
    };
    finish_step(3, outcome, &mut report, &mut on_event);

    log::info!("ROI workflow finished: {}", report.summary_line());
    on_event(RoiEvent::Completed {
        succeeded: report.succeeded_steps(),
        total: report.completed_steps(),
    });
    Ok(report)
}

fn begin_step<F: FnMut(RoiEvent)>(
    step: u8,
    on_event: &mut F,
    cancel: &Cancellation,
) -> Result<(), RoiError> {
    if cancel.is_cancelled() {
        return Err(RoiError::Cancelled);
    }
    let label = STEP_LABELS[(step - 1) as usize];
    log::info!("ROI step {}/{}: {}", step, TOTAL_STEPS, label);
    on_event(RoiEvent::StepStarted {
        step,
        total: TOTAL_STEPS,
        label,
    });
    Ok(())
}

fn finish_step<F: FnMut(RoiEvent)>(
    step: u8,
    outcome: StepOutcome,
    report: &mut RoiReport,
    on_event: &mut F,
) {
    let succeeded = outcome == StepOutcome::Succeeded;
    log::info!(
        "ROI step {}/{} {}",
        step,
        TOTAL_STEPS,
        if succeeded { "succeeded" } else { "failed" }
    );
    report.steps.push(StepReport {
        label: STEP_LABELS[(step - 1) as usize],
        outcome,
    });
    on_event(RoiEvent::StepFinished { step, succeeded });
}

/// Poll the project summary until it reports completion.
///
/// Attempts are strictly sequential with `interval` before each one. A failed
/// request is logged and polling continues.
async fn poll_until_complete<B, F>(
    backend: &B,
    project_id: i64,
    poll: PollSettings,
    cancel: &Cancellation,
    on_event: &mut F,
) -> Result<(PollOutcome, Option<AnalysisSummary>), RoiError>
where
    B: AnalysisBackend + ?Sized,
    F: FnMut(RoiEvent),
{
    let max_attempts = poll.max_attempts.max(1);
    let mut last_summary = None;
    let mut last_error: Option<ApiError> = None;
    let mut errors = 0;

    for attempt in 1..=max_attempts {
        tokio::select! {
            _ = tokio::time::sleep(poll.interval) => {}
            _ = cancel.cancelled() => return Err(RoiError::Cancelled),
        }
        on_event(RoiEvent::PollAttempt {
            attempt,
            max_attempts,
        });
        if cancel.is_cancelled() {
            return Err(RoiError::Cancelled);
        }
        let polled = tokio::select! {
            result = backend.analysis_summary(project_id) => result,
            _ = cancel.cancelled() => return Err(RoiError::Cancelled),
        };
        match polled {
            Ok(summary) => {
                log::debug!(
                    "Poll {}/{}: {} of {} analyzed, status {:?}",
                    attempt,
                    max_attempts,
                    summary.analyzed_images,
                    summary.total_images,
                    summary.status
                );
                let done = summary.is_complete();
                last_summary = Some(summary);
                if done {
                    return Ok((PollOutcome::Completed { attempts: attempt }, last_summary));
                }
            }
            Err(err) => {
                log::debug!("Poll {}/{} failed: {}", attempt, max_attempts, err);
                errors += 1;
                last_error = Some(err);
            }
        }
    }

    if errors == max_attempts {
        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        log::warn!("Every analysis-summary poll failed: {}", last_error);
        return Ok((
            PollOutcome::Failed {
                attempts: max_attempts,
                last_error,
            },
            None,
        ));
    }

    log::info!(
        "Analysis not complete after {} polls; results will arrive on a later refresh",
        max_attempts
    );
    Ok((
        PollOutcome::TimedOut {
            attempts: max_attempts,
        },
        last_summary,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        fail_roi: Option<u16>,
        fail_dispatch: bool,
        fail_polls: bool,
        complete_after: Option<u32>,
        calls: Mutex<Vec<&'static str>>,
        polls: Mutex<u32>,
    }

    #[async_trait]
    impl AnalysisBackend for FakeBackend {
        async fn analyze_roi(
            &self,
            _image_id: i64,
            request: &RoiAnalysisRequest,
        ) -> Result<RoiAnalysisResult, ApiError> {
            self.calls.lock().unwrap().push("roi");
            if let Some(status) = self.fail_roi {
                return Err(ApiError::Server {
                    status,
                    message: "nope".into(),
                });
            }
            let mut body = serde_json::Map::new();
            for kind in &request.analyses {
                body.insert(kind.key().to_string(), json!({"value": 1.0}));
            }
            Ok(RoiAnalysisResult::from(serde_json::Value::Object(body)))
        }

        async fn dispatch_project_analysis(
            &self,
            project_id: i64,
        ) -> Result<DispatchResponse, ApiError> {
            self.calls.lock().unwrap().push("dispatch");
            if self.fail_dispatch {
                return Err(ApiError::Timeout);
            }
            Ok(DispatchResponse {
                analyses_started: 4,
                message: None,
                project_id: Some(project_id),
            })
        }

        async fn analysis_summary(&self, project_id: i64) -> Result<AnalysisSummary, ApiError> {
            self.calls.lock().unwrap().push("poll");
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            if self.fail_polls {
                return Err(ApiError::Connection("refused".into()));
            }
            let done = self.complete_after.is_some_and(|n| *polls >= n);
            Ok(AnalysisSummary {
                project_id: Some(project_id),
                total_images: 4,
                analyzed_images: if done { 4 } else { 0 },
                status: if done { "completed" } else { "processing" }.into(),
                ..Default::default()
            })
        }
    }

    fn job() -> RoiJob {
        RoiJob {
            image_id: 1,
            project_id: Some(9),
            polygon: vec![
                ImagePoint::new(0.0, 0.0),
                ImagePoint::new(100.0, 0.0),
                ImagePoint::new(100.0, 100.0),
            ],
            analyses: vec![AnalysisKind::Vegetation, AnalysisKind::Health],
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(2),
            max_attempts: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn step_one_failure_is_counted_not_fatal() {
        let backend = FakeBackend {
            fail_roi: Some(500),
            complete_after: Some(2),
            ..Default::default()
        };
        let mut events = Vec::new();
        let report = run_roi_analysis(&backend, &job(), settings(), &Cancellation::new(), |e| {
            events.push(e)
        })
        .await
        .unwrap();

        assert_eq!(report.completed_steps(), 3);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.summary_line(), "2 of 3 steps succeeded");
        assert_eq!(
            events.last(),
            Some(&RoiEvent::Completed {
                succeeded: 2,
                total: 3
            })
        );
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["roi", "dispatch", "poll", "poll"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_token_in_step_one_is_fatal() {
        let backend = FakeBackend {
            fail_roi: Some(401),
            ..Default::default()
        };
        let mut completed = false;
        let result = run_roi_analysis(&backend, &job(), settings(), &Cancellation::new(), |e| {
            completed |= matches!(e, RoiEvent::Completed { .. })
        })
        .await;
        assert!(matches!(result, Err(RoiError::Fatal(_))));
        assert!(!completed);
        assert_eq!(*backend.calls.lock().unwrap(), vec!["roi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_timeout_is_success() {
        let backend = FakeBackend::default();
        let report = run_roi_analysis(&backend, &job(), settings(), &Cancellation::new(), |_| {})
            .await
            .unwrap();
        assert!(report.all_succeeded());
        assert_eq!(report.poll, Some(PollOutcome::TimedOut { attempts: 5 }));
        assert_eq!(*backend.polls.lock().unwrap(), 5);
        let result = report.roi_result.unwrap();
        assert!(result.is_ok("vegetation") && result.is_ok("health"));
    }

    #[tokio::test(start_paused = true)]
    async fn all_polls_failing_fails_step_three() {
        let backend = FakeBackend {
            fail_polls: true,
            fail_dispatch: true,
            ..Default::default()
        };
        let report = run_roi_analysis(&backend, &job(), settings(), &Cancellation::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.errors(), 2);
        assert!(matches!(report.poll, Some(PollOutcome::Failed { attempts: 5, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_attempts_are_spaced_by_interval() {
        let backend = FakeBackend {
            complete_after: Some(3),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();
        let report = run_roi_analysis(&backend, &job(), settings(), &Cancellation::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.poll, Some(PollOutcome::Completed { attempts: 3 }));
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert!(report.summary.unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let backend = FakeBackend::default();
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        let result = run_roi_analysis(&backend, &job(), settings(), &cancel, |e| {
            if matches!(e, RoiEvent::PollAttempt { attempt: 2, .. }) {
                trigger.cancel();
            }
        })
        .await;
        assert!(matches!(result, Err(RoiError::Cancelled)));
        assert_eq!(*backend.polls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn preconditions_are_checked_first() {
        let backend = FakeBackend::default();
        let mut open = job();
        open.polygon.truncate(2);
        let result = run_roi_analysis(&backend, &open, settings(), &Cancellation::new(), |_| {}).await;
        assert!(matches!(result, Err(RoiError::NoClosedPolygon)));

        let mut none = job();
        none.analyses.clear();
        let result = run_roi_analysis(&backend, &none, settings(), &Cancellation::new(), |_| {}).await;
        assert!(matches!(result, Err(RoiError::NoAnalyses)));
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
