//! End-to-end map creation: description → search → resolve → format → publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use adventuremap_places::{Geocoder, PlaceSearch};
use adventuremap_shared::{AdventureMapError, Result, SessionId};
use adventuremap_storage::ArtifactPublisher;

use crate::stages::{StageStatus, Stages};
use crate::state::{RunState, StateKey};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Resolve,
    Format,
    EncodeAndPublish,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Self::Search,
        Self::Resolve,
        Self::Format,
        Self::EncodeAndPublish,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Search => "Searching for places",
            Self::Resolve => "Resolving coordinates",
            Self::Format => "Formatting map data",
            Self::EncodeAndPublish => "Generating map file",
        }
    }

    /// The run-state slot this stage writes.
    pub fn output(&self) -> StateKey {
        match self {
            Self::Search => StateKey::RawPois,
            Self::Resolve => StateKey::PoisWithCoordinates,
            Self::Format => StateKey::FormattedPois,
            Self::EncodeAndPublish => StateKey::MapResult,
        }
    }
}

/// What one stage reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
}

/// Result of one pipeline invocation.
#[derive(Debug)]
pub struct PipelineRun {
    pub session: SessionId,
    /// The final stage's status, unchanged.
    pub message: String,
    pub stages: Vec<StageReport>,
    pub state: RunState,
    pub elapsed: Duration,
}

impl PipelineRun {
    /// Name of the transient artifact the run wrote, if it wrote one.
    pub fn artifact_name(&self) -> Option<&str> {
        self.stages.last().and_then(|r| r.status.artifact.as_deref())
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage starts.
    fn stage(&self, stage: Stage);
    /// Called after a stage returns.
    fn stage_finished(&self, report: &StageReport);
    /// Called when the pipeline completes.
    fn done(&self, run: &PipelineRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn stage_finished(&self, _report: &StageReport) {}
    fn done(&self, _run: &PipelineRun) {}
}

/// The four-stage map pipeline.
///
/// Holds no per-run data; concurrent [`run`](Self::run) calls each get
/// their own [`RunState`].
#[derive(Clone)]
pub struct Pipeline {
    stages: Stages,
}

impl Pipeline {
    pub fn new(
        search: Arc<dyn PlaceSearch>,
        geocoder: Arc<dyn Geocoder>,
        publisher: Arc<ArtifactPublisher>,
    ) -> Self {
        Self {
            stages: Stages::new(search, geocoder, publisher),
        }
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Run every stage in order for `description`.
    ///
    /// Returns `Err` only when the description is empty; every later
    /// failure is carried in the run state and the final message. Stages
    /// always advance, even after an earlier stage reported an error.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn run(
        &self,
        description: &str,
        session: &SessionId,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineRun> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AdventureMapError::validation(
                "no adventure description provided",
            ));
        }

        let start = Instant::now();
        let mut state = RunState::new();
        let mut reports = Vec::with_capacity(Stage::ALL.len());

        info!(%session, "starting map pipeline");

        for stage in Stage::ALL {
            progress.stage(stage);
            let status = match stage {
                Stage::Search => self.stages.research(description, &mut state).await,
                Stage::Resolve => self.stages.resolve(&mut state).await,
                Stage::Format => self.stages.format(&mut state),
                Stage::EncodeAndPublish => {
                    self.stages
                        .encode_and_publish(session, Some(description), &mut state)
                        .await
                }
            };
            info!(
                stage = ?stage,
                slot = %stage.output(),
                ok = status.ok,
                status = %status,
                "stage finished"
            );
            let report = StageReport { stage, status };
            progress.stage_finished(&report);
            reports.push(report);
        }

        let message = reports
            .last()
            .map(|r| r.status.message.clone())
            .unwrap_or_default();

        let run = PipelineRun {
            session: session.clone(),
            message,
            stages: reports,
            state,
            elapsed: start.elapsed(),
        };

        info!(elapsed_ms = run.elapsed.as_millis() as u64, "map pipeline complete");
        progress.done(&run);
        Ok(run)
    }
}
