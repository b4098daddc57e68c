//! The four pipeline stages.
//!
//! Each stage reads one [`RunState`] slot, writes its own slot, and returns
//! a short status line. A stage whose input is missing writes
//! [`StageOutput::Failed`] and returns an `Error: ...` status without doing
//! any work. Stages never return `Err`.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use adventuremap_places::{Geocoder, PlaceSearch};
use adventuremap_shared::SessionId;
use adventuremap_storage::{ArtifactPublisher, PublishOutcome};

use crate::formatter;
use crate::resolver;
use crate::state::{RunState, StageOutput, StateKey};

pub const NO_DESCRIPTION: &str = "No adventure description provided for POI research.";
pub const NO_RAW_POIS: &str = "No raw POIs found in state for coordinate fetching.";
pub const NO_RESOLVED_POIS: &str = "No POIs with coords for formatting.";
pub const NO_FORMATTED_POIS: &str = "No formatted POI data found in state for KML generation.";

/// Status returned by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub message: String,
    /// False when the stage could not do its work.
    pub ok: bool,
    /// Transient artifact written by this stage, if any.
    pub artifact: Option<String>,
}

impl StageStatus {
    fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: true,
            artifact: None,
        }
    }

    fn error(reason: &str) -> Self {
        Self {
            message: format!("Error: {reason}"),
            ok: false,
            artifact: None,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Stage implementations bound to their collaborators.
#[derive(Clone)]
pub struct Stages {
    search: Arc<dyn PlaceSearch>,
    geocoder: Arc<dyn Geocoder>,
    publisher: Arc<ArtifactPublisher>,
}

impl Stages {
    pub fn new(
        search: Arc<dyn PlaceSearch>,
        geocoder: Arc<dyn Geocoder>,
        publisher: Arc<ArtifactPublisher>,
    ) -> Self {
        Self {
            search,
            geocoder,
            publisher,
        }
    }

    pub fn publisher(&self) -> &ArtifactPublisher {
        &self.publisher
    }

    /// Search for places matching `description` into `raw_pois`.
    #[instrument(skip_all, fields(slot = %StateKey::RawPois))]
    pub async fn research(&self, description: &str, state: &mut RunState) -> StageStatus {
        let description = description.trim();
        if description.is_empty() {
            state.set_raw_pois(StageOutput::failed(NO_DESCRIPTION));
            return StageStatus::error(NO_DESCRIPTION);
        }

        let entries = self.search.search(description).await;
        let count = entries.len();
        state.set_raw_pois(StageOutput::Ready(entries));

        info!(count, "POI research complete");
        StageStatus::done(format!(
            "POI research complete. Found {count} POIs. Stored in state."
        ))
    }

    /// Resolve `raw_pois` into `pois_with_coordinates`.
    #[instrument(skip_all, fields(slot = %StateKey::PoisWithCoordinates))]
    pub async fn resolve(&self, state: &mut RunState) -> StageStatus {
        let entries = match state.raw_pois() {
            Some(StageOutput::Ready(entries)) if !entries.is_empty() => entries.clone(),
            other => {
                if let Some(StageOutput::Failed { error }) = other {
                    warn!(upstream = %error, "research stage failed");
                }
                state.set_pois_with_coordinates(StageOutput::failed(NO_RAW_POIS));
                return StageStatus::error(NO_RAW_POIS);
            }
        };

        let (resolved, _summary) =
            resolver::resolve_coordinates(&entries, self.geocoder.as_ref()).await;
        state.set_pois_with_coordinates(StageOutput::Ready(resolved));

        StageStatus::done(format!(
            "Coordinate fetching complete. Processed {} POIs. Stored in state.",
            entries.len()
        ))
    }

    /// Project `pois_with_coordinates` into `formatted_pois`.
    #[instrument(skip_all, fields(slot = %StateKey::FormattedPois))]
    pub fn format(&self, state: &mut RunState) -> StageStatus {
        let report = match state.pois_with_coordinates() {
            Some(StageOutput::Ready(pois)) => formatter::format_map_data(pois),
            other => {
                if let Some(StageOutput::Failed { error }) = other {
                    warn!(upstream = %error, "resolve stage failed");
                }
                state.set_formatted_pois(StageOutput::failed(NO_RESOLVED_POIS));
                return StageStatus::error(NO_RESOLVED_POIS);
            }
        };

        let count = report.pois.len();
        if !report.dropped.is_empty() {
            warn!(
                dropped = report.dropped.len(),
                "POIs with unusable coordinates left off the map"
            );
        }
        state.set_formatted_pois(StageOutput::Ready(report.pois));

        info!(count, skipped = report.skipped, "data formatting complete");
        StageStatus::done(format!(
            "Data formatting complete. Formatted {count} POIs. Stored in state."
        ))
    }

    /// Encode `formatted_pois` and publish the map file; the publisher's
    /// message lands in `map_result`.
    #[instrument(skip_all, fields(slot = %StateKey::MapResult, session = %session))]
    pub async fn encode_and_publish(
        &self,
        session: &SessionId,
        document_name: Option<&str>,
        state: &mut RunState,
    ) -> StageStatus {
        let pois = match state.formatted_pois() {
            Some(StageOutput::Ready(pois)) => pois,
            _ => {
                let status = StageStatus::error(NO_FORMATTED_POIS);
                state.set_map_result(status.message.clone());
                return status;
            }
        };

        let document = adventuremap_kml::encode(document_name, pois);
        let outcome = self.publisher.publish(document, session).await;
        let message = outcome.message();
        state.set_map_result(message.clone());

        StageStatus {
            message,
            ok: !matches!(outcome, PublishOutcome::Failed { .. }),
            artifact: outcome.artifact_name().map(String::from),
        }
    }
}
