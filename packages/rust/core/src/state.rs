//! Per-invocation run state threaded through the pipeline stages.
//!
//! Each stage owns exactly one slot. A slot is `None` until its stage has
//! run; a stage that could not do its work stores [`StageOutput::Failed`]
//! so the next stage can see why its input is missing.

use serde::{Deserialize, Serialize};

use adventuremap_shared::{AdventureMapError, FormattedPoi, Poi, PoiEntry, Result};

/// Names of the run-state slots, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    RawPois,
    PoisWithCoordinates,
    FormattedPois,
    MapResult,
}

impl StateKey {
    pub const ALL: [StateKey; 4] = [
        Self::RawPois,
        Self::PoisWithCoordinates,
        Self::FormattedPois,
        Self::MapResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawPois => "raw_pois",
            Self::PoisWithCoordinates => "pois_with_coordinates",
            Self::FormattedPois => "formatted_pois",
            Self::MapResult => "map_result",
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage left in its slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutput<T> {
    Ready(T),
    Failed { error: String },
}

impl<T> StageOutput<T> {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

/// Typed, ordered run state for one pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_pois: Option<StageOutput<Vec<PoiEntry>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pois_with_coordinates: Option<StageOutput<Vec<Poi>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    formatted_pois: Option<StageOutput<Vec<FormattedPoi>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    map_result: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_pois(&self) -> Option<&StageOutput<Vec<PoiEntry>>> {
        self.raw_pois.as_ref()
    }

    pub fn set_raw_pois(&mut self, output: StageOutput<Vec<PoiEntry>>) {
        self.raw_pois = Some(output);
    }

    pub fn pois_with_coordinates(&self) -> Option<&StageOutput<Vec<Poi>>> {
        self.pois_with_coordinates.as_ref()
    }

    pub fn set_pois_with_coordinates(&mut self, output: StageOutput<Vec<Poi>>) {
        self.pois_with_coordinates = Some(output);
    }

    pub fn formatted_pois(&self) -> Option<&StageOutput<Vec<FormattedPoi>>> {
        self.formatted_pois.as_ref()
    }

    pub fn set_formatted_pois(&mut self, output: StageOutput<Vec<FormattedPoi>>) {
        self.formatted_pois = Some(output);
    }

    pub fn map_result(&self) -> Option<&str> {
        self.map_result.as_deref()
    }

    pub fn set_map_result(&mut self, result: impl Into<String>) {
        self.map_result = Some(result.into());
    }

    /// Whether the slot for `key` has been written.
    pub fn contains(&self, key: StateKey) -> bool {
        match key {
            StateKey::RawPois => self.raw_pois.is_some(),
            StateKey::PoisWithCoordinates => self.pois_with_coordinates.is_some(),
            StateKey::FormattedPois => self.formatted_pois.is_some(),
            StateKey::MapResult => self.map_result.is_some(),
        }
    }

    /// JSON view of the written slots, in pipeline order.
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| AdventureMapError::parse(format!("failed to serialize run state: {e}")))
    }

    /// Rebuild a state from a [`snapshot`](Self::snapshot).
    #[cfg(test)]
    pub(crate) fn from_snapshot(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AdventureMapError::parse(format!("invalid run state: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_state_is_empty() {
        let state = RunState::new();
        for key in StateKey::ALL {
            assert!(!state.contains(key), "{key} should be unset");
        }
        assert_eq!(state.snapshot().unwrap(), json!({}));
    }

    #[test]
    fn snapshot_keeps_pipeline_order_and_error_payloads() {
        let mut state = RunState::new();
        state.set_raw_pois(StageOutput::Ready(vec![PoiEntry::Poi(Poi::failed("boom"))]));
        state.set_pois_with_coordinates(StageOutput::failed("no input"));
        state.set_map_result("done");

        let text = serde_json::to_string(&state).unwrap();
        let raw = text.find("raw_pois").unwrap();
        let coords = text.find("pois_with_coordinates").unwrap();
        let result = text.find("map_result").unwrap();
        assert!(raw < coords && coords < result);

        let snapshot = state.snapshot().unwrap();
        assert_eq!(snapshot["raw_pois"], json!([{"error": "boom"}]));
        assert_eq!(snapshot["pois_with_coordinates"], json!({"error": "no input"}));
        assert!(snapshot.get("formatted_pois").is_none());
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut state = RunState::new();
        state.set_formatted_pois(StageOutput::Ready(vec![FormattedPoi {
            name: "Falls".into(),
            description: "Somewhere".into(),
            latitude: 44.0,
            longitude: -72.0,
        }]));
        state.set_pois_with_coordinates(StageOutput::failed("nothing to resolve"));
        state.set_raw_pois(StageOutput::Ready(vec![
            PoiEntry::Malformed(json!(["a", "b"])),
            PoiEntry::Malformed(json!("text")),
            PoiEntry::Poi(Poi {
                name: Some("Falls".into()),
                address: Some("Falls Rd".into()),
                ..Poi::default()
            }),
        ]));

        let restored = RunState::from_snapshot(state.snapshot().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn malformed_snapshot_is_a_parse_error() {
        let err = RunState::from_snapshot(json!({"formatted_pois": 42})).unwrap_err();
        assert!(matches!(err, AdventureMapError::Parse { .. }));
    }
}
