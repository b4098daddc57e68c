//! The stages exposed as named, schema-described tools for an agent runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use adventuremap_shared::SessionId;

use crate::stages::Stages;
use crate::state::RunState;

pub const RESEARCH_POIS: &str = "research_pois";
pub const FETCH_COORDINATES: &str = "fetch_coordinates";
pub const FORMAT_MAP_DATA: &str = "format_map_data";
pub const GENERATE_MAP_FILE: &str = "generate_map_file";

/// A callable tool: name, description, and JSON-schema parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ResearchArgs {
    adventure_description: String,
}

/// Stage tools bound to one session.
pub struct StageTools {
    stages: Stages,
    session: SessionId,
}

impl StageTools {
    pub fn new(stages: Stages, session: SessionId) -> Self {
        Self { stages, session }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Tool definitions, in pipeline order.
    pub fn definitions() -> Vec<ToolDefinition> {
        let no_args = json!({"type": "object", "properties": {}});
        vec![
            ToolDefinition {
                name: RESEARCH_POIS,
                description: "Search for points of interest matching an adventure description \
                              and store them in state.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "adventure_description": {
                            "type": "string",
                            "description": "The refined adventure description to research POIs for."
                        }
                    },
                    "required": ["adventure_description"]
                }),
            },
            ToolDefinition {
                name: FETCH_COORDINATES,
                description: "Ensure every researched POI has coordinates, geocoding addresses \
                              where needed.",
                parameters: no_args.clone(),
            },
            ToolDefinition {
                name: FORMAT_MAP_DATA,
                description: "Reduce located POIs to map-ready records.",
                parameters: no_args.clone(),
            },
            ToolDefinition {
                name: GENERATE_MAP_FILE,
                description: "Generate the KML map file, store it, and return where to get it.",
                parameters: no_args,
            },
        ]
    }

    /// Dispatch one tool call. Always returns a status string.
    #[instrument(skip_all, fields(tool = name, session = %self.session))]
    pub async fn call(&self, name: &str, args: Value, state: &mut RunState) -> String {
        debug!(%args, "tool call");
        match name {
            RESEARCH_POIS => match serde_json::from_value::<ResearchArgs>(args) {
                Ok(args) => {
                    self.stages
                        .research(&args.adventure_description, state)
                        .await
                        .message
                }
                Err(e) => {
                    warn!(error = %e, "bad tool arguments");
                    format!("Error: invalid arguments for {RESEARCH_POIS}: {e}")
                }
            },
            FETCH_COORDINATES => self.stages.resolve(state).await.message,
            FORMAT_MAP_DATA => self.stages.format(state).message,
            GENERATE_MAP_FILE => {
                self.stages
                    .encode_and_publish(&self.session, None, state)
                    .await
                    .message
            }
            other => {
                warn!(tool = other, "unknown tool");
                format!("Error: unknown tool '{other}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateKey;
    use crate::testing::{Harness, address_only, located};

    #[test]
    fn definitions_cover_every_stage_in_order() {
        let names: Vec<_> = StageTools::definitions().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            [RESEARCH_POIS, FETCH_COORDINATES, FORMAT_MAP_DATA, GENERATE_MAP_FILE]
        );
        let research = &StageTools::definitions()[0];
        assert_eq!(
            research.parameters["required"],
            json!(["adventure_description"])
        );
    }

    #[tokio::test]
    async fn tools_drive_a_full_run() {
        let harness = Harness::new(vec![located("Falls", 44.5, -72.6), address_only("Gorge", "Gorge Rd")]);
        let tools = StageTools::new(harness.stages(), harness.session.clone());
        let mut state = RunState::new();

        let status = tools
            .call(
                RESEARCH_POIS,
                json!({"adventure_description": "gorges in Vermont"}),
                &mut state,
            )
            .await;
        assert_eq!(status, "POI research complete. Found 2 POIs. Stored in state.");

        tools.call(FETCH_COORDINATES, json!({}), &mut state).await;
        tools.call(FORMAT_MAP_DATA, json!({}), &mut state).await;
        let result = tools.call(GENERATE_MAP_FILE, json!({}), &mut state).await;

        for key in StateKey::ALL {
            assert!(state.contains(key), "{key} missing");
        }
        assert_eq!(state.map_result(), Some(result.as_str()));
        let name = Harness::artifact_name(&result);
        let kml = harness.artifacts.get(&harness.session, &name).await.unwrap();
        assert_eq!(kml.matches("<Placemark>").count(), 2);
    }

    #[tokio::test]
    async fn bad_arguments_are_reported_not_raised() {
        let harness = Harness::new(vec![]);
        let tools = StageTools::new(harness.stages(), harness.session.clone());
        let mut state = RunState::new();

        let status = tools
            .call(RESEARCH_POIS, json!({"query": "lakes"}), &mut state)
            .await;

        assert!(status.starts_with("Error: invalid arguments for research_pois"));
        assert!(!state.contains(StateKey::RawPois));
        assert_eq!(harness.search.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_string() {
        let harness = Harness::new(vec![]);
        let tools = StageTools::new(harness.stages(), harness.session.clone());

        let status = tools.call("launch_rocket", json!({}), &mut RunState::new()).await;

        assert_eq!(status, "Error: unknown tool 'launch_rocket'");
    }
}
