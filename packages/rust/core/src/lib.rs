//! Pipeline orchestration and domain logic for AdventureMap.
//!
//! Ties place search, coordinate resolution, formatting, and publishing
//! into the four-stage map pipeline ([`Pipeline::run`]), and exposes the
//! same stages as agent tools ([`StageTools`]).

pub mod formatter;
pub mod pipeline;
pub mod resolver;
pub mod stages;
pub mod state;
pub mod tools;

#[cfg(test)]
mod testing;

pub use formatter::{FormatReport, format_map_data};
pub use pipeline::{Pipeline, PipelineRun, ProgressReporter, SilentProgress, Stage, StageReport};
pub use resolver::{ResolveSummary, resolve_coordinates};
pub use stages::{StageStatus, Stages};
pub use state::{RunState, StageOutput, StateKey};
pub use tools::{StageTools, ToolDefinition};
