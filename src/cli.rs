//! CLI domain: parse, route, output, and presentation only.
//! No pipeline logic lives here; the route table hands off to the services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{ArtifactsCommands, CacheCommands, Cli, Commands, ConfigCommands};
pub use presentation::{
    format_artifacts_table, format_chart_result_text, format_classification_text,
    format_dependency_report_text, format_stage_event_line, format_verdict_text,
};
pub use route::RunContext;
