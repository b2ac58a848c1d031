//! Integration tests for the chartgate pipeline and its services

mod cache_store;
mod config_layering;
mod dependency_gate;
mod pipeline_scenarios;
mod sandbox_execution;
#[cfg(unix)]
mod scripted_interpreter;
mod test_utils;
