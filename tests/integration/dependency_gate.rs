//! Readiness gate ahead of any collaborator call

use super::test_utils::{checker, pipeline};
use chartgate::deps::StaticProbe;
use chartgate::pipeline::{ChartRequest, PipelineError, RecordingSink, Stage};
use chartgate::provider::scripted::ScriptedProvider;
use chartgate::provider::ModelProviderClient;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn ensure_imports_lists_exactly_the_missing_libraries() {
    let deps = checker(StaticProbe::all_installed().without("numpy"));
    let readiness = deps.ensure_imports();
    assert!(!readiness.ok);
    assert!(readiness
        .message
        .starts_with("Missing required dependencies: numpy\n"));
    assert!(readiness.message.contains("pip install numpy"));
    assert_eq!(
        deps.missing_required(),
        BTreeSet::from(["numpy".to_string()])
    );
}

#[tokio::test]
async fn missing_library_stops_the_pipeline_before_generation() {
    let dir = TempDir::new().unwrap();
    let scripted = Arc::new(ScriptedProvider::from_texts(["never requested"]));
    let calls = scripted.call_counter();
    let collaborator: Arc<dyn ModelProviderClient> = scripted;
    let pipeline = pipeline(
        &dir,
        checker(StaticProbe::all_installed().without("matplotlib")),
        Some(collaborator),
        None,
    );

    let sink = RecordingSink::new();
    let err = pipeline
        .generate_staged(&ChartRequest::new("plot sin(x) for x from 0 to 10"), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DependencyUnavailable(_)));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    let events = sink.events();
    assert_eq!(events.last().unwrap().stage, Stage::Error);
    assert_eq!(events.last().unwrap().failed_stage, Some(Stage::CheckingDeps));
}

#[test]
fn backend_failure_blocks_headless_hosts() {
    if chartgate::deps::display_available() {
        eprintln!("skipping: display available");
        return;
    }
    let deps = checker(StaticProbe::all_installed().with_backend_error("no Agg"));
    let readiness = deps.ensure_imports();
    assert!(!readiness.ok);
    assert!(readiness.message.contains("backend"));
}
