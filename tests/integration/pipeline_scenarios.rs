//! End-to-end pipeline scenarios

use super::test_utils::{checker, fenced, pipeline, ready_checker};
use chartgate::cache::ResultCache;
use chartgate::deps::StaticProbe;
use chartgate::pipeline::{
    ChartPipeline, ChartRequest, CodeOrigin, PipelineError, RecordingSink, Stage, StageEvent,
};
use chartgate::provider::scripted::{ScriptedProvider, ScriptedReply};
use chartgate::provider::ModelProviderClient;
use chartgate::safety::CodeSafetyValidator;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const LINE_PLOT: &str = "import matplotlib.pyplot as plt\n\
import numpy as np\n\
x = np.linspace(0, 10, 50)\n\
fig, ax = plt.subplots()\n\
ax.plot(x, np.sin(x))\n\
plt.savefig(output_path)\n\
print(f\"IMAGE_SAVED:{output_path}\")";

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[tokio::test]
async fn fallback_renders_chart_without_collaborator() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir, ready_checker(), None, None);

    let result = pipeline
        .generate(&ChartRequest::new("plot sin(x) for x from 0 to 10"))
        .await
        .unwrap();

    assert_eq!(result.origin, CodeOrigin::Fallback);
    assert!(!result.cached);
    assert!(result.code.chars().any(|c| c.is_ascii_digit()));
    let bytes = std::fs::read(&result.artifact_path).unwrap();
    assert!(bytes.starts_with(&PNG_MAGIC));
    assert!(result.artifact_path.starts_with(pipeline.executor().output_dir()));
}

#[tokio::test]
async fn forbidden_call_is_rejected_before_execution() {
    let code = "import matplotlib.pyplot as plt\n\
data = open('/etc/hosts').read()\n\
plt.plot([1, 2])\n\
plt.savefig(output_path)";

    let verdict = CodeSafetyValidator::new().validate(code);
    assert!(!verdict.safe);
    assert!(verdict.reason.contains("open("));

    let dir = TempDir::new().unwrap();
    let provider: Arc<dyn ModelProviderClient> =
        Arc::new(ScriptedProvider::from_texts([fenced(code)]));
    let pipeline = pipeline(&dir, checker(StaticProbe::all_installed()), Some(provider), None);

    let sink = RecordingSink::new();
    let err = pipeline
        .generate_staged(&ChartRequest::new("hosts per subnet: 3, 7, 12"), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SafetyRejected(_)));
    assert!(!sink.stages().contains(&Stage::Executing));
    assert!(pipeline.executor().list_artifacts().unwrap().is_empty());
}

#[tokio::test]
async fn identical_requests_are_served_from_cache() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let scripted = Arc::new(ScriptedProvider::from_texts([fenced(LINE_PLOT)]));
    let calls = scripted.call_counter();
    let pipeline = pipeline(
        &dir,
        ready_checker(),
        Some(scripted as Arc<dyn ModelProviderClient>),
        Some(ResultCache::temporary().unwrap()),
    );
    let request = ChartRequest::new("sine wave from 0 to 10").with_chart_type("line");

    let first = pipeline.generate(&request).await.unwrap();
    let sink = RecordingSink::new();
    let second = pipeline.generate_staged(&request, &sink).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.artifact_path, second.artifact_path);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(
        sink.stages(),
        vec![Stage::Analyzing, Stage::CheckingDeps, Stage::Complete]
    );
}

#[tokio::test]
async fn different_hint_is_a_different_request() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let scripted = Arc::new(ScriptedProvider::from_texts([fenced(LINE_PLOT)]));
    let calls = scripted.call_counter();
    let pipeline = pipeline(
        &dir,
        ready_checker(),
        Some(scripted as Arc<dyn ModelProviderClient>),
        Some(ResultCache::temporary().unwrap()),
    );

    pipeline
        .generate(&ChartRequest::new("sine wave from 0 to 10"))
        .await
        .unwrap();
    pipeline
        .generate(&ChartRequest::new("sine wave from 0 to 10").with_chart_type("scatter"))
        .await
        .unwrap();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_generation() {
    let dir = TempDir::new().unwrap();
    let scripted = Arc::new(
        ScriptedProvider::from_texts([fenced(LINE_PLOT)]).with_delay(Duration::from_millis(200)),
    );
    let calls = scripted.call_counter();
    let collaborator: Arc<dyn ModelProviderClient> = scripted;
    let pipeline = pipeline(&dir, ready_checker(), Some(collaborator), None);
    let request = ChartRequest::new("sine wave from 0 to 10");

    let outcomes = futures::future::join_all((0..4).map(|_| pipeline.generate(&request))).await;

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(outcomes.iter().all(|outcome| outcome == &outcomes[0]));
}

#[tokio::test]
async fn collaborator_failure_falls_back() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let provider: Arc<dyn ModelProviderClient> = Arc::new(ScriptedProvider::new(vec![
        ScriptedReply::Failure("upstream unavailable".to_string()),
    ]));
    let pipeline = pipeline(&dir, ready_checker(), Some(provider), None);

    let result = pipeline
        .generate(&ChartRequest::new("monthly sales 12, 18, 25, 31").with_chart_type("bar"))
        .await
        .unwrap();
    assert_eq!(result.origin, CodeOrigin::Fallback);
    assert!(result.code.contains("ax.bar("));
    assert!(result.artifact_path.is_file());
}

#[tokio::test]
async fn stream_reports_every_stage_in_order() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let provider: Arc<dyn ModelProviderClient> =
        Arc::new(ScriptedProvider::from_texts([fenced(LINE_PLOT)]));
    let pipeline = Arc::new(pipeline(&dir, ready_checker(), Some(provider), None));

    let events: Vec<StageEvent> = pipeline
        .stream(ChartRequest::new("sine wave from 0 to 10"))
        .collect()
        .await;

    let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Analyzing,
            Stage::CheckingDeps,
            Stage::GeneratingCode,
            Stage::CodeReady,
            Stage::Executing,
            Stage::Complete,
        ]
    );
    let preview = events[3].code_preview.as_deref().unwrap();
    assert!(preview.chars().count() <= 200);
    assert!(LINE_PLOT.starts_with(preview));
    assert!(events[5].result.as_ref().unwrap().artifact_path.is_file());
}

#[tokio::test]
async fn script_errors_are_classified() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let broken = "import matplotlib.pyplot as plt\n\
fig, ax = plt.subplots()\n\
ax.plot(undefined_series)\n\
plt.savefig(output_path)";
    let provider: Arc<dyn ModelProviderClient> =
        Arc::new(ScriptedProvider::from_texts([fenced(broken)]));
    let pipeline = pipeline(&dir, ready_checker(), Some(provider), None);

    let err = pipeline
        .generate(&ChartRequest::new("values 1, 2, 3, 4"))
        .await
        .unwrap_err();
    match err {
        PipelineError::ExecutionRuntimeError { message, .. } => {
            assert!(message.contains("NameError"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn supported_types_cover_common_charts() {
    let dir = TempDir::new().unwrap();
    let pipeline: ChartPipeline =
        pipeline(&dir, checker(StaticProbe::all_installed()), None, None);
    let ids: Vec<&str> = pipeline.supported_types().iter().map(|k| k.id()).collect();
    for expected in ["line", "scatter", "bar", "histogram", "pie", "box", "heatmap", "3d"] {
        assert!(ids.contains(&expected), "missing {}", expected);
    }
}
