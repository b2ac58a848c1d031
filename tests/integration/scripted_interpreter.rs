//! Sandbox and end-to-end paths driven by the shell stand-in interpreter.
//!
//! These run on any Unix host; no python installation is needed.

use crate::integration::test_utils::{interpreter_runs, stand_in_interpreter};
use chartgate::cache::ResultCache;
use chartgate::cli::{Commands, RunContext};
use chartgate::config::ChartgateConfig;
use chartgate::deps::{DependencyChecker, DependencyConfig};
use chartgate::pipeline::{ChartPipeline, ChartRequest, ChartResult, PipelineError, Stage};
use chartgate::provider::{ModelProviderClient, ScriptedProvider};
use chartgate::safety::{CodeSafetyValidator, VettedCode};
use chartgate::sandbox::{ExecutionFailure, SandboxConfig, SandboxedExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    interpreter: PathBuf,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            interpreter: stand_in_interpreter(),
        }
    }

    fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.to_string_lossy().into_owned(),
            output_dir: Some(self.dir.path().join("charts")),
            ..SandboxConfig::default()
        }
    }

    fn executor(&self) -> SandboxedExecutor {
        SandboxedExecutor::new(self.sandbox_config()).unwrap()
    }

    fn checker(&self) -> Arc<DependencyChecker> {
        Arc::new(DependencyChecker::for_interpreter(
            DependencyConfig::default(),
            &self.interpreter.to_string_lossy(),
        ))
    }

    fn config(&self) -> ChartgateConfig {
        let mut config = ChartgateConfig::default();
        config.sandbox = self.sandbox_config();
        config.cache.path = Some(self.dir.path().join("cache"));
        config
    }

    fn runs(&self) -> usize {
        interpreter_runs(&self.dir.path().join("charts"))
    }
}

fn script(directive: Option<&str>) -> String {
    let directive = directive
        .map(|d| format!("# interp: {}\n", d))
        .unwrap_or_default();
    format!(
        "import matplotlib.pyplot as plt\n{}plt.plot([1, 2, 3])\nplt.savefig(output_path)\n",
        directive
    )
}

fn vetted(directive: Option<&str>) -> VettedCode {
    CodeSafetyValidator::new().vet(script(directive)).unwrap()
}

#[tokio::test]
async fn default_run_saves_to_output_path() {
    let harness = Harness::new();
    let executor = harness.executor();

    let result = executor.execute(&vetted(None)).await;
    assert!(result.success, "stderr: {}", result.stderr);
    let artifact = result.artifact_path.unwrap();
    assert!(artifact.starts_with(executor.output_dir()));
    assert!(artifact.is_file());
    assert_eq!(executor.list_artifacts().unwrap().len(), 1);
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn hanging_script_is_killed_at_the_limit() {
    let harness = Harness::new();
    let executor = harness.executor();

    let started = Instant::now();
    let result = executor
        .execute_with_limit(&vetted(Some("hang")), Duration::from_secs(1))
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.failure, Some(ExecutionFailure::Timeout { limit_ms: 1000 }));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
    assert!(executor.list_artifacts().unwrap().is_empty());
}

#[tokio::test]
async fn syntax_error_is_classified() {
    let harness = Harness::new();
    let result = harness.executor().execute(&vetted(Some("syntax-error"))).await;

    match result.failure {
        Some(ExecutionFailure::Syntax { message }) => assert!(message.contains("SyntaxError")),
        other => panic!("unexpected failure: {:?}", other),
    }
}

#[tokio::test]
async fn clean_exit_without_image_is_artifact_missing() {
    let harness = Harness::new();
    let result = harness.executor().execute(&vetted(Some("no-output"))).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(ExecutionFailure::ArtifactMissing));
    assert!(result.stdout.contains("drew nothing"));
}

#[tokio::test]
async fn sentinel_inside_output_dir_is_accepted() {
    let harness = Harness::new();
    let executor = harness.executor();
    let reported = executor.output_dir().join("chart_reported.png");

    let directive = format!("report {}", reported.display());
    let result = executor.execute(&vetted(Some(&directive))).await;

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.artifact_path, Some(reported));
}

#[tokio::test]
async fn sentinel_outside_output_dir_is_rejected() {
    let harness = Harness::new();
    let executor = harness.executor();
    let escaped = executor.output_dir().join("..").join("chart_escape.png");

    let directive = format!("report {}", escaped.display());
    let result = executor.execute(&vetted(Some(&directive))).await;

    assert!(escaped.is_file(), "the script did write the file");
    assert!(!result.success);
    assert_eq!(result.failure, Some(ExecutionFailure::ArtifactMissing));
    assert!(executor.list_artifacts().unwrap().is_empty());
}

#[tokio::test]
async fn collaborator_script_timeout_fails_at_executing() {
    let harness = Harness::new();
    let executor = SandboxedExecutor::new(SandboxConfig {
        timeout_secs: 1,
        ..harness.sandbox_config()
    })
    .unwrap();
    let reply = format!("```python\n{}```\n", script(Some("hang")));
    let provider: Arc<dyn ModelProviderClient> = Arc::new(ScriptedProvider::from_texts([reply]));
    let pipeline = ChartPipeline::builder(harness.checker(), executor)
        .collaborator(provider)
        .build();

    let err = pipeline
        .generate(&ChartRequest::new("plot 1, 2, 3, 4 as a line"))
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::ExecutionTimeout { limit_ms: 1000 });
    assert_eq!(err.stage(), Stage::Executing);
}

#[tokio::test]
async fn pipeline_cache_hit_skips_execution() {
    let harness = Harness::new();
    let pipeline = ChartPipeline::builder(harness.checker(), harness.executor())
        .cache(ResultCache::temporary().unwrap())
        .build();
    let request = ChartRequest::new("monthly sales 12, 18, 9, 22, 30").with_chart_type("bar");

    let first = pipeline.generate(&request).await.unwrap();
    let second = pipeline.generate(&request).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.artifact_path, second.artifact_path);
    assert_eq!(harness.runs(), 1);
}

#[test]
fn cli_generate_keeps_artifacts_served_from_cache() {
    let harness = Harness::new();
    let mut config = harness.config();
    config.sandbox.cleanup_max_age_secs = 1;
    let ctx = RunContext::from_config(harness.dir.path().to_path_buf(), config).unwrap();
    let text = "sales: 120, 135, 150, 160";

    let classified: serde_json::Value = serde_json::from_str(
        &ctx.execute(&Commands::Classify {
            text: text.to_string(),
            format: "json".to_string(),
        })
        .unwrap(),
    )
    .unwrap();
    assert_eq!(classified["visualizable"], true);

    let generate = Commands::Generate {
        text: text.to_string(),
        chart_type: Some("bar".to_string()),
        stream: false,
        format: "json".to_string(),
    };
    let first: ChartResult = serde_json::from_str(&ctx.execute(&generate).unwrap()).unwrap();
    assert!(!first.cached);
    assert!(first.artifact_path.is_file());

    // Older than the configured cleanup age by the time the second run returns.
    std::thread::sleep(Duration::from_millis(1500));

    let second: ChartResult = serde_json::from_str(&ctx.execute(&generate).unwrap()).unwrap();
    assert!(second.cached);
    assert_eq!(second.artifact_path, first.artifact_path);
    assert!(second.artifact_path.is_file());
    assert_eq!(harness.runs(), 1);
}

#[test]
fn cli_stream_mode_renders_a_chart() {
    let harness = Harness::new();
    let ctx = RunContext::from_config(harness.dir.path().to_path_buf(), harness.config()).unwrap();

    let output = ctx
        .execute(&Commands::Generate {
            text: "temperatures 21.5, 23, 19.8, 25".to_string(),
            chart_type: None,
            stream: true,
            format: "json".to_string(),
        })
        .unwrap();
    let result: ChartResult = serde_json::from_str(&output).unwrap();
    assert!(result.artifact_path.is_file());
    assert_eq!(harness.runs(), 1);
}

#[test]
fn cli_runs_without_cache_while_another_handle_holds_it() {
    let harness = Harness::new();
    let config = harness.config();
    let _held = ResultCache::from_config(&config.cache).unwrap();
    let ctx = RunContext::from_config(harness.dir.path().to_path_buf(), config).unwrap();

    let generate = Commands::Generate {
        text: "visitors 5, 7, 11, 13".to_string(),
        chart_type: None,
        stream: false,
        format: "json".to_string(),
    };
    for _ in 0..2 {
        let result: ChartResult = serde_json::from_str(&ctx.execute(&generate).unwrap()).unwrap();
        assert!(!result.cached);
    }
    assert_eq!(harness.runs(), 2);
}
