//! Chart generation pipeline.
//!
//! A run moves through `analyzing → checking_deps → generating_code → code_ready →
//! executing → complete`, halting at the first failure with an `error` event tagged by
//! the failing stage. Every collaborator, the readiness checker, the executor and the
//! cache are injected through [`ChartPipelineBuilder`].

pub mod classify;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod progress;
pub mod prompts;
pub mod types;

pub use error::{PipelineError, ScriptErrorKind};
pub use fallback::FallbackGenerator;
pub use progress::{NoopSink, RecordingSink, Stage, StageEvent, StageSink};
pub use types::{ChartKind, ChartRequest, ChartResult, Classification, CodeOrigin, GeneratedChart};

use crate::cache::flight::SingleFlight;
use crate::cache::key::CacheKey;
use crate::cache::{CachedChart, ResultCache};
use crate::deps::DependencyChecker;
use crate::provider::{CompletionOptions, ModelProviderClient};
use crate::safety::CodeSafetyValidator;
use crate::sandbox::{ExecutionFailure, SandboxedExecutor};
use chrono::Utc;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Cache namespace for chart results
pub const CACHE_FEATURE: &str = "chart";

/// Characters of generated code carried on the `code_ready` event
const CODE_PREVIEW_CHARS: usize = 200;

type FlightOutcome = Result<ChartResult, PipelineError>;

pub struct ChartPipeline {
    deps: Arc<DependencyChecker>,
    executor: SandboxedExecutor,
    collaborator: Option<Arc<dyn ModelProviderClient>>,
    cache: Option<ResultCache>,
    validator: CodeSafetyValidator,
    fallback: FallbackGenerator,
    options: CompletionOptions,
    flights: SingleFlight<FlightOutcome>,
}

pub struct ChartPipelineBuilder {
    deps: Arc<DependencyChecker>,
    executor: SandboxedExecutor,
    collaborator: Option<Arc<dyn ModelProviderClient>>,
    cache: Option<ResultCache>,
    validator: CodeSafetyValidator,
    fallback: FallbackGenerator,
    options: CompletionOptions,
}

impl ChartPipelineBuilder {
    pub fn collaborator(mut self, client: Arc<dyn ModelProviderClient>) -> Self {
        self.collaborator = Some(client);
        self
    }

    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn validator(mut self, validator: CodeSafetyValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> ChartPipeline {
        ChartPipeline {
            deps: self.deps,
            executor: self.executor,
            collaborator: self.collaborator,
            cache: self.cache,
            validator: self.validator,
            fallback: self.fallback,
            options: self.options,
            flights: SingleFlight::new(),
        }
    }
}

impl ChartPipeline {
    pub fn builder(deps: Arc<DependencyChecker>, executor: SandboxedExecutor) -> ChartPipelineBuilder {
        ChartPipelineBuilder {
            deps,
            executor,
            collaborator: None,
            cache: None,
            validator: CodeSafetyValidator::new(),
            fallback: FallbackGenerator::default(),
            options: CompletionOptions::default(),
        }
    }

    pub fn deps(&self) -> &DependencyChecker {
        &self.deps
    }

    pub fn executor(&self) -> &SandboxedExecutor {
        &self.executor
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub fn has_collaborator(&self) -> bool {
        self.collaborator.is_some()
    }

    /// Chart kinds the pipeline can name
    pub fn supported_types(&self) -> &'static [ChartKind] {
        &ChartKind::ALL
    }

    /// Cache key for a request
    pub fn cache_key(request: &ChartRequest) -> CacheKey {
        CacheKey::new(CACHE_FEATURE, request.text()).with_option("chart_type", request.chart_type())
    }

    /// Judge whether `text` can be charted.
    ///
    /// Uses the collaborator when configured; its failures fall back to the rule set.
    pub async fn classify(&self, text: &str) -> Classification {
        let Some(collaborator) = &self.collaborator else {
            return classify::classify_with_rules(text);
        };
        match collaborator
            .complete(prompts::analysis_messages(text), self.options.clone())
            .await
        {
            Ok(response) => classify::parse_analysis(&response.content),
            Err(err) => {
                warn!(
                    provider = collaborator.provider_name(),
                    error = %err,
                    "Classification request failed; using rules"
                );
                classify::classify_with_rules(text)
            }
        }
    }

    /// Run a request to completion without progress reporting
    pub async fn generate(&self, request: &ChartRequest) -> Result<ChartResult, PipelineError> {
        self.generate_staged(request, &NoopSink).await
    }

    /// Run a request, reporting each stage to `sink`. Exactly one terminal event is emitted.
    #[instrument(skip(self, request, sink), fields(chars = request.text().chars().count()))]
    pub async fn generate_staged(
        &self,
        request: &ChartRequest,
        sink: &dyn StageSink,
    ) -> Result<ChartResult, PipelineError> {
        let outcome = self.run_stages(request, sink).await;
        match &outcome {
            Ok(result) => {
                info!(
                    artifact = %result.artifact_path.display(),
                    kind = result.chart_kind.id(),
                    cached = result.cached,
                    "Chart ready"
                );
                sink.emit(StageEvent::complete(result.clone()));
            }
            Err(err) => {
                warn!(stage = %err.stage(), category = err.category(), error = %err, "Chart generation failed");
                sink.emit(StageEvent::error(err.clone()));
            }
        }
        outcome
    }

    /// Run a request on the current tokio runtime, yielding its stage events.
    ///
    /// The stream ends after the terminal `complete` or `error` event.
    pub fn stream(self: &Arc<Self>, request: ChartRequest) -> impl Stream<Item = StageEvent> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel::<StageEvent>();
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let _ = pipeline.generate_staged(&request, &tx).await;
        });
        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    async fn run_stages(
        &self,
        request: &ChartRequest,
        sink: &dyn StageSink,
    ) -> Result<ChartResult, PipelineError> {
        sink.emit(StageEvent::new(Stage::Analyzing, "Analyzing input"));
        let classification = classify::classify_with_rules(request.text());
        if !classification.visualizable {
            return Err(PipelineError::InputRejected(classification.reason));
        }
        debug!(reason = %classification.reason, "Input accepted");

        sink.emit(StageEvent::new(Stage::CheckingDeps, "Checking dependencies"));
        self.ensure_ready().await?;

        let key = Self::cache_key(request);
        if let Some(hit) = self.cached(&key)? {
            return Ok(hit);
        }

        self.flights
            .run(key.digest(), || self.produce(request, &key, sink))
            .await
    }

    async fn ensure_ready(&self) -> Result<(), PipelineError> {
        let deps = Arc::clone(&self.deps);
        let readiness = tokio::task::spawn_blocking(move || deps.ensure_imports())
            .await
            .map_err(|e| PipelineError::DependencyUnavailable(format!("Readiness check aborted: {}", e)))?;
        if readiness.ok {
            Ok(())
        } else {
            Err(PipelineError::DependencyUnavailable(readiness.message))
        }
    }

    /// Cached result for `key`, evicting entries whose artifact no longer exists
    fn cached(&self, key: &CacheKey) -> Result<Option<ChartResult>, PipelineError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let Some(entry) = cache.lookup(key)? else {
            return Ok(None);
        };
        if !entry.artifact_path.is_file() {
            info!(key = %key, artifact = %entry.artifact_path.display(), "Evicting cache entry with missing artifact");
            cache.remove(key)?;
            return Ok(None);
        }
        debug!(key = %key, "Cache hit");
        Ok(Some(ChartResult {
            artifact_path: entry.artifact_path,
            chart_kind: entry.chart_kind,
            description: entry.description,
            code: entry.code,
            origin: entry.origin,
            cached: true,
        }))
    }

    async fn produce(
        &self,
        request: &ChartRequest,
        key: &CacheKey,
        sink: &dyn StageSink,
    ) -> Result<ChartResult, PipelineError> {
        // A previous flight for this key may have finished since the lookup.
        if let Some(hit) = self.cached(key)? {
            return Ok(hit);
        }

        sink.emit(StageEvent::new(Stage::GeneratingCode, "Generating chart code"));
        let generated = self.acquire_code(request).await?;
        let vetted = self
            .validator
            .vet(generated.code.as_str())
            .map_err(|verdict| PipelineError::SafetyRejected(verdict.reason))?;
        sink.emit(
            StageEvent::new(Stage::CodeReady, "Code generated")
                .with_code_preview(progress::preview(&generated.code, CODE_PREVIEW_CHARS)),
        );

        sink.emit(StageEvent::new(Stage::Executing, "Rendering chart"));
        let execution = self.executor.execute(&vetted).await;
        let artifact_path = match (execution.artifact_path, execution.failure) {
            (Some(path), None) if execution.success => path,
            (_, Some(ExecutionFailure::Timeout { limit_ms })) => {
                return Err(PipelineError::ExecutionTimeout { limit_ms })
            }
            (_, Some(ExecutionFailure::Syntax { message })) => {
                return Err(PipelineError::ExecutionRuntimeError {
                    kind: ScriptErrorKind::Syntax,
                    message,
                })
            }
            (_, Some(ExecutionFailure::Runtime { message })) => {
                return Err(PipelineError::ExecutionRuntimeError {
                    kind: ScriptErrorKind::Runtime,
                    message,
                })
            }
            _ => {
                return Err(PipelineError::ArtifactMissing {
                    stdout: execution.stdout,
                    stderr: execution.stderr,
                })
            }
        };
        debug!(elapsed_ms = execution.elapsed_ms, "Script finished");

        let result = ChartResult {
            artifact_path,
            chart_kind: generated.chart_kind,
            description: generated.description,
            code: generated.code,
            origin: generated.origin,
            cached: false,
        };
        self.remember(key, &result);
        Ok(result)
    }

    async fn acquire_code(&self, request: &ChartRequest) -> Result<GeneratedChart, PipelineError> {
        let Some(collaborator) = &self.collaborator else {
            debug!("No collaborator configured; using fallback generator");
            return Ok(self.fallback.generate(request.text(), request.chart_type()));
        };

        let messages = prompts::code_messages(request.text(), request.chart_type());
        let response = match collaborator.complete(messages, self.options.clone()).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    provider = collaborator.provider_name(),
                    model = collaborator.model_name(),
                    error = %err,
                    "Collaborator request failed; using fallback generator"
                );
                return Ok(self.fallback.generate(request.text(), request.chart_type()));
            }
        };

        let code = extract::extract_code(&response.content).ok_or_else(|| {
            PipelineError::GenerationFailed(
                "Response contained no runnable plotting code".to_string(),
            )
        })?;
        let chart_kind = extract::infer_kind(&code);
        Ok(GeneratedChart {
            description: extract::describe(request.text(), chart_kind),
            code,
            chart_kind,
            origin: CodeOrigin::Collaborator,
        })
    }

    fn remember(&self, key: &CacheKey, result: &ChartResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        let entry = CachedChart {
            artifact_path: result.artifact_path.clone(),
            chart_kind: result.chart_kind,
            description: result.description.clone(),
            code: result.code.clone(),
            origin: result.origin,
            created_at: Utc::now(),
        };
        if let Err(err) = cache.store(key, &entry) {
            warn!(key = %key, error = %err, "Failed to cache chart result");
        }
    }
}
