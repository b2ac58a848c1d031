//! CLI route: single route table and run context. Dispatches to services and presentation.

use crate::cache::ResultCache;
use crate::cli::parse::{ArtifactsCommands, CacheCommands, Commands, ConfigCommands};
use crate::cli::presentation::{
    format_artifacts_table, format_chart_result_text, format_classification_text,
    format_dependency_report_text, format_stage_event_line, format_verdict_text,
};
use crate::config::{ChartgateConfig, ConfigLoader};
use crate::deps::DependencyChecker;
use crate::error::{ApiError, StorageError};
use crate::pipeline::{ChartPipeline, ChartRequest, ChartResult, StageEvent};
use crate::provider::ProviderFactory;
use crate::safety::CodeSafetyValidator;
use crate::sandbox::SandboxedExecutor;
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace and the effective configuration.
/// Services are built per command so read-only commands never open the cache.
pub struct RunContext {
    workspace_root: PathBuf,
    config: ChartgateConfig,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::InvalidPath(e.to_string())))
}

fn runtime() -> Result<Runtime, ApiError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ApiError::RuntimeError(format!("Failed to create runtime: {}", e)))
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.ensure_valid()?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn from_config(workspace_root: PathBuf, config: ChartgateConfig) -> Result<Self, ApiError> {
        config.ensure_valid()?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn config(&self) -> &ChartgateConfig {
        &self.config
    }

    fn dependency_checker(&self) -> DependencyChecker {
        DependencyChecker::for_interpreter(
            self.config.dependencies.clone(),
            &self.config.sandbox.interpreter,
        )
        .with_backend(self.config.sandbox.backend.clone())
    }

    fn executor(&self) -> Result<SandboxedExecutor, ApiError> {
        Ok(SandboxedExecutor::new(self.config.sandbox.clone())?)
    }

    /// Assemble the pipeline from configuration
    pub fn build_pipeline(&self) -> Result<ChartPipeline, ApiError> {
        let mut builder =
            ChartPipeline::builder(Arc::new(self.dependency_checker()), self.executor()?);

        if let Some(provider) = &self.config.provider {
            let client = ProviderFactory::create_client(&provider.to_model_provider()?)?;
            info!(
                provider = %provider.display_name(),
                model = %provider.model,
                "Collaborator configured"
            );
            builder = builder
                .collaborator(Arc::from(client))
                .completion_options(provider.default_options.clone());
        }

        if self.config.cache.enabled {
            match ResultCache::from_config(&self.config.cache) {
                Ok(cache) => builder = builder.cache(cache),
                Err(StorageError::Locked(path)) => {
                    warn!(path = %path, "Result cache is busy; running without it");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(builder.build())
    }

    /// Execute one command and return its printable output
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Generate {
                text,
                chart_type,
                stream,
                format,
            } => self.handle_generate(text, chart_type.as_deref(), *stream, format),
            Commands::Classify { text, format } => self.handle_classify(text, format),
            Commands::Validate { file } => self.handle_validate(file),
            Commands::Deps { format } => self.handle_deps(format),
            Commands::Types => Ok(crate::pipeline::ChartKind::ALL
                .iter()
                .map(|kind| format!("{:<10} {}", kind.id(), kind.label()))
                .collect::<Vec<_>>()
                .join("\n")),
            Commands::Artifacts { command } => self.handle_artifacts(command),
            Commands::Cache { command } => self.handle_cache(command),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    fn handle_generate(
        &self,
        text: &str,
        chart_type: Option<&str>,
        stream: bool,
        format: &str,
    ) -> Result<String, ApiError> {
        let pipeline = Arc::new(self.build_pipeline()?);
        let mut request = ChartRequest::new(text);
        if let Some(hint) = chart_type {
            request = request.with_chart_type(hint);
        }

        let rt = runtime()?;
        let outcome: Result<ChartResult, ApiError> = if stream {
            rt.block_on(async {
                let mut events = Box::pin(pipeline.stream(request));
                let mut terminal = None;
                while let Some(event) = events.next().await {
                    eprintln!("{}", format_stage_event_line(&event));
                    if event.is_terminal() {
                        terminal = Some(event);
                    }
                }
                match terminal {
                    Some(StageEvent {
                        result: Some(result),
                        ..
                    }) => Ok(result),
                    Some(StageEvent {
                        failure: Some(failure),
                        ..
                    }) => Err(ApiError::from(failure)),
                    Some(event) => Err(ApiError::RuntimeError(event.message)),
                    None => Err(ApiError::RuntimeError(
                        "Pipeline ended without a terminal event".to_string(),
                    )),
                }
            })
        } else {
            rt.block_on(pipeline.generate(&request)).map_err(ApiError::from)
        };
        let result = outcome?;

        if format == "json" {
            to_json(&result)
        } else {
            Ok(format_chart_result_text(&result))
        }
    }

    fn handle_classify(&self, text: &str, format: &str) -> Result<String, ApiError> {
        let pipeline = self.build_pipeline()?;
        let classification = runtime()?.block_on(pipeline.classify(text));
        if format == "json" {
            to_json(&classification)
        } else {
            Ok(format_classification_text(&classification))
        }
    }

    fn handle_validate(&self, file: &PathBuf) -> Result<String, ApiError> {
        let code = std::fs::read_to_string(file).map_err(StorageError::from)?;
        let verdict = CodeSafetyValidator::new().validate(&code);
        Ok(format_verdict_text(&verdict))
    }

    fn handle_deps(&self, format: &str) -> Result<String, ApiError> {
        let report = self.dependency_checker().report();
        if format == "json" {
            to_json(&report)
        } else {
            Ok(format_dependency_report_text(&report))
        }
    }

    fn handle_artifacts(&self, command: &ArtifactsCommands) -> Result<String, ApiError> {
        let executor = self.executor()?;
        match command {
            ArtifactsCommands::List { format } => {
                let artifacts = executor.list_artifacts()?;
                if format == "json" {
                    to_json(&artifacts)
                } else {
                    Ok(format_artifacts_table(&artifacts))
                }
            }
            ArtifactsCommands::Cleanup {
                max_age_secs,
                max_files,
            } => {
                let removed = match (max_age_secs, max_files) {
                    (None, None) => executor.cleanup_configured()?,
                    _ => executor.cleanup_stale(
                        Duration::from_secs(
                            max_age_secs.unwrap_or(self.config.sandbox.cleanup_max_age_secs),
                        ),
                        max_files.unwrap_or(self.config.sandbox.cleanup_max_files),
                    )?,
                };
                Ok(format!("Removed {} chart(s)", removed))
            }
        }
    }

    fn handle_cache(&self, command: &CacheCommands) -> Result<String, ApiError> {
        match command {
            CacheCommands::Clear { yes } => {
                if !yes {
                    use dialoguer::Confirm;
                    let confirmed = Confirm::new()
                        .with_prompt("Remove every cached chart result?")
                        .default(false)
                        .interact()
                        .map_err(|e| {
                            ApiError::ConfigError(format!("Failed to get user input: {}", e))
                        })?;
                    if !confirmed {
                        return Ok("Cache clear cancelled".to_string());
                    }
                }
                let cache = ResultCache::from_config(&self.config.cache)?;
                let removed = cache.clear()?;
                Ok(format!("Removed {} cached result(s)", removed))
            }
        }
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, ApiError> {
        match command {
            ConfigCommands::Show { format } => {
                let mut shown = self.config.clone();
                if let Some(provider) = shown.provider.as_mut() {
                    if provider.api_key.is_some() {
                        provider.api_key = Some("********".to_string());
                    }
                }
                if format == "json" {
                    to_json(&shown)
                } else {
                    toml::to_string_pretty(&shown)
                        .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
                }
            }
        }
    }
}
