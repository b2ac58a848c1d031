//! Staged progress events.

use super::error::PipelineError;
use super::types::ChartResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyzing,
    CheckingDeps,
    GeneratingCode,
    CodeReady,
    Executing,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyzing => "analyzing",
            Stage::CheckingDeps => "checking_deps",
            Stage::GeneratingCode => "generating_code",
            Stage::CodeReady => "code_ready",
            Stage::Executing => "executing",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }

    /// Progress percentage reported when the stage starts
    pub fn progress(&self) -> Option<u8> {
        match self {
            Stage::Analyzing => Some(10),
            Stage::CheckingDeps => Some(20),
            Stage::GeneratingCode => Some(40),
            Stage::CodeReady => Some(50),
            Stage::Executing => Some(70),
            Stage::Complete => Some(100),
            Stage::Error => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ChartResult>,
    /// Stage that failed, on `error` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Typed failure, on `error` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PipelineError>,
}

impl StageEvent {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: stage.progress(),
            code_preview: None,
            result: None,
            failed_stage: None,
            failure: None,
        }
    }

    pub fn with_code_preview(mut self, preview: impl Into<String>) -> Self {
        self.code_preview = Some(preview.into());
        self
    }

    pub fn complete(result: ChartResult) -> Self {
        let message = if result.cached {
            "Chart loaded from cache"
        } else {
            "Chart generated"
        };
        Self {
            result: Some(result),
            ..Self::new(Stage::Complete, message)
        }
    }

    pub fn error(failure: PipelineError) -> Self {
        Self {
            failed_stage: Some(failure.stage()),
            ..Self::new(Stage::Error, failure.to_string())
        }
        .with_failure(failure)
    }

    fn with_failure(mut self, failure: PipelineError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Complete | Stage::Error)
    }
}

/// Receiver of progress events. Delivery is best effort and never fails the pipeline.
pub trait StageSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

/// Discards every event
pub struct NoopSink;

impl StageSink for NoopSink {
    fn emit(&self, _event: StageEvent) {}
}

impl StageSink for mpsc::UnboundedSender<StageEvent> {
    fn emit(&self, event: StageEvent) {
        if let Err(err) = self.send(event) {
            warn!(stage = %err.0.stage, "Progress receiver dropped; event discarded");
        }
    }
}

impl StageSink for std::sync::mpsc::Sender<StageEvent> {
    fn emit(&self, event: StageEvent) {
        if let Err(err) = self.send(event) {
            warn!(stage = %err.0.stage, "Progress receiver dropped; event discarded");
        }
    }
}

/// Collects events in memory
#[derive(Default)]
pub struct RecordingSink {
    events: parking_lot::Mutex<Vec<StageEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events.lock().iter().map(|e| e.stage).collect()
    }
}

impl StageSink for RecordingSink {
    fn emit(&self, event: StageEvent) {
        self.events.lock().push(event);
    }
}

/// First `max_chars` characters of `code`
pub fn preview(code: &str, max_chars: usize) -> String {
    code.chars().take(max_chars).collect()
}
