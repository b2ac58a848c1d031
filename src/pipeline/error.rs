//! Pipeline failure taxonomy. Each variant is tagged with the stage that produced it.

use super::progress::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptErrorKind {
    Syntax,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineError {
    #[error("Input cannot be charted: {0}")]
    InputRejected(String),

    #[error("Dependencies unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Code generation failed: {0}")]
    GenerationFailed(String),

    #[error("Generated code rejected: {0}")]
    SafetyRejected(String),

    #[error("Execution timed out after {limit_ms} ms")]
    ExecutionTimeout { limit_ms: u64 },

    #[error("Execution failed ({kind:?}): {message}")]
    ExecutionRuntimeError {
        kind: ScriptErrorKind,
        message: String,
    },

    #[error("Execution completed without artifact")]
    ArtifactMissing { stdout: String, stderr: String },

    #[error("Cache storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InputRejected(_) => Stage::Analyzing,
            // Cache lookup runs alongside the readiness gate.
            PipelineError::DependencyUnavailable(_) | PipelineError::Storage(_) => {
                Stage::CheckingDeps
            }
            PipelineError::GenerationFailed(_) | PipelineError::SafetyRejected(_) => {
                Stage::GeneratingCode
            }
            PipelineError::ExecutionTimeout { .. }
            | PipelineError::ExecutionRuntimeError { .. }
            | PipelineError::ArtifactMissing { .. } => Stage::Executing,
        }
    }

    /// Stable machine-readable category name
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InputRejected(_) => "input_rejected",
            PipelineError::DependencyUnavailable(_) => "dependency_unavailable",
            PipelineError::GenerationFailed(_) => "generation_failed",
            PipelineError::SafetyRejected(_) => "safety_rejected",
            PipelineError::ExecutionTimeout { .. } => "execution_timeout",
            PipelineError::ExecutionRuntimeError { .. } => "execution_runtime_error",
            PipelineError::ArtifactMissing { .. } => "artifact_missing",
            PipelineError::Storage(_) => "storage",
        }
    }
}

impl From<crate::error::StorageError> for PipelineError {
    fn from(err: crate::error::StorageError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}
