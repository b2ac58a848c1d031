//! Configuration System
//!
//! Layered configuration: built-in defaults, the user-level file, workspace files, then
//! `CHARTGATE__*` environment variables. Every section carries serde defaults so partial
//! files merge cleanly. Tests included.

use crate::cache::CacheConfig;
use crate::deps::DependencyConfig;
use crate::dispatch::DispatchConfig;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::sandbox::SandboxConfig;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(test)]
use std::sync::Mutex;

pub use crate::provider::{ProviderConfig, ProviderType};

mod merge;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartgateConfig {
    /// Code-writing collaborator; the fallback generator is used when absent
    #[serde(default)]
    pub provider: Option<ProviderConfig>,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String, String),
    Sandbox(String),
    Cache(String),
    Dependencies(String),
    Dispatch(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => {
                write!(f, "Provider '{}': {}", name, msg)
            }
            ValidationError::Sandbox(msg) => write!(f, "Sandbox: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Dependencies(msg) => write!(f, "Dependencies: {}", msg),
            ValidationError::Dispatch(msg) => write!(f, "Dispatch: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ChartgateConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(provider) = &self.provider {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(provider.display_name(), e));
            }
        }
        if let Err(e) = self.sandbox.validate() {
            errors.push(ValidationError::Sandbox(e));
        }
        if let Err(e) = self.cache.validate() {
            errors.push(ValidationError::Cache(e));
        }
        if let Err(e) = self.dependencies.validate() {
            errors.push(ValidationError::Dependencies(e));
        }
        if let Err(e) = self.dispatch.validate() {
            errors.push(ValidationError::Dispatch(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into one `ApiError`
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}

/// Loads [`ChartgateConfig`] from its layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load for a workspace: defaults, user file, workspace files, then environment
    pub fn load(workspace_root: &Path) -> Result<ChartgateConfig, ApiError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(Self::environment()).build()?;
        let loaded: ChartgateConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(loaded)
    }

    /// Load a single explicit file; environment overrides still apply
    pub fn load_from_file(path: &Path) -> Result<ChartgateConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(Self::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// User-level config file location
    pub fn xdg_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    fn environment() -> Environment {
        Environment::with_prefix("CHARTGATE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
