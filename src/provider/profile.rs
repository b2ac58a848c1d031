//! Provider profile: the `[provider]` config section and its validation.

use crate::error::ApiError;
use crate::provider::{CompletionOptions, ModelProvider};
use serde::{Deserialize, Serialize};

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[serde(alias = "open_ai")]
    OpenAI,
    Anthropic,
    Ollama,
    Local,
}

/// Collaborator configuration as written in config files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name used in logs
    #[serde(default)]
    pub provider_name: Option<String>,

    pub provider_type: ProviderType,

    pub model: String,

    /// API key; falls back to the provider's conventional environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL or full endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub default_options: CompletionOptions,
}

impl ProviderConfig {
    pub fn display_name(&self) -> String {
        self.provider_name
            .clone()
            .unwrap_or_else(|| format!("{:?}", self.provider_type).to_lowercase())
    }

    /// Validate the profile without touching the network
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }

        if let Some(endpoint) = &self.endpoint {
            let local_without_scheme = self.provider_type == ProviderType::Local
                && !endpoint.contains("://")
                && (endpoint.starts_with("localhost") || endpoint.starts_with("127.0.0.1"));
            if !local_without_scheme
                && !endpoint.starts_with("http://")
                && !endpoint.starts_with("https://")
            {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }

        if self.provider_type == ProviderType::Local && self.endpoint.is_none() {
            return Err("Local providers require an endpoint".to_string());
        }

        Ok(())
    }

    fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let env_var = match self.provider_type {
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::Ollama | ProviderType::Local => return None,
        };
        std::env::var(env_var).ok()
    }

    /// Convert the profile into a concrete provider description
    pub fn to_model_provider(&self) -> Result<ModelProvider, ApiError> {
        self.validate().map_err(ApiError::ConfigError)?;

        match self.provider_type {
            ProviderType::OpenAI => {
                let api_key = self.resolve_api_key().ok_or_else(|| {
                    ApiError::ProviderNotConfigured(
                        "OpenAI provider requires api_key or OPENAI_API_KEY".to_string(),
                    )
                })?;
                Ok(ModelProvider::OpenAI {
                    model: self.model.clone(),
                    api_key,
                    base_url: self.endpoint.clone(),
                })
            }
            ProviderType::Anthropic => {
                let api_key = self.resolve_api_key().ok_or_else(|| {
                    ApiError::ProviderNotConfigured(
                        "Anthropic provider requires api_key or ANTHROPIC_API_KEY".to_string(),
                    )
                })?;
                Ok(ModelProvider::Anthropic {
                    model: self.model.clone(),
                    api_key,
                })
            }
            ProviderType::Ollama => Ok(ModelProvider::Ollama {
                model: self.model.clone(),
                base_url: self.endpoint.clone(),
            }),
            ProviderType::Local => {
                let endpoint = self.endpoint.clone().unwrap_or_default();
                let endpoint = if endpoint.contains("://") {
                    endpoint
                } else {
                    format!("http://{}", endpoint)
                };
                Ok(ModelProvider::LocalCustom {
                    model: self.model.clone(),
                    endpoint,
                    api_key: self.resolve_api_key(),
                })
            }
        }
    }
}
