//! Provider selection from configuration.

use std::sync::Arc;

use dawnagent_config::AppConfig;
use dawnagent_core::error::ProviderError;
use dawnagent_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::{DEEPSEEK_BASE_URL, OpenAiCompatProvider};

/// Build the provider named by `config.provider`.
///
/// `"local"` selects on-device inference and needs the `local` feature;
/// any other name is treated as an OpenAI-compatible endpoint.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    debug!(provider = %config.provider, model = %config.model, "Selecting provider");

    if config.provider == "local" {
        return build_local(&config.model);
    }

    let base_url = config
        .api_url
        .clone()
        .or_else(|| default_base_url(&config.provider))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no api_url configured for provider '{}'",
                config.provider
            ))
        })?;
    let api_key = config.api_key.clone().unwrap_or_default();

    Ok(Arc::new(OpenAiCompatProvider::new(
        &config.provider,
        base_url,
        api_key,
    )?))
}

#[cfg(feature = "local")]
fn build_local(model: &str) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(crate::local::LocalProvider::new(model)))
}

#[cfg(not(feature = "local"))]
fn build_local(_model: &str) -> Result<Arc<dyn Provider>, ProviderError> {
    Err(ProviderError::NotConfigured(
        "this build has no on-device inference; rebuild with --features local".into(),
    ))
}

/// Base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "deepseek" => DEEPSEEK_BASE_URL,
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url.to_string())
}
