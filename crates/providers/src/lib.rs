//! Language-model provider implementations for hybridrag.
//!
//! All providers implement the `hybridrag_core::Provider` trait.
//! [`build_from_config`] turns the `[provider]` config section into one.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use hybridrag_config::ProviderSettings;
use hybridrag_core::error::ProviderError;
use hybridrag_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Build the shared provider from configuration.
///
/// Fails with `NotConfigured` when no API key is available.
pub fn build_from_config(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = settings
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".into()))?;

    let provider = OpenAiCompatProvider::new(
        "openai",
        settings.api_url.clone(),
        api_key,
        Duration::from_secs(settings.timeout_secs),
    )?;
    tracing::debug!(url = %provider.base_url(), "Configured provider");
    Ok(Arc::new(provider))
}
