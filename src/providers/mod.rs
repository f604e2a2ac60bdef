pub mod deepseek;
pub mod huggingface;
pub mod openai;
pub mod traits;
pub mod utils;

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::{EmbeddingBackend, GenerationSettings, LlmProvider, Settings};
use deepseek::DeepSeekProvider;
use huggingface::{HuggingFaceEmbeddings, HuggingFaceProvider};
use openai::{OpenAIEmbeddings, OpenAIProvider};
use traits::{CompletionProvider, EmbeddingProvider};

fn required<'a>(value: &'a Option<String>, variable: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("{} is not set", variable))
}

/// Builds the text-generation backend selected by `generation.provider`.
pub fn build_completion_provider(
    settings: &Settings,
    generation: &GenerationSettings,
) -> Result<Arc<dyn CompletionProvider>> {
    let model = generation
        .model_name
        .clone()
        .unwrap_or_else(|| settings.default_model(generation.provider).to_string());

    let provider: Arc<dyn CompletionProvider> = match generation.provider {
        LlmProvider::HuggingFace => Arc::new(HuggingFaceProvider::new(
            settings.huggingface_token.clone(),
            &settings.huggingface_api_url,
            &model,
            generation.clone(),
        )),
        LlmProvider::OpenAI => Arc::new(OpenAIProvider::new(
            required(&settings.openai_api_key, "OPENAI_API_KEY")?,
            &model,
            generation.clone(),
        )),
        LlmProvider::DeepSeek => Arc::new(DeepSeekProvider::new(
            required(&settings.deepseek_api_key, "DEEPSEEK_API_KEY")?,
            &settings.deepseek_api_url,
            &model,
            generation.clone(),
        )),
    };

    tracing::info!(
        "LLM provider ready: {:?} ({})",
        generation.provider,
        provider.model_name()
    );
    Ok(provider)
}

pub fn build_embedding_provider(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.embedding_provider {
        EmbeddingBackend::HuggingFace => Arc::new(HuggingFaceEmbeddings::new(
            settings.huggingface_token.clone(),
            &settings.huggingface_api_url,
            &settings.embedding_model,
        )),
        EmbeddingBackend::OpenAI => Arc::new(OpenAIEmbeddings::new(
            required(&settings.openai_api_key, "OPENAI_API_KEY")?,
            &settings.embedding_model,
        )),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_default_provider_uses_configured_model() {
        let settings = settings_from(&[("HUGGINGFACE_MODEL_NAME", "org/handbook-llm")]);
        let provider = build_completion_provider(&settings, &GenerationSettings::default()).unwrap();
        assert_eq!(provider.model_name(), "org/handbook-llm");
    }

    #[test]
    fn test_model_override_wins() {
        let settings = settings_from(&[("DEEPSEEK_API_KEY", "sk-test")]);
        let generation = GenerationSettings {
            provider: LlmProvider::DeepSeek,
            model_name: Some("deepseek-reasoner".to_string()),
            ..Default::default()
        };
        let provider = build_completion_provider(&settings, &generation).unwrap();
        assert_eq!(provider.model_name(), "deepseek-reasoner");
    }

    #[test]
    fn test_missing_key_names_the_variable() {
        let settings = settings_from(&[]);
        let generation = GenerationSettings {
            provider: LlmProvider::OpenAI,
            ..Default::default()
        };
        let err = build_completion_provider(&settings, &generation).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let settings = settings_from(&[("EMBEDDING_PROVIDER", "openai")]);
        assert!(build_embedding_provider(&settings).is_err());
    }
}
