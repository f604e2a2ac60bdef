use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::GenerationSettings;
use crate::providers::traits::CompletionProvider;
use crate::providers::utils::{chat_content, ensure_prompt, json_or_error};

const SYSTEM_MESSAGE: &str =
    "You are the University AI Assistant. Answer strictly from the handbook context you are given.";

#[derive(Clone)]
pub struct DeepSeekProvider {
    api_key: String,
    client: Client,
    api_url: String,
    model: String,
    generation: GenerationSettings,
}

impl DeepSeekProvider {
    pub fn new(api_key: &str, api_url: &str, model: &str, generation: GenerationSettings) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: Client::new(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            generation,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let temperature = if self.generation.do_sample {
            self.generation.temperature
        } else {
            0.0
        };

        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_MESSAGE
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": temperature,
            "top_p": self.generation.top_p,
            "max_tokens": self.generation.max_new_tokens
        })
    }
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        ensure_prompt(prompt)?;

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let response_json = json_or_error(response).await?;
        chat_content(&response_json)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_uses_generation_settings() {
        let mut generation = GenerationSettings::default();
        generation.max_new_tokens = 128;
        let provider = DeepSeekProvider::new("key", "https://deepseek.test/v1/chat/completions", "deepseek-chat", generation);

        let body = provider.request_body("Where is the library?");
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["messages"][1]["content"], "Where is the library?");
    }

    #[test]
    fn test_greedy_mode_zeroes_temperature() {
        let mut generation = GenerationSettings::default();
        generation.do_sample = false;
        let provider = DeepSeekProvider::new("key", "https://deepseek.test", "deepseek-chat", generation);
        assert_eq!(provider.request_body("hi")["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_the_network() {
        let provider = DeepSeekProvider::new("key", "http://127.0.0.1:9", "deepseek-chat", GenerationSettings::default());
        let err = provider.complete("  ").await.unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }
}
