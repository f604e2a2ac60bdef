use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::config::GenerationSettings;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};
use crate::providers::utils::{ensure_prompt, json_or_error};

fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.header("Authorization", format!("Bearer {}", token)),
        None => request,
    }
}

/// Text generation through the Hugging Face Inference API.
#[derive(Clone)]
pub struct HuggingFaceProvider {
    token: Option<String>,
    client: Client,
    api_url: String,
    model: String,
    generation: GenerationSettings,
}

impl HuggingFaceProvider {
    pub fn new(
        token: Option<String>,
        api_url: &str,
        model: &str,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            token,
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            generation,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut parameters = json!({
            "max_new_tokens": self.generation.max_new_tokens,
            "do_sample": self.generation.do_sample,
            "return_full_text": false,
        });
        // Sampling knobs are rejected by the endpoint in greedy mode.
        if self.generation.do_sample {
            parameters["temperature"] = json!(self.generation.temperature);
            parameters["top_p"] = json!(self.generation.top_p);
            parameters["top_k"] = json!(self.generation.top_k);
        }

        json!({
            "inputs": prompt,
            "parameters": parameters,
            "options": { "wait_for_model": true }
        })
    }
}

#[async_trait]
impl CompletionProvider for HuggingFaceProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        ensure_prompt(prompt)?;

        let request = self
            .client
            .post(format!("{}/models/{}", self.api_url, self.model))
            .json(&self.request_body(prompt));
        let response = authorized(request, self.token.as_deref()).send().await?;
        let body = json_or_error(response).await?;

        generated_text(&body)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// The endpoint answers with `[{"generated_text": ...}]`, or a bare object for
/// some deployments.
fn generated_text(body: &Value) -> Result<String> {
    let item = match body {
        Value::Array(items) => items.first(),
        other => Some(other),
    };

    item.and_then(|item| item.get("generated_text"))
        .and_then(|text| text.as_str())
        .map(|text| text.to_string())
        .ok_or_else(|| anyhow!("No generated_text in response: {}", body))
}

/// Sentence embeddings through the feature-extraction pipeline.
#[derive(Clone)]
pub struct HuggingFaceEmbeddings {
    token: Option<String>,
    client: Client,
    api_url: String,
    model: String,
}

impl HuggingFaceEmbeddings {
    pub fn new(token: Option<String>, api_url: &str, model: &str) -> Self {
        Self {
            token,
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned from Hugging Face"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .client
            .post(format!(
                "{}/pipeline/feature-extraction/{}",
                self.api_url, self.model
            ))
            .json(&json!({
                "inputs": texts,
                "options": { "wait_for_model": true }
            }));
        let response = authorized(request, self.token.as_deref()).send().await?;
        let body = json_or_error(response).await?;

        let vectors = parse_embeddings(&body)?;
        if vectors.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ));
        }
        Ok(vectors)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Accepts pooled output (`[[f32]]`), a single vector (`[f32]`) and token-level
/// output (`[[[f32]]]`), which is mean-pooled.
fn parse_embeddings(body: &Value) -> Result<Vec<Vec<f32>>> {
    let items = body
        .as_array()
        .ok_or_else(|| anyhow!("Unexpected embedding response: {}", body))?;

    if let Some(single) = as_vector(body) {
        return Ok(vec![single]);
    }

    items
        .iter()
        .map(|item| {
            if let Some(vector) = as_vector(item) {
                return Ok(vector);
            }
            let tokens: Option<Vec<Vec<f32>>> = item.as_array().map(|rows| {
                rows.iter().filter_map(as_vector).collect()
            });
            match tokens {
                Some(tokens) if !tokens.is_empty() => Ok(mean_pool(&tokens)),
                _ => Err(anyhow!("Unexpected embedding item: {}", item)),
            }
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let width = tokens.iter().map(Vec::len).max().unwrap_or(0);
    let mut pooled = vec![0.0_f32; width];
    for token in tokens {
        for (sum, value) in pooled.iter_mut().zip(token) {
            *sum += value;
        }
    }
    let count = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);
    pooled
}
