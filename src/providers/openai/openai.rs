use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use crate::config::GenerationSettings;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};
use crate::providers::utils::ensure_prompt;

const SYSTEM_MESSAGE: &str =
    "You are the University AI Assistant. Answer strictly from the handbook context you are given.";

#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    generation: GenerationSettings,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, chat_model: &str, generation: GenerationSettings) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            chat_model: chat_model.to_string(),
            generation,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        ensure_prompt(prompt)?;

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_MESSAGE)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.chat_model)
            .messages(messages)
            .max_tokens(self.generation.max_new_tokens.min(u16::MAX as u32) as u16);
        if self.generation.do_sample {
            request
                .temperature(self.generation.temperature)
                .top_p(self.generation.top_p);
        } else {
            request.temperature(0.0);
        }

        let response = self.client.chat().create(request.build()?).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }

    fn model_name(&self) -> String {
        self.chat_model.clone()
    }
}

#[derive(Clone)]
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    embedding_model: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: &str, embedding_model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            embedding_model: embedding_model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned from OpenAI"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(texts.to_vec())
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);
        if data.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, got {}",
                texts.len(),
                data.len()
            ));
        }
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }

    fn model_name(&self) -> String {
        self.embedding_model.clone()
    }
}
