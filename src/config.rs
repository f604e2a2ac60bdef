use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({size})")]
    Overlap { size: usize, overlap: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    HuggingFace,
    OpenAI,
    DeepSeek,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(LlmProvider::HuggingFace),
            "openai" => Ok(LlmProvider::OpenAI),
            "deepseek" => Ok(LlmProvider::DeepSeek),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    HuggingFace,
    OpenAI,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(EmbeddingBackend::HuggingFace),
            "openai" => Ok(EmbeddingBackend::OpenAI),
            other => Err(format!("unknown embedding provider '{}'", other)),
        }
    }
}

/// Sampling parameters sent with every completion request.
///
/// Also the body of `POST /llmsSettings/llmConfiguration`, so the range checks
/// live on the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerationSettings {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Falls back to the provider's configured default model.
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub model_name: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    #[validate(range(min = 1, max = 4096))]
    #[schema(minimum = 1, maximum = 4096)]
    pub max_new_tokens: u32,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    #[schema(minimum = 0.0, maximum = 2.0)]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    #[validate(range(min = 0.0, max = 1.0))]
    #[schema(minimum = 0.0, maximum = 1.0)]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1))]
    #[schema(minimum = 1)]
    pub top_k: u32,
}

fn default_max_new_tokens() -> u32 {
    512
}

fn default_do_sample() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    50
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model_name: None,
            max_new_tokens: default_max_new_tokens(),
            do_sample: default_do_sample(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub host: String,
    pub port: u16,
    pub documents_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub log_dir: PathBuf,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub qdrant_storage: PathBuf,
    pub qdrant_autostart: bool,
    pub allowed_types: Vec<String>,
    pub max_file_size_mb: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_provider: EmbeddingBackend,
    pub embedding_model: String,
    pub embedding_size: u64,
    pub huggingface_token: Option<String>,
    pub huggingface_model: String,
    pub huggingface_api_url: String,
    pub openai_api_key: Option<String>,
    pub openai_chat_model: String,
    pub deepseek_api_key: Option<String>,
    pub deepseek_model: String,
    pub deepseek_api_url: String,
    pub max_concurrent_requests: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Unset keys take their
    /// defaults, malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let chunk_size: usize = parse(&get, "CHUNK_SIZE", 1000)?;
        let chunk_overlap: usize = parse(&get, "CHUNK_OVERLAP", 200)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Overlap {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        let allowed_types = get("FILE_ALLOWED_TYPES")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|| vec!["pdf".to_string(), "txt".to_string()]);

        Ok(Self {
            app_name: text("APP_NAME", "University-AI-Assistant"),
            app_version: text("APP_VERSION", env!("CARGO_PKG_VERSION")),
            host: text("HOST", "0.0.0.0"),
            port: parse(&get, "PORT", 5000)?,
            documents_dir: PathBuf::from(text("LOC_DOC", "assets/files")),
            sqlite_path: PathBuf::from(text("SQLITE_DB", "assets/assistant.db")),
            log_dir: PathBuf::from(text("LOG_DIR", "log")),
            qdrant_url: text("QDRANT_URL", "http://localhost:6333"),
            qdrant_collection: text("QDRANT_COLLECTION", "embeddings"),
            qdrant_storage: PathBuf::from(text("QDRANT_STORAGE", "assets/qdrant")),
            qdrant_autostart: parse_bool(&get, "QDRANT_AUTOSTART")?,
            allowed_types,
            max_file_size_mb: parse(&get, "FILE_MAX_SIZE", 10)?,
            chunk_size,
            chunk_overlap,
            embedding_provider: parse(&get, "EMBEDDING_PROVIDER", EmbeddingBackend::HuggingFace)?,
            embedding_model: text("EMBEDDING_MODEL", "sentence-transformers/all-MiniLM-L6-v2"),
            embedding_size: parse(&get, "EMBEDDING_SIZE", 384)?,
            huggingface_token: get("HUGGINGFACE_TOKEN").or_else(|| get("HUGGINGFACE_TOKIENS")),
            huggingface_model: text("HUGGINGFACE_MODEL_NAME", "meta-llama/Llama-3.2-1B-Instruct"),
            huggingface_api_url: text(
                "HUGGINGFACE_API_URL",
                "https://api-inference.huggingface.co",
            ),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_chat_model: text("OPENAI_CHAT_MODEL", "gpt-4o-mini"),
            deepseek_api_key: get("DEEPSEEK_API_KEY"),
            deepseek_model: text("DEEPSEEK_MODEL", "deepseek-chat"),
            deepseek_api_url: text(
                "DEEPSEEK_API_URL",
                "https://api.deepseek.com/v1/chat/completions",
            ),
            max_concurrent_requests: parse(&get, "MAX_CONCURRENT_REQUESTS", 64)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    /// Model used when a [`GenerationSettings`] does not name one.
    pub fn default_model(&self, provider: LlmProvider) -> &str {
        match provider {
            LlmProvider::HuggingFace => &self.huggingface_model,
            LlmProvider::OpenAI => &self.openai_chat_model,
            LlmProvider::DeepSeek => &self.deepseek_model,
        }
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            key,
            value: v,
            reason: "expected a boolean".to_string(),
        }),
    }
}

// Accepts both `pdf,txt` and the JSON form `["pdf", "txt"]`.
fn parse_list(raw: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return items
            .into_iter()
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
