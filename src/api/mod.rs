pub mod docs;
pub mod error;
pub mod extract;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::config::GenerationSettings;
use crate::document::{loader, unique_file_name, ChunkRecord};
use crate::llm::Assistant;
pub use error::{ApiError, ErrorBody};
use extract::{AppJson, AppQuery};

type ApiResult<T> = Result<Json<T>, ApiError>;

// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChunkRequest {
    /// Document to chunk, relative to the documents folder. Omit to chunk
    /// every allowed file there.
    #[serde(default)]
    #[validate(length(min = 1, max = 1024))]
    file_path: Option<String>,
    /// 1 clears stored chunks and recreates the collection first.
    #[serde(default)]
    #[validate(range(min = 0, max = 1))]
    #[schema(minimum = 0, maximum = 1)]
    do_reset: i64,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChatParams {
    /// Student identifier; answers are cached per user.
    #[validate(length(min = 1, max = 256))]
    use_id: Option<String>,
    /// Accepted in place of `use_id`.
    #[validate(length(min = 1, max = 256))]
    user_id: Option<String>,
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 100))]
    #[param(minimum = 1, maximum = 100)]
    top_k: u64,
    #[serde(default = "default_score_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    #[param(minimum = 0.0, maximum = 1.0)]
    score_threshold: f32,
}

fn default_top_k() -> u64 {
    3
}

fn default_score_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    #[validate(length(max = 4000))]
    query: String,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppInfo {
    #[serde(rename = "App Name")]
    app_name: String,
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    message: String,
    filename: String,
    saved_to: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkResponse {
    status: String,
    inserted_chunks: usize,
    documents: Vec<ChunkRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmbeddingResponse {
    status: String,
    embedded_chunks: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    status: String,
    response: String,
    user_id: String,
    /// Number of passages the answer was grounded on; 0 when cached.
    retrieved_docs: usize,
    cached: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigurationResponse {
    status: String,
    message: String,
    config: GenerationSettings,
}

fn success() -> String {
    "success".to_string()
}

fn validated<T: Validate>(value: T) -> Result<T, ApiError> {
    value
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(value)
}

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let settings = state.assistant.settings();
    let body_limit = settings.max_file_size_bytes() + MULTIPART_OVERHEAD;
    let max_concurrent = settings.max_concurrent_requests.max(1);

    // Fully permissive CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/hello/hello", get(hello))
        .route("/health", get(health_check))
        .route("/upload/upload/", post(upload_file))
        .route("/upload/upload", post(upload_file))
        .route("/toChunks/to_chunks", post(to_chunks))
        .route("/chunksEmbedding/chunks_to_embedding", post(chunks_to_embedding))
        .route("/Chatbot/chat", post(chat_handler))
        .route(
            "/llmsSettings/llmConfiguration",
            get(get_llm_configuration).post(set_llm_configuration),
        )
        .route("/docs", get(docs::swagger_ui))
        .route("/openapi.json", get(docs::openapi_json))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/hello/hello",
    tag = "Hello",
    responses((status = 200, description = "Application name and version", body = AppInfo))
)]
async fn hello(State(state): State<AppState>) -> Json<AppInfo> {
    let settings = state.assistant.settings();
    tracing::info!("App info retrieved: {} {}", settings.app_name, settings.app_version);
    Json(AppInfo {
        app_name: settings.app_name.clone(),
        version: settings.app_version.clone(),
        message: "API is running".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Hello",
    responses((status = 200, description = "Service is healthy", body = HealthStatus))
)]
async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/upload/upload/",
    tag = "Upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored under a unique name", body = UploadResponse),
        (status = 400, description = "Missing file or disallowed type", body = ErrorBody),
        (status = 413, description = "File larger than FILE_MAX_SIZE", body = ErrorBody)
    )
)]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let settings = state.assistant.settings();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("No file name provided".to_string()))?;

        let extension = loader::extension_of(Path::new(&original));
        if !settings.allows_extension(&extension) {
            return Err(ApiError::BadRequest(format!(
                "File type not allowed. Allowed types: {}",
                settings.allowed_types.join(", ")
            )));
        }

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > settings.max_file_size_bytes() {
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds the maximum size of {} MB",
                settings.max_file_size_mb
            )));
        }

        let unique_filename = unique_file_name(&original);
        let file_location = settings.documents_dir.join(&unique_filename);
        tokio::fs::create_dir_all(&settings.documents_dir)
            .await
            .map_err(|e| ApiError::Internal("File upload failed.", e.to_string()))?;
        tokio::fs::write(&file_location, &bytes)
            .await
            .map_err(|e| ApiError::Internal("File upload failed.", e.to_string()))?;

        tracing::info!(
            "File uploaded and saved as '{}' at '{}'",
            unique_filename,
            file_location.display()
        );
        return Ok(Json(UploadResponse {
            message: "File uploaded successfully.".to_string(),
            filename: unique_filename,
            saved_to: file_location.display().to_string(),
        }));
    }

    Err(ApiError::BadRequest("Missing multipart field 'file'".to_string()))
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(error.body_text())
    } else {
        ApiError::BadRequest(error.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/toChunks/to_chunks",
    tag = "Chunks",
    request_body = ChunkRequest,
    responses(
        (status = 200, description = "Chunks inserted", body = ChunkResponse),
        (status = 400, description = "Path outside the documents folder or disallowed type", body = ErrorBody),
        (status = 404, description = "No valid documents found to process.", body = ErrorBody)
    )
)]
async fn to_chunks(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChunkRequest>,
) -> ApiResult<ChunkResponse> {
    let request = validated(request)?;
    let report = state
        .assistant
        .ingest(request.file_path.as_deref(), request.do_reset == 1)
        .await?;

    Ok(Json(ChunkResponse {
        status: success(),
        inserted_chunks: report.inserted_chunks,
        documents: report.documents,
    }))
}

#[utoipa::path(
    post,
    path = "/chunksEmbedding/chunks_to_embedding",
    tag = "Embeddings",
    responses(
        (status = 200, description = "Chunks embedded", body = EmbeddingResponse),
        (status = 404, description = "No chunks found in the database.", body = ErrorBody)
    )
)]
async fn chunks_to_embedding(State(state): State<AppState>) -> ApiResult<EmbeddingResponse> {
    let embedded = state.assistant.embed_chunks().await?;
    Ok(Json(EmbeddingResponse {
        status: success(),
        embedded_chunks: embedded,
    }))
}

#[utoipa::path(
    post,
    path = "/Chatbot/chat",
    tag = "Chatbot",
    params(ChatParams),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Generated or cached answer", body = ChatResponse),
        (status = 400, description = "Empty query or no relevant context", body = ErrorBody),
        (status = 500, description = "Failed to generate response", body = ErrorBody)
    )
)]
async fn chat_handler(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ChatParams>,
    AppJson(request): AppJson<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let params = validated(params)?;
    let request = validated(request)?;
    let user_id = params
        .use_id
        .or(params.user_id)
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'use_id' is required".to_string()))?;

    let answer = state
        .assistant
        .answer(&user_id, &request.query, params.top_k, params.score_threshold)
        .await?;

    Ok(Json(ChatResponse {
        status: success(),
        response: answer.response,
        user_id,
        retrieved_docs: answer.retrieved_docs.len(),
        cached: answer.cached,
    }))
}

#[utoipa::path(
    get,
    path = "/llmsSettings/llmConfiguration",
    tag = "LLM Settings",
    responses((status = 200, description = "Current generation settings", body = GenerationSettings))
)]
async fn get_llm_configuration(State(state): State<AppState>) -> Json<GenerationSettings> {
    Json(state.assistant.generation().await)
}

#[utoipa::path(
    post,
    path = "/llmsSettings/llmConfiguration",
    tag = "LLM Settings",
    request_body = GenerationSettings,
    responses(
        (status = 200, description = "Settings applied", body = ConfigurationResponse),
        (status = 400, description = "Unknown provider or settings out of range", body = ErrorBody),
        (status = 500, description = "Failed to configure LLM", body = ErrorBody)
    )
)]
async fn set_llm_configuration(
    State(state): State<AppState>,
    AppJson(generation): AppJson<GenerationSettings>,
) -> ApiResult<ConfigurationResponse> {
    let applied = state.assistant.configure(generation).await?;
    Ok(Json(ConfigurationResponse {
        status: success(),
        message: "LLM configuration updated successfully".to_string(),
        config: applied,
    }))
}
