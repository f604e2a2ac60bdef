use axum::{
    extract::State,
    response::{Html, IntoResponse},
    Json,
};
use utoipa::openapi::OpenApi as OpenApiDocument;
use utoipa::OpenApi;

use super::{
    AppInfo, AppState, ChatRequest, ChatResponse, ChunkRequest, ChunkResponse,
    ConfigurationResponse, EmbeddingResponse, ErrorBody, HealthStatus, UploadForm,
    UploadResponse,
};
use crate::config::{GenerationSettings, LlmProvider};
use crate::document::ChunkRecord;

pub async fn swagger_ui(State(state): State<AppState>) -> impl IntoResponse {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title} - Swagger UI</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {{
      window.ui = SwaggerUIBundle({{ url: "/openapi.json", dom_id: "#swagger-ui" }});
    }};
  </script>
</body>
</html>"##,
        title = state.assistant.settings().app_name
    ))
}

#[derive(OpenApi)]
#[openapi(
    info(description = "Answers student questions from the university policy handbook."),
    paths(
        super::hello,
        super::health_check,
        super::upload_file,
        super::to_chunks,
        super::chunks_to_embedding,
        super::chat_handler,
        super::get_llm_configuration,
        super::set_llm_configuration
    ),
    components(schemas(
        AppInfo,
        HealthStatus,
        UploadForm,
        UploadResponse,
        ChunkRequest,
        ChunkRecord,
        ChunkResponse,
        EmbeddingResponse,
        ChatRequest,
        ChatResponse,
        GenerationSettings,
        LlmProvider,
        ConfigurationResponse,
        ErrorBody
    )),
    tags(
        (name = "Hello", description = "Service information"),
        (name = "Upload", description = "Handbook uploads"),
        (name = "Chunks", description = "Document chunking"),
        (name = "Embeddings", description = "Vector indexing"),
        (name = "Chatbot", description = "Question answering"),
        (name = "LLM Settings", description = "Generation settings")
    )
)]
struct ApiDoc;

pub async fn openapi_json(State(state): State<AppState>) -> Json<OpenApiDocument> {
    let settings = state.assistant.settings();
    Json(openapi_document(&settings.app_name, &settings.app_version))
}

pub fn openapi_document(title: &str, version: &str) -> OpenApiDocument {
    let mut document = ApiDoc::openapi();
    document.info.title = title.to_string();
    document.info.version = version.to_string();
    document
}
