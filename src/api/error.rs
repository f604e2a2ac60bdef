use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::llm::AssistantError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    /// The first field goes to the client, the second only to the log.
    #[error("{0}: {1}")]
    Internal(&'static str, String),
}

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "error")]
    pub status: String,
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(error: AssistantError) -> Self {
        match error {
            AssistantError::EmptyQuery => ApiError::BadRequest("Query cannot be empty".to_string()),
            AssistantError::NoRelevantContext
            | AssistantError::InvalidSettings(_)
            | AssistantError::InvalidPath(_) => {
                ApiError::BadRequest(error.to_string())
            }
            AssistantError::NoDocuments | AssistantError::NoChunks => {
                ApiError::NotFound(error.to_string())
            }
            AssistantError::Generation(e) => {
                ApiError::Internal("Failed to generate response", format!("{:#}", e))
            }
            AssistantError::Provider(e) => {
                ApiError::Internal("Failed to configure LLM", format!("{:#}", e))
            }
            other => ApiError::Internal("An unexpected error occurred", other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Internal(public, detail) => {
                tracing::error!("{}: {}", public, detail);
                public.to_string()
            }
            other => {
                tracing::warn!("Request rejected ({}): {}", status, other);
                other.to_string()
            }
        };

        let body = ErrorBody {
            status: "error".to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_errors_map_to_statuses() {
        let cases = [
            (AssistantError::EmptyQuery, StatusCode::BAD_REQUEST),
            (AssistantError::NoRelevantContext, StatusCode::BAD_REQUEST),
            (AssistantError::InvalidSettings("top_p".to_string()), StatusCode::BAD_REQUEST),
            (AssistantError::InvalidPath("../x.txt".to_string()), StatusCode::BAD_REQUEST),
            (AssistantError::NoDocuments, StatusCode::NOT_FOUND),
            (AssistantError::NoChunks, StatusCode::NOT_FOUND),
            (
                AssistantError::Generation(anyhow::anyhow!("timeout")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_details_stay_out_of_the_body() {
        let error = ApiError::from(AssistantError::Generation(anyhow::anyhow!("token sk-123 rejected")));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"status": "error", "detail": "Failed to generate response"}));
    }
}
