use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config,
        with_payload_selector::SelectorOptions, CollectionInfo, CreateCollection,
        DeleteCollection, Distance, PointId, PointStruct, SearchPoints, UpsertPoints, Value,
        VectorParams, VectorsConfig, WithPayloadSelector,
    },
    Qdrant,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::database::qdrant_config::create_qdrant_client;

const UPSERT_BATCH: usize = 64;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// A chunk embedding ready to be indexed. The id is the chunk's row id so
/// re-embedding the same chunk overwrites its point.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub page: i64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub id: u64,
    pub text: String,
    pub score: f32,
    pub page: Option<i64>,
    pub source: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection unless it already exists. An existing
    /// collection must have the same vector size.
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError>;

    /// Drops the collection (if present) and creates it empty.
    async fn recreate_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError>;

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<usize, VectorDBError>;

    /// Cosine search returning at most `top_k` passages scoring at least
    /// `score_threshold`, best first.
    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedPassage>, VectorDBError>;
}

#[derive(Clone)]
pub struct QdrantStore {
    client: Arc<Qdrant>,
}

impl QdrantStore {
    pub async fn new(url: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    fn collection_request(name: &str, vector_size: u64) -> CreateCollection {
        let params = VectorParams {
            size: vector_size,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };

        CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(VectorsConfig {
                config: Some(Config::Params(params)),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError> {
        match self
            .client
            .create_collection(Self::collection_request(name, vector_size))
            .await
        {
            Ok(_) => {
                tracing::info!(
                    "[QDRANT COLLECTION] '{}' created with vector size {}.",
                    name,
                    vector_size
                );
                Ok(())
            }
            Err(e) if is_already_exists(&e.to_string()) => {
                tracing::info!("[QDRANT COLLECTION] '{}' already exists, skipping creation", name);
                let info = self
                    .client
                    .collection_info(name)
                    .await
                    .map_err(|e| VectorDBError::Operation(e.to_string()))?;
                let existing = info.result.as_ref().and_then(configured_vector_size);
                check_vector_size(name, vector_size, existing)
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    async fn recreate_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError> {
        let delete = DeleteCollection {
            collection_name: name.to_string(),
            ..Default::default()
        };
        if let Err(e) = self.client.delete_collection(delete).await {
            tracing::debug!("[QDRANT COLLECTION] delete of '{}' skipped: {}", name, e);
        }

        self.client
            .create_collection(Self::collection_request(name, vector_size))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        tracing::info!(
            "[QDRANT COLLECTION] '{}' recreated with vector size {}.",
            name,
            vector_size
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<usize, VectorDBError> {
        let total = points.len();
        let mut batch = Vec::with_capacity(UPSERT_BATCH);

        for point in points {
            let mut payload: HashMap<String, Value> = HashMap::new();
            payload.insert("text".to_string(), Value::from(point.text));
            payload.insert("page".to_string(), Value::from(point.page));
            payload.insert("source".to_string(), Value::from(point.source));

            batch.push(PointStruct {
                id: Some(PointId {
                    point_id_options: Some(PointIdOptions::Num(point.id)),
                }),
                vectors: Some(point.vector.into()),
                payload,
            });

            if batch.len() == UPSERT_BATCH {
                self.upsert_batch(name, std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            self.upsert_batch(name, batch).await?;
        }

        tracing::info!("[QDRANT UPSERT] Inserted {} point(s) into '{}'.", total, name);
        Ok(total)
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedPassage>, VectorDBError> {
        let request = SearchPoints {
            collection_name: name.to_string(),
            vector,
            limit: top_k,
            score_threshold: Some(score_threshold),
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let mut passages = Vec::with_capacity(response.result.len());
        for point in response.result {
            let id = match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Num(id)) => id,
                _ => 0,
            };
            match passage_from_payload(id, point.score, &point.payload) {
                Some(passage) => passages.push(passage),
                None => tracing::warn!("Search result {} missing 'text' in payload", id),
            }
        }

        tracing::info!(
            "[QDRANT SEARCH] Found {} results (requested {})",
            passages.len(),
            top_k
        );
        Ok(passages)
    }
}

impl QdrantStore {
    async fn upsert_batch(&self, name: &str, points: Vec<PointStruct>) -> Result<(), VectorDBError> {
        let request = UpsertPoints {
            collection_name: name.to_string(),
            wait: Some(true),
            points,
            ..Default::default()
        };

        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(())
    }
}

fn is_already_exists(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("already exists") || message.contains("alreadyexists")
}

fn configured_vector_size(info: &CollectionInfo) -> Option<u64> {
    let config = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match config.config.as_ref()? {
        Config::Params(params) => Some(params.size),
        Config::ParamsMap(_) => None,
    }
}

fn check_vector_size(name: &str, expected: u64, existing: Option<u64>) -> Result<(), VectorDBError> {
    match existing {
        Some(size) if size != expected => Err(VectorDBError::Operation(format!(
            "collection '{}' has vector size {}, but EMBEDDING_SIZE is {}; reset the collection",
            name, size, expected
        ))),
        Some(_) => Ok(()),
        None => {
            tracing::warn!("[QDRANT COLLECTION] '{}' has no single vector size to check", name);
            Ok(())
        }
    }
}

fn passage_from_payload(id: u64, score: f32, payload: &HashMap<String, Value>) -> Option<RetrievedPassage> {
    let text = match payload.get("text")?.kind.as_ref()? {
        Kind::StringValue(text) => text.clone(),
        _ => return None,
    };
    let page = payload.get("page").and_then(|v| match v.kind.as_ref()? {
        Kind::IntegerValue(page) => Some(*page),
        Kind::DoubleValue(page) => Some(*page as i64),
        _ => None,
    });
    let source = payload.get("source").and_then(|v| match v.kind.as_ref()? {
        Kind::StringValue(source) => Some(source.clone()),
        _ => None,
    });

    Some(RetrievedPassage {
        id,
        text,
        score,
        page,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{CollectionConfig, CollectionParams};

    fn payload(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_passage_reads_text_page_and_source() {
        let payload = payload(vec![
            ("text", Value::from("Tuition is due in September.".to_string())),
            ("page", Value::from(4_i64)),
            ("source", Value::from("handbook.pdf".to_string())),
        ]);

        let passage = passage_from_payload(7, 0.83, &payload).unwrap();
        assert_eq!(passage.id, 7);
        assert_eq!(passage.text, "Tuition is due in September.");
        assert_eq!(passage.page, Some(4));
        assert_eq!(passage.source.as_deref(), Some("handbook.pdf"));
    }

    #[test]
    fn test_passage_without_text_is_skipped() {
        let payload = payload(vec![("note", Value::from("test embedding".to_string()))]);
        assert!(passage_from_payload(1, 0.9, &payload).is_none());
    }

    fn collection_with_size(size: u64) -> CollectionInfo {
        CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_existing_collection_size_must_match() {
        let info = collection_with_size(384);
        assert_eq!(configured_vector_size(&info), Some(384));
        assert!(check_vector_size("embeddings", 384, configured_vector_size(&info)).is_ok());

        let err = check_vector_size("embeddings", 768, configured_vector_size(&info)).unwrap_err();
        assert!(matches!(err, VectorDBError::Operation(_)));
        assert!(err.to_string().contains("384"));

        assert_eq!(configured_vector_size(&CollectionInfo::default()), None);
        assert!(check_vector_size("embeddings", 768, None).is_ok());
    }

    #[test]
    fn test_already_exists_detection() {
        assert!(is_already_exists("status: AlreadyExists, message: \"Collection `embeddings` already exists!\""));
        assert!(!is_already_exists("status: Unavailable"));
    }
}
