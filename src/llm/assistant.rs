use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use validator::Validate;

use crate::config::{GenerationSettings, Settings};
use crate::database::{
    Database, DatabaseError, RetrievedPassage, Table, VectorDBError, VectorPoint, VectorStore,
};
use crate::document::{self, loader, ChunkRecord, DocumentError, TextSplitter};
use crate::llm::embeddings::EmbeddingGenerator;
use crate::llm::prompt;
use crate::providers::build_completion_provider;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("No relevant information found to answer your query")]
    NoRelevantContext,
    #[error("No valid documents found to process.")]
    NoDocuments,
    #[error("No chunks found in the database.")]
    NoChunks,
    #[error("Invalid LLM settings: {0}")]
    InvalidSettings(String),
    #[error("{0}")]
    InvalidPath(String),
    #[error("Embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("Generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("Provider setup failed: {0:#}")]
    Provider(anyhow::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    VectorDB(#[from] VectorDBError),
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub inserted_chunks: usize,
    pub documents: Vec<ChunkRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub retrieved_docs: Vec<RetrievedPassage>,
    pub cached: bool,
}

struct ActiveModel {
    provider: Arc<dyn CompletionProvider>,
    generation: GenerationSettings,
}

struct Inner {
    settings: Settings,
    database: Database,
    vectors: Arc<dyn VectorStore>,
    embeddings: EmbeddingGenerator,
    splitter: TextSplitter,
    model: RwLock<ActiveModel>,
}

/// Retrieval plus generation over the handbook. Cloning shares state.
#[derive(Clone)]
pub struct Assistant {
    inner: Arc<Inner>,
}

impl Assistant {
    pub fn new(
        settings: Settings,
        database: Database,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        provider: Arc<dyn CompletionProvider>,
        generation: GenerationSettings,
    ) -> Result<Self, AssistantError> {
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        let embeddings = EmbeddingGenerator::new(embedder, settings.embedding_size);

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                database,
                vectors,
                embeddings,
                splitter,
                model: RwLock::new(ActiveModel {
                    provider,
                    generation,
                }),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub async fn ensure_collection(&self) -> Result<(), AssistantError> {
        self.inner
            .vectors
            .ensure_collection(
                &self.inner.settings.qdrant_collection,
                self.inner.embeddings.dimension(),
            )
            .await?;
        Ok(())
    }

    /// Chunks one file, or every allowed file in the documents folder, into
    /// the chunks table.
    pub async fn ingest(
        &self,
        file_path: Option<&str>,
        reset: bool,
    ) -> Result<IngestReport, AssistantError> {
        let settings = &self.inner.settings;
        tracing::info!(
            "Starting chunking for: {}",
            file_path.unwrap_or("[ALL DOCUMENTS]")
        );

        let requested = file_path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| self.resolve_document(p))
            .transpose()?;

        if reset {
            let removed = self.inner.database.clear(Table::Chunks).await?;
            tracing::info!("Chunks table cleared ({} rows).", removed);
            self.inner
                .vectors
                .recreate_collection(&settings.qdrant_collection, self.inner.embeddings.dimension())
                .await?;
        }

        let files = match requested {
            Some(path) => vec![path],
            None => loader::discover(&settings.documents_dir, &settings.allowed_types).await?,
        };
        if files.is_empty() {
            tracing::error!("No valid files found to process.");
            return Err(AssistantError::NoDocuments);
        }

        let records = document::chunk_files(&files, &self.inner.splitter).await;
        if records.is_empty() {
            tracing::error!("No valid documents found to process.");
            return Err(AssistantError::NoDocuments);
        }

        let inserted_chunks = self.inner.database.insert_chunks(&records).await?;
        tracing::info!("Inserted {} chunks into the database.", inserted_chunks);

        Ok(IngestReport {
            inserted_chunks,
            documents: records,
        })
    }

    /// Maps a requested document onto the documents folder. Only relative
    /// paths without `..` and with an allowed extension are accepted.
    fn resolve_document(&self, file_path: &str) -> Result<PathBuf, AssistantError> {
        let settings = &self.inner.settings;
        let relative = Path::new(file_path);

        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            tracing::warn!("Rejected document path outside the documents folder: {}", file_path);
            return Err(AssistantError::InvalidPath(format!(
                "'{}' must be a relative path inside the documents folder",
                file_path
            )));
        }

        if !settings.allows_extension(&loader::extension_of(relative)) {
            return Err(AssistantError::InvalidPath(format!(
                "File type not allowed. Allowed types: {}",
                settings.allowed_types.join(", ")
            )));
        }

        Ok(settings.documents_dir.join(relative))
    }

    /// Embeds every stored chunk and upserts it under its row id.
    pub async fn embed_chunks(&self) -> Result<usize, AssistantError> {
        let chunks = self.inner.database.all_chunks().await?;
        if chunks.is_empty() {
            tracing::warn!("No chunks found in the database.");
            return Err(AssistantError::NoChunks);
        }
        tracing::info!("Embedding {} chunks", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .inner
            .embeddings
            .embed_documents(&texts)
            .await
            .map_err(AssistantError::Embedding)?;

        let points = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk.id as u64,
                vector,
                text: chunk.text,
                page: chunk.page,
                source: chunk.source,
            })
            .collect();

        self.ensure_collection().await?;
        let embedded = self
            .inner
            .vectors
            .upsert(&self.inner.settings.qdrant_collection, points)
            .await?;
        Ok(embedded)
    }

    pub async fn answer(
        &self,
        user_id: &str,
        query: &str,
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Answer, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::EmptyQuery);
        }
        tracing::info!("[CHAT] user={} top_k={} threshold={}", user_id, top_k, score_threshold);

        match self
            .inner
            .database
            .cached_response(user_id.to_string(), query.to_string())
            .await
        {
            Ok(Some(response)) => {
                tracing::info!("[CHAT] Returning cached response for user {}", user_id);
                return Ok(Answer {
                    response,
                    retrieved_docs: Vec::new(),
                    cached: true,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[CHAT] Cache lookup failed, continuing: {}", e),
        }

        let vector = self
            .inner
            .embeddings
            .embed_query(query)
            .await
            .map_err(AssistantError::Embedding)?;
        let passages = self
            .inner
            .vectors
            .search(&self.inner.settings.qdrant_collection, vector, top_k, score_threshold)
            .await?;
        if passages.is_empty() {
            tracing::warn!("[CHAT] No relevant context found for the query");
            return Err(AssistantError::NoRelevantContext);
        }

        let full_prompt = prompt::build_prompt(&prompt::format_context(&passages), query);
        let provider = self.inner.model.read().await.provider.clone();
        let raw = provider
            .complete(&full_prompt)
            .await
            .map_err(AssistantError::Generation)?;
        let response = prompt::extract_answer(&raw);
        tracing::debug!("[CHAT] Generated {} chars with {}", response.len(), provider.model_name());

        if let Err(e) = self
            .inner
            .database
            .save_query_response(user_id.to_string(), query.to_string(), response.clone())
            .await
        {
            tracing::error!("[CHAT] Failed to record response: {}", e);
        }

        Ok(Answer {
            response,
            retrieved_docs: passages,
            cached: false,
        })
    }

    /// Validates and applies new generation settings. The running provider is
    /// only replaced once the new one has been built.
    pub async fn configure(
        &self,
        generation: GenerationSettings,
    ) -> Result<GenerationSettings, AssistantError> {
        generation
            .validate()
            .map_err(|e| AssistantError::InvalidSettings(e.to_string()))?;

        let provider = build_completion_provider(&self.inner.settings, &generation)
            .map_err(AssistantError::Provider)?;

        let mut model = self.inner.model.write().await;
        model.provider = provider;
        model.generation = generation.clone();
        tracing::info!("LLM configuration updated: {:?}", generation);
        Ok(generation)
    }

    pub async fn generation(&self) -> GenerationSettings {
        self.inner.model.read().await.generation.clone()
    }

    pub async fn model_name(&self) -> String {
        self.inner.model.read().await.provider.model_name()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const DIMENSION: usize = 4;

    /// Maps text onto a small deterministic vector.
    pub struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0; DIMENSION];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % DIMENSION] += byte as f32;
            }
            Ok(vector)
        }

        fn model_name(&self) -> String {
            "fake-embedder".to_string()
        }
    }

    pub struct FakeLlm {
        pub reply: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FakeLlm {
        pub fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(format!("{}{}", prompt, reply)),
                None => Err(anyhow!("model overloaded")),
            }
        }

        fn model_name(&self) -> String {
            "fake-llm".to_string()
        }
    }

    /// In-memory store that returns every point with a fixed score.
    #[derive(Default)]
    pub struct MemoryStore {
        pub points: Mutex<HashMap<u64, VectorPoint>>,
        pub score: f32,
        pub recreated: AtomicUsize,
    }

    impl MemoryStore {
        pub fn scoring(score: f32) -> Arc<Self> {
            Arc::new(Self {
                score,
                ..Default::default()
            })
        }

        pub fn insert(&self, id: u64, text: &str) {
            if let Ok(mut points) = self.points.lock() {
                points.insert(
                    id,
                    VectorPoint {
                        id,
                        vector: vec![0.0; DIMENSION],
                        text: text.to_string(),
                        page: 0,
                        source: "handbook.pdf".to_string(),
                    },
                );
            }
        }

        pub fn len(&self) -> usize {
            self.points.lock().map(|p| p.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn ensure_collection(&self, _name: &str, _size: u64) -> Result<(), VectorDBError> {
            Ok(())
        }

        async fn recreate_collection(&self, _name: &str, _size: u64) -> Result<(), VectorDBError> {
            self.recreated.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut points) = self.points.lock() {
                points.clear();
            }
            Ok(())
        }

        async fn upsert(&self, _name: &str, points: Vec<VectorPoint>) -> Result<usize, VectorDBError> {
            let count = points.len();
            let mut stored = self
                .points
                .lock()
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
            for point in points {
                stored.insert(point.id, point);
            }
            Ok(count)
        }

        async fn search(
            &self,
            _name: &str,
            _vector: Vec<f32>,
            top_k: u64,
            score_threshold: f32,
        ) -> Result<Vec<RetrievedPassage>, VectorDBError> {
            if self.score < score_threshold {
                return Ok(Vec::new());
            }
            let stored = self
                .points
                .lock()
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
            let mut ids: Vec<&u64> = stored.keys().collect();
            ids.sort();
            Ok(ids
                .into_iter()
                .take(top_k as usize)
                .map(|id| {
                    let point = &stored[id];
                    RetrievedPassage {
                        id: point.id,
                        text: point.text.clone(),
                        score: self.score,
                        page: Some(point.page),
                        source: Some(point.source.clone()),
                    }
                })
                .collect())
        }
    }

    /// Test settings rooted at `documents_dir`; `overrides` win over the defaults.
    pub fn settings_with(documents_dir: &std::path::Path, overrides: &[(&str, &str)]) -> Settings {
        let dir = documents_dir.display().to_string();
        let size = DIMENSION.to_string();
        Settings::from_lookup(|key| {
            if let Some((_, value)) = overrides.iter().find(|(name, _)| *name == key) {
                return Some(value.to_string());
            }
            match key {
                "LOC_DOC" => Some(dir.clone()),
                "EMBEDDING_SIZE" => Some(size.clone()),
                "CHUNK_SIZE" => Some("200".to_string()),
                "CHUNK_OVERLAP" => Some("20".to_string()),
                _ => None,
            }
        })
        .expect("test settings")
    }

    pub async fn assistant_from(settings: Settings, store: Arc<MemoryStore>, llm: Arc<FakeLlm>) -> Assistant {
        let database = Database::open_in_memory().await.expect("in-memory database");
        Assistant::new(
            settings,
            database,
            store,
            Arc::new(FakeEmbedder),
            llm,
            GenerationSettings::default(),
        )
        .expect("assistant")
    }

    pub async fn assistant_with(
        documents_dir: &std::path::Path,
        store: Arc<MemoryStore>,
        llm: Arc<FakeLlm>,
    ) -> Assistant {
        assistant_from(settings_with(documents_dir, &[]), store, llm).await
    }
}
