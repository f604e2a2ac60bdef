pub mod loader;
pub mod naming;
pub mod splitter;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

pub use loader::{LoadedDocument, Page};
pub use naming::unique_file_name;
pub use splitter::TextSplitter;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("Invalid splitter configuration: {0}")]
    Splitter(String),
}

/// One retrievable passage of a handbook, before it gets a database id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChunkRecord {
    pub text: String,
    pub page: i64,
    pub source: String,
}

pub fn chunk_document(document: &LoadedDocument, splitter: &TextSplitter) -> Vec<ChunkRecord> {
    document
        .pages
        .iter()
        .flat_map(|page| {
            splitter.split(&page.text).into_iter().map(move |text| ChunkRecord {
                text,
                page: page.index,
                source: document.source.clone(),
            })
        })
        .collect()
}

/// Loads and splits every file. Files that cannot be read are logged and
/// skipped so one bad upload does not block the rest of the folder.
pub async fn chunk_files(files: &[PathBuf], splitter: &TextSplitter) -> Vec<ChunkRecord> {
    let mut records = Vec::new();
    for file in files {
        match loader::load(file).await {
            Ok(document) => {
                let chunks = chunk_document(&document, splitter);
                tracing::info!("Processed {} chunks from {}", chunks.len(), file.display());
                records.extend(chunks);
            }
            Err(e) => {
                tracing::error!("Error processing file {}: {}", file.display(), e);
            }
        }
    }
    tracing::info!("Total number of chunks processed: {}", records.len());
    records
}
