pub mod database;
pub mod qdrant_config;
pub mod vector_db;

pub use database::{Database, DatabaseError, StoredChunk, Table};
pub use vector_db::{QdrantStore, RetrievedPassage, VectorDBError, VectorPoint, VectorStore};
