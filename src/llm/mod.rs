pub mod assistant;
pub mod embeddings;
pub mod prompt;

pub use assistant::{Answer, Assistant, AssistantError, IngestReport};
pub use embeddings::EmbeddingGenerator;
