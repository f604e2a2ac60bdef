mod huggingface;

pub use huggingface::{HuggingFaceEmbeddings, HuggingFaceProvider};
