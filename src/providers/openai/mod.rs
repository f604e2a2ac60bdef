mod openai;

pub use openai::{OpenAIEmbeddings, OpenAIProvider};
