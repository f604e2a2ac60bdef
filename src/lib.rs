pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod logging;
pub mod providers;

// Re-export commonly used items
pub use config::{GenerationSettings, Settings};
pub use llm::Assistant;
