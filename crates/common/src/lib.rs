//! MenuChat Common Library
//!
//! Shared code for the MenuChat services including:
//! - The history-aware chat pipeline
//! - LLM provider and embedding client abstractions
//! - Database models, repository and vector search
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod chat;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use chat::{ChatPipeline, ConversationService, StructuredAnswer};
pub use config::AppConfig;
pub use db::{DbPool, PgVectorSearch, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, PipelineError, Result};
pub use llm::{LlmBackend, TextGenerator};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
