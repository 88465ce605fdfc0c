//! History-aware retrieval-augmented chat
//!
//! Components, in pipeline order:
//! - [`history`]: conversation turns and the bounded window fed to prompts
//! - [`rewriter`]: turns follow-up questions into standalone queries
//! - [`retriever`]: fetches the top menu documents for a query
//! - [`generator`]: fills the answer template and calls the model
//! - [`reconciler`]: parses model output and enriches suggestions
//! - [`pipeline`]: runs the stages above for one request
//! - [`service`]: binds requests to persisted conversations

pub mod generator;
pub mod history;
pub mod pipeline;
pub mod reconciler;
pub mod retriever;
pub mod rewriter;
pub mod service;
pub mod store;
pub mod template;

pub use generator::{AnswerGenerator, DEFAULT_ANSWER_TEMPLATE};
pub use history::{ConversationTurn, HistoryWindow, Role, HISTORY_LIMIT};
pub use pipeline::{ChatPipeline, PipelineRun, PipelineStage};
pub use reconciler::{ParseStrategy, ResponseReconciler, StructuredAnswer, Suggestion};
pub use retriever::{DocumentRetriever, RetrievedDocument, VectorSearch, TOP_K};
pub use rewriter::{QueryRewriter, RewriteOutcome, RewriteStatus};
pub use service::{ChatReply, ConversationService};
pub use store::{
    Conversation, ConversationStore, Feedback, HistorySource, InMemoryConversationStore,
    MessageContent, MessageUpdate, StoredMessage,
};
pub use template::PromptTemplate;

use crate::config::ChatConfig;
use crate::errors::Result;

/// The configured answer template, or the bundled one
pub fn answer_template(config: &ChatConfig) -> Result<PromptTemplate> {
    match config.prompt_template_path.as_deref() {
        Some(path) => {
            tracing::info!(path, "Loading answer template");
            PromptTemplate::from_file(path)
        }
        None => Ok(PromptTemplate::new(DEFAULT_ANSWER_TEMPLATE)),
    }
}
