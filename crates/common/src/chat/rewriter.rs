//! History-aware query rewriting
//!
//! Follow-up questions ("what about the spicy one?") retrieve poorly on their
//! own. When there is history, the question is handed to the model together
//! with the recent turns and replaced by a self-contained version. Rewriting is
//! best effort: any failure leaves the original question in place.

use super::history::HistoryWindow;
use super::template::PromptTemplate;
use crate::llm::TextGenerator;
use crate::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const REWRITE_TEMPLATE: &str = "You are given the recent history of a conversation with a restaurant guest and the guest's new question.\n\n\
- If the new question refers to or builds on the history, rewrite it as a single self-contained question that includes the context it needs.\n\
- If the new question is unrelated to the history or starts a new topic, return it with minimal changes.\n\n\
Reply with the question only.\n\n\
Conversation History:\n{history}\n\n\
Original Question: {question}\n\n\
Rewritten Question:";

/// Label some models echo back before the rewritten question
const ECHOED_LABEL: &str = "Rewritten Question:";

/// Why the query used for retrieval is what it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    Rewritten,
    SkippedNoHistory,
    FellBack,
}

impl RewriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteStatus::Rewritten => "rewritten",
            RewriteStatus::SkippedNoHistory => "skipped",
            RewriteStatus::FellBack => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    pub query: String,
    pub status: RewriteStatus,
}

impl RewriteOutcome {
    pub fn used_original(&self) -> bool {
        self.status != RewriteStatus::Rewritten
    }
}

pub struct QueryRewriter {
    llm: Arc<dyn TextGenerator>,
    template: PromptTemplate,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm,
            template: PromptTemplate::new(REWRITE_TEMPLATE),
        }
    }

    pub fn prompt(&self, question: &str, history: &HistoryWindow) -> String {
        let rendered = history.render();
        let values = HashMap::from([("history", rendered.as_str()), ("question", question)]);
        self.template.format(&values)
    }

    /// Produce the query used for retrieval and answering. Never fails.
    pub async fn rewrite(&self, question: &str, history: &HistoryWindow) -> RewriteOutcome {
        let outcome = self.try_rewrite(question, history).await;
        metrics::record_rewrite(outcome.status.as_str());
        outcome
    }

    async fn try_rewrite(&self, question: &str, history: &HistoryWindow) -> RewriteOutcome {
        if history.is_empty() {
            info!("No conversation history, using question as is");
            return RewriteOutcome {
                query: question.to_string(),
                status: RewriteStatus::SkippedNoHistory,
            };
        }

        let fallback = || RewriteOutcome {
            query: question.trim().to_string(),
            status: RewriteStatus::FellBack,
        };

        let raw = match self.llm.generate(&self.prompt(question, history)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, provider = self.llm.name(), "Query rewrite failed, falling back to original question");
                return fallback();
            }
        };

        let rewritten = clean_rewrite(&raw);
        if rewritten.is_empty() {
            warn!("Query rewrite returned no text, falling back to original question");
            return fallback();
        }

        info!(original = %question, rewritten = %rewritten, "Query rewritten");
        RewriteOutcome {
            query: rewritten.to_string(),
            status: RewriteStatus::Rewritten,
        }
    }
}

fn clean_rewrite(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix(ECHOED_LABEL)
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::{ConversationTurn, Role};
    use crate::errors::{AppError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed text, or fails when `reply` is `None`
    struct ScriptedLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or_else(|| AppError::LlmError {
                provider: "test".into(),
                message: "timeout".into(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn history() -> HistoryWindow {
        HistoryWindow::new(vec![
            ConversationTurn::new(Role::User, "Do you have paneer dishes?"),
            ConversationTurn::new(Role::Ai, "Yes, Paneer Tikka and Palak Paneer."),
        ])
    }

    #[tokio::test]
    async fn test_empty_history_skips_model() {
        let llm = ScriptedLlm::replying("ignored");
        let rewriter = QueryRewriter::new(llm.clone());
        let outcome = rewriter.rewrite("  Is it spicy? ", &HistoryWindow::default()).await;
        assert_eq!(outcome.query, "  Is it spicy? ");
        assert_eq!(outcome.status, RewriteStatus::SkippedNoHistory);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_is_trimmed() {
        let llm = ScriptedLlm::replying("\n  Is the Paneer Tikka spicy?  \n");
        let rewriter = QueryRewriter::new(llm.clone());
        let outcome = rewriter.rewrite("Is it spicy?", &history()).await;
        assert_eq!(outcome.query, "Is the Paneer Tikka spicy?");
        assert!(!outcome.used_original());

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("user: Do you have paneer dishes?\nai: Yes"));
        assert!(prompts[0].contains("Original Question: Is it spicy?"));
    }

    #[tokio::test]
    async fn test_echoed_label_is_stripped() {
        let rewriter = QueryRewriter::new(ScriptedLlm::replying("Rewritten Question: Is Palak Paneer vegan?"));
        let outcome = rewriter.rewrite("Is it vegan?", &history()).await;
        assert_eq!(outcome.query, "Is Palak Paneer vegan?");
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let rewriter = QueryRewriter::new(ScriptedLlm::failing());
        let outcome = rewriter.rewrite("Is it spicy?", &history()).await;
        assert_eq!(outcome.query, "Is it spicy?");
        assert_eq!(outcome.status, RewriteStatus::FellBack);
        assert!(outcome.used_original());
    }

    #[tokio::test]
    async fn test_blank_output_falls_back() {
        let rewriter = QueryRewriter::new(ScriptedLlm::replying("   \n"));
        let outcome = rewriter.rewrite("Is it spicy?", &history()).await;
        assert_eq!(outcome.query, "Is it spicy?");
        assert_eq!(outcome.status, RewriteStatus::FellBack);
    }

    #[test]
    fn test_fallback_output_is_trimmed() {
        let rewriter = QueryRewriter::new(ScriptedLlm::failing());
        let outcome = tokio_test::block_on(rewriter.rewrite("  Is it spicy?  \n", &history()));
        assert_eq!(outcome.query, "Is it spicy?");
        assert_eq!(outcome.status, RewriteStatus::FellBack);
    }
}
