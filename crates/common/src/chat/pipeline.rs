//! Chat pipeline orchestration
//!
//! One invocation runs strictly in order:
//!
//! ```text
//! RECEIVED -> HISTORY_LOADED -> QUERY_REWRITTEN -> DOCS_RETRIEVED
//!          -> ANSWER_GENERATED -> RESPONSE_RECONCILED -> DONE
//! ```
//!
//! History load, retrieval and generation failures end the run in `FAILED` with
//! a tagged [`PipelineError`]. Rewriting and reconciliation degrade instead of
//! failing. Each invocation owns its documents, so concurrent requests never
//! observe each other's retrieval results.

use super::generator::AnswerGenerator;
use super::history::{HistoryWindow, HISTORY_LIMIT};
use super::reconciler::{ParseStrategy, ResponseReconciler, StructuredAnswer};
use super::retriever::{DocumentRetriever, VectorSearch};
use super::rewriter::{QueryRewriter, RewriteOutcome};
use super::store::HistorySource;
use super::template::PromptTemplate;
use crate::errors::PipelineError;
use crate::llm::TextGenerator;
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Received,
    HistoryLoaded,
    QueryRewritten,
    DocsRetrieved,
    AnswerGenerated,
    ResponseReconciled,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::HistoryLoaded => "history_loaded",
            PipelineStage::QueryRewritten => "query_rewritten",
            PipelineStage::DocsRetrieved => "docs_retrieved",
            PipelineStage::AnswerGenerated => "answer_generated",
            PipelineStage::ResponseReconciled => "response_reconciled",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

/// Stages visited by one invocation, in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineTrace {
    stages: Vec<PipelineStage>,
    #[serde(skip)]
    last: Option<Instant>,
}

impl PipelineTrace {
    fn start() -> Self {
        Self {
            stages: vec![PipelineStage::Received],
            last: Some(Instant::now()),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        let now = Instant::now();
        if let Some(last) = self.last {
            metrics::record_stage(stage.as_str(), now.duration_since(last).as_secs_f64());
        }
        self.last = Some(now);
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn reached(&self, stage: PipelineStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn last_stage(&self) -> Option<PipelineStage> {
        self.stages.last().copied()
    }
}

/// Everything one invocation produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: Result<StructuredAnswer, PipelineError>,
    pub trace: PipelineTrace,
    pub rewrite: Option<RewriteOutcome>,
    pub strategy: Option<ParseStrategy>,
}

impl PipelineRun {
    pub fn into_result(self) -> Result<StructuredAnswer, PipelineError> {
        self.result
    }
}

pub struct ChatPipeline {
    history: Arc<dyn HistorySource>,
    rewriter: QueryRewriter,
    retriever: DocumentRetriever,
    generator: AnswerGenerator,
    reconciler: ResponseReconciler,
}

impl ChatPipeline {
    /// Rewriting and answering share one model client
    pub fn new(
        history: Arc<dyn HistorySource>,
        llm: Arc<dyn TextGenerator>,
        search: Arc<dyn VectorSearch>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            history,
            rewriter: QueryRewriter::new(llm.clone()),
            retriever: DocumentRetriever::new(search),
            generator: AnswerGenerator::new(llm, template),
            reconciler: ResponseReconciler::new(),
        }
    }

    /// Answer `question` for a conversation; `Ok` always carries a structured answer
    pub async fn answer(
        &self,
        question: &str,
        conversation_id: Uuid,
    ) -> Result<StructuredAnswer, PipelineError> {
        self.run(question, conversation_id).await.into_result()
    }

    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn run(&self, question: &str, conversation_id: Uuid) -> PipelineRun {
        let mut run = PipelineRun {
            result: Err(PipelineError::generation()),
            trace: PipelineTrace::start(),
            rewrite: None,
            strategy: None,
        };

        match self.execute(question, conversation_id, &mut run).await {
            Ok(answer) => {
                run.trace.enter(PipelineStage::Done);
                metrics::record_pipeline_run("success");
                run.result = Ok(answer);
            }
            Err(err) => {
                error!(
                    error = %err.message,
                    stage = run.trace.last_stage().map(|s| s.as_str()).unwrap_or("unknown"),
                    "Chat pipeline failed"
                );
                run.trace.enter(PipelineStage::Failed);
                metrics::record_pipeline_run(err.message.as_str());
                run.result = Err(err);
            }
        }
        run
    }

    async fn execute(
        &self,
        question: &str,
        conversation_id: Uuid,
        run: &mut PipelineRun,
    ) -> Result<StructuredAnswer, PipelineError> {
        let started = Instant::now();

        let turns = self
            .history
            .load_recent_turns(conversation_id, HISTORY_LIMIT)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load conversation history");
                PipelineError::history_load()
            })?;
        let history = HistoryWindow::new(turns);
        run.trace.enter(PipelineStage::HistoryLoaded);
        info!(turns = history.len(), "Conversation history loaded");

        let rewrite = self.rewriter.rewrite(question, &history).await;
        let query = rewrite.query.clone();
        run.rewrite = Some(rewrite);
        run.trace.enter(PipelineStage::QueryRewritten);

        let documents = self.retriever.retrieve(&query).await?;
        run.trace.enter(PipelineStage::DocsRetrieved);

        let raw = self.generator.generate(&documents, &query, &history).await?;
        run.trace.enter(PipelineStage::AnswerGenerated);

        let reconciled = self.reconciler.reconcile(&raw, &documents);
        run.strategy = Some(reconciled.strategy);
        run.trace.enter(PipelineStage::ResponseReconciled);

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            strategy = reconciled.strategy.as_str(),
            suggestions = reconciled.answer.suggestions.as_ref().map_or(0, Vec::len),
            "Chat pipeline completed"
        );
        Ok(reconciled.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::{ConversationTurn, Role};
    use crate::chat::retriever::RetrievedDocument;
    use crate::errors::{AppError, PipelineErrorKind, Result};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    struct FixedHistory(Vec<ConversationTurn>);

    #[async_trait]
    impl HistorySource for FixedHistory {
        async fn load_recent_turns(&self, _id: Uuid, limit: usize) -> Result<Vec<ConversationTurn>> {
            let skip = self.0.len().saturating_sub(limit);
            Ok(self.0[skip..].to_vec())
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl HistorySource for BrokenHistory {
        async fn load_recent_turns(&self, _id: Uuid, _limit: usize) -> Result<Vec<ConversationTurn>> {
            Err(AppError::DatabaseConnection {
                message: "pool timed out".into(),
            })
        }
    }

    struct OneDoc;

    #[async_trait]
    impl VectorSearch for OneDoc {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedDocument>> {
            Ok(vec![RetrievedDocument::new("Dal Makhani", Map::new())])
        }
    }

    struct Answering {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl Answering {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Answering {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }

        fn name(&self) -> &str {
            "answering"
        }
    }

    fn pipeline(history: Arc<dyn HistorySource>, llm: Arc<Answering>) -> ChatPipeline {
        ChatPipeline::new(
            history,
            llm,
            Arc::new(OneDoc),
            PromptTemplate::new("{context}\n{history}\n{question}"),
        )
    }

    #[tokio::test]
    async fn test_successful_run_visits_every_stage() {
        let llm = Answering::new("We have Dal Makhani.");
        let run = pipeline(Arc::new(FixedHistory(Vec::new())), llm.clone())
            .run("Lentils?", Uuid::new_v4())
            .await;

        assert_eq!(
            run.trace.stages(),
            [
                PipelineStage::Received,
                PipelineStage::HistoryLoaded,
                PipelineStage::QueryRewritten,
                PipelineStage::DocsRetrieved,
                PipelineStage::AnswerGenerated,
                PipelineStage::ResponseReconciled,
                PipelineStage::Done,
            ]
        );
        assert_eq!(run.strategy, Some(ParseStrategy::PlainText));
        assert_eq!(run.result.unwrap().message, "We have Dal Makhani.");
        // no history, so only the answer prompt reached the model
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_stops_before_rewrite() {
        let run = pipeline(Arc::new(BrokenHistory), Answering::new("unused"))
            .run("Lentils?", Uuid::new_v4())
            .await;
        let err = run.result.unwrap_err();
        assert_eq!(err.kind, Some(PipelineErrorKind::HistoryLoad));
        assert_eq!(err.message, "HISTORY_LOAD_ERROR");
        assert!(!run.trace.reached(PipelineStage::QueryRewritten));
        assert_eq!(run.trace.last_stage(), Some(PipelineStage::Failed));
    }

    #[tokio::test]
    async fn test_history_window_is_capped_and_rewrite_feeds_answer() {
        let turns = (0..10)
            .map(|i| ConversationTurn::new(Role::User, format!("q{}", i)))
            .collect();
        let llm = Answering::new("Which lentil dishes are there?");
        let run = pipeline(Arc::new(FixedHistory(turns)), llm.clone())
            .run("Lentils?", Uuid::new_v4())
            .await;
        assert!(run.result.is_ok());
        assert!(run.rewrite.is_some_and(|r| !r.used_original()));

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        let answer_prompt = &prompts[1];
        assert!(answer_prompt.contains("user: q4"));
        assert!(answer_prompt.contains("user: q9"));
        assert!(!answer_prompt.contains("user: q3"));
        assert!(answer_prompt.ends_with("Which lentil dishes are there?"));
    }

    #[tokio::test]
    async fn test_generation_failure_ends_after_retrieval() {
        struct Down;

        #[async_trait]
        impl TextGenerator for Down {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                Err(AppError::Configuration {
                    message: "API key missing".into(),
                })
            }

            fn name(&self) -> &str {
                "down"
            }
        }

        let pipeline = ChatPipeline::new(
            Arc::new(FixedHistory(Vec::new())),
            Arc::new(Down),
            Arc::new(OneDoc),
            PromptTemplate::new("{context}\n{question}"),
        );
        let run = pipeline.run("Lentils?", Uuid::new_v4()).await;

        let err = run.result.unwrap_err();
        assert_eq!(err.kind, Some(PipelineErrorKind::Generation));
        assert_eq!(err.code, 500);
        assert_eq!(err.message, "GENERATION_ERROR");
        assert_eq!(
            run.trace.stages(),
            [
                PipelineStage::Received,
                PipelineStage::HistoryLoaded,
                PipelineStage::QueryRewritten,
                PipelineStage::DocsRetrieved,
                PipelineStage::Failed,
            ]
        );
        assert!(run.strategy.is_none());
    }
}
