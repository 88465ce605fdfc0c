//! Grounded answer generation

use super::history::HistoryWindow;
use super::retriever::{format_documents, RetrievedDocument};
use super::template::PromptTemplate;
use crate::errors::PipelineError;
use crate::llm::TextGenerator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Bundled answer template with `{context}`, `{history}` and `{question}`
pub const DEFAULT_ANSWER_TEMPLATE: &str = include_str!("../../../../resources/prompt.txt");

pub struct AnswerGenerator {
    llm: Arc<dyn TextGenerator>,
    template: PromptTemplate,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, template: PromptTemplate) -> Self {
        Self { llm, template }
    }

    pub fn with_default_template(llm: Arc<dyn TextGenerator>) -> Self {
        Self::new(llm, PromptTemplate::new(DEFAULT_ANSWER_TEMPLATE))
    }

    /// Fill the template. History is supplied only when the template asks for it.
    pub fn build_prompt(
        &self,
        documents: &[RetrievedDocument],
        question: &str,
        history: &HistoryWindow,
    ) -> String {
        let context = format_documents(documents);
        let wants_history = self.template.declares("history");
        let rendered = if wants_history { history.render() } else { String::new() };

        let mut values = HashMap::from([("context", context.as_str()), ("question", question)]);
        if wants_history {
            values.insert("history", rendered.as_str());
        }

        self.template.format(&values)
    }

    /// Ask the model for an answer; any provider failure becomes `GENERATION_ERROR`
    pub async fn generate(
        &self,
        documents: &[RetrievedDocument],
        question: &str,
        history: &HistoryWindow,
    ) -> Result<String, PipelineError> {
        let prompt = self.build_prompt(documents, question, history);
        let raw = self.llm.generate(&prompt).await.map_err(|e| {
            error!(error = %e, provider = self.llm.name(), "Answer generation failed");
            PipelineError::generation()
        })?;

        info!(chars = raw.len(), "Answer generated");
        Ok(raw)
    }
}
