//! Menu document retrieval

use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Number of documents fetched per question
pub const TOP_K: usize = 6;

/// A menu document returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    fn metadata_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.metadata.get(*key).and_then(Value::as_str))
    }

    /// Dish this document describes, if tagged
    pub fn dish_name(&self) -> Option<&str> {
        self.metadata_str(&["dish_name", "dishName"])
    }

    pub fn image_url(&self) -> Option<&str> {
        self.metadata_str(&["image_url", "imageUrl"])
            .filter(|url| !url.is_empty())
    }
}

/// Similarity search over the menu corpus
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` documents ordered by decreasing similarity
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>>;
}

/// Fetches the top documents for a query and maps failures to `RETRIEVAL_ERROR`
#[derive(Clone)]
pub struct DocumentRetriever {
    backend: Arc<dyn VectorSearch>,
}

impl DocumentRetriever {
    pub fn new(backend: Arc<dyn VectorSearch>) -> Self {
        Self { backend }
    }

    pub async fn retrieve(&self, query: &str) -> std::result::Result<Vec<RetrievedDocument>, PipelineError> {
        let mut documents = self.backend.search(query, TOP_K).await.map_err(|e| {
            error!(error = %e, "Vector search failed");
            PipelineError::retrieval()
        })?;
        documents.truncate(TOP_K);

        info!(count = documents.len(), "Retrieved menu documents");
        for doc in &documents {
            debug!(
                dish = doc.dish_name().unwrap_or("-"),
                has_image = doc.image_url().is_some(),
                "Retrieved document"
            );
        }

        Ok(documents)
    }
}

/// Join document contents with blank lines, in retrieval order
pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, PipelineErrorKind};
    use serde_json::json;

    struct StaticSearch(Vec<RetrievedDocument>);

    #[async_trait]
    impl VectorSearch for StaticSearch {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl VectorSearch for BrokenSearch {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedDocument>> {
            Err(AppError::VectorSearch {
                message: "connection refused".into(),
            })
        }
    }

    fn plain(content: &str) -> RetrievedDocument {
        RetrievedDocument::new(content, Map::new())
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_top_k() {
        let docs = (0..10).map(|i| plain(&format!("dish {}", i))).collect();
        let retriever = DocumentRetriever::new(Arc::new(StaticSearch(docs)));
        let found = retriever.retrieve("anything").await.unwrap();
        assert_eq!(found.len(), TOP_K);
        assert_eq!(found[0].content, "dish 0");
    }

    #[tokio::test]
    async fn test_retrieve_failure_is_retrieval_error() {
        let retriever = DocumentRetriever::new(Arc::new(BrokenSearch));
        let err = retriever.retrieve("anything").await.unwrap_err();
        assert_eq!(err.kind, Some(PipelineErrorKind::Retrieval));
        assert_eq!(err.message, "RETRIEVAL_ERROR");
    }

    #[test]
    fn test_format_documents_joins_with_blank_line() {
        let docs = vec![plain("Dal: lentils"), plain("Naan: bread")];
        assert_eq!(format_documents(&docs), "Dal: lentils\n\nNaan: bread");
        assert_eq!(format_documents(&[]), "");
    }

    #[test]
    fn test_metadata_accessors() {
        let doc: RetrievedDocument = serde_json::from_value(json!({
            "content": "Paneer Tikka",
            "metadata": { "dishName": "Paneer Tikka", "image_url": "" }
        }))
        .unwrap();
        assert_eq!(doc.dish_name(), Some("Paneer Tikka"));
        assert_eq!(doc.image_url(), None);
    }
}
