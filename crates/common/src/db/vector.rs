//! pgvector similarity search over the menu corpus

use crate::chat::{RetrievedDocument, VectorSearch};
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use tracing::debug;

/// Embeds the query and ranks documents by cosine distance
pub struct PgVectorSearch {
    pool: DbPool,
    embedder: Arc<dyn Embedder>,
    sql: String,
}

impl PgVectorSearch {
    /// `table` must have `content text`, `metadata jsonb` and `embedding vector(n)`
    pub fn new(pool: DbPool, embedder: Arc<dyn Embedder>, table: &str) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(AppError::Configuration {
                message: format!("Invalid documents table name: {}", table),
            });
        }

        let sql = format!(
            r#"
            SELECT content, COALESCE(metadata, '{{}}'::jsonb) AS metadata
            FROM {}
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
            table
        );

        Ok(Self { pool, embedder, sql })
    }
}

#[async_trait]
impl VectorSearch for PgVectorSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed(query).await?;
        debug!(model = self.embedder.model_name(), dimension = embedding.len(), "Query embedded");

        let rows: Vec<(String, serde_json::Value)> = sqlx::query_as(&self.sql)
            .bind(Vector::from(embedding))
            .bind(k as i64)
            .fetch_all(self.pool.read().get_postgres_connection_pool())
            .await
            .map_err(|e| AppError::VectorSearch {
                message: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|(content, metadata)| {
                let metadata = match metadata {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                RetrievedDocument::new(content, metadata)
            })
            .collect())
    }
}
