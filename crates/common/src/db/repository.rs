//! Repository pattern for database operations
//!
//! Postgres-backed [`ConversationStore`]. Multi-row writes (append with rename,
//! delete with messages) run in a transaction.

use crate::chat::store::conversation_title;
use crate::chat::{
    Conversation, ConversationStore, ConversationTurn, HistorySource, MessageContent,
    MessageUpdate, Role, StoredMessage,
};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl HistorySource for Repository {
    async fn load_recent_turns(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<ConversationTurn>> {
        let mut rows = MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_desc(MessageColumn::CreatedAt)
            .limit(limit as u64)
            .all(self.read_conn())
            .await?;
        rows.reverse();

        rows.into_iter()
            .map(|row| row.into_message().map(|m| m.to_turn()))
            .collect()
    }
}

#[async_trait]
impl ConversationStore for Repository {
    async fn create_conversation(
        &self,
        name: &str,
        user_id: Option<Uuid>,
        summary: Option<String>,
    ) -> Result<Conversation> {
        let now = chrono::Utc::now();

        let conversation = ConversationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set(name.to_string()),
            summary: Set(summary),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let row = conversation.insert(self.write_conn()).await?;
        Ok(row.into())
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let row = ConversationEntity::find_by_id(id).one(self.read_conn()).await?;
        Ok(row.map(Into::into))
    }

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let rows = ConversationEntity::find()
            .filter(ConversationColumn::UserId.eq(user_id))
            .order_by_desc(ConversationColumn::UpdatedAt)
            .all(self.read_conn())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        MessageEntity::delete_many()
            .filter(MessageColumn::ConversationId.eq(id))
            .exec(&txn)
            .await?;
        let result = ConversationEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: MessageContent,
    ) -> Result<StoredMessage> {
        let txn = self.write_conn().begin().await?;

        let conversation = ConversationEntity::find_by_id(conversation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound {
                id: conversation_id.to_string(),
            })?;

        let existing = MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .count(&txn)
            .await?;

        let now = chrono::Utc::now();
        let message = MessageActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(conversation_id),
            role: Set(role.as_str().to_string()),
            content: Set(serde_json::to_value(&content)?),
            feedback: Set(serde_json::json!({})),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let row = message.insert(&txn).await?;

        let mut conversation = conversation.into_active_model();
        if existing == 0 {
            conversation.name = Set(conversation_title(&content.message));
        }
        conversation.updated_at = Set(now.into());
        conversation.update(&txn).await?;

        txn.commit().await?;
        row.into_message()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_asc(MessageColumn::CreatedAt)
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(MessageRow::into_message)
            .collect()
    }

    async fn update_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> Result<Option<StoredMessage>> {
        let Some(row) = MessageEntity::find_by_id(message_id)
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        let mut message = row.into_active_model();
        if let Some(content) = update.content {
            message.content = Set(serde_json::to_value(&content)?);
        }
        if let Some(feedback) = update.feedback {
            message.feedback = Set(serde_json::to_value(&feedback)?);
        }
        message.updated_at = Set(chrono::Utc::now().into());

        let row = message.update(self.write_conn()).await?;
        row.into_message().map(Some)
    }
}
