//! Conversation persistence abstraction
//!
//! [`HistorySource`] is all the pipeline needs; [`ConversationStore`] adds the
//! CRUD surface used by the conversation service. The Postgres implementation
//! lives in `db`; [`InMemoryConversationStore`] backs tests and local runs.

use super::history::{ConversationTurn, Role};
use super::reconciler::StructuredAnswer;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Message payload; user turns carry only `message`
pub type MessageContent = StructuredAnswer;

/// Characters of the first message kept when naming a conversation
const TITLE_CHARS: usize = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downvote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: MessageContent,
    pub feedback: Feedback,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn {
            role: self.role,
            text: self.content.message.clone(),
            created_at: self.created_at,
        }
    }
}

/// Partial update of a stored message
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub content: Option<MessageContent>,
    pub feedback: Option<Feedback>,
}

/// Title derived from a conversation's first message
pub fn conversation_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.chars().count() > TITLE_CHARS {
        let head: String = trimmed.chars().take(TITLE_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// Read access to recent turns
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` most recent turns, oldest first
    async fn load_recent_turns(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<ConversationTurn>>;
}

#[async_trait]
pub trait ConversationStore: HistorySource {
    async fn create_conversation(
        &self,
        name: &str,
        user_id: Option<Uuid>,
        summary: Option<String>,
    ) -> Result<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Delete a conversation and its messages; returns whether it existed
    async fn delete_conversation(&self, id: Uuid) -> Result<bool>;

    /// Append a message. The first message of a conversation also renames it
    /// (see [`conversation_title`]).
    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: MessageContent,
    ) -> Result<StoredMessage>;

    /// All messages of a conversation, oldest first
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>>;

    async fn update_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> Result<Option<StoredMessage>>;

    async fn conversation_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.find_conversation(id).await?.is_some())
    }

    /// Append a plain-text turn
    async fn append_turn(&self, conversation_id: Uuid, role: Role, text: &str) -> Result<StoredMessage> {
        self.append_message(conversation_id, role, MessageContent::plain(text))
            .await
    }
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<StoredMessage>>,
}

/// Process-local store with the same semantics as the Postgres repository
#[derive(Default)]
pub struct InMemoryConversationStore {
    state: RwLock<MemoryState>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistorySource for InMemoryConversationStore {
    async fn load_recent_turns(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<ConversationTurn>> {
        let state = self.state.read().await;
        let Some(messages) = state.messages.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).map(StoredMessage::to_turn).collect())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(
        &self,
        name: &str,
        user_id: Option<Uuid>,
        summary: Option<String>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            summary,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().await;
        state.conversations.insert(conversation.id, conversation.clone());
        state.messages.insert(conversation.id, Vec::new());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.user_id == Some(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        state.messages.remove(&id);
        Ok(state.conversations.remove(&id).is_some())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: MessageContent,
    ) -> Result<StoredMessage> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(conversation) = state.conversations.get_mut(&conversation_id) else {
            return Err(AppError::ConversationNotFound {
                id: conversation_id.to_string(),
            });
        };

        let now = Utc::now();
        let messages = state.messages.entry(conversation_id).or_default();
        if messages.is_empty() {
            conversation.name = conversation_title(&content.message);
        }
        conversation.updated_at = now;

        let message = StoredMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content,
            feedback: Feedback::default(),
            created_at: now,
            updated_at: now,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> Result<Option<StoredMessage>> {
        let mut state = self.state.write().await;
        let Some(message) = state
            .messages
            .get_mut(&conversation_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
        else {
            return Ok(None);
        };

        if let Some(content) = update.content {
            message.content = content;
        }
        if let Some(feedback) = update.feedback {
            message.feedback = feedback;
        }
        message.updated_at = Utc::now();
        Ok(Some(message.clone()))
    }
}
