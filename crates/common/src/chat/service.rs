//! Conversation service
//!
//! Binds a chat request to a conversation: create or verify it, run the
//! pipeline, persist both turns. Failures surface as [`AppError::Service`]
//! carrying the public tag and HTTP status.

use super::history::Role;
use super::pipeline::ChatPipeline;
use super::reconciler::StructuredAnswer;
use super::store::{Conversation, ConversationStore, Feedback, MessageContent, MessageUpdate, StoredMessage};
use crate::errors::{AppError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Name given to conversations a chat request creates implicitly
pub const NEW_CHAT_NAME: &str = "New Chat";

/// Answer to one chat request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub conversation_id: Uuid,
    #[serde(flatten)]
    pub answer: StructuredAnswer,
}

fn internal(context: &str, err: AppError) -> AppError {
    error!(error = %err, "{}", context);
    AppError::service(500, "INTERNAL_SERVER_ERROR")
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    pipeline: Arc<ChatPipeline>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, pipeline: Arc<ChatPipeline>) -> Self {
        Self { store, pipeline }
    }

    /// Answer a question within a conversation, creating one when none is given
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn process_message(
        &self,
        question: &str,
        conversation_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Result<ChatReply> {
        let conversation_id = match conversation_id {
            None => {
                let conversation = self
                    .store
                    .create_conversation(NEW_CHAT_NAME, user_id, None)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Failed to create conversation");
                        AppError::service(500, "FAILED_TO_CREATE_CONVERSATION")
                    })?;
                info!(conversation_id = %conversation.id, "New conversation created");
                conversation.id
            }
            Some(id) => {
                let exists = self
                    .store
                    .conversation_exists(id)
                    .await
                    .map_err(|e| internal("Failed to look up conversation", e))?;
                if !exists {
                    error!(conversation_id = %id, "Conversation not found");
                    return Err(AppError::service(404, "CONVERSATION_NOT_FOUND"));
                }
                id
            }
        };

        // The current question is persisted after the pipeline ran, so history
        // never contains it.
        let result = self.pipeline.answer(question, conversation_id).await;

        self.store
            .append_turn(conversation_id, Role::User, question)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to add user message");
                AppError::service(500, "FAILED_TO_ADD_USER_MESSAGE")
            })?;

        let answer = result.map_err(|e| {
            error!(error = %e, "Failed to generate AI response");
            AppError::service(500, "FAILED_TO_GENERATE_AI_RESPONSE")
        })?;

        self.store
            .append_message(conversation_id, Role::Ai, answer.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to add AI message");
                AppError::service(500, "FAILED_TO_ADD_AI_MESSAGE")
            })?;

        info!(conversation_id = %conversation_id, "Message processed");
        Ok(ChatReply {
            conversation_id,
            answer,
        })
    }

    pub async fn create_conversation(
        &self,
        name: &str,
        user_id: Option<Uuid>,
        summary: Option<String>,
    ) -> Result<Conversation> {
        self.store
            .create_conversation(name, user_id, summary)
            .await
            .map_err(|e| internal("Failed to create conversation", e))
    }

    pub async fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.store
            .list_conversations(user_id)
            .await
            .map_err(|e| internal("Failed to list conversations", e))
    }

    /// Add a message directly, bypassing the pipeline
    pub async fn add_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: MessageContent,
        feedback: Option<Feedback>,
    ) -> Result<StoredMessage> {
        let message = self
            .store
            .append_message(conversation_id, role, content)
            .await
            .map_err(|e| match e {
                AppError::ConversationNotFound { .. } => {
                    AppError::service(404, "CONVERSATION_NOT_FOUND")
                }
                other => internal("Failed to add message", other),
            })?;

        match feedback {
            Some(feedback) if feedback != Feedback::default() => {
                let update = MessageUpdate {
                    feedback: Some(feedback),
                    ..MessageUpdate::default()
                };
                self.update_message(conversation_id, message.id, update).await
            }
            _ => Ok(message),
        }
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.store
            .list_messages(conversation_id)
            .await
            .map_err(|e| internal("Failed to list messages", e))
    }

    pub async fn update_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> Result<StoredMessage> {
        let updated = self
            .store
            .update_message(conversation_id, message_id, update)
            .await
            .map_err(|e| internal("Failed to update message", e))?;

        match updated {
            Some(message) => {
                info!(%conversation_id, %message_id, "Message updated");
                Ok(message)
            }
            None => {
                error!(%conversation_id, %message_id, "Message not found");
                Err(AppError::service(404, "MESSAGE_NOT_FOUND"))
            }
        }
    }

    /// Returns whether the conversation existed
    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool> {
        self.store
            .delete_conversation(conversation_id)
            .await
            .map_err(|e| internal("Failed to delete conversation", e))
    }
}
