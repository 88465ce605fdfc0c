//! Conversation and message handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::validate;
use crate::AppState;
use menuchat_common::{
    chat::{Conversation, Feedback, MessageContent, MessageUpdate, Role, StoredMessage},
    errors::{ApiResponse, AppError, Result},
};

/// Create conversation request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateConversationRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[serde(default, alias = "userId")]
    pub user_id: Option<Uuid>,

    #[serde(default)]
    pub summary: Option<String>,
}

/// Add message request
#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    #[serde(alias = "conversationId")]
    pub conversation_id: Uuid,

    /// Plain text or a structured answer object
    pub content: Value,

    pub role: String,

    #[serde(default)]
    pub feedback: Option<Feedback>,
}

/// Update message request
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMessageRequest {
    #[serde(default)]
    pub feedback: Option<Feedback>,

    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<StoredMessage>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

/// Message content accepts a bare string or an answer-shaped object
fn parse_content(value: Value) -> Result<MessageContent> {
    match value {
        Value::String(text) => Ok(MessageContent::plain(text)),
        Value::Object(object) => Ok(MessageContent::from_object(object)),
        _ => Err(AppError::Validation {
            message: "Content must be a string or an object".to_string(),
            field: Some("content".to_string()),
        }),
    }
}

/// Create a conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Conversation>>)> {
    validate(&request)?;

    let conversation = state
        .service
        .create_conversation(request.name.trim(), request.user_id, request.summary)
        .await?;

    tracing::info!(conversation_id = %conversation.id, "Conversation created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(conversation))))
}

/// List a user's conversations, most recently updated first
pub async fn list_user_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ConversationsResponse>>> {
    let conversations = state.service.conversations_for_user(user_id).await?;
    Ok(Json(ApiResponse::ok(ConversationsResponse { conversations })))
}

/// Append a message without running the chat pipeline
pub async fn add_message(
    State(state): State<AppState>,
    Json(request): Json<AddMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StoredMessage>>)> {
    let role: Role = request.role.parse()?;
    let content = parse_content(request.content)?;

    let message = state
        .service
        .add_message(request.conversation_id, role, content, request.feedback)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

/// Messages of a conversation, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessagesResponse>>> {
    let messages = state.service.messages(conversation_id).await?;
    Ok(Json(ApiResponse::ok(MessagesResponse { messages })))
}

/// Replace a message's feedback and/or content
pub async fn update_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateMessageRequest>,
) -> Result<Json<ApiResponse<StoredMessage>>> {
    let update = MessageUpdate {
        content: request.content.map(parse_content).transpose()?,
        feedback: request.feedback,
    };

    let message = state
        .service
        .update_message(conversation_id, message_id, update)
        .await?;

    Ok(Json(ApiResponse::ok(message)))
}

/// Delete a conversation with all its messages
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeleteResponse>>> {
    if !state.service.delete_conversation(conversation_id).await? {
        return Err(AppError::service(404, "CONVERSATION_NOT_FOUND"));
    }

    tracing::info!(%conversation_id, "Conversation deleted");
    Ok(Json(ApiResponse::ok(DeleteResponse {
        message: "CONVERSATION_DELETED_SUCCESSFULLY",
    })))
}
