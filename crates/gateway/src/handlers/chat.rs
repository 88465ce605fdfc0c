//! Chat handler

use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::validate;
use crate::AppState;
use menuchat_common::{
    chat::ChatReply,
    errors::{ApiResponse, AppError, Result},
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    /// The user's question
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Conversation to continue; a new one is created when absent
    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<Uuid>,

    /// Owner of a newly created conversation
    #[serde(default, alias = "userId")]
    pub user_id: Option<Uuid>,
}

/// Answer a question within a conversation
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>> {
    validate(&request)?;

    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation {
            message: "Question cannot be empty".to_string(),
            field: Some("question".to_string()),
        });
    }

    tracing::info!(
        conversation_id = ?request.conversation_id,
        question_len = question.len(),
        "Chat request"
    );

    let reply = state
        .service
        .process_message(question, request.conversation_id, request.user_id)
        .await?;

    Ok(Json(ApiResponse::ok(reply)))
}
