//! Message entity

use crate::chat::{Feedback, MessageContent, StoredMessage};
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub conversation_id: Uuid,

    /// user, ai or admin
    #[sea_orm(column_type = "Text")]
    pub role: String,

    /// `MessageContent` as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub content: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub feedback: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decode the JSONB columns into the domain message
    pub fn into_message(self) -> crate::errors::Result<StoredMessage> {
        let content: MessageContent = serde_json::from_value(self.content)?;
        let feedback: Feedback = match self.feedback {
            serde_json::Value::Null => Feedback::default(),
            value => serde_json::from_value(value)?,
        };
        let role = self.role.parse().map_err(|_| AppError::Internal {
            message: format!("Stored message {} has unknown role {}", self.id, self.role),
        })?;

        Ok(StoredMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content,
            feedback,
            created_at: self.created_at.into(),
            updated_at: self.updated_at.into(),
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id",
        on_delete = "Cascade"
    )]
    Conversation,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use chrono::Utc;
    use serde_json::json;

    fn model(role: &str, feedback: serde_json::Value) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: role.to_string(),
            content: json!({"message": "Try the dal", "suggestions": [{"name": "Dal", "imageUrl": "u"}]}),
            feedback,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_into_message_decodes_json_columns() {
        let message = model("ai", json!({"upvote": true})).into_message().unwrap();
        assert_eq!(message.role, Role::Ai);
        assert_eq!(message.content.message, "Try the dal");
        assert_eq!(message.feedback.upvote, Some(true));
        let suggestions = message.content.suggestions.unwrap();
        assert_eq!(suggestions[0].image_url.as_deref(), Some("u"));
    }

    #[test]
    fn test_null_feedback_is_empty() {
        let message = model("user", serde_json::Value::Null).into_message().unwrap();
        assert_eq!(message.feedback, Feedback::default());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(model("bot", json!({})).into_message().is_err());
    }
}
