//! SeaORM entity models
//!
//! Database entities for MenuChat

mod conversation;
mod message;

pub use conversation::{
    Entity as ConversationEntity,
    Model as ConversationRow,
    ActiveModel as ConversationActiveModel,
    Column as ConversationColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as MessageRow,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
};
