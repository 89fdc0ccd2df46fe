use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::types::MessageRole;

/// Persistence for conversations and their messages.
#[cfg_attr(feature = "test-mocks", mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, DbError>;
    /// All conversations with their messages, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, DbError>;
    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, DbError>;
    /// Removes the conversation and, by cascade, its messages.
    async fn delete_conversation(&self, id: i64) -> Result<(), DbError>;
    /// Appends a message and bumps the conversation's `updated_at`.
    async fn add_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DbError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
