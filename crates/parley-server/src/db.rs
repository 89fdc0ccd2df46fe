use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::{Conversation, ConversationStore, DbError, Message, MessageRole};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &str = include_str!("../migrations/001_initial_schema.sql");

#[derive(Clone)]
pub struct SqlxDb {
    pool: SqlitePool,
}

impl SqlxDb {
    /// Wraps an existing SQLite pool. Call [`SqlxDb::migrate`] before use on a
    /// fresh database.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` with foreign keys on.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Database schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn messages_for(&self, conversation_id: i64) -> Result<Vec<Message>, DbError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM messages WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

#[async_trait]
impl ConversationStore for SqlxDb {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, DbError> {
        let now = Utc::now();
        let row: ConversationRow = sqlx::query_as(
            "INSERT INTO conversations (title, created_at, updated_at) VALUES (?, ?, ?) RETURNING id, title, created_at, updated_at",
        )
        .bind(title)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_conversation(Vec::new()))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, DbError> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, title, created_at, updated_at FROM conversations ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let message_rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM messages ORDER BY conversation_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_conversation: HashMap<i64, Vec<Message>> = HashMap::new();
        for row in message_rows {
            let message = Message::try_from(row)?;
            by_conversation
                .entry(message.conversation_id)
                .or_default()
                .push(message);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let messages = by_conversation.remove(&row.id).unwrap_or_default();
                row.into_conversation(messages)
            })
            .collect())
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, DbError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let messages = self.messages_for(row.id).await?;
                Ok(Some(row.into_conversation(messages)))
            }
            None => Ok(None),
        }
    }

    async fn delete_conversation(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    async fn add_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::NotFound(conversation_id));
        }

        let row: MessageRow = sqlx::query_as(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?) RETURNING id, conversation_id, role, content, created_at",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Message::try_from(row)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: self.id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
            messages,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|_| DbError::InvalidRole(row.role.clone()))?;
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role,
            content: row.content,
            created_at: row.created_at,
        })
    }
}
