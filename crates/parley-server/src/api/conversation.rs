use axum::extract::{Path, State};
use axum::Json;
use parley_core::{Conversation, Message, MessageRole};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::ApiError;
use crate::AppState;

pub const DEFAULT_TITLE: &str = "New conversation";

#[derive(Debug, Deserialize)]
pub struct CreateConversation {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMessage {
    role: MessageRole,
    content: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateConversation>,
) -> Result<Json<Conversation>, ApiError> {
    let title = body.title.unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let conversation = state.conversations.create_conversation(&title).await?;
    info!("Created conversation {}", conversation.id);
    Ok(Json(conversation))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.conversations.list_conversations().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .conversations
        .get_conversation(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.conversations.delete_conversation(id).await?;
    info!("Deleted conversation {}", id);
    Ok(Json(json!({ "status": "success" })))
}

pub async fn add_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AddMessage>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .conversations
        .add_message(id, body.role, &body.content)
        .await?;
    Ok(Json(message))
}
