use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewItem {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct NewGroup {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveTarget {
    group: String,
}

fn success(message: &str) -> Json<Value> {
    Json(json!({ "status": "success", "message": message }))
}

pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<NewItem>,
) -> Result<Json<Value>, ApiError> {
    let id = state.knowledge.add_item(&body.content).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Added to knowledge base",
        "id": id,
    })))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let base = state.knowledge.snapshot().await?;
    Ok(Json(json!({ "items": base.groups })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(item_id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    state.knowledge.delete_item(item_id).await?;
    Ok(success("Knowledge item deleted"))
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(body): Json<NewGroup>,
) -> Result<Json<Value>, ApiError> {
    state.knowledge.create_group(&body.name).await?;
    Ok(success("Group created"))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.knowledge.delete_group(&name).await?;
    Ok(success("Group deleted"))
}

pub async fn move_item(
    State(state): State<AppState>,
    Path(item_id): Path<u64>,
    Json(body): Json<MoveTarget>,
) -> Result<Json<Value>, ApiError> {
    state.knowledge.move_item(item_id, &body.group).await?;
    Ok(success("Knowledge item moved"))
}
