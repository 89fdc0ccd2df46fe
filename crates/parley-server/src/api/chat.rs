use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{stream, StreamExt};
use parley_core::{ChatRequest, ChatResponse, RelayError, StreamChunk};
use serde_json::json;
use tracing::{info, warn};

use super::ApiError;
use crate::AppState;

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::new(422, "messages must not be empty"));
    }
    info!(
        "Chat request: {} messages, stream={}",
        request.messages.len(),
        request.stream
    );

    if !request.stream {
        let response = state.relay.complete(&request.messages).await?;
        return Ok(Json(ChatResponse { response }).into_response());
    }

    let mut chunks = state.relay.stream(request.messages);
    // an error before any output still gets a proper status code
    let first = match chunks.next().await {
        Some(Err(e)) => return Err(e.into()),
        Some(Ok(chunk)) => Some(Ok(chunk)),
        None => None,
    };

    let lines = stream::iter(first)
        .chain(chunks)
        .map(|item| Ok::<_, Infallible>(encode_line(item)));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// One NDJSON line per chunk; a mid-stream failure becomes a final error line.
fn encode_line(item: Result<StreamChunk, RelayError>) -> String {
    let value = match item {
        Ok(chunk) => json!({ "response": chunk.text() }),
        Err(e) => {
            warn!("Stream ended with an error: {}", e);
            json!({ "error": e.to_string(), "status": e.status_code() })
        }
    };
    format!("{}\n", value)
}
