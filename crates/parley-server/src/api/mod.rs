//! HTTP routes, all mounted under `/api`

mod chat;
mod conversation;
mod error;
mod knowledge;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use error::ApiError;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::chat))
        .route(
            "/conversations",
            post(conversation::create).get(conversation::list),
        )
        .route(
            "/conversations/{id}",
            get(conversation::get).delete(conversation::remove),
        )
        .route("/conversations/{id}/messages", post(conversation::add_message))
        .route("/knowledge", post(knowledge::add).get(knowledge::list))
        .route("/knowledge/groups", post(knowledge::create_group))
        .route("/knowledge/groups/{name}", delete(knowledge::delete_group))
        .route("/knowledge/{item_id}", delete(knowledge::remove))
        .route("/knowledge/{item_id}/move", post(knowledge::move_item));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
