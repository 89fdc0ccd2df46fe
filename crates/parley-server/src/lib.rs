//! Parley Server
//!
//! HTTP front end for the relay: chat (single-shot and streaming),
//! conversation history in SQLite and the personal knowledge file.

pub mod api;
pub mod config;
pub mod db;
pub mod knowledge;

use std::sync::Arc;

use parley_client::RelayClient;
use parley_core::ConversationStore;

pub use api::router;
pub use config::{ConfigError, Settings};
pub use db::SqlxDb;
pub use knowledge::KnowledgeStore;

/// Shared handles every request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayClient,
    pub conversations: Arc<dyn ConversationStore>,
    pub knowledge: Arc<KnowledgeStore>,
}

impl AppState {
    pub fn new(
        relay: RelayClient,
        conversations: Arc<dyn ConversationStore>,
        knowledge: Arc<KnowledgeStore>,
    ) -> Self {
        Self {
            relay,
            conversations,
            knowledge,
        }
    }
}
