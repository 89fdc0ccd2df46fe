//! Core types, traits, and error handling for Parley
//!
//! This crate contains the shared data structures, the process-wide rate
//! governor, retry planning, the knowledge document model and the storage
//! traits used across the Parley workspace.

pub mod error;
pub mod knowledge;
pub mod rate_limiting;
pub mod retry;
pub mod traits;
pub mod types;

// Re-exports for convenient access
pub use error::{DbError, KnowledgeError, RelayError};
pub use knowledge::{KnowledgeBase, KnowledgeGroup, KnowledgeItem, UNGROUPED};
pub use rate_limiting::{Clock, GovernorConfig, ManualClock, RateGovernor, RateState, TokioClock};
pub use retry::RetryPlan;
pub use traits::{Conversation, ConversationStore, Message};
pub use types::{ChatMessage, ChatRequest, ChatResponse, MessageRole, RelayConfig, StreamChunk};

#[cfg(feature = "test-mocks")]
pub use traits::MockConversationStore;
