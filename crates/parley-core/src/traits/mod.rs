mod conversation_store;

pub use conversation_store::{Conversation, ConversationStore, Message};

#[cfg(feature = "test-mocks")]
pub use conversation_store::MockConversationStore;
