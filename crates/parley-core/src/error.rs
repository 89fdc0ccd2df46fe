//! Error handling for Parley
//!
//! Defines the error types used by the relay, the conversation store and the
//! knowledge store. Every kind carries an HTTP-like status code so callers can
//! surface it without crashing.

use thiserror::Error;

/// Terminal failure of a call to the upstream completion service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Upstream is busy, please retry later")]
    RateLimited,

    #[error("Upstream request timed out, please retry later")]
    Timeout,

    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Upstream call failed: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

impl RelayError {
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::RateLimited => 429,
            RelayError::Timeout => 504,
            RelayError::Network(_) => 502,
            RelayError::Upstream { status, .. } => *status,
            RelayError::MalformedResponse(_) => 502,
            RelayError::Stream(_) => 500,
        }
    }

    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::RateLimited | RelayError::Timeout | RelayError::Network(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Conversation {0} not found")]
    NotFound(i64),

    #[error("Invalid message role stored: {0}")]
    InvalidRole(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub fn status_code(&self) -> u16 {
        match self {
            DbError::NotFound(_) => 404,
            DbError::InvalidRole(_) | DbError::Sqlx(_) => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Knowledge item {0} not found")]
    ItemNotFound(u64),

    #[error("Group '{0}' not found")]
    GroupNotFound(String),

    #[error("Group '{0}' already exists")]
    GroupExists(String),

    #[error("Group '{0}' cannot be deleted")]
    ProtectedGroup(String),

    #[error("Group name must not be blank")]
    InvalidGroupName,

    #[error("Knowledge file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KnowledgeError {
    pub fn status_code(&self) -> u16 {
        match self {
            KnowledgeError::ItemNotFound(_) | KnowledgeError::GroupNotFound(_) => 404,
            KnowledgeError::GroupExists(_)
            | KnowledgeError::ProtectedGroup(_)
            | KnowledgeError::InvalidGroupName => 400,
            KnowledgeError::Io(_) | KnowledgeError::Serialization(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_status_codes() {
        assert_eq!(RelayError::RateLimited.status_code(), 429);
        assert_eq!(RelayError::Timeout.status_code(), 504);
        assert_eq!(RelayError::Network("refused".into()).status_code(), 502);
        assert_eq!(RelayError::MalformedResponse("empty".into()).status_code(), 502);
        assert_eq!(RelayError::Stream("reset".into()).status_code(), 500);
        assert_eq!(
            RelayError::Upstream {
                status: 401,
                message: "bad key".into()
            }
            .status_code(),
            401
        );
    }

    #[test]
    fn test_relay_error_retryable_kinds() {
        assert!(RelayError::RateLimited.is_retryable());
        assert!(RelayError::Timeout.is_retryable());
        assert!(RelayError::Network("reset".into()).is_retryable());
        assert!(!RelayError::MalformedResponse("x".into()).is_retryable());
        assert!(!RelayError::Stream("x".into()).is_retryable());
        assert!(!RelayError::Upstream {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_upstream_error_display_carries_message() {
        let err = RelayError::Upstream {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Upstream call failed: boom");
    }

    #[test]
    fn test_knowledge_error_status_codes() {
        assert_eq!(KnowledgeError::ItemNotFound(3).status_code(), 404);
        assert_eq!(KnowledgeError::GroupNotFound("x".into()).status_code(), 404);
        assert_eq!(KnowledgeError::GroupExists("x".into()).status_code(), 400);
        assert_eq!(KnowledgeError::ProtectedGroup("x".into()).status_code(), 400);
        assert_eq!(KnowledgeError::InvalidGroupName.status_code(), 400);
    }

    #[test]
    fn test_db_error_status_codes() {
        assert_eq!(DbError::NotFound(7).status_code(), 404);
        assert_eq!(DbError::InvalidRole("robot".into()).status_code(), 500);
    }
}
