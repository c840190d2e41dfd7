/// Error types for the campus chat client.
/// Every failure the synchronization core can observe maps onto one variant.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("Conversation has no valid recipient")]
    NoRecipient,

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Conversation is blocked: {0}")]
    Blocked(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl ClientError {
    /// True for failures that happened before any network call was made
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::EmptyMessage
                | ClientError::NoRecipient
                | ClientError::ConversationNotFound(_)
                | ClientError::Blocked(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
