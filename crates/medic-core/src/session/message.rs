//! Chat transcript message types.
//!
//! This module contains types for representing messages in the chat
//! transcript, including roles and message content.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in the chat transcript.
///
/// This is a closed set: assembly and rendering match on it exhaustively,
/// so adding a role is a compile-time concern rather than a stray string
/// comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum MessageRole {
    /// Message entered by the user.
    User,
    /// Message produced by the AI assistant.
    Assistant,
}

/// A single message in the chat transcript.
///
/// Each message has a role (user or assistant), content, and a timestamp
/// indicating when it was started. The content of the last assistant
/// message keeps growing while a streamed reply is still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier (UUID format).
    pub id: String,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Timestamp when the message was started (ISO 8601 format).
    pub timestamp: String,
}

impl ChatMessage {
    /// Creates a new message with a fresh identifier and the current timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
