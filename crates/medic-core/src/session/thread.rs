//! Chat thread summaries.

use serde::{Deserialize, Serialize};

/// A stored chat thread, as listed in the conversation sidebar.
///
/// Threads are created and persisted by the service; the client only ever
/// reads them back. The title is the thread's first user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    /// Server-assigned thread identifier
    pub id: i64,
    /// First user message of the thread, used as the display title
    pub title: String,
    /// Timestamp when the thread was created (ISO 8601 format)
    pub created_at: String,
}
