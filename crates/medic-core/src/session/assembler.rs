//! Streaming reply assembler.
//!
//! Merges the ordered sequence of text fragments arriving over the event
//! channel into the chat transcript. Consecutive fragments for the same
//! reply grow the last message in place so the UI can render live typing;
//! the terminal sentinel closes the reply so that two consecutive replies
//! from the same role never collapse into one message.

use super::message::{ChatMessage, MessageRole};

/// Assembles streamed fragments into the chat transcript.
///
/// Fragments are applied strictly in arrival order; there is no reordering
/// or buffering. The channel is trusted to preserve delivery order.
#[derive(Debug, Clone, Default)]
pub struct StreamAssembler {
    messages: Vec<ChatMessage>,
    /// Whether the last message is a reply that is still receiving fragments.
    reply_open: bool,
}

impl StreamAssembler {
    /// Creates an assembler with an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the assembled transcript.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Applies one streamed fragment.
    ///
    /// Appends to the last message when it has the same role and its reply
    /// is still open; otherwise starts a new message. A role change always
    /// starts a new message, whatever the open flag says.
    pub fn push(&mut self, role: MessageRole, fragment: &str) {
        if self.reply_open {
            if let Some(last) = self.messages.last_mut() {
                if last.role == role {
                    last.content.push_str(fragment);
                    return;
                }
            }
        }

        self.messages.push(ChatMessage::new(role, fragment));
        self.reply_open = true;
    }

    /// Handles the terminal sentinel: closes the in-progress reply.
    ///
    /// The next fragment starts a new message even for the same role.
    pub fn finish(&mut self) {
        self.reply_open = false;
    }

    /// Handles a channel-level failure.
    ///
    /// Already-assembled content is preserved, never rolled back; the reply
    /// is closed so a retried exchange starts fresh.
    pub fn fail(&mut self) {
        self.reply_open = false;
    }

    /// Appends a complete, locally produced message (e.g. user input).
    pub fn push_complete(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.reply_open = false;
    }

    /// Replaces the transcript, e.g. when switching to a stored thread.
    pub fn load(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.reply_open = false;
    }
}
