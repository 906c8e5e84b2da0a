//! Event-channel message types.
//!
//! Typed forms of the events exchanged with the diagnosis service over the
//! bidirectional channel. The wire codec in the transport layer maps these
//! to and from the socket event names and payload shapes.

use super::diagnosis::DiagnosisUpdate;
use serde::{Deserialize, Serialize};

/// Events delivered by the service (server -> client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Partial diagnosis-record fields for the tagged session.
    DiagnosisChunk {
        #[serde(default)]
        session_id: String,
        text: DiagnosisUpdate,
    },
    /// Terminal event of a diagnosis stream.
    DiagnosisDone {
        #[serde(default)]
        session_id: String,
    },
    /// One chat text fragment.
    StreamChunk { text: String },
    /// Terminal sentinel of a chat reply.
    StreamDone,
    /// Channel-level failure of a chat stream.
    StreamError { message: String },
    /// A new chat thread was created for this connection.
    ThreadCreated { thread_id: i64 },
    /// The sidebar thread list should be re-fetched.
    SidebarRefresh { thread_id: i64 },
    /// Connection lifecycle.
    Connected,
    Disconnected,
    ConnectError { message: String },
}

/// Events sent to the service (client -> server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask the service to stream a diagnosis for the final prompt.
    ///
    /// Carries the session identifier so stale responses can be discarded
    /// after a new session supersedes this one.
    StartDiagnosis {
        session_id: String,
        final_prompt: String,
    },
    /// Ask the service to stream a chat reply within a thread.
    StartStreamAnswer { thread_id: i64, message: String },
    /// Ask the service to create a chat thread for this connection.
    StartStatus,
}
