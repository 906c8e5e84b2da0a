//! Event channel contract and wire codec.
//!
//! The diagnosis service pushes streamed replies and diagnosis chunks over
//! a bidirectional event socket. The physical connection (and its
//! reconnection policy) belongs to the channel implementation; this module
//! defines the client-side contract and the mapping between the socket's
//! event names/payloads and the typed events in `medic-core`.

use async_trait::async_trait;
use medic_core::session::{ClientEvent, ServerEvent};
use medic_core::{MedicError, Result};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// The in-band sentinel the service sends to close a chat reply.
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";

/// Client side of the bidirectional event channel.
///
/// Implementations own the connection: they deliver decoded incoming
/// events on the mpsc receiver handed out at construction, and they are
/// responsible for reconnecting on their own (surfacing `Disconnected` /
/// `ConnectError` events while they do).
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Sends one client event to the service.
    async fn emit(&self, event: ClientEvent) -> anyhow::Result<()>;
}

/// Decodes one incoming socket event into a [`ServerEvent`].
///
/// Payload tolerance follows the service's habits: `stream_chunk` carries a
/// raw string (with the `[DONE]` sentinel in-band), `diagnosis_chunk` wraps
/// its record in a `text` field and reports failures via an `error` field,
/// and missing fields default rather than fail.
///
/// # Errors
///
/// Returns an error for event names this client does not know.
pub fn decode_event(name: &str, payload: Value) -> Result<ServerEvent> {
    match name {
        "stream_chunk" => {
            let text = payload
                .as_str()
                .map(str::to_string)
                .or_else(|| {
                    payload
                        .get("text")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_default();

            if text == STREAM_DONE_SENTINEL {
                Ok(ServerEvent::StreamDone)
            } else {
                Ok(ServerEvent::StreamChunk { text })
            }
        }
        "diagnosis_chunk" => {
            if let Some(error) = payload.get("error").and_then(Value::as_str) {
                return Ok(ServerEvent::StreamError {
                    message: error.to_string(),
                });
            }

            let session_id = string_field(&payload, "session_id");
            let text = payload.get("text").cloned().unwrap_or(Value::Null);
            let update = serde_json::from_value(text).unwrap_or_default();
            Ok(ServerEvent::DiagnosisChunk {
                session_id,
                text: update,
            })
        }
        "diagnosis_done" => Ok(ServerEvent::DiagnosisDone {
            session_id: string_field(&payload, "session_id"),
        }),
        "stream_error" => Ok(ServerEvent::StreamError {
            message: message_field(&payload),
        }),
        "thread_created" => Ok(ServerEvent::ThreadCreated {
            thread_id: payload
                .get("thread_id")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        }),
        "trigger_sidebar_fetch" => Ok(ServerEvent::SidebarRefresh {
            thread_id: payload
                .get("thread_id")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        }),
        "connect" => Ok(ServerEvent::Connected),
        "disconnect" => Ok(ServerEvent::Disconnected),
        "connect_error" => Ok(ServerEvent::ConnectError {
            message: message_field(&payload),
        }),
        other => Err(MedicError::channel(format!("unknown channel event: {other}"))),
    }
}

/// Encodes one [`ClientEvent`] into its socket event name and payload.
pub fn encode_event(event: &ClientEvent) -> (&'static str, Value) {
    match event {
        ClientEvent::StartDiagnosis {
            session_id,
            final_prompt,
        } => (
            "start_diagnosis",
            json!({ "session_id": session_id, "finalPrompt": final_prompt }),
        ),
        ClientEvent::StartStreamAnswer { thread_id, message } => (
            "start_stream_answer",
            json!({ "thread_id": thread_id, "message": message }),
        ),
        ClientEvent::StartStatus => ("start_status", json!({})),
    }
}

fn string_field(payload: &Value, field: &str) -> String {
    payload
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn message_field(payload: &Value) -> String {
    payload
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| string_field(payload, "message"))
}

/// In-memory channel for tests and offline development.
///
/// Emitted client events are recorded; server events are injected by hand
/// and delivered on the receiver exactly as a live channel would deliver
/// decoded socket events.
pub struct MemoryChannel {
    sent: Mutex<Vec<ClientEvent>>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl MemoryChannel {
    /// Creates the channel and the receiver carrying injected server events.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                server_tx,
            }),
            server_rx,
        )
    }

    /// Injects a server->client event.
    pub fn push_server_event(&self, event: ServerEvent) {
        let _ = self.server_tx.send(event);
    }

    /// Returns the client->server events emitted so far.
    pub fn sent(&self) -> Vec<ClientEvent> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn emit(&self, event: ClientEvent) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("memory channel lock poisoned"))?
            .push(event);
        Ok(())
    }
}
