//! Transport collaborators for the MEDIC client.
//!
//! Everything that talks to the diagnosis service lives here: the typed
//! REST client, the event-channel contract with its wire codec, and the
//! endpoint configuration. The domain layer (`medic-core`) never sees a
//! socket or an HTTP status code.

pub mod channel;
pub mod config;
pub mod http;

pub use channel::{EventChannel, MemoryChannel, decode_event, encode_event};
pub use config::TransportConfig;
pub use http::{DiagnosisApi, HttpDiagnosisApi, MediaAnalysis, MediaUpload, SymptomAck};
