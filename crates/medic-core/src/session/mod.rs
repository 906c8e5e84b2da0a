//! Session domain module.
//!
//! This module contains all session-related domain models, the follow-up
//! wizard state machine, the streaming-reply assembler, and the session
//! state store.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`)
//! - `message`: Chat transcript message types (`MessageRole`, `ChatMessage`)
//! - `diagnosis`: Diagnosis record types (`Diagnosis`, `Medicine`, `DiagnosisUpdate`)
//! - `wizard`: Follow-up question state machine (`FollowUpWizard`, `WizardState`)
//! - `assembler`: Streamed-reply assembly (`StreamAssembler`)
//! - `store`: Session state store (`SessionStore`)
//! - `event`: Event-channel message types (`ServerEvent`, `ClientEvent`)
//! - `thread`: Chat thread summaries (`ChatThread`)

mod assembler;
mod diagnosis;
mod event;
mod message;
mod model;
mod store;
mod thread;
mod wizard;

// Re-export public API
pub use assembler::StreamAssembler;
pub use diagnosis::{Diagnosis, DiagnosisUpdate, Medicine};
pub use event::{ClientEvent, ServerEvent};
pub use message::{ChatMessage, MessageRole};
pub use model::Session;
pub use store::SessionStore;
pub use thread::ChatThread;
pub use wizard::{FollowUpWizard, WizardState};
