//! Session domain model.
//!
//! This module contains the core Session entity that represents one
//! end-to-end symptom-to-diagnosis interaction.

use super::diagnosis::Diagnosis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents one symptom-to-diagnosis interaction.
///
/// A session contains:
/// - The reported symptom description and personal info line
/// - The server-assigned follow-up questions (immutable once received)
/// - The user's answer for each question, keyed by the question text
/// - The synthesized final prompt and the resulting diagnosis
/// - Timestamps for creation and last update
///
/// A session has no explicit destruction: starting a new one supersedes it
/// wholesale, which is also what invalidates any still-in-flight responses
/// tagged with the old identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// The user's symptom description, as normalized by the service
    pub symptoms: String,
    /// Free-text personal info line (age, gender)
    #[serde(default)]
    pub user_info: String,
    /// Server-assigned follow-up questions, in presentation order
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    /// Answers keyed by question text
    #[serde(default)]
    pub answers: HashMap<String, String>,
    /// The final prompt synthesized from symptoms and answers
    #[serde(default)]
    pub final_prompt: String,
    /// The diagnosis for this session
    #[serde(default)]
    pub diagnosis: Diagnosis,
    /// URL of the spoken-diagnosis audio, when voice analysis was used
    #[serde(default)]
    pub audio_url: String,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
}

impl Session {
    /// Creates a fresh session for the given symptom description.
    pub fn new(symptoms: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symptoms: symptoms.into(),
            user_info: String::new(),
            follow_up_questions: Vec::new(),
            answers: HashMap::new(),
            final_prompt: String::new(),
            diagnosis: Diagnosis::default(),
            audio_url: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Returns true when the answer key set exactly equals the question set.
    ///
    /// This is the submission invariant: every question answered with a
    /// non-whitespace answer, and no extra keys.
    pub fn answers_complete(&self) -> bool {
        self.answers.len() == self.follow_up_questions.len()
            && self
                .follow_up_questions
                .iter()
                .all(|q| self.answers.get(q).is_some_and(|a| !a.trim().is_empty()))
    }

    /// Updates the last-modified timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
