//! Session state store.
//!
//! The single source of truth the presentation layer reads from. All
//! mutations go through the named methods below — there is no ambient
//! access, and the orchestration layer owns the only instance, handed to
//! components by explicit composition.
//!
//! Mutations are serialized by the caller (one store behind one lock), so
//! no two mutations ever race on the same field.

use super::assembler::StreamAssembler;
use super::diagnosis::{Diagnosis, DiagnosisUpdate};
use super::message::{ChatMessage, MessageRole};
use super::model::Session;
use super::thread::ChatThread;
use super::wizard::{FollowUpWizard, WizardState};
use crate::error::{MedicError, Result};
use std::collections::HashMap;

/// Holds the active session, the chat transcript, the thread list, and the
/// status flags the presentation layer renders from.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    session: Option<Session>,
    wizard: FollowUpWizard,
    assembler: StreamAssembler,
    threads: Vec<ChatThread>,
    current_thread_id: Option<i64>,
    loading: bool,
    awaiting_reply: bool,
    error: Option<String>,
}

impl SessionStore {
    /// Creates an empty store: no session, no transcript, no threads.
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================================================
    // Session lifecycle
    // ============================================================================

    /// Starts a fresh session for the given symptoms, superseding any
    /// previous one.
    ///
    /// The wizard is recreated, and the new session identifier immediately
    /// invalidates diagnosis responses still in flight for the old session.
    /// The chat transcript is thread-scoped and survives.
    pub fn begin_session(&mut self, symptoms: impl Into<String>) -> &Session {
        self.session = Some(Session::new(symptoms));
        self.wizard = FollowUpWizard::new();
        self.error = None;
        // Safe to unwrap because we just set the session
        self.session.as_ref().unwrap()
    }

    /// Returns the active session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the active session's identifier, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| MedicError::session("no active session"))
    }

    /// Replaces the symptom text with the service-normalized form.
    pub fn set_symptoms(&mut self, symptoms: impl Into<String>) -> Result<()> {
        let session = self.session_mut()?;
        session.symptoms = symptoms.into();
        session.touch();
        Ok(())
    }

    /// Records the personal-info line (age, gender).
    pub fn set_user_info(&mut self, user_info: impl Into<String>) -> Result<()> {
        let session = self.session_mut()?;
        session.user_info = user_info.into();
        session.touch();
        Ok(())
    }

    /// Stores the server-assigned follow-up questions and loads the wizard.
    pub fn set_questions(&mut self, questions: Vec<String>) -> Result<()> {
        let session = self.session_mut()?;
        session.follow_up_questions = questions.clone();
        session.touch();
        self.wizard.load_questions(questions)
    }

    /// Stores the final prompt synthesized by the service.
    pub fn set_final_prompt(&mut self, prompt: impl Into<String>) -> Result<()> {
        let session = self.session_mut()?;
        session.final_prompt = prompt.into();
        session.touch();
        Ok(())
    }

    /// Stores the audio URL produced by voice analysis.
    pub fn set_audio_url(&mut self, url: impl Into<String>) -> Result<()> {
        let session = self.session_mut()?;
        session.audio_url = url.into();
        session.touch();
        Ok(())
    }

    // ============================================================================
    // Wizard
    // ============================================================================

    /// Returns the wizard state for rendering.
    pub fn wizard_state(&self) -> &WizardState {
        self.wizard.state()
    }

    /// Returns the question currently presented, if any.
    pub fn current_question(&self) -> Option<&str> {
        self.wizard.current_question()
    }

    /// Returns the recorded answer for the current question, if any.
    pub fn current_answer(&self) -> Option<&str> {
        self.wizard.current_answer()
    }

    /// Records the answer for the current question.
    pub fn answer_current(&mut self, text: impl Into<String>) -> Result<()> {
        self.wizard.answer(text)
    }

    /// Advances to the next question.
    pub fn next_question(&mut self) -> Result<()> {
        self.wizard.next()
    }

    /// Returns to the previous question.
    pub fn prev_question(&mut self) -> Result<()> {
        self.wizard.prev()
    }

    /// Begins the submission, yielding the question->answer map.
    ///
    /// See [`FollowUpWizard::begin_submit`] for the double-submission guard.
    pub fn begin_submit(&mut self) -> Result<HashMap<String, String>> {
        self.wizard.begin_submit()
    }

    /// Records that the submission failed; the wizard becomes retryable.
    pub fn submit_failed(&mut self) {
        self.wizard.submit_failed();
    }

    /// Records the accepted answers on the session and terminates the wizard.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer key set does not exactly equal the
    /// question set.
    pub fn submit_succeeded(&mut self, answers: HashMap<String, String>) -> Result<()> {
        let session = self.session_mut()?;
        session.answers = answers;
        if !session.answers_complete() {
            session.answers.clear();
            return Err(MedicError::session(
                "submitted answers do not cover the question list",
            ));
        }
        session.touch();
        self.wizard.submit_succeeded();
        Ok(())
    }

    // ============================================================================
    // Diagnosis
    // ============================================================================

    /// Replaces the diagnosis wholesale with a complete record.
    ///
    /// Returns `false` (and leaves the store untouched) when the response is
    /// tagged with a session identifier other than the current session's —
    /// the stale-response guard for superseded sessions.
    pub fn set_diagnosis(&mut self, session_id: &str, diagnosis: Diagnosis) -> bool {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => {
                session.diagnosis = diagnosis;
                session.touch();
                true
            }
            _ => false,
        }
    }

    /// Merges one streamed partial record into the diagnosis.
    ///
    /// Only the fields present in the chunk are overwritten. Returns `false`
    /// for stale or unknown session identifiers, as [`Self::set_diagnosis`].
    pub fn apply_diagnosis_update(&mut self, session_id: &str, update: DiagnosisUpdate) -> bool {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => {
                session.diagnosis.apply(update);
                session.touch();
                true
            }
            _ => false,
        }
    }

    // ============================================================================
    // Chat transcript
    // ============================================================================

    /// Returns the chat transcript.
    pub fn messages(&self) -> &[ChatMessage] {
        self.assembler.messages()
    }

    /// Appends a locally entered user message and returns it.
    pub fn push_user_message(&mut self, text: impl Into<String>) -> &ChatMessage {
        let message = ChatMessage::new(MessageRole::User, text);
        self.assembler.push_complete(message);
        // Safe to unwrap because we just pushed a message
        self.messages().last().unwrap()
    }

    /// Applies one streamed reply fragment.
    pub fn append_stream_fragment(&mut self, role: MessageRole, fragment: &str) {
        self.awaiting_reply = false;
        self.assembler.push(role, fragment);
    }

    /// Closes the in-progress reply (terminal sentinel received).
    pub fn finish_stream(&mut self) {
        self.awaiting_reply = false;
        self.assembler.finish();
    }

    /// Records a stream failure: typing indication stops, partial content
    /// stays, and the error banner is raised.
    pub fn stream_failed(&mut self, message: impl Into<String>) {
        self.awaiting_reply = false;
        self.assembler.fail();
        self.error = Some(message.into());
    }

    /// Replaces the transcript with a stored thread's messages.
    pub fn load_transcript(&mut self, messages: Vec<ChatMessage>) {
        self.assembler.load(messages);
        self.awaiting_reply = false;
    }

    // ============================================================================
    // Threads
    // ============================================================================

    /// Returns the sidebar thread list.
    pub fn threads(&self) -> &[ChatThread] {
        &self.threads
    }

    /// Replaces the sidebar thread list.
    pub fn set_threads(&mut self, threads: Vec<ChatThread>) {
        self.threads = threads;
    }

    /// Returns the currently open thread, if any.
    pub fn current_thread_id(&self) -> Option<i64> {
        self.current_thread_id
    }

    /// Switches the currently open thread.
    pub fn set_current_thread(&mut self, thread_id: i64) {
        self.current_thread_id = Some(thread_id);
    }

    // ============================================================================
    // Status flags
    // ============================================================================

    /// Whether a request/response operation is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Sets the in-flight flag for request/response operations.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Whether a chat reply has been requested but no fragment arrived yet.
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Sets the typing-indicator flag.
    pub fn set_awaiting_reply(&mut self, awaiting: bool) {
        self.awaiting_reply = awaiting;
    }

    /// Returns the current error banner text, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Raises the error banner.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clears the error banner.
    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_questions(questions: &[&str]) -> SessionStore {
        let mut store = SessionStore::new();
        store.begin_session("fever and cough");
        store
            .set_questions(questions.iter().map(|q| q.to_string()).collect())
            .unwrap();
        store
    }

    #[test]
    fn begin_session_supersedes_the_previous_one() {
        let mut store = SessionStore::new();
        let first_id = store.begin_session("fever").id.clone();
        store.set_questions(vec!["How long?".to_string()]).unwrap();

        let second_id = store.begin_session("headache").id.clone();
        assert_ne!(first_id, second_id);
        // The wizard was recreated for the new session.
        assert_eq!(*store.wizard_state(), WizardState::Idle);
        assert!(store.session().unwrap().follow_up_questions.is_empty());
    }

    #[test]
    fn stale_diagnosis_responses_are_discarded() {
        let mut store = store_with_questions(&["How long?"]);
        let old_id = store.session_id().unwrap().to_string();

        store.begin_session("new symptoms");

        let stale = Diagnosis {
            disease_name: "Old disease".to_string(),
            ..Default::default()
        };
        assert!(!store.set_diagnosis(&old_id, stale));
        assert!(store.session().unwrap().diagnosis.is_empty());

        assert!(!store.apply_diagnosis_update(
            &old_id,
            DiagnosisUpdate {
                disease_name: Some("Old disease".to_string()),
                ..Default::default()
            }
        ));
        assert!(store.session().unwrap().diagnosis.is_empty());
    }

    #[test]
    fn matching_session_id_applies_the_diagnosis() {
        let mut store = store_with_questions(&["How long?"]);
        let session_id = store.session_id().unwrap().to_string();

        let diagnosis = Diagnosis {
            disease_name: "Influenza".to_string(),
            ..Default::default()
        };
        assert!(store.set_diagnosis(&session_id, diagnosis));
        assert_eq!(store.session().unwrap().diagnosis.disease_name, "Influenza");
    }

    #[test]
    fn submit_succeeded_enforces_the_answer_invariant() {
        let mut store = store_with_questions(&["How long?", "Severity 1-10?"]);

        let mut partial = HashMap::new();
        partial.insert("How long?".to_string(), "3 days".to_string());
        assert!(store.submit_succeeded(partial).is_err());
        assert!(store.session().unwrap().answers.is_empty());

        let mut complete = HashMap::new();
        complete.insert("How long?".to_string(), "3 days".to_string());
        complete.insert("Severity 1-10?".to_string(), "6".to_string());
        store.submit_succeeded(complete).unwrap();
        assert_eq!(store.session().unwrap().answers.len(), 2);
    }

    #[test]
    fn stream_failure_keeps_partial_content_and_raises_the_banner() {
        let mut store = SessionStore::new();
        store.set_awaiting_reply(true);
        store.append_stream_fragment(MessageRole::Assistant, "partial");
        store.stream_failed("connection lost");

        assert!(!store.is_awaiting_reply());
        assert_eq!(store.error(), Some("connection lost"));
        assert_eq!(store.messages()[0].content, "partial");
    }

    #[test]
    fn first_fragment_stops_the_typing_indicator() {
        let mut store = SessionStore::new();
        store.push_user_message("hello");
        store.set_awaiting_reply(true);

        store.append_stream_fragment(MessageRole::Assistant, "Hi");
        assert!(!store.is_awaiting_reply());
        assert_eq!(store.messages().len(), 2);
    }
}
