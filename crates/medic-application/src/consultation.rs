//! Consultation use case implementation.
//!
//! This module provides the `ConsultationService` which orchestrates the
//! symptom -> follow-up -> final-prompt -> diagnosis pipeline across the
//! session store and the transport collaborators, and dispatches incoming
//! channel events into the store.

use medic_core::session::{
    ClientEvent, MessageRole, ServerEvent, SessionStore, WizardState,
};
use medic_core::{MedicError, Result};
use medic_transport::http::{DiagnosisApi, MediaAnalysis, MediaUpload};
use medic_transport::channel::EventChannel;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Use case driving one consultation at a time.
///
/// `ConsultationService` coordinates the [`SessionStore`] with the REST API
/// and the event channel. The store is the only state; the service never
/// caches anything of its own, so every read the presentation layer makes
/// goes through the same source of truth.
///
/// # Concurrency
///
/// All store mutations happen behind one `RwLock`, so they are serialized.
/// The lock is never held across a network call: each pipeline step
/// re-acquires it and re-checks that its session is still the current one,
/// which is what discards responses that arrive after a new session has
/// superseded theirs.
pub struct ConsultationService {
    /// Single source of truth for the presentation layer
    store: Arc<RwLock<SessionStore>>,
    /// Request/response collaborator
    api: Arc<dyn DiagnosisApi>,
    /// Bidirectional event channel collaborator
    channel: Arc<dyn EventChannel>,
}

impl ConsultationService {
    /// Creates a service with an empty store.
    ///
    /// # Arguments
    ///
    /// * `api` - The request/response collaborator
    /// * `channel` - The event channel collaborator
    pub fn new(api: Arc<dyn DiagnosisApi>, channel: Arc<dyn EventChannel>) -> Self {
        Self {
            store: Arc::new(RwLock::new(SessionStore::new())),
            api,
            channel,
        }
    }

    /// Returns the shared store for the presentation layer to read from.
    pub fn store(&self) -> Arc<RwLock<SessionStore>> {
        Arc::clone(&self.store)
    }

    // ============================================================================
    // Session pipeline
    // ============================================================================

    /// Starts a new consultation session from a symptom description.
    ///
    /// Supersedes any previous session immediately, submits the symptoms,
    /// and loads the generated follow-up questions into the wizard.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank input; transport failures are
    /// also surfaced on the store's error banner for retry.
    pub async fn start_session(&self, symptoms: &str) -> Result<String> {
        let symptoms = symptoms.trim();
        if symptoms.is_empty() {
            return Err(MedicError::validation("describe your symptoms first"));
        }

        {
            let mut store = self.store.write().await;
            store.set_loading(true);
            store.clear_error();
        }

        let result = self.start_session_inner(symptoms).await;

        let mut store = self.store.write().await;
        store.set_loading(false);
        if let Err(err) = &result {
            store.set_error(err.to_string());
        }

        result
    }

    async fn start_session_inner(&self, symptoms: &str) -> Result<String> {
        let session_id = {
            let mut store = self.store.write().await;
            store.begin_session(symptoms).id.clone()
        };
        tracing::info!("Starting consultation session: {}", session_id);

        let ack = self.api.submit_symptoms(&session_id, symptoms).await?;
        let questions = self.api.generate_follow_up(&session_id, &ack.symptoms).await?;

        let mut store = self.store.write().await;
        if store.session_id() != Some(session_id.as_str()) {
            return Err(MedicError::session("session was superseded while starting"));
        }
        store.set_symptoms(ack.symptoms)?;
        store.set_questions(questions)?;
        Ok(session_id)
    }

    /// Submits the personal-info line (age, gender) for the session.
    pub async fn submit_personal_info(&self, user_info: &str) -> Result<()> {
        let user_info = user_info.trim();
        if user_info.is_empty() {
            return Err(MedicError::validation("personal info must not be empty"));
        }

        let session_id = self
            .current_session_id()
            .await
            .ok_or_else(|| MedicError::session("no active session"))?;

        match self.api.submit_personal_info(&session_id, user_info).await {
            Ok(normalized) => {
                let mut store = self.store.write().await;
                if store.session_id() == Some(session_id.as_str()) {
                    store.set_user_info(normalized)?;
                }
                Ok(())
            }
            Err(err) => {
                self.store.write().await.set_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Records the answer for the currently presented question.
    pub async fn answer_current(&self, text: &str) -> Result<()> {
        self.store.write().await.answer_current(text)
    }

    /// Advances the wizard to the next question.
    pub async fn next_question(&self) -> Result<()> {
        self.store.write().await.next_question()
    }

    /// Returns the wizard to the previous question.
    pub async fn prev_question(&self) -> Result<()> {
        self.store.write().await.prev_question()
    }

    /// Submits the completed assessment and requests the diagnosis.
    ///
    /// Runs the whole remaining pipeline: answer submission, final-prompt
    /// generation, `start_diagnosis` on the event channel, and the complete
    /// diagnosis record over the REST API.
    ///
    /// A second invocation while the first is still pending is a no-op:
    /// the wizard's `Submitting` state guards against duplicate network
    /// submissions. On failure the wizard returns to `ReadyToSubmit` and
    /// the error banner is raised for retry.
    pub async fn complete_assessment(&self) -> Result<()> {
        let (session_id, symptoms, answers) = {
            let mut store = self.store.write().await;
            if *store.wizard_state() == WizardState::Submitting {
                tracing::debug!("submission already in flight, ignoring duplicate request");
                return Ok(());
            }

            let session = store
                .session()
                .ok_or_else(|| MedicError::session("no active session"))?;
            let session_id = session.id.clone();
            let symptoms = session.symptoms.clone();
            let answers = store.begin_submit()?;
            (session_id, symptoms, answers)
        };

        match self.run_submission(&session_id, &symptoms, answers).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut store = self.store.write().await;
                if store.session_id() == Some(session_id.as_str()) {
                    store.submit_failed();
                    store.set_error(err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn run_submission(
        &self,
        session_id: &str,
        symptoms: &str,
        answers: HashMap<String, String>,
    ) -> Result<()> {
        let formatted = self
            .api
            .submit_followup_answers(session_id, symptoms, &answers)
            .await?;
        let prompt = self
            .api
            .generate_final_prompt(session_id, symptoms, &formatted)
            .await?;

        {
            let mut store = self.store.write().await;
            if store.session_id() != Some(session_id) {
                return Err(MedicError::session("session was superseded during submission"));
            }
            store.set_final_prompt(prompt.clone())?;
        }

        self.channel
            .emit(ClientEvent::StartDiagnosis {
                session_id: session_id.to_string(),
                final_prompt: prompt.clone(),
            })
            .await
            .map_err(|err| MedicError::channel(err.to_string()))?;

        let diagnosis = self.api.get_final_diagnosis(session_id, &prompt).await?;

        let mut store = self.store.write().await;
        if store.session_id() != Some(session_id) {
            tracing::warn!("Discarding diagnosis for superseded session: {}", session_id);
            return Err(MedicError::session("session was superseded during submission"));
        }
        store.submit_succeeded(answers)?;
        store.set_diagnosis(session_id, diagnosis);
        tracing::info!("Assessment submitted and diagnosis stored: {}", session_id);
        Ok(())
    }

    /// Analyzes an image together with a voice recording.
    pub async fn analyze_image_and_voice(
        &self,
        image: MediaUpload,
        audio: MediaUpload,
    ) -> Result<MediaAnalysis> {
        {
            let mut store = self.store.write().await;
            store.set_loading(true);
            store.clear_error();
        }

        let result = self.api.analyze_image_and_voice(image, audio).await;

        let mut store = self.store.write().await;
        store.set_loading(false);
        match result {
            Ok(analysis) => {
                if store.session().is_some() && !analysis.audio_url.is_empty() {
                    store.set_audio_url(analysis.audio_url.clone())?;
                }
                Ok(analysis)
            }
            Err(err) => {
                store.set_error(err.to_string());
                Err(err)
            }
        }
    }

    // ============================================================================
    // Chat
    // ============================================================================

    /// Sends a chat message within the open thread.
    ///
    /// The message is appended to the transcript immediately; the reply
    /// arrives as `stream_chunk` events handled by the event loop.
    pub async fn send_chat_message(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MedicError::validation("message must not be empty"));
        }

        let thread_id = self
            .store
            .read()
            .await
            .current_thread_id()
            .ok_or_else(|| MedicError::session("no chat thread is open"))?;

        {
            let mut store = self.store.write().await;
            store.push_user_message(text);
            store.set_awaiting_reply(true);
            store.clear_error();
        }

        if let Err(err) = self
            .channel
            .emit(ClientEvent::StartStreamAnswer {
                thread_id,
                message: text.to_string(),
            })
            .await
        {
            let err = MedicError::channel(err.to_string());
            let mut store = self.store.write().await;
            store.set_awaiting_reply(false);
            store.set_error(err.to_string());
            return Err(err);
        }

        Ok(())
    }

    /// Opens a stored thread and loads its transcript.
    pub async fn open_thread(&self, thread_id: i64) -> Result<()> {
        let messages = self.api.messages_by_thread(thread_id).await?;
        let mut store = self.store.write().await;
        store.set_current_thread(thread_id);
        store.load_transcript(messages);
        Ok(())
    }

    /// Re-fetches the sidebar thread list.
    pub async fn refresh_threads(&self) -> Result<()> {
        let threads = self.api.thread_summaries().await?;
        self.store.write().await.set_threads(threads);
        Ok(())
    }

    /// Makes sure a chat thread is open, creating the initial one if needed.
    pub async fn ensure_initial_thread(&self) -> Result<i64> {
        if let Some(thread_id) = self.store.read().await.current_thread_id() {
            return Ok(thread_id);
        }

        let thread_id = match self.api.initial_thread().await? {
            Some(thread) => thread.id,
            None => self.api.create_initial_thread().await?,
        };

        self.open_thread(thread_id).await?;
        Ok(thread_id)
    }

    // ============================================================================
    // Channel events
    // ============================================================================

    /// Dispatches one incoming channel event into the store.
    pub async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::StreamChunk { text } => {
                self.store
                    .write()
                    .await
                    .append_stream_fragment(MessageRole::Assistant, &text);
            }
            ServerEvent::StreamDone => {
                self.store.write().await.finish_stream();
            }
            ServerEvent::StreamError { message } => {
                self.store.write().await.stream_failed(message);
            }
            ServerEvent::DiagnosisChunk { session_id, text } => {
                let mut store = self.store.write().await;
                if !store.apply_diagnosis_update(&session_id, text) {
                    tracing::warn!("Discarding diagnosis chunk for superseded session: {}", session_id);
                }
            }
            ServerEvent::DiagnosisDone { session_id } => {
                tracing::info!("Diagnosis stream complete: {}", session_id);
                self.store.write().await.set_loading(false);
            }
            ServerEvent::ThreadCreated { thread_id } => {
                self.store.write().await.set_current_thread(thread_id);
            }
            ServerEvent::SidebarRefresh { thread_id } => {
                tracing::debug!("Sidebar refresh requested for thread {}", thread_id);
                if let Err(err) = self.refresh_threads().await {
                    tracing::warn!("sidebar refresh failed: {}", err);
                }
            }
            ServerEvent::Connected => {
                self.store.write().await.clear_error();
            }
            ServerEvent::Disconnected => {
                self.store
                    .write()
                    .await
                    .set_error("connection to the assistant lost");
            }
            ServerEvent::ConnectError { message } => {
                self.store
                    .write()
                    .await
                    .set_error(format!("cannot reach the assistant: {message}"));
            }
        }
    }

    /// Spawns the loop that drains the channel receiver into the store.
    ///
    /// Runs until the token is cancelled or the channel closes.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ServerEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => service.handle_server_event(event).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("channel event loop stopped");
        })
    }

    async fn current_session_id(&self) -> Option<String> {
        self.store.read().await.session_id().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medic_core::session::{ChatMessage, ChatThread, Diagnosis, DiagnosisUpdate};
    use medic_transport::channel::MemoryChannel;
    use medic_transport::http::SymptomAck;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Mock DiagnosisApi for testing
    #[derive(Default)]
    struct MockDiagnosisApi {
        questions: Vec<String>,
        disease_name: String,
        submit_delay: Duration,
        failing_submissions: AtomicUsize,
        submit_calls: AtomicUsize,
    }

    impl MockDiagnosisApi {
        fn new(questions: &[&str], disease_name: &str) -> Self {
            Self {
                questions: questions.iter().map(|q| q.to_string()).collect(),
                disease_name: disease_name.to_string(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl DiagnosisApi for MockDiagnosisApi {
        async fn submit_symptoms(&self, session_id: &str, symptoms: &str) -> Result<SymptomAck> {
            Ok(SymptomAck {
                session_id: session_id.to_string(),
                symptoms: symptoms.to_string(),
            })
        }

        async fn submit_personal_info(&self, _session_id: &str, user_info: &str) -> Result<String> {
            Ok(user_info.to_string())
        }

        async fn generate_follow_up(
            &self,
            _session_id: &str,
            _symptoms: &str,
        ) -> Result<Vec<String>> {
            Ok(self.questions.clone())
        }

        async fn submit_followup_answers(
            &self,
            _session_id: &str,
            _symptoms: &str,
            answers: &HashMap<String, String>,
        ) -> Result<HashMap<String, String>> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if !self.submit_delay.is_zero() {
                tokio::time::sleep(self.submit_delay).await;
            }

            let remaining = self.failing_submissions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_submissions.store(remaining - 1, Ordering::SeqCst);
                return Err(MedicError::transport_retryable("service unavailable"));
            }

            Ok(answers.clone())
        }

        async fn generate_final_prompt(
            &self,
            _session_id: &str,
            symptoms: &str,
            _formatted_response: &HashMap<String, String>,
        ) -> Result<String> {
            Ok(format!("Final prompt for: {symptoms}"))
        }

        async fn get_final_diagnosis(
            &self,
            _session_id: &str,
            _final_prompt: &str,
        ) -> Result<Diagnosis> {
            Ok(Diagnosis {
                disease_name: self.disease_name.clone(),
                ..Default::default()
            })
        }

        async fn analyze_image_and_voice(
            &self,
            _image: MediaUpload,
            _audio: MediaUpload,
        ) -> Result<MediaAnalysis> {
            Ok(MediaAnalysis {
                diagnosis: "mild skin irritation".to_string(),
                audio_url: "http://localhost/audio.mp3".to_string(),
            })
        }

        async fn create_initial_thread(&self) -> Result<i64> {
            Ok(1)
        }

        async fn initial_thread(&self) -> Result<Option<ChatThread>> {
            Ok(None)
        }

        async fn messages_by_thread(&self, _thread_id: i64) -> Result<Vec<ChatMessage>> {
            Ok(Vec::new())
        }

        async fn thread_summaries(&self) -> Result<Vec<ChatThread>> {
            Ok(vec![ChatThread {
                id: 1,
                title: "I have a headache".to_string(),
                created_at: "2024-05-01T10:00:00Z".to_string(),
            }])
        }
    }

    fn service_with(
        api: MockDiagnosisApi,
    ) -> (
        Arc<ConsultationService>,
        Arc<MockDiagnosisApi>,
        Arc<MemoryChannel>,
    ) {
        let api = Arc::new(api);
        let (channel, _events) = MemoryChannel::new();
        let service = Arc::new(ConsultationService::new(api.clone(), channel.clone()));
        (service, api, channel)
    }

    async fn answer_all(service: &ConsultationService, answers: &[&str]) {
        for answer in answers {
            service.answer_current(answer).await.unwrap();
            service.next_question().await.unwrap();
        }
    }

    #[tokio::test]
    async fn start_session_loads_the_wizard() {
        let (service, _api, _channel) =
            service_with(MockDiagnosisApi::new(&["How long?", "Severity 1-10?"], ""));

        service.start_session("fever and cough").await.unwrap();

        let store = service.store();
        let store = store.read().await;
        assert_eq!(*store.wizard_state(), WizardState::Active { cursor: 0 });
        assert_eq!(store.current_question(), Some("How long?"));
        assert!(!store.is_loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn blank_symptoms_are_rejected_before_any_network_call() {
        let (service, _api, _channel) = service_with(MockDiagnosisApi::new(&[], ""));

        let err = service.start_session("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(service.store().read().await.session().is_none());
    }

    #[tokio::test]
    async fn complete_assessment_runs_the_full_pipeline() {
        let api = MockDiagnosisApi::new(&["How long?", "Severity 1-10?"], "Viral Fever");
        let (service, api, channel) = service_with(api);

        let session_id = service.start_session("fever and cough").await.unwrap();
        answer_all(&service, &["3 days", "6"]).await;
        service.complete_assessment().await.unwrap();

        let store = service.store();
        let store = store.read().await;
        let session = store.session().unwrap();
        assert_eq!(session.diagnosis.disease_name, "Viral Fever");
        assert_eq!(session.answers["How long?"], "3 days");
        assert_eq!(session.final_prompt, "Final prompt for: fever and cough");
        assert_eq!(*store.wizard_state(), WizardState::Submitted);

        assert_eq!(
            channel.sent(),
            vec![ClientEvent::StartDiagnosis {
                session_id,
                final_prompt: "Final prompt for: fever and cough".to_string(),
            }]
        );
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_submission_is_a_single_network_call() {
        let mut api = MockDiagnosisApi::new(&["How long?"], "Viral Fever");
        api.submit_delay = Duration::from_millis(50);
        let (service, api, _channel) = service_with(api);

        service.start_session("fever").await.unwrap();
        answer_all(&service, &["3 days"]).await;

        let (first, second) =
            tokio::join!(service.complete_assessment(), service.complete_assessment());
        first.unwrap();
        second.unwrap();

        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);
        let store = service.store();
        assert_eq!(*store.read().await.wizard_state(), WizardState::Submitted);
    }

    #[tokio::test]
    async fn failed_submission_surfaces_a_retryable_state() {
        let api = MockDiagnosisApi::new(&["How long?"], "Viral Fever");
        api.failing_submissions.store(1, Ordering::SeqCst);
        let (service, api, _channel) = service_with(api);

        service.start_session("fever").await.unwrap();
        answer_all(&service, &["3 days"]).await;

        let err = service.complete_assessment().await.unwrap_err();
        assert!(err.is_retryable());
        {
            let store = service.store();
            let store = store.read().await;
            assert_eq!(*store.wizard_state(), WizardState::ReadyToSubmit);
            assert!(store.error().is_some());
        }

        // The retry goes through.
        service.complete_assessment().await.unwrap();
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 2);
        let store = service.store();
        assert_eq!(*store.read().await.wizard_state(), WizardState::Submitted);
    }

    #[tokio::test]
    async fn stale_diagnosis_chunks_are_discarded() {
        let (service, _api, _channel) =
            service_with(MockDiagnosisApi::new(&["How long?"], ""));
        let session_id = service.start_session("fever").await.unwrap();

        service
            .handle_server_event(ServerEvent::DiagnosisChunk {
                session_id: "some-old-session".to_string(),
                text: DiagnosisUpdate {
                    disease_name: Some("Old disease".to_string()),
                    ..Default::default()
                },
            })
            .await;
        assert!(
            service
                .store()
                .read()
                .await
                .session()
                .unwrap()
                .diagnosis
                .is_empty()
        );

        service
            .handle_server_event(ServerEvent::DiagnosisChunk {
                session_id,
                text: DiagnosisUpdate {
                    disease_name: Some("Influenza".to_string()),
                    ..Default::default()
                },
            })
            .await;
        assert_eq!(
            service
                .store()
                .read()
                .await
                .session()
                .unwrap()
                .diagnosis
                .disease_name,
            "Influenza"
        );
    }

    #[tokio::test]
    async fn chat_reply_fragments_assemble_into_the_transcript() {
        let (service, _api, channel) = service_with(MockDiagnosisApi::new(&[], ""));

        service
            .handle_server_event(ServerEvent::ThreadCreated { thread_id: 5 })
            .await;
        service.send_chat_message("I have a headache").await.unwrap();
        assert!(service.store().read().await.is_awaiting_reply());
        assert_eq!(
            channel.sent(),
            vec![ClientEvent::StartStreamAnswer {
                thread_id: 5,
                message: "I have a headache".to_string(),
            }]
        );

        service
            .handle_server_event(ServerEvent::StreamChunk { text: "How long".to_string() })
            .await;
        service
            .handle_server_event(ServerEvent::StreamChunk { text: " has it hurt?".to_string() })
            .await;
        service.handle_server_event(ServerEvent::StreamDone).await;
        service
            .handle_server_event(ServerEvent::StreamChunk { text: "Anything else?".to_string() })
            .await;

        let store = service.store();
        let store = store.read().await;
        let messages = store.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "I have a headache");
        assert_eq!(messages[1].content, "How long has it hurt?");
        assert_eq!(messages[2].content, "Anything else?");
        assert!(!store.is_awaiting_reply());
    }

    #[tokio::test]
    async fn chat_message_requires_an_open_thread() {
        let (service, _api, _channel) = service_with(MockDiagnosisApi::new(&[], ""));
        assert!(service.send_chat_message("hello").await.is_err());

        let err = service.send_chat_message("   ").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn ensure_initial_thread_creates_one_when_absent() {
        let (service, _api, _channel) = service_with(MockDiagnosisApi::new(&[], ""));

        let thread_id = service.ensure_initial_thread().await.unwrap();
        assert_eq!(thread_id, 1);
        assert_eq!(service.store().read().await.current_thread_id(), Some(1));

        // A second call reuses the open thread.
        assert_eq!(service.ensure_initial_thread().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn event_loop_drains_the_channel_until_cancelled() {
        let api = MockDiagnosisApi::new(&[], "");
        let (channel, events) = MemoryChannel::new();
        let service = Arc::new(ConsultationService::new(Arc::new(api), channel.clone()));

        let cancel = CancellationToken::new();
        let handle = service.spawn_event_loop(events, cancel.clone());

        channel.push_server_event(ServerEvent::StreamChunk { text: "Hi".to_string() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.store().read().await.messages().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stream_errors_keep_partial_content() {
        let (service, _api, _channel) = service_with(MockDiagnosisApi::new(&[], ""));

        service
            .handle_server_event(ServerEvent::StreamChunk { text: "partial".to_string() })
            .await;
        service
            .handle_server_event(ServerEvent::StreamError {
                message: "stream interrupted".to_string(),
            })
            .await;

        let store = service.store();
        let store = store.read().await;
        assert_eq!(store.messages()[0].content, "partial");
        assert_eq!(store.error(), Some("stream interrupted"));
    }
}
