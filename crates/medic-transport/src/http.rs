//! Request/response client for the diagnosis service REST API.
//!
//! `HttpDiagnosisApi` speaks the service's wire format directly; the
//! [`DiagnosisApi`] trait keeps the orchestration layer decoupled from the
//! transport so it can be exercised against mocks.

use async_trait::async_trait;
use medic_core::session::{ChatMessage, ChatThread, Diagnosis, MessageRole};
use medic_core::{MedicError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::TransportConfig;

/// Acknowledgement returned when a symptom description is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymptomAck {
    /// Session identifier echoed (or assigned) by the service.
    pub session_id: String,
    /// The symptom text as normalized by the service.
    pub symptoms: String,
}

/// A file handed to the image/voice analysis endpoint.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Result of the combined image and voice analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaAnalysis {
    /// Free-text diagnosis produced from the uploads.
    pub diagnosis: String,
    /// URL of the spoken rendition, when the service produced one.
    pub audio_url: String,
}

/// The request/response operations offered by the diagnosis service.
///
/// All operations are transport-level: they validate nothing about session
/// state (the orchestration layer does that) and convert every failure into
/// a [`MedicError`] with retryability classified.
#[async_trait]
pub trait DiagnosisApi: Send + Sync {
    /// Submits the symptom description and starts the session server-side.
    async fn submit_symptoms(&self, session_id: &str, symptoms: &str) -> Result<SymptomAck>;

    /// Submits the personal-info line (age, gender) for the session.
    async fn submit_personal_info(&self, session_id: &str, user_info: &str) -> Result<String>;

    /// Generates the ordered follow-up question list.
    async fn generate_follow_up(&self, session_id: &str, symptoms: &str) -> Result<Vec<String>>;

    /// Submits the completed question->answer map.
    ///
    /// Returns the service's formatted response record, which feeds the
    /// final-prompt generation.
    async fn submit_followup_answers(
        &self,
        session_id: &str,
        symptoms: &str,
        answers: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>>;

    /// Synthesizes the final prompt from symptoms and formatted answers.
    async fn generate_final_prompt(
        &self,
        session_id: &str,
        symptoms: &str,
        formatted_response: &HashMap<String, String>,
    ) -> Result<String>;

    /// Requests the complete diagnosis record for the final prompt.
    async fn get_final_diagnosis(&self, session_id: &str, final_prompt: &str) -> Result<Diagnosis>;

    /// Analyzes an image together with a voice recording.
    async fn analyze_image_and_voice(
        &self,
        image: MediaUpload,
        audio: MediaUpload,
    ) -> Result<MediaAnalysis>;

    /// Creates the initial chat thread and returns its identifier.
    async fn create_initial_thread(&self) -> Result<i64>;

    /// Returns the stored initial thread, if one exists.
    async fn initial_thread(&self) -> Result<Option<ChatThread>>;

    /// Returns the stored messages of a thread, oldest first.
    async fn messages_by_thread(&self, thread_id: i64) -> Result<Vec<ChatMessage>>;

    /// Returns one summary row per thread for the sidebar.
    async fn thread_summaries(&self) -> Result<Vec<ChatThread>>;
}

/// `DiagnosisApi` implementation over the service's HTTP endpoints.
#[derive(Clone)]
pub struct HttpDiagnosisApi {
    client: Client,
    base_url: String,
}

impl HttpDiagnosisApi {
    /// Creates a client for the configured API endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| MedicError::config(format!("cannot build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {} to diagnosis service", path);
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_request_error)?;

        read_json(path, response).await
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::debug!("GET {} from diagnosis service", path);
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(map_request_error)?;

        read_json(path, response).await
    }
}

#[async_trait]
impl DiagnosisApi for HttpDiagnosisApi {
    async fn submit_symptoms(&self, session_id: &str, symptoms: &str) -> Result<SymptomAck> {
        let response: InitResponse = self
            .post_json(
                "/init",
                &InitRequest {
                    session_id,
                    symptoms,
                },
            )
            .await?;

        Ok(SymptomAck {
            session_id: if response.session_id.is_empty() {
                session_id.to_string()
            } else {
                response.session_id
            },
            symptoms: if response.symptoms.is_empty() {
                symptoms.to_string()
            } else {
                response.symptoms
            },
        })
    }

    async fn submit_personal_info(&self, session_id: &str, user_info: &str) -> Result<String> {
        let response: PersonalInfoResponse = self
            .post_json(
                "/get_personal_info",
                &PersonalInfoRequest {
                    session_id,
                    user_info,
                },
            )
            .await?;

        Ok(if response.user_info.is_empty() {
            user_info.to_string()
        } else {
            response.user_info
        })
    }

    async fn generate_follow_up(&self, session_id: &str, symptoms: &str) -> Result<Vec<String>> {
        let response: FollowUpResponse = self
            .post_json(
                "/generate_followUp",
                &FollowUpRequest {
                    session_id,
                    symptoms,
                },
            )
            .await?;

        Ok(response.followup_questions)
    }

    async fn submit_followup_answers(
        &self,
        session_id: &str,
        symptoms: &str,
        answers: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        let response: AnswersResponse = self
            .post_json(
                "/get_answers",
                &AnswersRequest {
                    session_id,
                    symptoms,
                    user_response: answers,
                },
            )
            .await?;

        Ok(response.formatted_response)
    }

    async fn generate_final_prompt(
        &self,
        session_id: &str,
        symptoms: &str,
        formatted_response: &HashMap<String, String>,
    ) -> Result<String> {
        let response: FinalPromptResponse = self
            .post_json(
                "/generate_final_prompt",
                &FinalPromptRequest {
                    session_id,
                    symptoms,
                    formatted_response,
                },
            )
            .await?;

        Ok(response.final_prompt)
    }

    async fn get_final_diagnosis(&self, session_id: &str, final_prompt: &str) -> Result<Diagnosis> {
        self.post_json(
            "/generate_diagnosis",
            &DiagnosisRequest {
                session_id,
                final_prompt,
            },
        )
        .await
    }

    async fn analyze_image_and_voice(
        &self,
        image: MediaUpload,
        audio: MediaUpload,
    ) -> Result<MediaAnalysis> {
        let form = reqwest::multipart::Form::new()
            .part(
                "image",
                reqwest::multipart::Part::bytes(image.bytes).file_name(image.file_name),
            )
            .part(
                "audio",
                reqwest::multipart::Part::bytes(audio.bytes).file_name(audio.file_name),
            );

        let path = "/analyze_with_voice_image";
        tracing::debug!("Multipart POST {} to diagnosis service", path);
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(map_request_error)?;

        read_json(path, response).await
    }

    async fn create_initial_thread(&self) -> Result<i64> {
        let response: InsertedIdResponse = self
            .post_json("/threads/saveInitialThread", &serde_json::json!({}))
            .await?;
        Ok(response.inserted_id)
    }

    async fn initial_thread(&self) -> Result<Option<ChatThread>> {
        let response: InitialThreadResponse =
            self.get_json("/threads/getInitalThread", &[]).await?;

        Ok(response.id.map(|id| ChatThread {
            id,
            title: String::new(),
            created_at: response.created_at.unwrap_or_default(),
        }))
    }

    async fn messages_by_thread(&self, thread_id: i64) -> Result<Vec<ChatMessage>> {
        let rows: Vec<StoredMessageRow> = self
            .get_json(
                "/chats/getChatByThreadId",
                &[("threadId", thread_id.to_string())],
            )
            .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn thread_summaries(&self) -> Result<Vec<ChatThread>> {
        let rows: Vec<ThreadSummaryRow> =
            self.get_json("/chats/getFirstUserMessages", &[]).await?;

        Ok(rows.into_iter().map(ChatThread::from).collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct InitRequest<'a> {
    session_id: &'a str,
    #[serde(rename = "userSymptoms")]
    symptoms: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InitResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "userSymptoms")]
    symptoms: String,
}

#[derive(Serialize)]
struct PersonalInfoRequest<'a> {
    session_id: &'a str,
    user_info: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PersonalInfoResponse {
    user_info: String,
}

#[derive(Serialize)]
struct FollowUpRequest<'a> {
    session_id: &'a str,
    #[serde(rename = "userSymptoms")]
    symptoms: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FollowUpResponse {
    #[serde(rename = "followupQuestions")]
    followup_questions: Vec<String>,
}

#[derive(Serialize)]
struct AnswersRequest<'a> {
    session_id: &'a str,
    #[serde(rename = "userSymptoms")]
    symptoms: &'a str,
    user_response: &'a HashMap<String, String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AnswersResponse {
    formatted_response: HashMap<String, String>,
}

#[derive(Serialize)]
struct FinalPromptRequest<'a> {
    session_id: &'a str,
    #[serde(rename = "userSymptoms")]
    symptoms: &'a str,
    formatted_response: &'a HashMap<String, String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FinalPromptResponse {
    final_prompt: String,
}

#[derive(Serialize)]
struct DiagnosisRequest<'a> {
    session_id: &'a str,
    #[serde(rename = "finalPrompt")]
    final_prompt: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InsertedIdResponse {
    inserted_id: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InitialThreadResponse {
    id: Option<i64>,
    created_at: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StoredMessageRow {
    id: i64,
    sender: String,
    message: String,
    time_stamp: String,
}

impl From<StoredMessageRow> for ChatMessage {
    fn from(row: StoredMessageRow) -> Self {
        Self {
            id: row.id.to_string(),
            role: role_from_sender(&row.sender),
            content: row.message,
            timestamp: row.time_stamp,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ThreadSummaryRow {
    thread_id: i64,
    message: String,
    time_stamp: String,
}

impl From<ThreadSummaryRow> for ChatThread {
    fn from(row: ThreadSummaryRow) -> Self {
        Self {
            id: row.thread_id,
            title: row.message,
            created_at: row.time_stamp,
        }
    }
}

/// The service stores senders as free-form strings ("User", "AI", ...);
/// anything that does not parse as a known role is rendered as the
/// assistant.
fn role_from_sender(sender: &str) -> MessageRole {
    sender.parse().unwrap_or(MessageRole::Assistant)
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_request_error(err: reqwest::Error) -> MedicError {
    if err.is_connect() || err.is_timeout() {
        MedicError::transport_retryable(format!("request failed: {err}"))
    } else {
        MedicError::transport(format!("request failed: {err}"))
    }
}

fn map_http_error(status: StatusCode, body: String) -> MedicError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.detail)
        .unwrap_or(body);

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    MedicError::Transport {
        message: format!("HTTP {}: {}", status.as_u16(), message),
        retryable,
    }
}

async fn read_json<T>(path: &str, response: reqwest::Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        return Err(map_http_error(status, body));
    }

    response.json::<T>().await.map_err(|err| {
        MedicError::transport(format!("cannot parse response from {path}: {err}"))
    })
}
