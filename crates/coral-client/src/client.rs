//! HTTP client for the chat backend REST API.
//!
//! Follows the backend wire format: camelCase JSON bodies, one base URL
//! selecting the API origin, all routes rooted at `<base>/api`.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use coral_core::stream::ChunkStream;
use coral_core::{Conversation, Message, PlanInfo, PlanTier, StreamChunk, StreamError, UserProfile};

use crate::decode::Utf8StreamDecoder;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Failed to decode a response payload. Fatal to the current view:
    /// a malformed profile must never render partial state.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<ClientError> for StreamError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Decode(message) => Self::Decode(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Error response body from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Request body for the chat stream endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation the draft belongs to.
    pub conversation_id: String,
    /// The submitted draft text.
    pub message: String,
    /// Model to complete with.
    pub model: String,
    /// Optional system prompt override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Optional attachment references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
}

/// Request body for the billing intent endpoint.
#[derive(Debug, Serialize)]
struct BillingIntentRequest {
    plan: PlanTier,
}

/// Client for the chat backend REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API origin (e.g., `http://localhost:8080`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.text().await {
            Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(err) => err.error,
                Err(_) if !body.is_empty() => body,
                Err(_) => "Unknown error".to_string(),
            },
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    // =========================================================================
    // Profile and billing
    // =========================================================================

    /// Fetch the user profile with subscription state.
    ///
    /// Decoding is strict: a schema violation is a [`ClientError::Decode`],
    /// never a partially-populated profile.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a
    /// malformed payload.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ClientError> {
        let response = self.client.get(self.url("/me")).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Post a subscription intent for a plan tier; returns the updated plan.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn submit_billing_intent(&self, plan: PlanTier) -> Result<PlanInfo, ClientError> {
        let response = self
            .client
            .post(self.url("/billing/intent"))
            .json(&BillingIntentRequest { plan })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// List all conversations.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a
    /// malformed payload.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let response = self.client.get(self.url("/conversations")).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Fetch the message history of a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a
    /// malformed payload.
    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/conversations/{conversation_id}/messages")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    // =========================================================================
    // Chat stream
    // =========================================================================

    /// Open the chunked completion stream for a submitted draft.
    ///
    /// Each decoded text fragment becomes one `StreamChunk { content }`; a
    /// final `StreamChunk { content: "", done: true }` is synthesized when
    /// the transport signals end-of-stream. A non-success status is a
    /// transport error surfaced before any chunk.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails to establish or the server
    /// responds with a non-success status.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, ClientError> {
        let response = self
            .client
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        debug!(conversation_id = %request.conversation_id, "chat stream opened");

        let mut bytes = response.bytes_stream();
        let chunks = async_stream::stream! {
            let mut decoder = Utf8StreamDecoder::new();
            while let Some(result) = bytes.next().await {
                match result {
                    Ok(chunk) => match decoder.push(&chunk) {
                        Ok(text) => {
                            if !text.is_empty() {
                                yield Ok(StreamChunk::text(text));
                            }
                        }
                        Err(e) => {
                            yield Err(StreamError::Decode(e.to_string()));
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(StreamError::Transport(e.to_string()));
                        return;
                    }
                }
            }
            if let Err(e) = decoder.finish() {
                yield Err(StreamError::Decode(e.to_string()));
                return;
            }
            yield Ok(StreamChunk::terminator());
        };

        Ok(Box::pin(chunks))
    }
}
