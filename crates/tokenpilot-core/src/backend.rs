//! Conversational backend client
//!
//! The backend is a black box that answers one query per call and reports
//! progress as stage events. [`HttpBackend`] talks to it over HTTP with a
//! newline-delimited JSON response body.

use crate::config::CoreSettings;
use crate::stages::StageEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sink for stage events of one backend call
pub type StageSender = mpsc::Sender<StageEvent>;

/// Errors returned by a backend call
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
    /// A line could not be decoded
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Response violated the streaming protocol
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Backend reported a failure
    #[error("backend error: {0}")]
    Backend(String),
    /// Client misconfiguration
    #[error("configuration error: {0}")]
    Config(String),
}

/// One query sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRequest {
    /// Identity id
    pub user_id: i64,
    /// Session id
    pub session_id: i64,
    /// Chat id
    pub chat_id: i64,
    /// Query text
    pub query: String,
    /// Priority tools, passed through opaquely
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_hints: Vec<String>,
}

/// The assistant's answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Answer text
    #[serde(default)]
    pub text: String,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// Final result of a backend call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResult {
    /// Assistant answer
    pub assistant_message: AssistantMessage,
    /// Shape-discriminated payload
    #[serde(default)]
    pub structured_data: Option<Value>,
}

impl BackendResult {
    /// Result carrying only text
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            assistant_message: AssistantMessage {
                text: text.into(),
                metadata: Value::Null,
            },
            structured_data: None,
        }
    }

    /// Structured payload, from the top level or else from the message metadata
    #[must_use]
    pub fn structured(&self) -> Option<&Value> {
        self.structured_data
            .as_ref()
            .filter(|v| !v.is_null())
            .or_else(|| {
                self.assistant_message
                    .metadata
                    .get("structuredData")
                    .filter(|v| !v.is_null())
            })
    }
}

/// Interface to the conversational backend
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Answer one query, emitting stage events in order on `stages`.
    ///
    /// Exactly one attempt is made; callers own retry policy.
    async fn ask(
        &self,
        request: BackendRequest,
        stages: StageSender,
    ) -> Result<BackendResult, BackendError>;
}

/// One line of the streamed response
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamLine {
    Result { result: BackendResult },
    Error { error: Value },
    Stage(StageEvent),
    Bare(BackendResult),
}

/// Backend reached over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Create a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` for an empty URL and
    /// `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, BackendError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(BackendError::Config("backend URL is empty".to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Create a client from core settings.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` when `backend_url` is missing.
    pub fn from_settings(settings: &CoreSettings) -> Result<Self, BackendError> {
        let url = settings
            .require_backend_url()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        info!(url = %url, timeout_secs = settings.backend_timeout_secs, "Backend client configured");
        Self::new(
            url,
            settings.backend_api_key.clone(),
            Duration::from_secs(settings.backend_timeout_secs),
        )
    }
}

/// Apply one response line. Returns the result once it arrives.
async fn apply_line(
    line: &[u8],
    stages: &StageSender,
) -> Result<Option<BackendResult>, BackendError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<StreamLine>(text) {
        Ok(StreamLine::Result { result } | StreamLine::Bare(result)) => Ok(Some(result)),
        Ok(StreamLine::Error { error }) => {
            let message = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            Err(BackendError::Backend(message))
        }
        Ok(StreamLine::Stage(event)) => {
            debug!(stage = %event.stage, "Backend stage");
            if stages.send(event).await.is_err() {
                debug!("Stage receiver dropped, ignoring event");
            }
            Ok(None)
        }
        Err(e) => {
            warn!(error = %e, "Skipping unrecognized backend line");
            Ok(None)
        }
    }
}

#[async_trait]
impl ConversationBackend for HttpBackend {
    async fn ask(
        &self,
        request: BackendRequest,
        stages: StageSender,
    ) -> Result<BackendResult, BackendError> {
        debug!(chat_id = request.chat_id, url = %self.url, "Backend request");

        let mut builder = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: crate::utils::truncate_str(body, 500),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(result) = apply_line(&line, &stages).await? {
                    return Ok(result);
                }
            }
        }
        if let Some(result) = apply_line(&buffer, &stages).await? {
            return Ok(result);
        }

        Err(BackendError::Protocol(
            "response ended without a result".to_string(),
        ))
    }
}
