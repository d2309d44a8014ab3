//! Progress relay
//!
//! Keeps one placeholder message alive while the backend works, rewriting it
//! for every stage event. All transport calls here are best-effort.

use crate::transport::{ChatTransport, MessageRef, TransportError};
use std::sync::Arc;
use tokenpilot_core::backend::{BackendError, BackendRequest, BackendResult, ConversationBackend};
use tokenpilot_core::config::STAGE_CHANNEL_CAPACITY;
use tokenpilot_core::render::TextFormat;
use tokenpilot_core::stages::{is_heavy, render_stage, StageEvent};
use tokio::sync::mpsc::{self, Receiver};
use tracing::{debug, warn};

/// What a relay run leaves behind.
#[derive(Debug)]
pub struct RelayOutcome {
    /// The single backend attempt
    pub result: Result<BackendResult, BackendError>,
    /// Placeholder that is still visible because deleting it failed
    pub placeholder: Option<MessageRef>,
    /// Stage edits the transport accepted
    pub stages_applied: usize,
}

/// Runs a backend call behind a progress placeholder.
#[derive(Clone)]
pub struct ProgressRelay {
    transport: Arc<dyn ChatTransport>,
    backend: Arc<dyn ConversationBackend>,
}

impl ProgressRelay {
    /// Create a relay over `transport` and `backend`
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, backend: Arc<dyn ConversationBackend>) -> Self {
        Self { transport, backend }
    }

    /// Post `placeholder_text`, call the backend once while relaying its stage
    /// events, then remove the placeholder.
    pub async fn run(
        &self,
        chat_id: i64,
        request: BackendRequest,
        placeholder_text: &str,
    ) -> RelayOutcome {
        let placeholder = match self
            .transport
            .send_message(chat_id, placeholder_text, TextFormat::Html, None)
            .await
        {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(chat_id, error = %err, "Failed to post progress placeholder");
                None
            }
        };

        let (tx, rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (result, stages_applied) = tokio::join!(
            self.backend.ask(request, tx),
            run_stage_loop(self.transport.as_ref(), chat_id, placeholder, rx),
        );

        let placeholder = match placeholder {
            Some(message) => self.remove_placeholder(message).await,
            None => None,
        };

        RelayOutcome {
            result,
            placeholder,
            stages_applied,
        }
    }

    async fn remove_placeholder(&self, message: MessageRef) -> Option<MessageRef> {
        match self.transport.delete_message(message).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %err,
                    "Failed to delete progress placeholder"
                );
                Some(message)
            }
        }
    }
}

/// Apply stage events to the placeholder in arrival order until the sender
/// side is dropped. Returns how many edits went through.
pub async fn run_stage_loop(
    transport: &dyn ChatTransport,
    chat_id: i64,
    placeholder: Option<MessageRef>,
    mut rx: Receiver<StageEvent>,
) -> usize {
    let mut applied = 0;

    while let Some(event) = rx.recv().await {
        if is_heavy(&event.stage) {
            if let Err(err) = transport.send_typing(chat_id).await {
                warn!(chat_id, stage = %event.stage, error = %err, "Failed to send typing indicator");
            }
        }

        let Some(message) = placeholder else {
            continue;
        };

        let text = render_stage(&event.stage, event.detail.as_deref());
        match transport
            .edit_message(message, &text, TextFormat::Html, None)
            .await
        {
            Ok(()) => applied += 1,
            Err(TransportError::NotModified) => {
                debug!(stage = %event.stage, "Progress text unchanged");
            }
            Err(err) => {
                warn!(stage = %event.stage, error = %err, "Failed to update progress message");
            }
        }
    }

    applied
}
