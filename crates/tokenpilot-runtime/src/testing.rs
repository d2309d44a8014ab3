//! Recording fakes for runtime tests.

use crate::transport::{ChatTransport, MessageRef, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokenpilot_core::backend::{
    BackendError, BackendRequest, BackendResult, ConversationBackend, StageSender,
};
use tokenpilot_core::keyboard::Keyboard;
use tokenpilot_core::render::TextFormat;
use tokenpilot_core::stages::StageEvent;
use tokio::sync::Mutex;

/// One transport call, as observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        chat_id: i64,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    },
    Edit {
        message: MessageRef,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    },
    Delete(MessageRef),
    Typing(i64),
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub fail_send: bool,
    pub fail_edit: bool,
    pub fail_delete: bool,
    pub fail_typing: bool,
    pub reject_html: bool,
    pub(crate) next_id: Arc<AtomicI32>,
}

impl RecordingTransport {
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn sends(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, Call::Send { .. }))
            .collect()
    }

    pub async fn edits(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, Call::Edit { .. }))
            .collect()
    }

    async fn record(&self, call: Call) {
        self.calls.lock().await.push(call);
    }

    fn check_markup(&self, format: TextFormat) -> Result<(), TransportError> {
        if self.reject_html && format == TextFormat::Html {
            return Err(TransportError::MarkupRejected(
                "can't parse entities".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError> {
        self.record(Call::Send {
            chat_id,
            text: text.to_string(),
            format,
            keyboard: keyboard.cloned(),
        })
        .await;
        if self.fail_send {
            return Err(TransportError::Other("send refused".to_string()));
        }
        self.check_markup(format)?;
        Ok(MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.record(Call::Edit {
            message,
            text: text.to_string(),
            format,
            keyboard: keyboard.cloned(),
        })
        .await;
        if self.fail_edit {
            return Err(TransportError::Other("edit refused".to_string()));
        }
        self.check_markup(format)
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        self.record(Call::Delete(message)).await;
        if self.fail_delete {
            return Err(TransportError::Other("delete refused".to_string()));
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        self.record(Call::Typing(chat_id)).await;
        if self.fail_typing {
            return Err(TransportError::Other("typing refused".to_string()));
        }
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.record(Call::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        })
        .await;
        Ok(())
    }
}

/// Backend that emits a fixed list of stages, then returns a fixed answer.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub stages: Vec<StageEvent>,
    pub answer: Option<BackendResult>,
    pub requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    pub fn answering(answer: BackendResult) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_stages(mut self, stages: &[(&str, Option<&str>)]) -> Self {
        self.stages = stages
            .iter()
            .map(|(stage, detail)| StageEvent::new(*stage, detail.map(str::to_string)))
            .collect();
        self
    }
}

#[async_trait]
impl ConversationBackend for ScriptedBackend {
    async fn ask(
        &self,
        request: BackendRequest,
        stages: StageSender,
    ) -> Result<BackendResult, BackendError> {
        self.requests.lock().await.push(request);
        for event in &self.stages {
            if stages.send(event.clone()).await.is_err() {
                break;
            }
        }
        self.answer
            .clone()
            .ok_or_else(|| BackendError::Backend("scripted failure".to_string()))
    }
}
