use async_trait::async_trait;
use thiserror::Error;
use tokenpilot_core::keyboard::Keyboard;
use tokenpilot_core::render::TextFormat;

/// Handle to a message the transport has posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Platform chat id
    pub chat_id: i64,
    /// Platform message id
    pub message_id: i32,
}

/// Transport failures the runtime distinguishes.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The platform refused the markup of an outgoing body
    #[error("Markup rejected: {0}")]
    MarkupRejected(String),
    /// An edit produced the same content the message already had
    #[error("Message is not modified")]
    NotModified,
    /// The target message no longer exists
    #[error("Message not found")]
    NotFound,
    /// Anything else (network, rate limit, permissions)
    #[error("Transport error: {0}")]
    Other(String),
}

/// Outbound messaging operations used by the runtime.
///
/// Implementations must tolerate concurrent calls from independent updates.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Post a new message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError>;

    /// Replace the text (and keyboard) of an existing message.
    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Delete a message.
    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError>;

    /// Show the "typing" presence indicator.
    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError>;

    /// Acknowledge a button press, optionally with a toast.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError>;
}
