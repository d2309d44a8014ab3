//! Final answer delivery.

use crate::transport::{ChatTransport, MessageRef, TransportError};
use tokenpilot_core::render::{demote_to_plain, Rendered};
use tracing::{debug, warn};

/// How the final answer reached the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The leftover placeholder was edited in place
    Edited(MessageRef),
    /// A new message was posted
    SentNew(MessageRef),
    /// Nothing was delivered
    Failed(String),
}

impl DeliveryOutcome {
    /// Message that now carries the answer, if any
    #[must_use]
    pub const fn message(&self) -> Option<MessageRef> {
        match self {
            Self::Edited(message) | Self::SentNew(message) => Some(*message),
            Self::Failed(_) => None,
        }
    }

    /// Whether delivery failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Deliver `rendered` to `chat_id`.
///
/// A still-visible `placeholder` is edited in place; otherwise (or when the
/// edit fails) a new message is sent. If the platform rejects the markup, the
/// body is demoted to plain text and tried once more.
pub async fn deliver(
    transport: &dyn ChatTransport,
    chat_id: i64,
    placeholder: Option<MessageRef>,
    rendered: &Rendered,
) -> DeliveryOutcome {
    match attempt(transport, chat_id, placeholder, rendered).await {
        Ok(outcome) => outcome,
        Err(TransportError::MarkupRejected(reason)) => {
            warn!(chat_id, tier = ?rendered.tier, reason = %reason, "Markup rejected, retrying as plain text");
            let plain = demote_to_plain(rendered);
            attempt(transport, chat_id, placeholder, &plain)
                .await
                .unwrap_or_else(|err| DeliveryOutcome::Failed(err.to_string()))
        }
        Err(err) => DeliveryOutcome::Failed(err.to_string()),
    }
}

async fn attempt(
    transport: &dyn ChatTransport,
    chat_id: i64,
    placeholder: Option<MessageRef>,
    rendered: &Rendered,
) -> Result<DeliveryOutcome, TransportError> {
    if let Some(message) = placeholder {
        match transport
            .edit_message(
                message,
                &rendered.body,
                rendered.format,
                rendered.keyboard.as_ref(),
            )
            .await
        {
            Ok(()) | Err(TransportError::NotModified) => {
                return Ok(DeliveryOutcome::Edited(message));
            }
            Err(err @ TransportError::MarkupRejected(_)) => return Err(err),
            Err(err) => {
                debug!(chat_id, error = %err, "Placeholder edit failed, sending a new message");
            }
        }
    }

    transport
        .send_message(
            chat_id,
            &rendered.body,
            rendered.format,
            rendered.keyboard.as_ref(),
        )
        .await
        .map(DeliveryOutcome::SentNew)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingTransport};
    use tokenpilot_core::keyboard::minimal_keyboard;
    use tokenpilot_core::render::{TextFormat, Tier};

    fn html(body: &str) -> Rendered {
        Rendered {
            body: body.to_string(),
            keyboard: Some(minimal_keyboard()),
            format: TextFormat::Html,
            tier: Tier::Enhanced,
        }
    }

    #[tokio::test]
    async fn without_placeholder_sends_new() {
        let transport = RecordingTransport::default();
        let outcome = deliver(&transport, 3, None, &html("<b>hi</b>")).await;

        assert!(matches!(outcome, DeliveryOutcome::SentNew(MessageRef { chat_id: 3, .. })));
        assert_eq!(transport.sends().await.len(), 1);
    }

    #[tokio::test]
    async fn leftover_placeholder_is_edited() {
        let transport = RecordingTransport::default();
        let placeholder = MessageRef {
            chat_id: 3,
            message_id: 77,
        };
        let outcome = deliver(&transport, 3, Some(placeholder), &html("hi")).await;

        assert_eq!(outcome, DeliveryOutcome::Edited(placeholder));
        assert!(transport.sends().await.is_empty());
    }

    #[tokio::test]
    async fn failed_edit_falls_back_to_send() {
        let transport = RecordingTransport {
            fail_edit: true,
            ..RecordingTransport::default()
        };
        let placeholder = MessageRef {
            chat_id: 3,
            message_id: 77,
        };
        let outcome = deliver(&transport, 3, Some(placeholder), &html("hi")).await;

        assert!(matches!(outcome, DeliveryOutcome::SentNew(_)));
    }

    #[tokio::test]
    async fn rejected_markup_is_demoted_once() {
        let transport = RecordingTransport {
            reject_html: true,
            ..RecordingTransport::default()
        };
        let outcome = deliver(&transport, 3, None, &html("<b>SOL</b> &amp; co")).await;

        assert!(matches!(outcome, DeliveryOutcome::SentNew(_)));
        let sends = transport.sends().await;
        assert_eq!(sends.len(), 2);
        match &sends[1] {
            Call::Send { text, format, .. } => {
                assert_eq!(*format, TextFormat::Plain);
                assert_eq!(text, "SOL & co");
            }
            other => panic!("expected a send, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn total_failure_is_reported() {
        let transport = RecordingTransport {
            fail_send: true,
            ..RecordingTransport::default()
        };
        let outcome = deliver(&transport, 3, None, &html("hi")).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.message(), None);
    }
}
