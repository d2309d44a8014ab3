//! Telegram implementation of [`ChatTransport`].

use crate::bot::resilient::{classify, retry_request};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode,
};
use tokenpilot_core::keyboard::{Button, ButtonKind, Keyboard};
use tokenpilot_core::render::TextFormat;
use tokenpilot_runtime::{ChatTransport, MessageRef, TransportError};
use tracing::debug;

/// Convert a keyboard into Telegram inline markup.
///
/// Link buttons with unparsable URLs are skipped, as are rows left empty.
#[must_use]
pub fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().filter_map(inline_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn inline_button(button: &Button) -> Option<InlineKeyboardButton> {
    match &button.kind {
        ButtonKind::Callback(data) => Some(InlineKeyboardButton::callback(
            button.text.clone(),
            data.clone(),
        )),
        ButtonKind::Url(url) => match reqwest::Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(button.text.clone(), url)),
            Err(e) => {
                debug!(url = %url, error = %e, "Skipping link button with invalid URL");
                None
            }
        },
    }
}

const fn parse_mode(format: TextFormat) -> Option<ParseMode> {
    match format {
        TextFormat::Html => Some(ParseMode::Html),
        TextFormat::Plain => None,
    }
}

/// Bot API client behind the runtime's transport trait.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot client
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Underlying bot client
    #[must_use]
    pub const fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError> {
        let markup = keyboard.map(inline_keyboard);
        let sent = retry_request(|| {
            let mut req = self.bot.send_message(ChatId(chat_id), text.to_string());
            if let Some(pm) = parse_mode(format) {
                req = req.parse_mode(pm);
            }
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            async move { req.await }
        })
        .await
        .map_err(|e| classify(&e))?;

        Ok(MessageRef {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let markup = keyboard.map(inline_keyboard);
        retry_request(|| {
            let mut req = self.bot.edit_message_text(
                ChatId(message.chat_id),
                MessageId(message.message_id),
                text.to_string(),
            );
            if let Some(pm) = parse_mode(format) {
                req = req.parse_mode(pm);
            }
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            async move { req.await }
        })
        .await
        .map(|_| ())
        .map_err(|e| classify(&e))
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        retry_request(|| {
            let req = self
                .bot
                .delete_message(ChatId(message.chat_id), MessageId(message.message_id));
            async move { req.await }
        })
        .await
        .map(|_| ())
        .map_err(|e| classify(&e))
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| classify(&e))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut req = self
            .bot
            .answer_callback_query(teloxide::types::CallbackQueryId(callback_id.to_owned()));
        if let Some(text) = text {
            req = req.text(text.to_owned());
        }
        req.await.map(|_| ()).map_err(|e| classify(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenpilot_core::keyboard::{build_keyboard, minimal_keyboard};

    #[test]
    fn minimal_keyboard_converts_to_one_row() {
        let markup = inline_keyboard(&minimal_keyboard());
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn invalid_link_buttons_are_skipped() {
        let keyboard = Keyboard {
            rows: vec![
                vec![Button::url("broken", "not a url")],
                vec![Button::url("ok", "https://solscan.io/token/abc")],
            ],
        };
        let markup = inline_keyboard(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0][0].text, "ok");
    }

    #[test]
    fn recommendation_keyboard_keeps_all_rows() {
        let payload = serde_json::json!({
            "recommendations": [
                { "symbol": "SOL", "address": "So11111111111111111111111111111111111111112" },
                { "symbol": "JUP" }
            ]
        });
        let keyboard = build_keyboard(Some(&payload), "https://solscan.io").unwrap_or_default();
        let markup = inline_keyboard(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), keyboard.rows.len());
    }
}
