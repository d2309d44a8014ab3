//! Telegram update → [`PlatformUpdate`] conversion.

use teloxide::types::{CallbackQuery, Chat, Message, User};
use tokenpilot_core::models::{Platform, PlatformUpdate};

fn chat_type(chat: &Chat) -> &'static str {
    if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else if chat.is_channel() {
        "channel"
    } else {
        "unknown"
    }
}

fn from_parts(user: &User, chat_id: i64, chat_type: &str, chat_title: Option<&str>) -> PlatformUpdate {
    PlatformUpdate {
        platform: Platform::Telegram,
        platform_user_id: user.id.0.cast_signed(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
        is_premium: user.is_premium,
        chat_id,
        chat_type: chat_type.to_string(),
        chat_title: chat_title.map(str::to_string),
    }
}

/// Sender and chat of a message, or `None` for messages without a sender
/// (channel posts).
#[must_use]
pub fn from_message(msg: &Message) -> Option<PlatformUpdate> {
    let user = msg.from.as_ref()?;
    Some(from_parts(
        user,
        msg.chat.id.0,
        chat_type(&msg.chat),
        msg.chat.title(),
    ))
}

/// Presser and chat of a button press.
///
/// Presses on inaccessible or inline messages fall back to the presser's
/// private chat.
#[must_use]
pub fn from_callback(q: &CallbackQuery) -> PlatformUpdate {
    match q.message.as_ref().map(|m| m.chat()) {
        Some(chat) => from_parts(&q.from, chat.id.0, chat_type(chat), chat.title()),
        None => from_parts(&q.from, q.from.id.0.cast_signed(), "private", None),
    }
}
