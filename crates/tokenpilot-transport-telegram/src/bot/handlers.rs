//! Command, message and button handlers.

use crate::bot::updates::{from_callback, from_message};
use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokenpilot_runtime::{ConversationPipeline, DeliveryOutcome};
use tracing::{debug, error, info};

/// Pipeline shared by every handler.
pub type Pipeline = ConversationPipeline;

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Register and show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Ask the assistant what it can do
    #[command(description = "Show what the bot can do.")]
    Help,
    /// Summarize the latest structured answer
    #[command(description = "Show the latest token or wallet data.")]
    Data,
}

fn log_outcome(kind: &str, chat_id: i64, outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Failed(reason) => error!(kind, chat_id, reason = %reason, "Update ended without delivery"),
        delivered => debug!(kind, chat_id, outcome = ?delivered, "Update handled"),
    }
}

/// Handle `/start`, `/help` and `/data`.
///
/// # Errors
///
/// Returns an error if the message has no sender.
pub async fn command(msg: Message, cmd: Command, pipeline: &Pipeline) -> Result<()> {
    let update = from_message(&msg).ok_or_else(|| anyhow!("Command without sender"))?;
    info!(user_id = update.platform_user_id, command = ?cmd, "Command received");

    let outcome = match cmd {
        Command::Start => pipeline.welcome(&update).await,
        Command::Help => pipeline.handle_action(&update, "help").await,
        Command::Data => pipeline.recall_data(&update).await,
    };
    log_outcome("command", update.chat_id, &outcome);
    Ok(())
}

/// Handle a free-text message.
///
/// # Errors
///
/// Returns an error if the message has no sender or no text.
pub async fn text(msg: Message, pipeline: &Pipeline) -> Result<()> {
    let update = from_message(&msg).ok_or_else(|| anyhow!("Message without sender"))?;
    let text = msg.text().ok_or_else(|| anyhow!("Message without text"))?;
    info!(
        user_id = update.platform_user_id,
        chat_id = update.chat_id,
        "Text message received"
    );

    let outcome = pipeline.handle_text(&update, text).await;
    log_outcome("text", update.chat_id, &outcome);
    Ok(())
}

/// Handle an inline button press.
///
/// # Errors
///
/// Never returns an error; failures are reported to the chat by the pipeline.
pub async fn callback(q: CallbackQuery, pipeline: &Pipeline) -> Result<()> {
    let update = from_callback(&q);
    let data = q.data.as_deref().unwrap_or_default();
    info!(user_id = update.platform_user_id, data, "Callback received");

    if let Some(outcome) = pipeline
        .handle_callback(&update, &q.id.to_string(), data)
        .await
    {
        log_outcome("callback", update.chat_id, &outcome);
    }
    Ok(())
}

/// Chat to notify when a handler fails.
#[must_use]
pub fn message_chat_id(msg: &Message) -> i64 {
    msg.chat.id.0
}

/// Chat to notify when a callback handler fails.
#[must_use]
pub fn callback_chat_id(q: &CallbackQuery) -> i64 {
    from_callback(q).chat_id
}
