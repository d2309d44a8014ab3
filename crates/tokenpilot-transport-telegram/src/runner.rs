use crate::bot;
use crate::bot::handlers::{callback_chat_id, message_chat_id, Command, Pipeline};
use crate::bot::TelegramTransport;
use crate::config::BotSettings;
use anyhow::Result;
use std::sync::{Arc, OnceLock};
use teloxide::dispatching::{ShutdownToken, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tokenpilot_core::backend::HttpBackend;
use tokenpilot_core::resolver::SessionResolver;
use tokenpilot_core::storage::{IdentityStore, SqliteStore};
use tokenpilot_runtime::{Lifecycle, PipelineOptions, StopSignal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run the Telegram transport runtime until a signal or a lifecycle stop.
///
/// # Errors
///
/// Returns an error if storage or the backend client cannot be set up. The
/// store is released before returning.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let store: Arc<dyn IdentityStore> = Arc::new(SqliteStore::open(&settings.core.database_path)?);
    info!(path = %settings.core.database_path, "SQLite storage opened.");

    let lifecycle = Arc::new(Lifecycle::new(store.clone()));
    lifecycle.start().await?;

    let backend = match HttpBackend::from_settings(&settings.core) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            error!("Failed to initialize backend client: {}", e);
            lifecycle.stop(StopSignal::Finished).await;
            return Err(e.into());
        }
    };
    info!("Backend client initialized.");

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let pipeline: Arc<Pipeline> = Arc::new(Pipeline::new(
        SessionResolver::new(store),
        Arc::new(TelegramTransport::new(bot.clone())),
        backend,
        PipelineOptions::from(settings.core.as_ref()),
    ));

    let mut dispatcher = Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![pipeline])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error from the update listener",
        ))
        .build();

    let received = Arc::new(OnceLock::new());
    let watcher = tokio::spawn(watch_shutdown(
        dispatcher.shutdown_token(),
        lifecycle.token(),
        received.clone(),
    ));

    info!("Bot is running...");
    dispatcher.dispatch().await;
    watcher.abort();

    let signal = received.get().copied().unwrap_or(StopSignal::Finished);
    lifecycle.stop(signal).await;
    info!("Bot stopped.");
    Ok(())
}

/// Stop the dispatcher on the first OS signal or lifecycle cancellation.
async fn watch_shutdown(
    shutdown: ShutdownToken,
    token: CancellationToken,
    received: Arc<OnceLock<StopSignal>>,
) {
    let signal = tokio::select! {
        signal = wait_for_signal() => {
            remember_signal(&received, signal);
            signal
        }
        () = token.cancelled() => StopSignal::Finished,
    };
    info!(%signal, "Stopping dispatcher");
    match shutdown.shutdown() {
        Ok(done) => done.await,
        Err(e) => debug!("Dispatcher was not running: {}", e),
    }
}

/// Keep the first stop signal; later ones are only logged.
fn remember_signal(received: &OnceLock<StopSignal>, signal: StopSignal) {
    if received.set(signal).is_err() {
        debug!(%signal, "Stop signal was already recorded");
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> StopSignal {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => StopSignal::Interrupt,
                _ = term.recv() => StopSignal::Terminate,
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> StopSignal {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> StopSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    StopSignal::Interrupt
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
                ),
        )
}

/// Best-effort apology after a handler failed; errors while notifying are dropped.
async fn notify_failure(pipeline: &Pipeline, chat_id: i64, err: &anyhow::Error) {
    let outcome = pipeline.apologize_for(chat_id, err).await;
    if outcome.is_failed() {
        debug!(chat_id, "Failure notice could not be delivered");
    }
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = message_chat_id(&msg);
    if let Err(e) = bot::handlers::command(msg, cmd, &pipeline).await {
        error!("Command error: {:#}", e);
        notify_failure(&pipeline, chat_id, &e).await;
    }
    respond(())
}

async fn handle_text(msg: Message, pipeline: Arc<Pipeline>) -> Result<(), teloxide::RequestError> {
    let chat_id = message_chat_id(&msg);
    if let Err(e) = Box::pin(bot::handlers::text(msg, &pipeline)).await {
        error!("Text handler error: {:#}", e);
        notify_failure(&pipeline, chat_id, &e).await;
    }
    respond(())
}

async fn handle_callback(
    q: CallbackQuery,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = callback_chat_id(&q);
    if let Err(e) = Box::pin(bot::handlers::callback(q, &pipeline)).await {
        error!("Callback handler error: {:#}", e);
        notify_failure(&pipeline, chat_id, &e).await;
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stop_signal_is_kept() {
        let received = OnceLock::new();
        remember_signal(&received, StopSignal::Terminate);
        remember_signal(&received, StopSignal::Interrupt);
        assert_eq!(received.get().copied(), Some(StopSignal::Terminate));
    }
}
