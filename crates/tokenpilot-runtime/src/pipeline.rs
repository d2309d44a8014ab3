//! Conversation pipeline
//!
//! One inbound update at a time: resolve the sender, relay the backend call,
//! render the answer and deliver it. Every entry point ends with something
//! visible for the user, an answer or an apology.

use crate::delivery::{deliver, DeliveryOutcome};
use crate::relay::ProgressRelay;
use crate::transport::{ChatTransport, MessageRef};
use chrono::Utc;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tokenpilot_core::backend::{BackendError, BackendRequest, BackendResult, ConversationBackend};
use tokenpilot_core::callback::{decode, CallbackError, DecodedQuery};
use tokenpilot_core::config::CoreSettings;
use tokenpilot_core::keyboard::build_keyboard;
use tokenpilot_core::models::{MessageRole, NewMessage, PlatformUpdate, ResolvedContext};
use tokenpilot_core::render::{
    render, render_data_summary, RenderOptions, Rendered, TextFormat, Tier,
};
use tokenpilot_core::resolver::SessionResolver;
use tokenpilot_core::storage::StorageError;
use tokenpilot_core::utils::truncate_str;
use tokenpilot_core::views::{BotView, DefaultBotView};
use tracing::{debug, error, info, warn};

const MAX_ERROR_DETAILS_CHARS: usize = 3000;

/// Failures that end an update with an apology
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Resolver or message log failure
    #[error("Storage failure")]
    Storage(#[from] StorageError),
    /// The single backend attempt failed
    #[error("Backend call failed")]
    Backend(#[from] BackendError),
    /// Button payload could not be decoded
    #[error("Invalid action")]
    Callback(#[from] CallbackError),
}

/// Runtime toggles for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Append the error chain to apologies
    pub debug_errors: bool,
    /// Append the raw backend result to answers
    pub echo_result: bool,
    /// Base URL for explorer link buttons
    pub explorer_base_url: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            debug_errors: false,
            echo_result: render.echo_result,
            explorer_base_url: render.explorer_base_url,
        }
    }
}

impl From<&CoreSettings> for PipelineOptions {
    fn from(settings: &CoreSettings) -> Self {
        Self {
            debug_errors: settings.debug_errors,
            echo_result: settings.echo_result,
            explorer_base_url: settings.explorer_base_url.clone(),
        }
    }
}

impl PipelineOptions {
    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            echo_result: self.echo_result,
            explorer_base_url: self.explorer_base_url.clone(),
        }
    }
}

/// Control flow for text messages, button presses and commands
pub struct ConversationPipeline<V: BotView = DefaultBotView> {
    resolver: SessionResolver,
    transport: Arc<dyn ChatTransport>,
    relay: ProgressRelay,
    options: PipelineOptions,
    _view: PhantomData<fn() -> V>,
}

impl<V: BotView> ConversationPipeline<V> {
    /// Wire a pipeline from its collaborators
    #[must_use]
    pub fn new(
        resolver: SessionResolver,
        transport: Arc<dyn ChatTransport>,
        backend: Arc<dyn ConversationBackend>,
        options: PipelineOptions,
    ) -> Self {
        let relay = ProgressRelay::new(transport.clone(), backend);
        Self {
            resolver,
            transport,
            relay,
            options,
            _view: PhantomData,
        }
    }

    /// Answer a free-text message.
    pub async fn handle_text(&self, update: &PlatformUpdate, text: &str) -> DeliveryOutcome {
        let ctx = match self.resolve(update).await {
            Ok(ctx) => ctx,
            Err(outcome) => return outcome,
        };
        self.ask_and_deliver(&ctx, update.chat_id, text, Vec::new())
            .await
    }

    /// Answer a button press.
    ///
    /// The press is acknowledged first. Undecodable data gets an "unknown
    /// action" toast and `None`; nothing else runs.
    pub async fn handle_callback(
        &self,
        update: &PlatformUpdate,
        callback_id: &str,
        data: &str,
    ) -> Option<DeliveryOutcome> {
        let decoded = match decode(data) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(data, error = %err, "Invalid callback data");
                self.answer_callback(callback_id, Some(V::unknown_action()))
                    .await;
                return None;
            }
        };
        self.answer_callback(callback_id, Some(V::action_accepted()))
            .await;
        Some(self.run_decoded(update, decoded).await)
    }

    /// Run a callback-style action that did not come from a button
    /// (`/help` is routed as `help`).
    pub async fn handle_action(&self, update: &PlatformUpdate, data: &str) -> DeliveryOutcome {
        match decode(data) {
            Ok(decoded) => self.run_decoded(update, decoded).await,
            Err(err) => {
                warn!(data, error = %err, "Invalid action");
                self.apologize(update.chat_id, None, err.into()).await
            }
        }
    }

    /// `/data`: summarize the newest structured answer of the active chat.
    pub async fn recall_data(&self, update: &PlatformUpdate) -> DeliveryOutcome {
        let ctx = match self.resolve(update).await {
            Ok(ctx) => ctx,
            Err(outcome) => return outcome,
        };
        let latest = match self
            .resolver
            .store()
            .latest_structured_data(ctx.chat.id)
            .await
        {
            Ok(latest) => latest,
            Err(err) => {
                error!(chat = ctx.chat.id, error = %err, "Failed to load structured data");
                return self.apologize(update.chat_id, None, err.into()).await;
            }
        };

        let rendered = latest
            .as_ref()
            .and_then(|value| self.data_summary(value))
            .unwrap_or_else(|| notice(V::no_data_yet()));
        deliver(self.transport.as_ref(), update.chat_id, None, &rendered).await
    }

    /// `/start`: register the user and greet them.
    pub async fn welcome(&self, update: &PlatformUpdate) -> DeliveryOutcome {
        let ctx = match self.resolve(update).await {
            Ok(ctx) => ctx,
            Err(outcome) => return outcome,
        };
        let rendered = Rendered {
            body: V::welcome_message(&ctx.user.firstname),
            keyboard: build_keyboard(None, &self.options.explorer_base_url),
            format: TextFormat::Html,
            tier: Tier::Simple,
        };
        deliver(self.transport.as_ref(), update.chat_id, None, &rendered).await
    }

    /// Send the apology for an error raised outside the pipeline.
    pub async fn apologize_for(&self, chat_id: i64, err: &anyhow::Error) -> DeliveryOutcome {
        let body = if self.options.debug_errors {
            V::apology_with_details(&truncate_str(format!("{err:?}"), MAX_ERROR_DETAILS_CHARS))
        } else {
            V::apology().to_string()
        };
        deliver(self.transport.as_ref(), chat_id, None, &notice(&body)).await
    }

    async fn resolve(&self, update: &PlatformUpdate) -> Result<ResolvedContext, DeliveryOutcome> {
        match self.resolver.resolve(update).await {
            Ok(ctx) => Ok(ctx),
            Err(err) => {
                error!(
                    platform = %update.platform,
                    platform_user_id = update.platform_user_id,
                    error = %err,
                    "Failed to resolve session"
                );
                Err(self.apologize(update.chat_id, None, err.into()).await)
            }
        }
    }

    async fn run_decoded(&self, update: &PlatformUpdate, decoded: DecodedQuery) -> DeliveryOutcome {
        let ctx = match self.resolve(update).await {
            Ok(ctx) => ctx,
            Err(outcome) => return outcome,
        };
        self.ask_and_deliver(&ctx, update.chat_id, &decoded.query, decoded.tool_hints)
            .await
    }

    async fn ask_and_deliver(
        &self,
        ctx: &ResolvedContext,
        chat_id: i64,
        query: &str,
        tool_hints: Vec<String>,
    ) -> DeliveryOutcome {
        let request = BackendRequest {
            user_id: ctx.user.id,
            session_id: ctx.session.id,
            chat_id: ctx.chat.id,
            query: query.to_string(),
            tool_hints,
        };
        let relayed = self.relay.run(chat_id, request, V::processing()).await;
        debug!(chat_id, stages = relayed.stages_applied, "Backend call finished");

        let result = match relayed.result {
            Ok(result) => result,
            Err(err) => {
                error!(chat_id, chat = ctx.chat.id, error = %err, "Backend call failed");
                return self
                    .apologize(chat_id, relayed.placeholder, err.into())
                    .await;
            }
        };

        self.record_exchange(ctx, query, &result).await;
        let rendered = render(&result, &self.options.render_options());
        let outcome = deliver(
            self.transport.as_ref(),
            chat_id,
            relayed.placeholder,
            &rendered,
        )
        .await;
        match &outcome {
            DeliveryOutcome::Failed(reason) => {
                error!(chat_id, reason = %reason, "Failed to deliver answer");
            }
            delivered => info!(chat_id, tier = ?rendered.tier, outcome = ?delivered, "Answer delivered"),
        }
        outcome
    }

    async fn record_exchange(&self, ctx: &ResolvedContext, query: &str, result: &BackendResult) {
        let now = Utc::now();
        let messages = [
            NewMessage {
                role: MessageRole::User,
                status: "completed".to_string(),
                content: query.to_string(),
                metadata: json!({}),
            },
            NewMessage {
                role: MessageRole::Assistant,
                status: "completed".to_string(),
                content: result.assistant_message.text.clone(),
                metadata: assistant_metadata(result),
            },
        ];
        for message in &messages {
            if let Err(err) = self
                .resolver
                .store()
                .record_message(&ctx.chat, message, now)
                .await
            {
                warn!(chat = ctx.chat.id, role = ?message.role, error = %err, "Failed to record message");
            }
        }
    }

    async fn apologize(
        &self,
        chat_id: i64,
        placeholder: Option<MessageRef>,
        err: PipelineError,
    ) -> DeliveryOutcome {
        let body = if self.options.debug_errors {
            let details = format!("{:?}", anyhow::Error::new(err));
            V::apology_with_details(&truncate_str(details, MAX_ERROR_DETAILS_CHARS))
        } else {
            V::apology().to_string()
        };
        let outcome = deliver(self.transport.as_ref(), chat_id, placeholder, &notice(&body)).await;
        if let DeliveryOutcome::Failed(reason) = &outcome {
            warn!(chat_id, reason = %reason, "Failed to send apology");
        }
        outcome
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) {
        if let Err(err) = self.transport.answer_callback(callback_id, text).await {
            warn!(callback_id, error = %err, "Failed to answer callback query");
        }
    }

    fn data_summary(&self, value: &Value) -> Option<Rendered> {
        match render_data_summary(value, V::data_header()) {
            Ok(Some(body)) => Some(Rendered {
                body,
                keyboard: build_keyboard(Some(value), &self.options.explorer_base_url),
                format: TextFormat::Html,
                tier: Tier::Enhanced,
            }),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Stored structured data is not renderable");
                None
            }
        }
    }
}

fn notice(body: &str) -> Rendered {
    Rendered {
        body: body.to_string(),
        keyboard: None,
        format: TextFormat::Html,
        tier: Tier::Simple,
    }
}

/// Assistant metadata with `structuredData` merged in.
fn assistant_metadata(result: &BackendResult) -> Value {
    let mut metadata = match &result.assistant_message.metadata {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(structured) = result.structured() {
        metadata.insert("structuredData".to_string(), structured.clone());
    }
    Value::Object(metadata)
}
