//! Fixed user-facing strings.

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for bot UI text
///
/// Provides every fixed message the pipeline and handlers send.
pub trait BotView {
    /// Welcome message for `/start`
    fn welcome_message(first_name: &str) -> String;

    /// Placeholder shown while the backend is working
    fn processing() -> &'static str;

    /// Generic apology after a failed update
    fn apology() -> &'static str;

    /// Apology with the error chain appended (debug mode)
    fn apology_with_details(details: &str) -> String;

    /// Toast for a button press that could not be decoded
    fn unknown_action() -> &'static str;

    /// Toast acknowledging a valid button press
    fn action_accepted() -> &'static str;

    /// `/data` when the chat has no structured answer yet
    fn no_data_yet() -> &'static str;

    /// Header of the `/data` summary
    fn data_header() -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default English implementation of `BotView`
pub struct DefaultBotView;

impl BotView for DefaultBotView {
    fn welcome_message(first_name: &str) -> String {
        format!(
            "👋 <b>Welcome, {}!</b>\n\nAsk me about any token or wallet:\n• 📊 prices and market data\n• 👛 wallet holdings\n• 🔔 price alerts\n\nOr tap a button below to get started.",
            html_escape::encode_text(first_name)
        )
    }

    fn processing() -> &'static str {
        "⏳ Processing..."
    }

    fn apology() -> &'static str {
        "😔 Sorry, something went wrong while handling your request. Please try again."
    }

    fn apology_with_details(details: &str) -> String {
        format!(
            "{}\n\n<pre>{}</pre>",
            Self::apology(),
            html_escape::encode_text(details)
        )
    }

    fn unknown_action() -> &'static str {
        "⚠️ Unknown action"
    }

    fn action_accepted() -> &'static str {
        "⏳ On it..."
    }

    fn no_data_yet() -> &'static str {
        "📭 No data yet. Ask me about a token or wallet first."
    }

    fn data_header() -> &'static str {
        "🗂 <b>Latest data</b>"
    }
}
