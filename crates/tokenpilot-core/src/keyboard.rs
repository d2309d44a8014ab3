//! Action keyboards derived from the structured payload.
//!
//! The model here is transport-neutral; the Telegram crate converts it to
//! `InlineKeyboardMarkup`.

use crate::config::CALLBACK_DATA_LIMIT;
use crate::structured::{Shape, StructuredView, TokenFacts, WalletFacts};
use serde_json::Value;
use tracing::debug;

/// What a button does when pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonKind {
    /// Sends callback data back to the bot
    Callback(String),
    /// Opens an external link
    Url(String),
}

/// One keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label
    pub text: String,
    /// Action
    pub kind: ButtonKind,
}

impl Button {
    /// Callback button, or `None` when the payload breaks the wire format.
    ///
    /// Payloads must be ASCII and fit in [`CALLBACK_DATA_LIMIT`] bytes.
    #[must_use]
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Option<Self> {
        let data = data.into();
        if data.is_empty() || data.len() > CALLBACK_DATA_LIMIT || !data.is_ascii() {
            debug!(data = %data, "Dropping callback button with invalid payload");
            return None;
        }
        Some(Self {
            text: text.into(),
            kind: ButtonKind::Callback(data),
        })
    }

    /// Link button
    #[must_use]
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ButtonKind::Url(url.into()),
        }
    }
}

/// Rows of buttons
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    /// Non-empty rows, top to bottom
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    fn push_row(&mut self, row: impl IntoIterator<Item = Option<Button>>) {
        let row: Vec<Button> = row.into_iter().flatten().collect();
        if !row.is_empty() {
            self.rows.push(row);
        }
    }

    fn into_option(self) -> Option<Self> {
        (!self.rows.is_empty()).then_some(self)
    }

    /// Every callback payload in the keyboard
    pub fn callback_data(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().filter_map(|b| match &b.kind {
            ButtonKind::Callback(data) => Some(data.as_str()),
            ButtonKind::Url(_) => None,
        })
    }

    /// Find a button by label
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&Button> {
        self.rows.iter().flatten().find(|b| b.text == text)
    }
}

/// Label of the compare button on recommendation keyboards
pub const COMPARE_TOP_TWO: &str = "⚖️ Compare top 2";
/// Label of the "more tokens" button
pub const MORE_TOKENS: &str = "➕ More tokens";
/// Label of the generic explore button
pub const EXPLORE: &str = "🧭 Explore tokens";
/// Label of the generic market overview button
pub const MARKET_OVERVIEW: &str = "🌍 Market overview";
/// Label of the help button on the minimal keyboard
pub const HELP: &str = "❓ Help";

/// Callback tokens are colon-delimited, so parameters must not contain colons.
fn param(raw: &str) -> String {
    raw.trim().replace(':', "")
}

fn explorer_link(base: &str, kind: &str, address: &str) -> String {
    format!("{}/{kind}/{}", base.trim_end_matches('/'), address.trim())
}

fn generic_keyboard() -> Keyboard {
    let mut keyboard = Keyboard::default();
    keyboard.push_row([
        Button::callback(EXPLORE, "example:explore"),
        Button::callback(MARKET_OVERVIEW, "action:market_overview"),
    ]);
    keyboard
}

/// One- or two-button keyboard used by the simple and plain tiers.
#[must_use]
pub fn minimal_keyboard() -> Keyboard {
    let mut keyboard = Keyboard::default();
    keyboard.push_row([
        Button::callback(HELP, "help"),
        Button::callback(MARKET_OVERVIEW, "action:market_overview"),
    ]);
    keyboard
}

fn recommendations_keyboard(recs: &[TokenFacts], explorer: &str) -> Keyboard {
    let keys: Vec<(String, String)> = recs
        .iter()
        .filter_map(|t| {
            let key = param(t.callback_key()?);
            let label = t.label().map_or_else(|| key.clone(), str::to_string);
            (!key.is_empty()).then_some((label, key))
        })
        .collect();

    let mut keyboard = Keyboard::default();
    keyboard.push_row(
        keys.iter()
            .take(3)
            .map(|(label, key)| Button::callback(format!("🔍 {label}"), format!("token:info:{key}"))),
    );
    keyboard.push_row(
        keys.iter()
            .take(3)
            .map(|(label, key)| Button::callback(format!("🔔 {label}"), format!("alert:set:{key}"))),
    );
    if let [(_, first), (_, second), ..] = keys.as_slice() {
        keyboard.push_row([
            Button::callback(COMPARE_TOP_TWO, format!("action:compare:{first}:{second}")),
            Button::callback(MORE_TOKENS, "action:more_tokens"),
        ]);
    }
    if let Some(top) = recs.first() {
        if let Some(address) = top.address.as_deref() {
            let label = top.label().unwrap_or("top pick");
            keyboard.push_row([Some(Button::url(
                format!("🌐 {label} on explorer"),
                explorer_link(explorer, "token", address),
            ))]);
        }
    }
    keyboard
}

fn token_keyboard(token: &TokenFacts, explorer: &str) -> Keyboard {
    let mut keyboard = Keyboard::default();
    if let Some(key) = token.callback_key().map(param).filter(|k| !k.is_empty()) {
        keyboard.push_row([
            Button::callback("💲 Price", format!("token:price:{key}")),
            Button::callback("📊 Chart", format!("token:chart:{key}")),
        ]);
        keyboard.push_row([
            Button::callback("👥 Holders", format!("token:holders:{key}")),
            Button::callback("🔮 Predict", format!("token:predict:{key}")),
            Button::callback("🔔 Alert", format!("alert:set:{key}")),
        ]);
    }
    if let Some(address) = token.address.as_deref() {
        keyboard.push_row([Some(Button::url(
            "🌐 View on explorer",
            explorer_link(explorer, "token", address),
        ))]);
    }
    keyboard
}

fn wallet_keyboard(wallet: &WalletFacts, explorer: &str) -> Keyboard {
    let mut keyboard = Keyboard::default();
    if let Some(address) = wallet.address.as_deref() {
        let key = param(address);
        keyboard.push_row([
            Button::callback("🪙 Tokens", format!("wallet:tokens:{key}")),
            Button::callback("💹 PnL", format!("wallet:pnl:{key}")),
            Button::callback("🖼 NFTs", format!("wallet:nfts:{key}")),
        ]);
        keyboard.push_row([
            Button::callback("📜 Activity", format!("wallet:activity:{key}")),
            Button::callback("🛡 Risk", format!("wallet:risk:{key}")),
        ]);
        keyboard.push_row([Some(Button::url(
            "🌐 View on explorer",
            explorer_link(explorer, "account", address),
        ))]);
    }
    keyboard
}

/// Build the action keyboard for a payload.
///
/// Shapes are matched in the same order as the renderer. Unrecognized,
/// missing or malformed payloads get the generic explore row. Returns `None`
/// only when no row survived the payload-length checks.
#[must_use]
pub fn build_keyboard(structured: Option<&Value>, explorer_base_url: &str) -> Option<Keyboard> {
    let shape = structured
        .and_then(|value| StructuredView::parse(value).ok())
        .and_then(|view| view.shape);

    let keyboard = match shape {
        Some(Shape::Recommendations(recs)) => recommendations_keyboard(&recs, explorer_base_url),
        Some(Shape::Token(token)) => token_keyboard(&token, explorer_base_url),
        Some(Shape::Wallet(wallet)) => wallet_keyboard(&wallet, explorer_base_url),
        _ => Keyboard::default(),
    };

    if keyboard.rows.is_empty() {
        generic_keyboard().into_option()
    } else {
        Some(keyboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EXPLORER: &str = "https://solscan.io";

    #[test]
    fn recommendations_build_view_alert_compare_and_link_rows() {
        let payload = json!({
            "recommendations": [
                { "symbol": "SOL", "address": "So11111111111111111111111111111111111111112" },
                { "symbol": "JUP" },
                { "symbol": "BONK" },
                { "symbol": "WIF" }
            ]
        });
        let Some(keyboard) = build_keyboard(Some(&payload), EXPLORER) else {
            panic!("expected keyboard");
        };
        assert_eq!(keyboard.rows.len(), 4);
        assert_eq!(keyboard.rows[0].len(), 3);
        assert_eq!(keyboard.rows[1].len(), 3);
        let compare = keyboard.find(COMPARE_TOP_TWO).map(|b| b.kind.clone());
        assert_eq!(
            compare,
            Some(ButtonKind::Callback("action:compare:SOL:JUP".to_string()))
        );
        assert_eq!(
            keyboard.rows[3][0].kind,
            ButtonKind::Url(
                "https://solscan.io/token/So11111111111111111111111111111111111111112".to_string()
            )
        );
    }

    #[test]
    fn single_recommendation_has_no_compare_row() {
        let payload = json!({ "recommendations": [{ "symbol": "SOL" }] });
        let keyboard = build_keyboard(Some(&payload), EXPLORER).unwrap_or_default();
        assert!(keyboard.find(COMPARE_TOP_TWO).is_none());
        assert_eq!(keyboard.rows.len(), 2);
    }

    #[test]
    fn overlong_payloads_are_dropped() {
        let long = "A".repeat(60);
        let payload = json!({ "token": { "symbol": long } });
        let keyboard = build_keyboard(Some(&payload), EXPLORER).unwrap_or_default();
        // every token action overflows, so only the generic row remains
        assert!(keyboard.find(EXPLORE).is_some());
        assert!(keyboard
            .callback_data()
            .all(|d| d.len() <= CALLBACK_DATA_LIMIT));
    }

    #[test]
    fn wallet_keyboard_links_account() {
        let address = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
        let payload = json!({ "wallet": { "address": address } });
        let keyboard = build_keyboard(Some(&payload), EXPLORER).unwrap_or_default();
        assert_eq!(keyboard.rows.len(), 3);
        assert!(keyboard
            .callback_data()
            .any(|d| d == format!("wallet:risk:{address}")));
        assert_eq!(
            keyboard.rows[2][0].kind,
            ButtonKind::Url(format!("https://solscan.io/account/{address}"))
        );
    }

    #[test]
    fn no_payload_gets_generic_row() {
        let keyboard = build_keyboard(None, EXPLORER).unwrap_or_default();
        assert_eq!(keyboard.rows.len(), 1);
        assert!(keyboard.find(MARKET_OVERVIEW).is_some());

        let malformed = json!({ "recommendations": 5 });
        assert_eq!(build_keyboard(Some(&malformed), EXPLORER), Some(keyboard));
    }

    #[test]
    fn minimal_keyboard_is_one_row() {
        let keyboard = minimal_keyboard();
        assert_eq!(keyboard.rows.len(), 1);
        assert!(keyboard.find(HELP).is_some());
    }
}
