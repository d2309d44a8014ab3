//! Tiered response rendering
//!
//! Three tiers of decreasing fidelity, each a pure function returning a
//! result. [`render`] picks the first tier that succeeds:
//!
//! 1. **Enhanced**: highlighted answer text, visualization block and source
//!    line for structured payloads, full action keyboard.
//! 2. **Simple**: escaped answer text with the minimal keyboard.
//! 3. **Plain**: tag-free text, never fails.
//!
//! Every tier keeps the body within [`MESSAGE_LENGTH_LIMIT`] characters.

#![allow(clippy::non_std_lazy_statics)]

use crate::backend::BackendResult;
use crate::config::MESSAGE_LENGTH_LIMIT;
use crate::format::{format_number, format_percent, format_price, format_usd, trend_icon};
use crate::keyboard::{build_keyboard, minimal_keyboard, Keyboard};
use crate::structured::{
    ActionResult, Shape, ShapeError, SourceInfo, StructuredView, TokenFacts, WalletFacts,
};
use crate::utils::{escape, shorten_middle, strip_tags, truncate_html, truncate_str};
use lazy_regex::lazy_regex;
use serde_json::Value;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::warn;

/// Appended when a body had to be cut to fit the ceiling
pub const TRUNCATION_NOTICE: &str = "\n\n<i>✂️ Message truncated</i>";

/// Label used when the payload does not name its data source
pub const DEFAULT_SOURCE_LABEL: &str = "Tokenpilot";

/// Body sent when the backend answered with nothing
pub const EMPTY_ANSWER: &str = "(empty answer)";

const MAX_RECOMMENDATIONS: usize = 5;
const MAX_HOLDINGS: usize = 3;
const MAX_ACTION_FIELDS: usize = 5;

/// Cosmetic highlighting, applied to already-escaped text in one pass
static RE_HIGHLIGHT: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?P<addr>\b[1-9A-HJ-NP-Za-km-z]{32,44}\b)|(?P<usd>\$\d[\d,]*(?:\.\d+)?[KMBT]?)|(?P<pct>[+-]?\d+(?:\.\d+)?%)|(?P<ticker>\b[A-Z]{2,5}\b)"
);

/// A tier could not produce a body
#[derive(Error, Debug)]
pub enum RenderError {
    /// Structured payload had an unusable shape
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// Nothing to show
    #[error("answer is empty")]
    EmptyAnswer,
    /// Echo block could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fidelity level that produced a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Highlighting, visualization, full keyboard
    Enhanced,
    /// Escaped text, minimal keyboard
    Simple,
    /// No markup
    Plain,
}

/// How the transport should interpret a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Restricted HTML subset
    Html,
    /// No formatting directives
    Plain,
}

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Message body
    pub body: String,
    /// Attached keyboard
    pub keyboard: Option<Keyboard>,
    /// Body format
    pub format: TextFormat,
    /// Tier that produced it
    pub tier: Tier,
}

/// Renderer toggles
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Append the raw result as a preformatted block
    pub echo_result: bool,
    /// Base URL for explorer link buttons
    pub explorer_base_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            echo_result: false,
            explorer_base_url: "https://solscan.io".to_string(),
        }
    }
}

/// Render a backend result, degrading tier by tier. Never fails.
#[must_use]
pub fn render(result: &BackendResult, options: &RenderOptions) -> Rendered {
    render_enhanced(result, options)
        .or_else(|err| {
            warn!(error = %err, "Enhanced rendering failed, using simple tier");
            render_simple(result)
        })
        .unwrap_or_else(|err| {
            warn!(error = %err, "Simple rendering failed, using plain tier");
            render_plain(&result.assistant_message.text)
        })
}

/// Tier 1.
///
/// # Errors
///
/// Fails on a malformed structured payload or when there is nothing to show.
pub fn render_enhanced(
    result: &BackendResult,
    options: &RenderOptions,
) -> Result<Rendered, RenderError> {
    let text = result.assistant_message.text.trim();
    let structured = result.structured();
    let view = structured.map(StructuredView::parse).transpose()?;

    let mut sections: Vec<String> = Vec::new();
    if !text.is_empty() {
        sections.push(highlight(&escape(text)));
    }
    if let Some(view) = &view {
        if let Some(block) = view.shape.as_ref().map(visualization) {
            sections.push(block);
        }
        if sections.is_empty() {
            return Err(RenderError::EmptyAnswer);
        }
        sections.push(source_line(view.source.as_ref()));
    }
    if sections.is_empty() {
        return Err(RenderError::EmptyAnswer);
    }
    if options.echo_result {
        let raw = serde_json::to_string_pretty(result)?;
        sections.push(format!("<pre>{}</pre>", escape(&raw)));
    }

    Ok(Rendered {
        body: truncate_html(&sections.join("\n\n"), MESSAGE_LENGTH_LIMIT, TRUNCATION_NOTICE),
        keyboard: build_keyboard(structured, &options.explorer_base_url),
        format: TextFormat::Html,
        tier: Tier::Enhanced,
    })
}

/// Tier 2.
///
/// # Errors
///
/// Fails when the answer text is empty.
pub fn render_simple(result: &BackendResult) -> Result<Rendered, RenderError> {
    let text = result.assistant_message.text.trim();
    if text.is_empty() {
        return Err(RenderError::EmptyAnswer);
    }
    Ok(Rendered {
        body: truncate_html(&escape(text), MESSAGE_LENGTH_LIMIT, TRUNCATION_NOTICE),
        keyboard: Some(minimal_keyboard()),
        format: TextFormat::Html,
        tier: Tier::Simple,
    })
}

/// Tier 3: strip markup from `text`.
#[must_use]
pub fn render_plain(text: &str) -> Rendered {
    let stripped = strip_tags(text);
    let stripped = stripped.trim();
    let body = if stripped.is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        fit_plain(stripped)
    };
    Rendered {
        body,
        keyboard: Some(minimal_keyboard()),
        format: TextFormat::Plain,
        tier: Tier::Plain,
    }
}

/// Demote an already rendered message after the transport rejected its markup.
#[must_use]
pub fn demote_to_plain(rendered: &Rendered) -> Rendered {
    render_plain(&rendered.body)
}

fn fit_plain(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LENGTH_LIMIT {
        return text.to_string();
    }
    let notice = strip_tags(TRUNCATION_NOTICE);
    let budget = MESSAGE_LENGTH_LIMIT.saturating_sub(notice.chars().count());
    format!("{}{notice}", truncate_str(text, budget))
}

/// Highlight tickers, dollar amounts, percentages and addresses in escaped text.
#[must_use]
pub fn highlight(escaped: &str) -> String {
    RE_HIGHLIGHT
        .replace_all(escaped, |caps: &regex::Captures| {
            if let Some(m) = caps.name("addr").or_else(|| caps.name("ticker")) {
                format!("<code>{}</code>", m.as_str())
            } else if let Some(m) = caps.name("usd") {
                format!("💰 <b>{}</b>", m.as_str())
            } else if let Some(m) = caps.name("pct") {
                let icon = if m.as_str().starts_with('-') { "📉" } else { "📈" };
                format!("{icon} <b>{}</b>", m.as_str())
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Visualization block for a payload shape.
#[must_use]
pub fn visualization(shape: &Shape) -> String {
    match shape {
        Shape::Recommendations(recs) => recommendations_block(recs),
        Shape::Token(token) => token_block(token),
        Shape::Wallet(wallet) => wallet_block(wallet),
        Shape::Action(action) => action_block(action),
    }
}

fn label_of(token: &TokenFacts) -> String {
    escape(token.label().unwrap_or("?"))
}

fn recommendations_block(recs: &[TokenFacts]) -> String {
    let mut out = String::from("<b>🏆 Top picks</b>");
    for (i, token) in recs.iter().take(MAX_RECOMMENDATIONS).enumerate() {
        let _ = write!(
            out,
            "\n{}. <b>{}</b> · {} · {} {}",
            i + 1,
            label_of(token),
            format_price(token.price),
            trend_icon(token.change_24h),
            format_percent(token.change_24h)
        );
        if let Some(reason) = &token.reason {
            let _ = write!(out, "\n   <i>{}</i>", escape(&truncate_str(reason, 200)));
        }
    }
    if recs.len() > MAX_RECOMMENDATIONS {
        let _ = write!(out, "\n<i>…and {} more</i>", recs.len() - MAX_RECOMMENDATIONS);
    }
    out
}

fn token_block(token: &TokenFacts) -> String {
    let mut out = format!("<b>📊 {}</b>", label_of(token));
    if let (Some(name), Some(_)) = (&token.name, &token.symbol) {
        let _ = write!(out, " · {}", escape(name));
    }
    let _ = write!(
        out,
        "\n💵 Price: {}\n{} 24h: {}\n🏦 Market cap: {}\n🔄 Volume 24h: {}\n👥 Holders: {}",
        format_price(token.price),
        trend_icon(token.change_24h),
        format_percent(token.change_24h),
        format_usd(token.market_cap),
        format_usd(token.volume_24h),
        format_number(token.holders, true)
    );
    if let Some(address) = &token.address {
        let _ = write!(out, "\n<code>{}</code>", escape(address));
    }
    out
}

fn wallet_block(wallet: &WalletFacts) -> String {
    let mut out = String::from("<b>👛 Wallet</b>");
    if let Some(address) = &wallet.address {
        let _ = write!(out, " <code>{}</code>", escape(&shorten_middle(address, 4)));
    }
    let _ = write!(out, "\n💰 Total value: {}", format_usd(wallet.total_value));
    let top = wallet.top_holdings(MAX_HOLDINGS);
    if !top.is_empty() {
        out.push_str("\nTop holdings:");
        for holding in top {
            let _ = write!(
                out,
                "\n• <b>{}</b> {} · {}",
                escape(holding.symbol.as_deref().unwrap_or("?")),
                format_number(holding.balance, true),
                format_usd(holding.value_usd)
            );
        }
    }
    out
}

fn action_block(action: &ActionResult) -> String {
    let icon = if action.success == Some(false) { "❌" } else { "✅" };
    let headline = action.message.as_deref().unwrap_or("Done");
    let mut out = format!("{icon} <b>{}</b>", escape(headline));
    for (key, value) in action.fields.iter().take(MAX_ACTION_FIELDS) {
        let _ = write!(out, "\n• {}: {}", escape(key), escape(&truncate_str(value, 100)));
    }
    out
}

/// Attribution line: provider, optional endpoint and local fetch time.
#[must_use]
pub fn source_line(source: Option<&SourceInfo>) -> String {
    let default = SourceInfo::default();
    let source = source.unwrap_or(&default);
    let mut line = format!(
        "<i>📡 Source: {}",
        escape(source.api.as_deref().unwrap_or(DEFAULT_SOURCE_LABEL))
    );
    if let Some(endpoint) = &source.endpoint {
        let _ = write!(line, " · {}", escape(endpoint));
    }
    let _ = write!(line, " · {}</i>", source.local_time().format("%Y-%m-%d %H:%M"));
    line
}

/// Compact summary of a stored payload (the `/data` command).
///
/// Returns `Ok(None)` when the payload has no recognized shape.
///
/// # Errors
///
/// Fails on a malformed payload.
pub fn render_data_summary(value: &Value, header: &str) -> Result<Option<String>, RenderError> {
    let view = StructuredView::parse(value)?;
    let Some(shape) = &view.shape else {
        return Ok(None);
    };
    let body = format!(
        "{header}\n\n{}\n\n{}",
        visualization(shape),
        source_line(view.source.as_ref())
    );
    Ok(Some(truncate_html(&body, MESSAGE_LENGTH_LIMIT, TRUNCATION_NOTICE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::COMPARE_TOP_TWO;
    use serde_json::json;

    fn with_data(text: &str, data: Value) -> BackendResult {
        BackendResult {
            structured_data: Some(data),
            ..BackendResult::text(text)
        }
    }

    #[test]
    fn plain_answer_is_escaped_with_generic_keyboard() {
        let rendered = render(&BackendResult::text("Hi!"), &RenderOptions::default());
        assert_eq!(rendered.body, "Hi!");
        assert_eq!(rendered.tier, Tier::Enhanced);
        assert_eq!(rendered.format, TextFormat::Html);
        let keyboard = rendered.keyboard.unwrap_or_default();
        assert_eq!(keyboard.rows.len(), 1);
        assert!(keyboard.find(crate::keyboard::MARKET_OVERVIEW).is_some());
    }

    #[test]
    fn highlight_wraps_known_patterns() {
        insta::assert_snapshot!(
            highlight(&escape("SOL is $142.10 (-2.5%) & BONK +3%")),
            @"<code>SOL</code> is 💰 <b>$142.10</b> (📉 <b>-2.5%</b>) &amp; <code>BONK</code> 📈 <b>+3%</b>"
        );
    }

    #[test]
    fn highlight_marks_addresses_as_code() {
        let addr = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
        assert_eq!(
            highlight(&format!("wallet {addr}")),
            format!("wallet <code>{addr}</code>")
        );
    }

    #[test]
    fn recommendations_show_trend_and_percent() {
        let result = with_data(
            "Here are my picks",
            json!({
                "recommendations": [
                    { "symbol": "SOL", "price": 142.1, "price_change_1d": -2.5, "reason": "Strong <b>ecosystem</b>" },
                    { "symbol": "JUP", "price": 0.91, "price_change_1d": 3.1 },
                    { "symbol": "BONK", "price": 0.000_021 }
                ],
                "source": { "api": "birdeye", "endpoint": "/defi/price" }
            }),
        );
        let rendered = render(&result, &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Enhanced);
        assert!(rendered.body.contains("1. <b>SOL</b> · $142.10 · 📉 -2.50%"));
        assert!(rendered.body.contains("Strong &lt;b&gt;ecosystem&lt;/b&gt;"));
        assert!(rendered.body.contains("📡 Source: birdeye · /defi/price"));
        let keyboard = rendered.keyboard.unwrap_or_default();
        assert!(keyboard.find(COMPARE_TOP_TWO).is_some());
    }

    #[test]
    fn payloads_with_both_field_spellings_stay_enhanced() {
        let wallet = with_data(
            "Your wallet",
            json!({
                "wallet": {
                    "address": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
                    "tokens": [{ "symbol": "SOL", "name": "Solana", "valueUsd": 900 }]
                }
            }),
        );
        let rendered = render(&wallet, &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Enhanced);
        assert!(rendered.body.contains("👛 Wallet"));
        assert!(rendered.body.contains("• <b>SOL</b>"));
        let keyboard = rendered.keyboard.unwrap_or_default();
        assert!(keyboard.find("🌐 View on explorer").is_some());

        let token = with_data(
            "SOL overview",
            json!({ "token": { "symbol": "SOL", "name": "Solana", "price": 142.1, "priceUsd": 142.1 } }),
        );
        let rendered = render(&token, &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Enhanced);
        assert!(rendered.body.contains("<b>📊 SOL</b> · Solana"));
    }

    #[test]
    fn empty_recommendations_render_like_plain_answer() {
        let result = with_data("Nothing stands out", json!({ "recommendations": [] }));
        let rendered = render(&result, &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Enhanced);
        assert!(!rendered.body.contains("Top picks"));
        let keyboard = rendered.keyboard.unwrap_or_default();
        assert_eq!(keyboard.rows.len(), 1);
        assert!(keyboard.find(crate::keyboard::MARKET_OVERVIEW).is_some());
    }

    #[test]
    fn malformed_payload_degrades_to_simple_tier() {
        let result = with_data("Answer <3", json!({ "recommendations": "oops" }));
        let rendered = render(&result, &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Simple);
        assert_eq!(rendered.body, "Answer &lt;3");
        assert_eq!(rendered.keyboard, Some(minimal_keyboard()));
    }

    #[test]
    fn empty_everything_degrades_to_plain_tier() {
        let rendered = render(&BackendResult::text("  "), &RenderOptions::default());
        assert_eq!(rendered.tier, Tier::Plain);
        assert_eq!(rendered.format, TextFormat::Plain);
        assert_eq!(rendered.body, EMPTY_ANSWER);
    }

    #[test]
    fn long_answers_are_truncated_with_notice() {
        let result = BackendResult::text("word ".repeat(2000));
        let rendered = render(&result, &RenderOptions::default());
        assert!(rendered.body.chars().count() <= MESSAGE_LENGTH_LIMIT);
        assert!(rendered.body.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn echo_appends_preformatted_result() {
        let options = RenderOptions {
            echo_result: true,
            ..RenderOptions::default()
        };
        let rendered = render(&BackendResult::text("ok"), &options);
        assert!(rendered.body.contains("<pre>{"));
        assert!(rendered.body.contains("\"assistantMessage\""));
    }

    #[test]
    fn demotion_strips_markup() {
        let rendered = render(&BackendResult::text("SOL & <friends>"), &RenderOptions::default());
        let plain = demote_to_plain(&rendered);
        assert_eq!(plain.body, "SOL & <friends>");
        assert_eq!(plain.format, TextFormat::Plain);
    }

    #[test]
    fn data_summary_for_token() -> Result<(), RenderError> {
        let summary = render_data_summary(
            &json!({ "token": { "symbol": "SOL", "marketCap": 6.5e10, "holders": 1200 } }),
            "Latest",
        )?
        .unwrap_or_default();
        assert!(summary.starts_with("Latest\n\n<b>📊 SOL</b>"));
        assert!(summary.contains("🏦 Market cap: $65.00B"));
        assert!(summary.contains("👥 Holders: 1.2K"));
        assert!(render_data_summary(&json!({}), "Latest")?.is_none());
        Ok(())
    }
}
