//! Callback action routing.
//!
//! Decodes `actionType:param1:param2:...` button payloads into a natural
//! language query plus priority tool hints for the backend. Every non-empty
//! action type yields a query; unknown actions and sub-actions use a generic
//! template.

use thiserror::Error;

/// Callback data could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// No data at all
    #[error("callback data is empty")]
    Empty,
    /// Data present but the token sequence is unusable
    #[error("malformed callback data: {0}")]
    Malformed(String),
}

/// Result of decoding a button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedQuery {
    /// Query sent to the backend as if typed by the user
    pub query: String,
    /// Tools the backend should prefer
    pub tool_hints: Vec<String>,
}

impl DecodedQuery {
    fn new(query: String, hints: &[&str]) -> Self {
        Self {
            query,
            tool_hints: hints.iter().map(|h| (*h).to_string()).collect(),
        }
    }
}

/// Decode a callback payload.
///
/// # Errors
///
/// Returns `CallbackError::Empty` for empty or blank data and
/// `CallbackError::Malformed` when the action type token is empty.
///
/// ```
/// use tokenpilot_core::callback::decode;
/// let decoded = decode("token:info:SOL").expect("valid");
/// assert!(decoded.query.contains("analyze") && decoded.query.contains("SOL"));
/// assert!(decode("").is_err());
/// ```
pub fn decode(data: &str) -> Result<DecodedQuery, CallbackError> {
    let data = data.trim();
    if data.is_empty() {
        return Err(CallbackError::Empty);
    }

    let (action, rest) = data.split_once(':').unwrap_or((data, ""));
    let action = action.trim();
    if action.is_empty() {
        return Err(CallbackError::Malformed(data.to_string()));
    }
    let params: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(':').map(str::trim).collect()
    };

    Ok(match action.to_ascii_lowercase().as_str() {
        "help" => help_query(),
        "example" => example_query(&params),
        "token" => token_query(&params),
        "wallet" => wallet_query(&params),
        "alert" => alert_query(&params),
        "action" => action_query(&params),
        "default" => default_query(rest, &params),
        _ => generic_query(action, &params),
    })
}

fn generic_query(action: &str, params: &[&str]) -> DecodedQuery {
    let details: Vec<&str> = params.iter().copied().filter(|p| !p.is_empty()).collect();
    let query = if details.is_empty() {
        format!("Please help me with the \"{action}\" action.")
    } else {
        format!(
            "Please help me with the \"{action}\" action for: {}.",
            details.join(" ")
        )
    };
    DecodedQuery::new(query, &[])
}

fn subject<'a>(params: &[&'a str], index: usize, fallback: &'a str) -> &'a str {
    params
        .get(index)
        .copied()
        .filter(|p| !p.is_empty())
        .unwrap_or(fallback)
}

fn help_query() -> DecodedQuery {
    DecodedQuery::new(
        "What can you help me with? Give me a short overview of what you can do with tokens, wallets and alerts.".to_string(),
        &[],
    )
}

fn example_query(params: &[&str]) -> DecodedQuery {
    match params.first().copied().unwrap_or_default() {
        "explore" | "" => DecodedQuery::new(
            "Show me some interesting tokens to explore right now.".to_string(),
            &["trending_tokens"],
        ),
        "trending" => DecodedQuery::new(
            "What tokens are trending today?".to_string(),
            &["trending_tokens"],
        ),
        "wallet" => DecodedQuery::new(
            "Show me an example wallet analysis.".to_string(),
            &["wallet_overview"],
        ),
        _ => generic_query("example", params),
    }
}

fn token_query(params: &[&str]) -> DecodedQuery {
    let sub = params.first().copied().unwrap_or_default();
    let token = subject(params, 1, "this token");
    match sub {
        "info" => DecodedQuery::new(
            format!("Please analyze {token} and give me an overview of its price, market cap, volume and holders."),
            &["token_overview", "token_security"],
        ),
        "price" => DecodedQuery::new(
            format!("What is the current price of {token}?"),
            &["token_price"],
        ),
        "chart" => DecodedQuery::new(
            format!("Show me the recent price trend of {token}."),
            &["price_history"],
        ),
        "holders" => DecodedQuery::new(
            format!("Who are the top holders of {token}?"),
            &["token_holders"],
        ),
        "predict" => DecodedQuery::new(
            format!("What is your short-term price outlook for {token}?"),
            &["price_history", "market_sentiment"],
        ),
        _ => generic_query("token", params),
    }
}

fn wallet_query(params: &[&str]) -> DecodedQuery {
    let sub = params.first().copied().unwrap_or_default();
    let wallet = subject(params, 1, "my wallet");
    match sub {
        "info" => DecodedQuery::new(
            format!("Give me an overview of wallet {wallet}."),
            &["wallet_overview"],
        ),
        "tokens" => DecodedQuery::new(
            format!("Which tokens does wallet {wallet} hold?"),
            &["wallet_tokens"],
        ),
        "nfts" => DecodedQuery::new(
            format!("Which NFTs does wallet {wallet} hold?"),
            &["wallet_nfts"],
        ),
        "pnl" => DecodedQuery::new(
            format!("What is the profit and loss of wallet {wallet}?"),
            &["wallet_pnl"],
        ),
        "activity" => DecodedQuery::new(
            format!("Show me the recent activity of wallet {wallet}."),
            &["wallet_transactions"],
        ),
        "risk" => DecodedQuery::new(
            format!("Assess the risk profile of wallet {wallet}."),
            &["wallet_tokens", "token_security"],
        ),
        _ => generic_query("wallet", params),
    }
}

fn alert_query(params: &[&str]) -> DecodedQuery {
    match params.first().copied().unwrap_or_default() {
        "set" => DecodedQuery::new(
            format!(
                "Set a price alert for {}.",
                subject(params, 1, "a token")
            ),
            &["alert_create", "token_price"],
        ),
        "list" => DecodedQuery::new(
            "Show me my active price alerts.".to_string(),
            &["alert_list"],
        ),
        "delete" => DecodedQuery::new(
            match params.get(1).filter(|id| !id.is_empty()) {
                Some(id) => format!("Delete my price alert {id}."),
                None => "Delete my price alert.".to_string(),
            },
            &["alert_delete"],
        ),
        _ => generic_query("alert", params),
    }
}

fn action_query(params: &[&str]) -> DecodedQuery {
    match params.first().copied().unwrap_or_default() {
        "compare" => DecodedQuery::new(
            format!(
                "Compare {} and {}.",
                subject(params, 1, "the first token"),
                subject(params, 2, "the second token")
            ),
            &["token_overview"],
        ),
        "more_tokens" => DecodedQuery::new(
            "Show me more recommended tokens.".to_string(),
            &["trending_tokens"],
        ),
        "market_overview" => DecodedQuery::new(
            "Give me an overview of the market today.".to_string(),
            &["market_overview", "trending_tokens"],
        ),
        _ => generic_query("action", params),
    }
}

fn default_query(rest: &str, params: &[&str]) -> DecodedQuery {
    let text = rest.trim();
    if text.is_empty() {
        generic_query("default", params)
    } else {
        DecodedQuery::new(text.to_string(), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn query(data: &str) -> DecodedQuery {
        match decode(data) {
            Ok(decoded) => decoded,
            Err(err) => panic!("{data:?} failed to decode: {err}"),
        }
    }

    #[test]
    fn token_info_asks_for_analysis() {
        let decoded = query("token:info:SOL");
        assert!(decoded.query.contains("analyze"));
        assert!(decoded.query.contains("SOL"));
        assert_eq!(decoded.tool_hints, vec!["token_overview", "token_security"]);
    }

    #[test]
    fn empty_data_is_invalid() {
        assert_eq!(decode(""), Err(CallbackError::Empty));
        assert_eq!(decode("   "), Err(CallbackError::Empty));
        assert!(matches!(decode(":SOL"), Err(CallbackError::Malformed(_))));
    }

    #[test]
    fn compare_uses_both_symbols() {
        let decoded = query("action:compare:SOL:JUP");
        assert_eq!(decoded.query, "Compare SOL and JUP.");
    }

    #[test]
    fn unknown_sub_action_uses_generic_template() {
        let decoded = query("token:burn:SOL");
        assert!(decoded.query.contains("\"token\""));
        assert!(decoded.query.contains("burn SOL"));
        assert!(decoded.tool_hints.is_empty());
    }

    #[test]
    fn unknown_action_type_uses_generic_template() {
        assert_eq!(
            query("stake").query,
            "Please help me with the \"stake\" action."
        );
    }

    #[test]
    fn default_passes_text_through() {
        assert_eq!(query("default:gm: what's up").query, "gm: what's up");
    }

    proptest! {
        #[test]
        fn decode_is_total_for_non_empty_action(
            action in "[a-z_]{1,10}",
            params in proptest::collection::vec("[A-Za-z0-9_]{0,12}", 0..4)
        ) {
            let mut data = action.clone();
            for p in &params {
                data.push(':');
                data.push_str(p);
            }
            let decoded = decode(&data);
            prop_assert!(decoded.is_ok());
            prop_assert!(decoded.map(|d| !d.query.trim().is_empty()).unwrap_or(false));
        }
    }
}
