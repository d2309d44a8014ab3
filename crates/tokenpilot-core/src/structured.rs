//! Typed views over the shape-discriminated `structuredData` payload.
//!
//! The payload is untyped JSON produced by the backend. Shape is decided by
//! the first key present, in the order `recommendations`, `token`, `wallet`,
//! then any other object (an action result). Field names are matched
//! leniently since producers mix snake_case and camelCase, sometimes both
//! in one object.

use crate::format::number_from;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Payload had a recognized key with an unusable value
#[derive(Error, Debug)]
#[error("malformed `{key}` payload: {source}")]
pub struct ShapeError {
    /// Discriminating key
    pub key: &'static str,
    /// Decoding failure
    #[source]
    pub source: serde_json::Error,
}

/// Lenient field lookup over a JSON object.
///
/// Each field has several spellings; the first spelling holding a usable
/// value wins, so payloads carrying two spellings of one field still decode.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .find_map(|key| self.0.get(*key).and_then(number_from))
    }

    fn list(&self, keys: &[&str]) -> Option<&Vec<Value>> {
        keys.iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_array))
    }
}

/// Facts about one token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenFacts {
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Full name
    pub name: Option<String>,
    /// Mint address
    pub address: Option<String>,
    /// Price in USD
    pub price: Option<f64>,
    /// 24h change in percent
    pub change_24h: Option<f64>,
    /// Market capitalization in USD
    pub market_cap: Option<f64>,
    /// 24h trading volume in USD
    pub volume_24h: Option<f64>,
    /// Holder count
    pub holders: Option<f64>,
    /// Why the token was recommended
    pub reason: Option<String>,
}

impl TokenFacts {
    fn from_map(map: &Map<String, Value>) -> Self {
        let f = Fields(map);
        Self {
            symbol: f.text(&["symbol"]),
            name: f.text(&["name"]),
            address: f.text(&["address", "mint", "tokenAddress", "token_address"]),
            price: f.number(&["price", "priceUsd", "price_usd"]),
            change_24h: f.number(&[
                "price_change_1d",
                "price_change_24h",
                "priceChange24h",
                "priceChange1d",
                "change_24h",
            ]),
            market_cap: f.number(&["market_cap", "marketCap", "mc"]),
            volume_24h: f.number(&["volume_24h", "volume24h", "volume", "v24hUSD"]),
            holders: f.number(&["holders", "holder"]),
            reason: f.text(&["reason", "rationale"]),
        }
    }

    /// Symbol, falling back to the name
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.symbol.as_deref().or(self.name.as_deref())
    }

    /// Identifier usable in callback data: symbol, else address
    #[must_use]
    pub fn callback_key(&self) -> Option<&str> {
        self.symbol.as_deref().or(self.address.as_deref())
    }
}

impl<'de> Deserialize<'de> for TokenFacts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(|map| Self::from_map(&map))
    }
}

/// One wallet holding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holding {
    /// Ticker symbol, else the token name
    pub symbol: Option<String>,
    /// Token amount
    pub balance: Option<f64>,
    /// Value in USD
    pub value_usd: Option<f64>,
}

impl Holding {
    fn from_map(map: &Map<String, Value>) -> Self {
        let f = Fields(map);
        Self {
            symbol: f.text(&["symbol", "name"]),
            balance: f.number(&["balance", "amount", "uiAmount"]),
            value_usd: f.number(&["value_usd", "valueUsd", "value", "usd_value"]),
        }
    }
}

/// Wallet summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletFacts {
    /// Wallet address
    pub address: Option<String>,
    /// Total value in USD
    pub total_value: Option<f64>,
    /// Holdings as reported; entries that are not objects are skipped
    pub tokens: Vec<Holding>,
}

impl WalletFacts {
    fn from_map(map: &Map<String, Value>) -> Self {
        let f = Fields(map);
        Self {
            address: f.text(&["address", "wallet"]),
            total_value: f.number(&[
                "total_value",
                "totalValue",
                "totalValueUsd",
                "total_value_usd",
            ]),
            tokens: f
                .list(&["tokens", "holdings"])
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(Holding::from_map)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl<'de> Deserialize<'de> for WalletFacts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(|map| Self::from_map(&map))
    }
}

impl WalletFacts {
    /// Up to `n` holdings by descending USD value
    #[must_use]
    pub fn top_holdings(&self, n: usize) -> Vec<&Holding> {
        let mut sorted: Vec<&Holding> = self.tokens.iter().collect();
        sorted.sort_by(|a, b| {
            b.value_usd
                .unwrap_or(0.0)
                .total_cmp(&a.value_usd.unwrap_or(0.0))
        });
        sorted.truncate(n);
        sorted
    }
}

/// Attribution attached to any payload shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    /// Data provider label
    pub api: Option<String>,
    /// Endpoint queried
    pub endpoint: Option<String>,
    /// When the data was fetched
    pub timestamp: Option<DateTime<Utc>>,
}

impl SourceInfo {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            api: text("api").or_else(|| text("name")),
            endpoint: text("endpoint"),
            timestamp: obj.get("timestamp").and_then(parse_timestamp),
        })
    }

    /// Timestamp in local time, or now when absent
    #[must_use]
    pub fn local_time(&self) -> DateTime<Local> {
        self.timestamp
            .map_or_else(Local::now, |ts| ts.with_timezone(&Local))
    }
}

/// RFC 3339 text, or unix seconds/milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| number_from(value).and_then(from_epoch)),
        Value::Number(_) => number_from(value).and_then(from_epoch),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    // Values past year 5138 in seconds are treated as milliseconds
    let millis = if raw.abs() >= 1e11 { raw } else { raw * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Generic action result (alert confirmation and similar)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    /// Success flag when reported
    pub success: Option<bool>,
    /// Human-readable message
    pub message: Option<String>,
    /// Remaining scalar fields, by key
    pub fields: Vec<(String, String)>,
}

impl ActionResult {
    fn from_map(map: &Map<String, Value>) -> Self {
        let mut result = Self {
            success: map.get("success").and_then(Value::as_bool),
            message: map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            fields: Vec::new(),
        };
        for (key, value) in map {
            if matches!(key.as_str(), "success" | "message" | "source") {
                continue;
            }
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            result.fields.push((key.clone(), text));
        }
        result
    }
}

/// Discriminated payload shape
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// List of recommended tokens
    Recommendations(Vec<TokenFacts>),
    /// Single token overview
    Token(TokenFacts),
    /// Wallet summary
    Wallet(WalletFacts),
    /// Any other object
    Action(ActionResult),
}

/// Parsed payload
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredView {
    /// Matched shape, if any
    pub shape: Option<Shape>,
    /// Attribution, independent of shape
    pub source: Option<SourceInfo>,
}

fn decode<T: DeserializeOwned>(key: &'static str, value: &Value) -> Result<T, ShapeError> {
    T::deserialize(value).map_err(|source| ShapeError { key, source })
}

impl StructuredView {
    /// Classify a payload.
    ///
    /// # Errors
    ///
    /// Returns `ShapeError` when the discriminating key holds a value of the
    /// wrong type (e.g. `recommendations` that is not an array). An empty
    /// `recommendations` array is treated as if the key were missing.
    pub fn parse(value: &Value) -> Result<Self, ShapeError> {
        let Some(map) = value.as_object() else {
            return Ok(Self {
                shape: None,
                source: None,
            });
        };
        let source = map.get("source").and_then(SourceInfo::from_value);
        // An empty pick list carries nothing to show and counts as absent
        let recommendations = map
            .get("recommendations")
            .filter(|recs| !recs.as_array().is_some_and(Vec::is_empty));
        let is_payload_key = |key: &String| {
            key != "source" && (key != "recommendations" || recommendations.is_some())
        };

        let shape = if let Some(recs) = recommendations {
            Some(Shape::Recommendations(decode("recommendations", recs)?))
        } else if let Some(token) = map.get("token") {
            Some(Shape::Token(decode("token", token)?))
        } else if let Some(wallet) = map.get("wallet") {
            Some(Shape::Wallet(parse_wallet(map, wallet)?))
        } else if map.keys().any(is_payload_key) {
            Some(Shape::Action(ActionResult::from_map(map)))
        } else {
            None
        };

        Ok(Self { shape, source })
    }
}

/// `wallet` may be the full object or just the address with siblings alongside.
fn parse_wallet(map: &Map<String, Value>, wallet: &Value) -> Result<WalletFacts, ShapeError> {
    match wallet {
        Value::String(address) => {
            let mut facts: WalletFacts = decode("wallet", &Value::Object(map.clone()))?;
            facts.address = Some(address.clone());
            Ok(facts)
        }
        other => decode("wallet", other),
    }
}
