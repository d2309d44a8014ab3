//! Number formatting shared by every rendering tier and the data summaries.

use serde_json::Value;

/// Placeholder for missing or non-numeric input
pub const NOT_AVAILABLE: &str = "N/A";

/// Format a number for display.
///
/// With `compact`, large magnitudes get a T/B/M/K suffix; otherwise the
/// precision adapts to the magnitude and values from 1000 up get thousands
/// separators.
///
/// ```
/// use tokenpilot_core::format::format_number;
/// assert_eq!(format_number(Some(0.0), false), "0.00");
/// assert_eq!(format_number(Some(1_234_567.0), true), "1.23M");
/// assert_eq!(format_number(None, false), "N/A");
/// ```
#[must_use]
pub fn format_number(value: Option<f64>, compact: bool) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return NOT_AVAILABLE.to_string();
    };
    if value == 0.0 {
        return if compact { "0" } else { "0.00" }.to_string();
    }
    if compact {
        format_compact(value)
    } else {
        format_precise(value)
    }
}

fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.1}K", value / 1e3)
    } else if abs < 1.0 {
        with_significant_digits(value, 2)
    } else {
        format!("{value:.0}")
    }
}

fn format_precise(value: f64) -> String {
    let abs = value.abs();
    if abs < 1e-6 {
        format!("{value:.2e}")
    } else if abs < 0.01 {
        trim_fraction(&with_significant_digits(value, 4), 0)
    } else if abs < 1.0 {
        trim_fraction(&format!("{value:.4}"), 2)
    } else if abs < 1000.0 {
        format!("{value:.2}")
    } else {
        with_thousands(value)
    }
}

/// Fixed-point rendering with `digits` significant digits.
fn with_significant_digits(value: f64, digits: i32) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = usize::try_from((digits - 1 - magnitude).max(0)).unwrap_or(0);
    format!("{value:.decimals$}")
}

/// Drop trailing zeros but keep at least `min_fraction` fraction digits.
fn trim_fraction(s: &str, min_fraction: usize) -> String {
    let Some(dot) = s.find('.') else {
        return s.to_string();
    };
    let mut out = s.trim_end_matches('0').to_string();
    let fraction = out.len() - dot - 1;
    if fraction < min_fraction {
        out.push_str(&"0".repeat(min_fraction - fraction));
    }
    if out.ends_with('.') {
        out.pop();
    }
    out
}

fn with_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

/// Signed percentage with two decimals, e.g. `+2.50%`.
#[must_use]
pub fn format_percent(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{v:+.2}%"),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Trend icon for a signed change
#[must_use]
pub fn trend_icon(value: Option<f64>) -> &'static str {
    match value.filter(|v| v.is_finite()) {
        Some(v) if v < 0.0 => "📉",
        Some(v) if v > 0.0 => "📈",
        _ => "➖",
    }
}

/// Dollar amount in compact form, e.g. `$1.23M`.
#[must_use]
pub fn format_usd(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("${}", format_number(Some(v), true)),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Dollar price in precise form, e.g. `$0.0012`.
#[must_use]
pub fn format_price(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("${}", format_number(Some(v), false)),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Read a number from JSON, accepting numeric strings like `"$1,234.5"`.
#[must_use]
pub fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '%' | '_'))
                .collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}
