//! Text helpers for the restricted HTML subset the renderer emits.
//!
//! Regexes are declared with `lazy_regex!` so patterns are validated at
//! compile time.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use unicode_segmentation::UnicodeSegmentation;

/// Tags the renderer is allowed to emit
pub const ALLOWED_TAGS: &[&str] = &["b", "i", "code", "pre", "a"];

/// Match any markup tag
static RE_TAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"</?[a-zA-Z][^<>]*>");

/// Match an opening or closing tag, capturing the slash and the name
static RE_TAG_NAME: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<(/?)([a-zA-Z]+)[^<>]*>");

/// Escape user-derived text for embedding in markup.
#[must_use]
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Remove every markup tag and decode entities.
///
/// ```
/// use tokenpilot_core::utils::strip_tags;
/// assert_eq!(strip_tags("<b>1 &lt; 2</b>"), "1 < 2");
/// ```
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let without_tags = RE_TAG.replace_all(html, "");
    html_escape::decode_html_entities(&without_tags).into_owned()
}

/// Cut `s` to at most `max_chars` characters without splitting a grapheme.
///
/// A multi-codepoint emoji that would straddle the limit is dropped whole.
///
/// ```
/// use tokenpilot_core::utils::truncate_str;
/// assert_eq!(truncate_str("Solana 🇸🇪", 8), "Solana ");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    let mut used = 0;
    let mut end = 0;
    for (pos, grapheme) in s.grapheme_indices(true) {
        let width = grapheme.chars().count();
        if used + width > max_chars {
            return s[..end].to_string();
        }
        used += width;
        end = pos + grapheme.len();
    }
    s.to_string()
}

/// Shorten a long identifier to `head…tail`.
#[must_use]
pub fn shorten_middle(s: &str, keep: usize) -> String {
    let count = s.chars().count();
    if count <= keep * 2 + 1 {
        return s.to_string();
    }
    let head: String = s.chars().take(keep).collect();
    let tail: String = s.chars().skip(count - keep).collect();
    format!("{head}…{tail}")
}

/// Drop a dangling partial tag or entity at the end of a cut.
fn drop_partial_markup(cut: &str) -> &str {
    let mut end = cut.len();
    if let Some(lt) = cut.rfind('<') {
        if cut[lt..].find('>').is_none() {
            end = lt;
        }
    }
    let head = &cut[..end];
    if let Some(amp) = head.rfind('&') {
        let tail = &head[amp..];
        if !tail.contains(';') && !tail.contains(char::is_whitespace) {
            end = amp;
        }
    }
    &cut[..end]
}

/// Closing tags for every tag still open at the end of `html`.
fn closing_tags(html: &str) -> String {
    let mut open: Vec<String> = Vec::new();
    for caps in RE_TAG_NAME.captures_iter(html) {
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map_or("", |m| m.as_str()).to_ascii_lowercase();
        if closing {
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.truncate(pos);
            }
        } else {
            open.push(name);
        }
    }
    open.iter().rev().map(|t| format!("</{t}>")).collect()
}

/// Truncate markup to at most `max_chars` characters including `notice`.
///
/// Partial tags and entities at the cut are dropped and every tag left open
/// is closed before the notice is appended. Input that already fits is
/// returned unchanged.
#[must_use]
pub fn truncate_html(html: &str, max_chars: usize, notice: &str) -> String {
    if html.chars().count() <= max_chars {
        return html.to_string();
    }

    let notice_len = notice.chars().count();
    let mut budget = max_chars.saturating_sub(notice_len);
    loop {
        let cut = truncate_str(html, budget);
        let kept = drop_partial_markup(&cut);
        let closers = closing_tags(kept);
        let total = kept.chars().count() + closers.chars().count() + notice_len;
        if total <= max_chars || budget == 0 {
            return format!("{kept}{closers}{notice}");
        }
        budget = budget.saturating_sub(total - max_chars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_keeps_graphemes_whole() {
        assert_eq!(truncate_str("BONK 🐕 pump", 6), "BONK 🐕");
        assert_eq!(truncate_str("Solana 🇸🇪", 8), "Solana ");
        assert_eq!(truncate_str("short", 50), "short");
        assert_eq!(truncate_str("", 3), "");
    }

    #[test]
    fn test_strip_tags_decodes_entities() {
        assert_eq!(
            strip_tags("<b>SOL</b> &amp; <code>BONK</code> <a href=\"x\">link</a>"),
            "SOL & BONK link"
        );
    }

    #[test]
    fn test_truncate_html_closes_open_tags() {
        let html = format!("<b>{}</b>", "a".repeat(50));
        let out = truncate_html(&html, 20, "…");
        assert!(out.chars().count() <= 20, "{out}");
        assert!(out.starts_with("<b>"));
        assert!(out.ends_with("</b>…"));
    }

    #[test]
    fn test_truncate_html_drops_partial_entity_and_tag() {
        assert_eq!(drop_partial_markup("abc &am"), "abc ");
        assert_eq!(drop_partial_markup("abc <co"), "abc ");
        assert_eq!(drop_partial_markup("a &amp; b"), "a &amp; b");
        assert_eq!(drop_partial_markup("x & y"), "x & y");
    }

    #[test]
    fn test_truncate_html_noop_when_short() {
        assert_eq!(truncate_html("<i>hi</i>", 100, "!"), "<i>hi</i>");
    }

    #[test]
    fn test_shorten_middle() {
        assert_eq!(shorten_middle("abcdefghij", 3), "abc…hij");
        assert_eq!(shorten_middle("abc", 3), "abc");
    }
}
