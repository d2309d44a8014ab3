//! Stage table shared by every component that renders backend progress.

use serde::{Deserialize, Serialize};

/// Icon used for stages missing from the table
pub const DEFAULT_STAGE_ICON: &str = "⏳";

/// Presentation of one known stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLabel {
    /// Emoji shown before the title
    pub icon: &'static str,
    /// Uppercase title
    pub title: &'static str,
    /// Whether the stage re-asserts the typing indicator
    pub heavy: bool,
}

const STAGES: &[(&str, StageLabel)] = &[
    ("setup", StageLabel { icon: "🔧", title: "SETTING UP", heavy: false }),
    ("memory_consultation", StageLabel { icon: "🧠", title: "CHECKING MEMORY", heavy: false }),
    ("token_resolution", StageLabel { icon: "🔍", title: "RESOLVING TOKENS", heavy: false }),
    ("main_consultation", StageLabel { icon: "🤔", title: "THINKING", heavy: true }),
    ("executing_tools", StageLabel { icon: "⚙️", title: "GATHERING DATA", heavy: true }),
    ("synthesis", StageLabel { icon: "✍️", title: "COMPOSING ANSWER", heavy: true }),
    ("finalizing", StageLabel { icon: "📦", title: "FINALIZING", heavy: false }),
    ("complete", StageLabel { icon: "✅", title: "COMPLETE", heavy: false }),
    ("error", StageLabel { icon: "❌", title: "ERROR", heavy: false }),
];

/// One progress event emitted by the backend during a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage name (open set)
    pub stage: String,
    /// Optional human-readable detail
    #[serde(default)]
    pub detail: Option<String>,
}

impl StageEvent {
    /// Create an event
    #[must_use]
    pub fn new(stage: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            stage: stage.into(),
            detail,
        }
    }
}

/// Look up a known stage
#[must_use]
pub fn lookup(stage: &str) -> Option<StageLabel> {
    STAGES
        .iter()
        .find(|(name, _)| *name == stage)
        .map(|(_, label)| *label)
}

/// Whether the stage is in the heavy set
#[must_use]
pub fn is_heavy(stage: &str) -> bool {
    lookup(stage).is_some_and(|label| label.heavy)
}

/// All known stage names, in pipeline order
pub fn known_stages() -> impl Iterator<Item = &'static str> {
    STAGES.iter().map(|(name, _)| *name)
}

/// Render a stage event as `"{icon} {TITLE}\n{escaped detail}"`.
///
/// Unknown stages use the hourglass icon and the uppercased stage name.
/// A missing or blank detail renders the header line only.
#[must_use]
pub fn render_stage(stage: &str, detail: Option<&str>) -> String {
    let header = match lookup(stage) {
        Some(label) => format!("{} {}", label.icon, label.title),
        None => {
            let title = stage.trim().replace('_', " ").to_uppercase();
            let title = if title.is_empty() {
                "PROCESSING".to_string()
            } else {
                html_escape::encode_text(&title).into_owned()
            };
            format!("{DEFAULT_STAGE_ICON} {title}")
        }
    };

    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("{header}\n{}", html_escape::encode_text(detail)),
        None => header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_stage_uses_table() {
        assert_eq!(render_stage("synthesis", None), "✍️ COMPOSING ANSWER");
        assert!(is_heavy("executing_tools"));
        assert!(!is_heavy("setup"));
        assert!(!is_heavy("something_else"));
    }

    #[test]
    fn unknown_stage_falls_back_to_hourglass() {
        assert_eq!(
            render_stage("price_lookup", Some("fetching")),
            "⏳ PRICE LOOKUP\nfetching"
        );
        assert_eq!(render_stage("", None), "⏳ PROCESSING");
    }

    #[test]
    fn detail_is_escaped_for_every_known_stage() {
        let raw = "<b>SOL</b> & friends";
        for stage in known_stages() {
            let rendered = render_stage(stage, Some(raw));
            assert!(!rendered.is_empty());
            assert!(!rendered.contains(raw), "{stage} leaked raw detail");
            assert!(rendered.contains("&lt;b&gt;SOL&lt;/b&gt; &amp; friends"));
        }
    }
}
