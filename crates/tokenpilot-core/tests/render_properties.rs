use proptest::prelude::*;
use serde_json::json;
use tokenpilot_core::backend::BackendResult;
use tokenpilot_core::callback::decode;
use tokenpilot_core::config::{CALLBACK_DATA_LIMIT, MESSAGE_LENGTH_LIMIT};
use tokenpilot_core::keyboard::build_keyboard;
use tokenpilot_core::render::{render, RenderOptions, TRUNCATION_NOTICE};
use tokenpilot_core::stages::{known_stages, render_stage};
use tokenpilot_core::utils::ALLOWED_TAGS;

fn emitted_tags(body: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let name: String = after
            .trim_start_matches('/')
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect();
        tags.push(name);
        rest = after;
    }
    tags
}

proptest! {
    /// The body never exceeds the ceiling and truncated bodies end with the notice.
    #[test]
    fn body_respects_ceiling(text in "\\PC{0,6000}", echo in any::<bool>()) {
        let options = RenderOptions { echo_result: echo, ..RenderOptions::default() };
        let rendered = render(&BackendResult::text(text.clone()), &options);
        prop_assert!(rendered.body.chars().count() <= MESSAGE_LENGTH_LIMIT);
        if text.trim().chars().count() > MESSAGE_LENGTH_LIMIT {
            prop_assert!(rendered.body.ends_with(TRUNCATION_NOTICE));
        }
    }

    /// Only the restricted tag subset reaches the transport.
    #[test]
    fn only_allowed_tags_are_emitted(text in "[<>&a-zA-Z0-9$%+\\- ]{0,300}") {
        let result = BackendResult {
            structured_data: Some(json!({
                "recommendations": [{ "symbol": text.clone(), "reason": text.clone() }],
                "source": { "api": text.clone() }
            })),
            ..BackendResult::text(text.clone())
        };
        let rendered = render(&result, &RenderOptions::default());
        for tag in emitted_tags(&rendered.body) {
            prop_assert!(ALLOWED_TAGS.contains(&tag.as_str()), "unexpected tag {tag:?} in {}", rendered.body);
        }
    }

    /// Every keyboard payload fits the callback budget and decodes.
    #[test]
    fn keyboard_payloads_fit_and_decode(symbol in "[A-Za-z0-9]{1,80}") {
        let payload = json!({ "recommendations": [{ "symbol": symbol.clone() }, { "symbol": "SOL" }] });
        if let Some(keyboard) = build_keyboard(Some(&payload), "https://solscan.io") {
            for data in keyboard.callback_data() {
                prop_assert!(data.len() <= CALLBACK_DATA_LIMIT);
                prop_assert!(decode(data).is_ok());
            }
        }
    }

    /// Stage rendering never passes markup-special characters through.
    #[test]
    fn stage_detail_is_escaped(detail in "[a-z &]{0,10}[<>][a-z &]{0,10}") {
        for stage in known_stages() {
            let rendered = render_stage(stage, Some(&detail));
            prop_assert!(!rendered.is_empty());
            prop_assert!(!rendered.contains(detail.trim()));
        }
    }
}
