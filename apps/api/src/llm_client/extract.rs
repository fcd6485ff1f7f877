//! Tolerant JSON extraction for model replies.
//!
//! Each strategy is a pure function from reply text to an optional JSON object.
//! `extract_json_object` walks [`STRATEGIES`] in order and keeps the first hit.

use serde_json::{Map, Value};

pub type Strategy = fn(&str) -> Option<Map<String, Value>>;

/// Ordered cascade: whole reply, then fenced code block, then outermost brace span.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("brace-span", parse_brace_span),
];

/// Returns the recovered object together with the name of the strategy that found it.
pub fn extract_json_object(text: &str) -> Option<(Map<String, Value>, &'static str)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(text).map(|object| (object, *name)))
}

/// The reply is itself a JSON object.
pub fn parse_direct(text: &str) -> Option<Map<String, Value>> {
    as_object(text)
}

/// The first fenced block (```json ... ``` or ``` ... ```) whose body is a JSON object.
pub fn parse_fenced(text: &str) -> Option<Map<String, Value>> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let close = after.find("```")?;
        if let Some(object) = as_object(strip_language_tag(&after[..close])) {
            return Some(object);
        }
        rest = &after[close + 3..];
    }
    None
}

/// Everything from the first `{` to the last `}`.
pub fn parse_brace_span(text: &str) -> Option<Map<String, Value>> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last <= first {
        return None;
    }
    as_object(&text[first..=last])
}

fn strip_language_tag(block: &str) -> &str {
    let tag_len = block
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(block.len());
    &block[tag_len..]
}

fn as_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object_uses_first_strategy() {
        let (object, strategy) = extract_json_object(r#"{"version": 1}"#).unwrap();
        assert_eq!(strategy, "direct");
        assert_eq!(object["version"], 1);
    }

    #[test]
    fn test_fenced_block_with_language_tag() {
        let reply = "Here is the plan:\n```json\n{\"market_pulse\": []}\n```\nLet me know!";
        let (object, strategy) = extract_json_object(reply).unwrap();
        assert_eq!(strategy, "fenced");
        assert!(object["market_pulse"].is_array());
    }

    #[test]
    fn test_fenced_block_without_language_tag() {
        let reply = "```\n{\"cash_tracker\": {\"playbook\": \"wait\"}}\n```";
        let object = parse_fenced(reply).unwrap();
        assert_eq!(object["cash_tracker"]["playbook"], "wait");
    }

    #[test]
    fn test_fenced_skips_non_object_blocks() {
        let reply = "```text\nnot json\n```\nand then\n```json\n{\"ok\": true}\n```";
        let object = parse_fenced(reply).unwrap();
        assert_eq!(object["ok"], true);
    }

    #[test]
    fn test_brace_span_recovers_object_inside_prose() {
        let reply =
            "Sure thing. {\"portfolio_snapshot\": [{\"ticker\": \"AMZN\"}]} Hope that helps.";
        let (object, strategy) = extract_json_object(reply).unwrap();
        assert_eq!(strategy, "brace-span");
        assert_eq!(object["portfolio_snapshot"][0]["ticker"], "AMZN");
    }

    #[test]
    fn test_arrays_and_scalars_are_not_objects() {
        assert!(parse_direct("[1, 2, 3]").is_none());
        assert!(parse_direct("42").is_none());
        assert!(extract_json_object("[{\"a\": 1}, {\"b\": 2}]").is_none());
    }

    #[test]
    fn test_unbalanced_reply_fails_every_strategy() {
        assert!(extract_json_object("I could not produce a plan today.").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("{\"truncated\": [1, 2").is_none());
    }
}
