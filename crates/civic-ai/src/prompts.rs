//! Prompt construction and JSON response parsing for chat-completion models.

use std::collections::{BTreeMap, BTreeSet};

use civic_core::{FeedbackKind, SentimentLabel};
use serde_json::Value;

use crate::client::{DocumentParams, FeedbackAnalysis, ImpactSummary, ServiceError};

pub const SYSTEM_PROMPT: &str = "You help citizens understand government policy documents \
and help officials understand citizen feedback. Be accurate and neutral.";

/// Longest document excerpt sent for impact analysis, in characters.
const IMPACT_EXCERPT_CHARS: usize = 12_000;

pub fn simplify(text: &str, params: &DocumentParams) -> String {
    format!(
        "Rewrite the following policy document in plain {language} for a reader at {level} \
level. Keep every obligation, date and amount. Reply as JSON: \
{{\"simplified_text\": \"...\"}}\n\nDocument:\n{text}",
        language = params.language,
        level = params.reading_level.label(),
    )
}

pub fn impact(text: &str, groups: &[&str]) -> String {
    let excerpt: String = text.chars().take(IMPACT_EXCERPT_CHARS).collect();
    format!(
        "Analyse how this policy affects each of these groups: {groups}. \
Reply as a JSON object with one key per group, each holding \
{{\"impact\": \"...\", \"concerns\": \"...\", \"benefits\": \"...\"}}, plus a key \
\"key_provisions\" holding a list of the main provisions.\n\nDocument:\n{excerpt}",
        groups = groups.join(", "),
    )
}

pub fn feedback(text: &str, kind: Option<FeedbackKind>) -> String {
    let kind_line = match kind {
        Some(kind) => format!("The citizen marked this as a {kind}.\n"),
        None => String::new(),
    };
    format!(
        "{kind_line}Classify this citizen feedback on a policy. Reply as JSON: \
{{\"sentiment\": \"positive|neutral|negative\", \"categories\": [\"...\"], \
\"key_points\": [\"...\"]}}\n\nFeedback:\n{text}"
    )
}

/// Parse a model reply as JSON, tolerating a surrounding markdown fence.
pub fn parse_json(content: &str) -> Result<Value, ServiceError> {
    let trimmed = strip_fence(content.trim());
    serde_json::from_str(trimmed)
        .map_err(|e| ServiceError::Malformed(format!("response is not JSON: {e}")))
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop an optional language tag on the opening fence.
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_simplified(value: &Value) -> Result<String, ServiceError> {
    match value.get("simplified_text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(ServiceError::Malformed(
            "missing simplified_text".to_string(),
        )),
    }
}

/// Split an impact reply into per-group summaries and key provisions.
///
/// Groups whose value is not an object are skipped.
pub fn parse_impact(
    value: &Value,
) -> Result<(BTreeMap<String, ImpactSummary>, Vec<String>), ServiceError> {
    let object = value
        .as_object()
        .ok_or_else(|| ServiceError::Malformed("impact reply is not an object".to_string()))?;

    let mut groups = BTreeMap::new();
    let mut provisions = Vec::new();
    for (key, entry) in object {
        if key == "key_provisions" {
            provisions = string_list(entry);
            continue;
        }
        if entry.is_object()
            && let Ok(summary) = serde_json::from_value::<ImpactSummary>(entry.clone())
        {
            groups.insert(key.clone(), summary);
        }
    }
    Ok((groups, provisions))
}

/// Sentiment is required; categories and key points default to empty.
pub fn parse_feedback(value: &Value) -> Result<FeedbackAnalysis, ServiceError> {
    let raw = value
        .get("sentiment")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Malformed("missing sentiment".to_string()))?;
    let sentiment: SentimentLabel = raw
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|e| ServiceError::Malformed(format!("{e}")))?;

    let mut category_tags = BTreeSet::new();
    for key in ["category", "categories"] {
        if let Some(entry) = value.get(key) {
            category_tags.extend(string_list(entry));
        }
    }

    Ok(FeedbackAnalysis {
        sentiment,
        category_tags,
        key_points: value.get("key_points").map(string_list).unwrap_or_default(),
    })
}

/// A string or list of strings, trimmed, blanks dropped.
fn string_list(value: &Value) -> Vec<String> {
    let items: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
