//! Citizen feedback types shared by the store, the AI boundary and the CLI.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open demographic mapping: attribute name → value (e.g. `age` → `25-34`).
pub type Demographics = BTreeMap<String, String>;

/// Sentiment assigned by the AI analysis client at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            _ => Err(UnknownVariant {
                kind: "sentiment label",
                value: s.to_string(),
            }),
        }
    }
}

/// The citizen's own framing of a submission, independent of AI sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Support,
    Concern,
    Suggestion,
    Question,
}

impl FeedbackKind {
    pub const ALL: [FeedbackKind; 4] = [
        Self::Support,
        Self::Concern,
        Self::Suggestion,
        Self::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Concern => "concern",
            Self::Suggestion => "suggestion",
            Self::Question => "question",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "support" => Ok(Self::Support),
            "concern" => Ok(Self::Concern),
            "suggestion" => Ok(Self::Suggestion),
            "question" => Ok(Self::Question),
            _ => Err(UnknownVariant {
                kind: "feedback kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Returned when parsing one of the closed label sets fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A feedback submission before the store has accepted it.
///
/// `sentiment_label`, `category_tags` and `key_points` are expected to come
/// from the AI analysis client; the store keeps them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDraft {
    pub policy_document_id: String,
    pub free_text: String,
    #[serde(default)]
    pub demographics: Demographics,
    pub sentiment_label: SentimentLabel,
    #[serde(default)]
    pub category_tags: BTreeSet<String>,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub feedback_kind: Option<FeedbackKind>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl FeedbackDraft {
    pub fn new(
        policy_document_id: impl Into<String>,
        free_text: impl Into<String>,
        sentiment_label: SentimentLabel,
    ) -> Self {
        Self {
            policy_document_id: policy_document_id.into(),
            free_text: free_text.into(),
            demographics: Demographics::new(),
            sentiment_label,
            category_tags: BTreeSet::new(),
            submitter: None,
            feedback_kind: None,
            key_points: Vec::new(),
        }
    }

    pub fn with_demographic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.demographics.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.category_tags.insert(tag.into());
        self
    }

    pub fn with_submitter(mut self, name: impl Into<String>) -> Self {
        self.submitter = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: FeedbackKind) -> Self {
        self.feedback_kind = Some(kind);
        self
    }

    pub fn with_key_point(mut self, point: impl Into<String>) -> Self {
        self.key_points.push(point.into());
        self
    }
}

/// One committed, immutable feedback submission.
///
/// Serialised as a single JSON line in the store's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub policy_document_id: String,
    pub free_text: String,
    #[serde(default)]
    pub demographics: Demographics,
    pub sentiment_label: SentimentLabel,
    #[serde(default)]
    pub category_tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_kind: Option<FeedbackKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,
}

impl FeedbackEntry {
    /// Stamp a (normalised) draft with its id and creation time.
    pub fn from_draft(id: u64, timestamp: DateTime<Utc>, draft: FeedbackDraft) -> Self {
        Self {
            id,
            timestamp,
            policy_document_id: draft.policy_document_id,
            free_text: draft.free_text,
            demographics: draft.demographics,
            sentiment_label: draft.sentiment_label,
            category_tags: draft.category_tags,
            submitter: draft.submitter,
            feedback_kind: draft.feedback_kind,
            key_points: draft.key_points,
        }
    }

    /// Display name, falling back to `Anonymous`.
    pub fn display_name(&self) -> &str {
        self.submitter.as_deref().unwrap_or("Anonymous")
    }
}
