//! Entry filters shared by `list`, `aggregate` and `export`.

use civic_core::{FeedbackEntry, FeedbackKind, SentimentLabel};

use crate::StoreError;

/// Conjunctive filter: an entry matches when every set criterion matches.
/// The default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackFilter {
    pub policy_document_id: Option<String>,
    /// `(attribute, value)` pairs; all must be present on the entry.
    pub demographics: Vec<(String, String)>,
    pub sentiment: Option<SentimentLabel>,
    pub kind: Option<FeedbackKind>,
}

impl FeedbackFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.policy_document_id = Some(id.into().trim().to_string());
        self
    }

    pub fn demographic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.demographics
            .push((key.into().trim().to_string(), value.into().trim().to_string()));
        self
    }

    pub fn sentiment(mut self, label: SentimentLabel) -> Self {
        self.sentiment = Some(label);
        self
    }

    pub fn kind(mut self, kind: FeedbackKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Parse a `key=value` demographic criterion.
    pub fn parse_demographic(raw: &str) -> Result<(String, String), StoreError> {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            StoreError::Validation(format!("demographic filter {raw:?} must be key=value"))
        })?;
        Ok((key.trim().to_string(), value.trim().to_string()))
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(id) = &self.policy_document_id
            && id.trim().is_empty()
        {
            return Err(StoreError::Validation(
                "document filter must not be empty".into(),
            ));
        }
        for (key, _) in &self.demographics {
            if key.trim().is_empty() {
                return Err(StoreError::Validation(
                    "demographic filter attribute must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Criteria are compared trimmed, the same way `submit` stores them.
    pub fn matches(&self, entry: &FeedbackEntry) -> bool {
        if let Some(id) = &self.policy_document_id
            && entry.policy_document_id != id.trim()
        {
            return false;
        }
        if let Some(label) = self.sentiment
            && entry.sentiment_label != label
        {
            return false;
        }
        if let Some(kind) = self.kind
            && entry.feedback_kind != Some(kind)
        {
            return false;
        }
        self.demographics
            .iter()
            .all(|(k, v)| {
                entry
                    .demographics
                    .get(k.trim())
                    .is_some_and(|stored| stored == v.trim())
            })
    }
}
