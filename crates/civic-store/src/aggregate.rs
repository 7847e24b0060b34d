//! Aggregate insights over a set of feedback entries.
//!
//! Reports are recomputed from entries on every call and never stored.
//! All maps are ordered so equal inputs always yield equal reports.

use std::collections::{BTreeMap, HashMap};

use chrono::Timelike;
use civic_core::{FeedbackEntry, FeedbackKind, SentimentLabel};
use serde::Serialize;

/// How many free-text comments `top_concerns` / `top_support` keep.
pub const HIGHLIGHT_LIMIT: usize = 5;

/// Negative share above which a recommendation is raised.
pub const CONCERN_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    pub fn add(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn get(&self, label: SentimentLabel) -> usize {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Negative => self.negative,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Summary statistics over a (filtered) set of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    pub by_sentiment: SentimentCounts,
    /// Every kind is present, zero if unseen.
    pub by_kind: BTreeMap<FeedbackKind, usize>,
    pub unspecified_kind: usize,
    /// attribute → value → sentiment counts, for every attribute seen.
    pub demographics: BTreeMap<String, BTreeMap<String, SentimentCounts>>,
    /// Most frequent tags first; ties alphabetical.
    pub top_tags: Vec<TagCount>,
    /// UTC hour of day → submissions, only hours that occur.
    pub by_hour: BTreeMap<u32, usize>,
    pub support_rate: f64,
    pub concern_rate: f64,
    pub top_concerns: Vec<String>,
    pub top_support: Vec<String>,
}

impl AggregateReport {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a FeedbackEntry>,
        top_tag_limit: usize,
    ) -> Self {
        let mut total = 0usize;
        let mut by_sentiment = SentimentCounts::default();
        let mut by_kind: BTreeMap<FeedbackKind, usize> =
            FeedbackKind::ALL.into_iter().map(|k| (k, 0)).collect();
        let mut unspecified_kind = 0usize;
        let mut demographics: BTreeMap<String, BTreeMap<String, SentimentCounts>> =
            BTreeMap::new();
        let mut tags: HashMap<&str, usize> = HashMap::new();
        let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        let mut top_concerns = Vec::new();
        let mut top_support = Vec::new();

        for entry in entries {
            total += 1;
            by_sentiment.add(entry.sentiment_label);
            *by_hour.entry(entry.timestamp.hour()).or_default() += 1;

            match entry.feedback_kind {
                Some(kind) => *by_kind.entry(kind).or_default() += 1,
                None => unspecified_kind += 1,
            }

            for (key, value) in &entry.demographics {
                demographics
                    .entry(key.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .add(entry.sentiment_label);
            }

            for tag in &entry.category_tags {
                *tags.entry(tag.as_str()).or_default() += 1;
            }

            match entry.sentiment_label {
                SentimentLabel::Negative if top_concerns.len() < HIGHLIGHT_LIMIT => {
                    top_concerns.push(entry.free_text.clone());
                }
                SentimentLabel::Positive if top_support.len() < HIGHLIGHT_LIMIT => {
                    top_support.push(entry.free_text.clone());
                }
                _ => {}
            }
        }

        let mut top_tags: Vec<TagCount> = tags
            .into_iter()
            .map(|(tag, count)| TagCount {
                tag: tag.to_string(),
                count,
            })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        top_tags.truncate(top_tag_limit);

        let rate = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        Self {
            total,
            support_rate: rate(by_sentiment.positive),
            concern_rate: rate(by_sentiment.negative),
            by_sentiment,
            by_kind,
            unspecified_kind,
            demographics,
            top_tags,
            by_hour,
            top_concerns,
            top_support,
        }
    }

    /// Cross-tabulation for one demographic attribute.
    pub fn breakdown(&self, attribute: &str) -> Option<&BTreeMap<String, SentimentCounts>> {
        self.demographics.get(attribute)
    }

    /// Number of distinct values seen for `attribute`.
    pub fn represented(&self, attribute: &str) -> usize {
        self.breakdown(attribute).map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Actionable suggestions derived from the report.
    ///
    /// `attribute` selects which demographic breakdown to inspect for the
    /// group with the most negative feedback.
    pub fn recommendations(&self, attribute: &str) -> Vec<String> {
        let mut out = Vec::new();
        if self.total == 0 {
            return out;
        }

        if self.concern_rate > CONCERN_THRESHOLD {
            out.push(format!(
                "Consider addressing the high level of concerns ({:.0}% negative) before policy implementation.",
                self.concern_rate * 100.0
            ));
        }

        if let Some(breakdown) = self.breakdown(attribute) {
            // max_by_key keeps the last maximum; iterate in reverse so ties
            // resolve to the alphabetically first value.
            let most_concerned = breakdown
                .iter()
                .rev()
                .filter(|(_, counts)| counts.negative > 0)
                .max_by_key(|(_, counts)| counts.negative);
            if let Some((value, counts)) = most_concerned {
                out.push(format!(
                    "Focus stakeholder engagement on the {value} group ({attribute}), which shows the highest concern levels ({} negative).",
                    counts.negative
                ));
            }
        }

        let suggestions = self.by_kind.get(&FeedbackKind::Suggestion).copied().unwrap_or(0);
        if suggestions > 0 {
            out.push(format!(
                "Review {suggestions} citizen suggestion{} for potential policy improvements.",
                if suggestions == 1 { "" } else { "s" }
            ));
        }

        out
    }
}
