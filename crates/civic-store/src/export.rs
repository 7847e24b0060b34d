//! Export formats: CSV and Parquet via Arrow, JSON via serde, and a
//! human-readable summary report.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SecondsFormat, Utc};
use civic_core::feedback_schema::{LIST_SEPARATOR, feedback_schema};
use civic_core::{FeedbackEntry, FeedbackKind, SentimentLabel};

use crate::StoreError;
use crate::aggregate::AggregateReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One row per entry; demographics flattened to `demographic:<key>`.
    Csv,
    /// Array of entries, field-for-field.
    Json,
    /// Same columns as CSV with a typed UTC timestamp.
    #[cfg(feature = "parquet")]
    Parquet,
    /// Markdown summary of the aggregate report.
    Report,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            #[cfg(feature = "parquet")]
            Self::Parquet => "parquet",
            Self::Report => "report",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Report => "md",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            #[cfg(feature = "parquet")]
            "parquet" => Ok(Self::Parquet),
            "report" | "md" | "markdown" => Ok(Self::Report),
            other => Err(StoreError::Validation(format!(
                "unknown export format {other:?}"
            ))),
        }
    }
}

/// Build one Arrow batch for `entries`.
///
/// Demographic columns are the union of attributes across `entries`,
/// sorted; entries lacking an attribute get a null cell.
pub fn to_record_batch(
    entries: &[&FeedbackEntry],
    typed_timestamp: bool,
) -> Result<RecordBatch, StoreError> {
    let keys: Vec<String> = entries
        .iter()
        .flat_map(|e| e.demographics.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let schema = Arc::new(feedback_schema(&keys, typed_timestamp));

    let timestamps: ArrayRef = if typed_timestamp {
        Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                entries.iter().map(|e| e.timestamp.timestamp_micros()),
            )
            .with_timezone("UTC"),
        )
    } else {
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| {
            e.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        })))
    };

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from_iter_values(entries.iter().map(|e| e.id))),
        timestamps,
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.policy_document_id.as_str()),
        )),
        Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.submitter.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.feedback_kind.map(|k| k.as_str()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.sentiment_label.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.free_text.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| {
            e.category_tags
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR)
        }))),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.key_points.join(LIST_SEPARATOR)),
        )),
    ];

    for key in &keys {
        columns.push(Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.demographics.get(key).map(String::as_str))
                .collect::<Vec<_>>(),
        )));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

pub fn to_csv(entries: &[&FeedbackEntry]) -> Result<Vec<u8>, StoreError> {
    let batch = to_record_batch(entries, false)?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(Vec::new());
    writer.write(&batch)?;
    Ok(writer.into_inner())
}

pub fn to_json(entries: &[&FeedbackEntry]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec_pretty(entries)?)
}

#[cfg(feature = "parquet")]
pub fn to_parquet(entries: &[&FeedbackEntry]) -> Result<Vec<u8>, StoreError> {
    let batch = to_record_batch(entries, true)?;
    let mut buf = Vec::new();
    {
        let mut writer = parquet::arrow::ArrowWriter::try_new(&mut buf, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
    }
    Ok(buf)
}

/// Render `report` as a markdown document.
///
/// `focus_attribute` picks the demographic used for the "most concerned
/// group" recommendation.
pub fn render_report(
    report: &AggregateReport,
    generated_at: DateTime<Utc>,
    focus_attribute: Option<&str>,
) -> String {
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line("# Policy Feedback Analysis Report".into());
    line(String::new());
    line(format!(
        "Generated: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    line(String::new());

    line("## Summary Statistics".into());
    line(String::new());
    line(format!("- Total feedback received: {}", report.total));
    line(format!("- Support rate: {:.1}%", report.support_rate * 100.0));
    line(format!("- Concern rate: {:.1}%", report.concern_rate * 100.0));
    for (attribute, values) in &report.demographics {
        line(format!("- Distinct {attribute} values: {}", values.len()));
    }
    line(String::new());

    line("## Sentiment".into());
    line(String::new());
    line("| Sentiment | Count |".into());
    line("|-----------|-------|".into());
    for label in SentimentLabel::ALL {
        line(format!("| {label} | {} |", report.by_sentiment.get(label)));
    }
    line(String::new());

    line("## Feedback Types".into());
    line(String::new());
    line("| Type | Count |".into());
    line("|------|-------|".into());
    for kind in FeedbackKind::ALL {
        let n = report.by_kind.get(&kind).copied().unwrap_or(0);
        line(format!("| {kind} | {n} |"));
    }
    if report.unspecified_kind > 0 {
        line(format!("| unspecified | {} |", report.unspecified_kind));
    }
    line(String::new());

    for (attribute, values) in &report.demographics {
        line(format!("## Breakdown by {attribute}"));
        line(String::new());
        line("| Value | Positive | Neutral | Negative | Total |".into());
        line("|-------|----------|---------|----------|-------|".into());
        for (value, counts) in values {
            line(format!(
                "| {value} | {} | {} | {} | {} |",
                counts.positive,
                counts.neutral,
                counts.negative,
                counts.total()
            ));
        }
        line(String::new());
    }

    if !report.top_tags.is_empty() {
        line("## Top Categories".into());
        line(String::new());
        for tag in &report.top_tags {
            line(format!("- {} ({})", tag.tag, tag.count));
        }
        line(String::new());
    }

    if !report.by_hour.is_empty() {
        line("## Submission Timeline".into());
        line(String::new());
        line("| Hour (UTC) | Submissions |".into());
        line("|------------|-------------|".into());
        for (hour, n) in &report.by_hour {
            line(format!("| {hour:02}:00 | {n} |"));
        }
        line(String::new());
    }

    line("## Top Concerns".into());
    line(String::new());
    numbered(&mut line, &report.top_concerns);

    line("## Top Support Points".into());
    line(String::new());
    numbered(&mut line, &report.top_support);

    let recommendations = report.recommendations(focus_attribute.unwrap_or_default());
    if !recommendations.is_empty() {
        line("## Recommendations".into());
        line(String::new());
        numbered(&mut line, &recommendations);
    }

    out
}

fn numbered(line: &mut impl FnMut(String), items: &[String]) {
    if items.is_empty() {
        line("_None._".into());
    }
    for (i, item) in items.iter().enumerate() {
        line(format!("{}. {}", i + 1, item));
    }
    line(String::new());
}
