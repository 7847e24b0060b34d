//! Plain-text rendering for entries, aggregate reports and document analyses.
//!
//! Writers take any `io::Write` sink.

use std::io::{self, Write};

use civic_core::{FeedbackEntry, FeedbackKind, SentimentLabel};
use civic_store::AggregateReport;

use crate::pipeline::DocumentReport;

const MAX_LIST_ITEMS: usize = 10;

// ── Entries ──

/// One entry as a vertical card.
pub fn write_entry_card(out: &mut dyn Write, entry: &FeedbackEntry) -> io::Result<()> {
    writeln!(out, "=== #{} · {} ===", entry.id, entry.display_name())?;
    writeln!(out, "{}", entry.free_text)?;
    writeln!(out)?;

    field(out, "document", &entry.policy_document_id)?;
    field(out, "submitted", &entry.timestamp.to_rfc3339())?;
    field(out, "sentiment", entry.sentiment_label.as_str())?;
    if let Some(kind) = entry.feedback_kind {
        field(out, "kind", kind.as_str())?;
    }
    for (key, value) in &entry.demographics {
        field(out, key, value)?;
    }
    if !entry.category_tags.is_empty() {
        let tags: Vec<&str> = entry.category_tags.iter().map(String::as_str).collect();
        field(out, "categories", &tags.join(", "))?;
    }
    list(out, "key points", &entry.key_points)?;
    writeln!(out)
}

/// Entries as cards followed by a count line.
pub fn write_entries<'a>(
    out: &mut dyn Write,
    entries: impl IntoIterator<Item = &'a FeedbackEntry>,
) -> io::Result<()> {
    let mut count = 0usize;
    for entry in entries {
        write_entry_card(out, entry)?;
        count += 1;
    }
    writeln!(
        out,
        "{count} entr{}",
        if count == 1 { "y" } else { "ies" }
    )
}

/// The last `n` items, in their original order.
pub fn recent<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

// ── Aggregate report ──

pub fn write_report(
    out: &mut dyn Write,
    report: &AggregateReport,
    by: Option<&str>,
    recommendations: &[String],
) -> io::Result<()> {
    writeln!(out, "=== Feedback summary ===")?;
    if report.is_empty() {
        writeln!(out, "No feedback matches.")?;
        return Ok(());
    }
    writeln!(out)?;

    writeln!(out, "Overview")?;
    field(out, "total", &report.total.to_string())?;
    field(out, "support rate", &percent(report.support_rate))?;
    field(out, "concern rate", &percent(report.concern_rate))?;
    writeln!(out)?;

    writeln!(out, "Sentiment")?;
    for label in SentimentLabel::ALL {
        let n = report.by_sentiment.get(label);
        field(out, label.as_str(), &format!("{n:>5}  {}", share(n, report.total)))?;
    }
    writeln!(out)?;

    writeln!(out, "Feedback types")?;
    for kind in FeedbackKind::ALL {
        let n = report.by_kind.get(&kind).copied().unwrap_or(0);
        field(out, kind.as_str(), &n.to_string())?;
    }
    if report.unspecified_kind > 0 {
        field(out, "unspecified", &report.unspecified_kind.to_string())?;
    }
    writeln!(out)?;

    if let Some(attribute) = by
        && let Some(breakdown) = report.breakdown(attribute)
    {
        writeln!(out, "By {attribute}")?;
        for (value, counts) in breakdown {
            field(
                out,
                value,
                &format!(
                    "{} total, {} positive, {} neutral, {} negative",
                    counts.total(),
                    counts.positive,
                    counts.neutral,
                    counts.negative
                ),
            )?;
        }
        writeln!(out)?;
    }

    if !report.top_tags.is_empty() {
        writeln!(out, "Top categories")?;
        for tag in &report.top_tags {
            field(out, &tag.tag, &tag.count.to_string())?;
        }
        writeln!(out)?;
    }

    if !report.by_hour.is_empty() {
        writeln!(out, "Submissions by hour (UTC)")?;
        for (hour, n) in &report.by_hour {
            field(out, &format!("{hour:02}:00"), &n.to_string())?;
        }
        writeln!(out)?;
    }

    list_section(out, "Top concerns", &report.top_concerns)?;
    list_section(out, "Top support", &report.top_support)?;

    list_section(out, "Recommendations", recommendations)
}

// ── Document analysis ──

pub fn write_document(out: &mut dyn Write, report: &DocumentReport) -> io::Result<()> {
    writeln!(out, "=== {} ===", report.document_id)?;
    writeln!(out, "{}", report.source.display())?;
    writeln!(out)?;

    writeln!(out, "Simplified text")?;
    for line in report.analysis.simplified_text.lines() {
        writeln!(out, "  {line}")?;
    }
    writeln!(out)?;

    writeln!(out, "Readability")?;
    field(
        out,
        "original grade",
        &format!("{:.1} ({} words)", report.original.grade_level, report.original.word_count),
    )?;
    field(
        out,
        "simplified grade",
        &format!(
            "{:.1} ({} words)",
            report.simplified.grade_level, report.simplified.word_count
        ),
    )?;
    field(
        out,
        "improvement",
        &format!("{:+.1} grades", report.analysis.readability_delta),
    )?;
    writeln!(out)?;

    if !report.analysis.demographic_impact.is_empty() {
        writeln!(out, "Impact by group")?;
        for (group, impact) in &report.analysis.demographic_impact {
            writeln!(out, "  {group}")?;
            for (label, text) in [
                ("impact", &impact.impact),
                ("concerns", &impact.concerns),
                ("benefits", &impact.benefits),
            ] {
                if !text.is_empty() {
                    writeln!(out, "    {:<24} {}", label, text)?;
                }
            }
        }
        writeln!(out)?;
    }

    list_section(out, "Key provisions", &report.analysis.key_provisions)?;
    writeln!(out, "analysed in {:.1}s", report.elapsed_secs)
}

// ── Helpers ──

fn field(out: &mut dyn Write, name: &str, value: &str) -> io::Result<()> {
    writeln!(out, "  {:<26} {}", name, value)
}

fn list(out: &mut dyn Write, name: &str, items: &[String]) -> io::Result<()> {
    let Some((first, rest)) = items.split_first() else {
        return Ok(());
    };
    field(out, name, first)?;
    for item in rest.iter().take(MAX_LIST_ITEMS - 1) {
        writeln!(out, "  {:<26} {}", "", item)?;
    }
    if items.len() > MAX_LIST_ITEMS {
        writeln!(out, "  {:<26} ... and {} more", "", items.len() - MAX_LIST_ITEMS)?;
    }
    Ok(())
}

fn list_section(out: &mut dyn Write, header: &str, items: &[String]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{header}")?;
    for item in items.iter().take(MAX_LIST_ITEMS) {
        writeln!(out, "  - {item}")?;
    }
    writeln!(out)
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn share(n: usize, total: usize) -> String {
    if total == 0 {
        return percent(0.0);
    }
    percent(n as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use civic_core::FeedbackDraft;

    fn render(f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn entry(id: u64, label: SentimentLabel, role: &str) -> FeedbackEntry {
        FeedbackEntry::from_draft(
            id,
            Utc::now(),
            FeedbackDraft::new("doc-1", "Needs more detail", label)
                .with_demographic("role", role)
                .with_tag("Clarity")
                .with_kind(FeedbackKind::Suggestion),
        )
    }

    #[test]
    fn entry_card_shows_fields() {
        let out = render(|out| write_entry_card(out, &entry(7, SentimentLabel::Neutral, "Teacher")));
        assert!(out.starts_with("=== #7 · Anonymous ==="));
        assert!(out.contains("Needs more detail"));
        assert!(out.contains("  sentiment                  neutral"));
        assert!(out.contains("  role                       Teacher"));
        assert!(out.contains("  categories                 Clarity"));
    }

    #[test]
    fn entries_are_counted() {
        let entries = [
            entry(1, SentimentLabel::Positive, "Farmer"),
            entry(2, SentimentLabel::Negative, "Farmer"),
        ];
        let out = render(|out| write_entries(out, entries.iter()));
        assert!(out.ends_with("2 entries\n"));
        let out = render(|out| write_entries(out, std::iter::empty()));
        assert_eq!(out, "0 entries\n");
    }

    #[test]
    fn report_includes_breakdown_and_recommendations() {
        let entries = [
            entry(1, SentimentLabel::Negative, "Farmer"),
            entry(2, SentimentLabel::Negative, "Farmer"),
            entry(3, SentimentLabel::Positive, "Student"),
        ];
        let report = AggregateReport::from_entries(entries.iter(), 10);
        let recs = report.recommendations("role");
        let out = render(|out| write_report(out, &report, Some("role"), &recs));

        assert!(out.contains("  total                      3"));
        assert!(out.contains("  concern rate               66.7%"));
        assert!(out.contains("By role"));
        assert!(out.contains("  Farmer                     2 total, 0 positive, 0 neutral, 2 negative"));
        assert!(out.contains("Recommendations"));
        assert!(out.contains("Focus stakeholder engagement on the Farmer group (role)"));
        assert!(out.contains("Review 3 citizen suggestions"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = AggregateReport::from_entries(std::iter::empty(), 10);
        let out = render(|out| write_report(out, &report, None, &[]));
        assert!(out.contains("No feedback matches."));
    }

    #[test]
    fn long_lists_are_truncated() {
        let items: Vec<String> = (0..13).map(|i| format!("point {i}")).collect();
        let out = render(|out| list(out, "key points", &items));
        assert!(out.contains("point 9"));
        assert!(!out.contains("point 10"));
        assert!(out.contains("... and 3 more"));
    }

    #[test]
    fn report_shows_hourly_timeline() {
        let mut late = entry(2, SentimentLabel::Positive, "Student");
        late.timestamp = DateTime::parse_from_rfc3339("2026-10-18T21:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut early = entry(1, SentimentLabel::Negative, "Farmer");
        early.timestamp = DateTime::parse_from_rfc3339("2026-10-18T07:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let report = AggregateReport::from_entries([&early, &late], 10);
        let out = render(|out| write_report(out, &report, None, &[]));

        let timeline = out.find("Submissions by hour (UTC)").unwrap();
        let seven = out.find("  07:00                      1").unwrap();
        let nine_pm = out.find("  21:00                      1").unwrap();
        assert!(timeline < seven && seven < nine_pm);
    }

    #[test]
    fn recent_keeps_the_tail() {
        let items = [1, 2, 3, 4, 5];
        assert_eq!(recent(&items, 2), &[4, 5]);
        assert_eq!(recent(&items, 9), &items);
        assert!(recent(&items, 0).is_empty());
    }
}
